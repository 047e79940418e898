//! Intake stages: eligibility, correlation, classification.

use async_trait::async_trait;
use tracing::debug;

use crate::app::dispatcher::StageHandler;
use crate::app::services::StageContext;
use crate::correlation::apply_boost;
use crate::domain::{
    CandidateState, DriftCandidate, ErrorCode, Resolution, SignalEvent, SourceType, StageError,
};
use crate::ports::TriageInput;

use super::{load_signal, store_unavailable};

/// Why a signal cannot lead anywhere, if it can't.
pub fn ineligibility(signal: &SignalEvent) -> Option<&'static str> {
    if signal.service.is_none() && signal.repo.is_none() {
        return Some("no_service_or_repo");
    }
    if signal.extracted_bool("actionable") == Some(false) {
        return Some("marked_not_actionable");
    }
    if signal.source_type == SourceType::GithubPr {
        if signal.extracted_bool("merged") == Some(false) {
            return Some("pr_not_merged");
        }
        if signal.extracted_bool("draft") == Some(true) {
            return Some("draft_pr");
        }
    }
    None
}

pub struct EligibilityStage;

#[async_trait]
impl StageHandler for EligibilityStage {
    async fn handle(
        &self,
        candidate: &mut DriftCandidate,
        ctx: &StageContext<'_>,
    ) -> Result<CandidateState, StageError> {
        let signal = load_signal(candidate, ctx).await?;
        match ineligibility(&signal) {
            Some(reason) => {
                debug!(reason, "signal not actionable");
                Ok(candidate.complete_with(Resolution::NotActionable {
                    reason: reason.to_string(),
                }))
            }
            None => Ok(CandidateState::EligibilityChecked),
        }
    }
}

pub struct CorrelationStage;

#[async_trait]
impl StageHandler for CorrelationStage {
    async fn handle(
        &self,
        candidate: &mut DriftCandidate,
        ctx: &StageContext<'_>,
    ) -> Result<CandidateState, StageError> {
        let signal = load_signal(candidate, ctx).await?;
        let result = ctx
            .services
            .correlator
            .join_signals(&signal)
            .await
            .map_err(store_unavailable)?;

        debug!(
            correlated = result.correlated_signals.len(),
            boost = result.confidence_boost,
            "signals correlated"
        );
        candidate.correlated_signals = result.correlated_signals;
        candidate.correlation_boost = result.confidence_boost;
        candidate.correlation_reason = result.join_reason;
        Ok(CandidateState::SignalsCorrelated)
    }
}

/// Runs triage and applies the stored correlation boost to its confidence.
///
/// Confidence is recomputed from the agent output on every run, so a replay
/// never boosts twice.
pub struct ClassificationStage;

#[async_trait]
impl StageHandler for ClassificationStage {
    async fn handle(
        &self,
        candidate: &mut DriftCandidate,
        ctx: &StageContext<'_>,
    ) -> Result<CandidateState, StageError> {
        let signal = load_signal(candidate, ctx).await?;
        let output = ctx
            .services
            .agents
            .triage
            .call(&TriageInput { signal })
            .await
            .into_result()
            .map_err(|e| StageError::retryable(ErrorCode::AgentUnavailable, format!("triage: {e}")))?;

        if !output.is_drift {
            candidate.evidence = output.evidence;
            return Ok(candidate.complete_with(Resolution::NoDrift));
        }

        candidate.drift_type = Some(output.drift_type);
        candidate.drift_domains = output.drift_domains;
        candidate.drift_score = output.drift_score;
        candidate.risk_level = output.risk_level;
        candidate.evidence = output.evidence;
        candidate.confidence = apply_boost(output.confidence.clamp(0.0, 1.0), candidate.correlation_boost);
        debug!(
            drift_type = candidate.drift_type.as_deref(),
            confidence = candidate.confidence,
            "drift classified"
        );
        Ok(CandidateState::DriftClassified)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{SignalId, TenantId};
    use chrono::Utc;
    use rstest::rstest;
    use serde_json::json;
    use ulid::Ulid;

    fn signal(
        source_type: SourceType,
        service: Option<&str>,
        extracted: serde_json::Value,
    ) -> SignalEvent {
        SignalEvent {
            tenant_id: TenantId::new("t1"),
            id: SignalId::from_ulid(Ulid::new()),
            source_type,
            occurred_at: Utc::now(),
            repo: None,
            service: service.map(str::to_string),
            extracted: extracted.as_object().cloned().unwrap_or_default(),
            raw_payload: Default::default(),
        }
    }

    #[rstest]
    #[case::merged_pr(SourceType::GithubPr, Some("api"), json!({"merged": true}), None)]
    #[case::unknown_merge_state(SourceType::GithubPr, Some("api"), json!({}), None)]
    #[case::open_pr(SourceType::GithubPr, Some("api"), json!({"merged": false}), Some("pr_not_merged"))]
    #[case::draft_pr(SourceType::GithubPr, Some("api"), json!({"draft": true}), Some("draft_pr"))]
    #[case::draft_flag_ignored_for_incident(SourceType::Incident, Some("api"), json!({"draft": true}), None)]
    #[case::no_target(SourceType::Deploy, None, json!({}), Some("no_service_or_repo"))]
    #[case::opted_out(SourceType::SlackThread, Some("api"), json!({"actionable": false}), Some("marked_not_actionable"))]
    fn eligibility_rules(
        #[case] source_type: SourceType,
        #[case] service: Option<&str>,
        #[case] extracted: serde_json::Value,
        #[case] expected: Option<&str>,
    ) {
        assert_eq!(ineligibility(&signal(source_type, service, extracted)), expected);
    }
}
