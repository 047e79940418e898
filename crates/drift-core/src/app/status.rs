//! Status - 候補の状態照会（「なぜここで止まっているのか」）
//!
//! ストアの正本から組み立てる読み取り専用ビュー。
//! エラーコードは失敗で終わった候補にだけ載せる（リトライ中の一時エラーは
//! `retry_count` で分かる）。

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::domain::{
    CandidateId, CandidateState, ErrorCode, Resolution, RoutingAction, TenantId,
};
use crate::error::DriftError;
use crate::ports::CandidateStore;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProposalSummary {
    pub doc_id: String,
    pub summary: String,
    pub confidence: f64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CandidateStatus {
    pub tenant_id: TenantId,
    pub candidate_id: CandidateId,
    pub state: CandidateState,
    pub state_updated_at: DateTime<Utc>,
    pub retry_count: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<ErrorCode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolution: Option<Resolution>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duplicate_of: Option<CandidateId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub routing_action: Option<RoutingAction>,
    pub confidence: f64,
    pub edit_cycle: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latest_proposal: Option<ProposalSummary>,
}

pub async fn candidate_status(
    store: &dyn CandidateStore,
    tenant_id: &TenantId,
    candidate_id: CandidateId,
) -> Result<CandidateStatus, DriftError> {
    let candidate = store
        .get(tenant_id, candidate_id)
        .await?
        .ok_or_else(|| DriftError::CandidateNotFound {
            tenant_id: tenant_id.clone(),
            candidate_id,
        })?;
    let latest = store.latest_proposal(tenant_id, candidate_id).await?;

    let failed = matches!(
        candidate.state,
        CandidateState::Failed | CandidateState::FailedNeedsMapping
    );
    Ok(CandidateStatus {
        tenant_id: candidate.tenant_id,
        candidate_id: candidate.id,
        state: candidate.state,
        state_updated_at: candidate.state_updated_at,
        retry_count: candidate.retry_count,
        error_code: candidate.last_error_code.filter(|_| failed),
        error_message: candidate.last_error_message.filter(|_| failed),
        resolution: candidate.resolution,
        duplicate_of: candidate.duplicate_of,
        routing_action: candidate.routing.map(|r| r.action),
        confidence: candidate.confidence,
        edit_cycle: candidate.edit_cycle,
        latest_proposal: latest.map(|p| ProposalSummary {
            doc_id: p.doc_id,
            summary: p.summary,
            confidence: p.confidence,
            created_at: p.created_at,
        }),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::testkit::{TestEngine, merged_pr};

    #[tokio::test]
    async fn waiting_candidate_shows_proposal_and_routing() {
        let engine = TestEngine::builder().unconfigured_queue().build();
        let id = engine.ingest(merged_pr(0.85)).await;

        let status = candidate_status(engine.store.as_ref(), &engine.tenant, id)
            .await
            .unwrap();

        assert_eq!(status.state, CandidateState::AwaitingHuman);
        assert_eq!(status.routing_action, Some(RoutingAction::Notify));
        assert!(status.error_code.is_none());
        let proposal = status.latest_proposal.as_ref().expect("proposal");
        assert_eq!(proposal.doc_id, "docs/payments.md");

        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["state"], "AWAITING_HUMAN");
        assert!(json.get("error_code").is_none());
    }

    #[tokio::test]
    async fn failed_candidate_surfaces_error_code() {
        let engine = TestEngine::new();
        let id = engine.ingest(merged_pr(0.85)).await;
        engine.agents.doc_resolver.failures.fail_next(1);
        engine.drain(id).await;

        let status = candidate_status(engine.store.as_ref(), &engine.tenant, id)
            .await
            .unwrap();

        assert_eq!(status.state, CandidateState::FailedNeedsMapping);
        assert_eq!(status.error_code, Some(ErrorCode::NoDocMapping));
        assert!(status.error_message.is_some());
    }

    #[tokio::test]
    async fn retrying_candidate_hides_transient_error() {
        let engine = TestEngine::new();
        let id = engine.ingest(merged_pr(0.85)).await;
        engine.agents.triage.failures.fail_next(1);
        engine.run(id).await;

        let status = candidate_status(engine.store.as_ref(), &engine.tenant, id)
            .await
            .unwrap();

        assert_eq!(status.retry_count, 1);
        assert!(status.error_code.is_none());
    }

    #[tokio::test]
    async fn unknown_candidate_is_not_found() {
        let engine = TestEngine::new();
        let missing = CandidateId::from_ulid(ulid::Ulid::new());
        let err = candidate_status(engine.store.as_ref(), &engine.tenant, missing).await;
        assert!(matches!(err, Err(DriftError::CandidateNotFound { .. })));
    }
}
