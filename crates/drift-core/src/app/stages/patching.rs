//! Plan, generate, validate and edit patch proposals.

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::app::dispatcher::StageHandler;
use crate::app::services::StageContext;
use crate::domain::{
    CandidateState, DriftCandidate, ErrorCode, FetchedDoc, PatchPlan, PatchProposal, PatchStyle,
    PlanSource, StageError, StageFinding,
};
use crate::patch::{heuristic_plan, validate_proposal};
use crate::ports::{Clock, EditInput, GenerateInput, GeneratedPatch, PlanInput};

use super::{fetched_doc, latest_proposal, missing, store_unavailable};

/// Planner agent first; the heuristic plan when it is unavailable.
pub struct PlanStage;

#[async_trait]
impl StageHandler for PlanStage {
    async fn handle(
        &self,
        candidate: &mut DriftCandidate,
        ctx: &StageContext<'_>,
    ) -> Result<CandidateState, StageError> {
        let context = candidate
            .extracted_context()
            .cloned()
            .ok_or_else(|| missing("extracted context"))?;
        let baseline = candidate
            .baseline()
            .cloned()
            .ok_or_else(|| missing("baseline report"))?;

        let input = PlanInput {
            drift_type: candidate.drift_type.clone(),
            evidence: candidate.evidence.clone(),
            context,
            baseline,
        };
        let plan = match ctx.services.agents.planner.call(&input).await.into_result() {
            Ok(out) => PatchPlan {
                target_sections: out.target_sections,
                intent: out.intent,
                style: out.style,
                source: PlanSource::Agent,
            },
            Err(e) => {
                warn!(error = %e, "planner unavailable, using heuristic plan");
                heuristic_plan(&input.evidence, &input.context, &input.baseline)
            }
        };

        debug!(style = %plan.style, sections = plan.target_sections.len(), "patch planned");
        candidate.set_finding(StageFinding::PatchPlan(plan));
        Ok(CandidateState::PatchPlanned)
    }
}

pub struct GenerateStage;

#[async_trait]
impl StageHandler for GenerateStage {
    async fn handle(
        &self,
        candidate: &mut DriftCandidate,
        ctx: &StageContext<'_>,
    ) -> Result<CandidateState, StageError> {
        let doc = fetched_doc(candidate)?.clone();
        let plan = candidate
            .patch_plan()
            .cloned()
            .ok_or_else(|| missing("patch plan"))?;
        let context = candidate
            .extracted_context()
            .cloned()
            .ok_or_else(|| missing("extracted context"))?;

        let style = plan.style;
        let input = GenerateInput {
            doc: doc.clone(),
            plan,
            evidence: candidate.evidence.clone(),
            context,
        };
        let patch = ctx
            .services
            .agents
            .generator
            .call(&input)
            .await
            .into_result()
            .map_err(|e| {
                StageError::retryable(ErrorCode::AgentUnavailable, format!("generator: {e}"))
            })?;

        store_proposal(candidate, ctx, &doc, style, patch).await?;
        Ok(CandidateState::PatchGenerated)
    }
}

/// Runs the validator suite against the latest proposal.
///
/// Failures are recorded in the report; acting on them is the next stage's job.
pub struct ValidateStage;

#[async_trait]
impl StageHandler for ValidateStage {
    async fn handle(
        &self,
        candidate: &mut DriftCandidate,
        ctx: &StageContext<'_>,
    ) -> Result<CandidateState, StageError> {
        let proposal = latest_proposal(candidate, ctx).await?;
        let doc = fetched_doc(candidate)?;
        let report = validate_proposal(&proposal, doc, ctx.services.validation_limits());

        debug!(passed = report.passed(), "proposal validated");
        candidate.set_finding(StageFinding::Validation(report));
        Ok(CandidateState::PatchValidated)
    }
}

/// Revises the latest proposal from the reviewer's instructions.
pub struct EditStage;

#[async_trait]
impl StageHandler for EditStage {
    async fn handle(
        &self,
        candidate: &mut DriftCandidate,
        ctx: &StageContext<'_>,
    ) -> Result<CandidateState, StageError> {
        let instructions = candidate
            .edit_instructions
            .clone()
            .ok_or_else(|| missing("edit instructions"))?;
        let doc = fetched_doc(candidate)?.clone();
        let current = latest_proposal(candidate, ctx).await?;
        let style = current.patch_style;

        let input = EditInput {
            doc: doc.clone(),
            current,
            instructions,
        };
        let patch = ctx
            .services
            .agents
            .editor
            .call(&input)
            .await
            .into_result()
            .map_err(|e| StageError::retryable(ErrorCode::AgentUnavailable, format!("editor: {e}")))?;

        store_proposal(candidate, ctx, &doc, style, patch).await?;
        Ok(CandidateState::PatchGenerated)
    }
}

/// Upsert the proposal for the candidate's current edit cycle.
async fn store_proposal(
    candidate: &DriftCandidate,
    ctx: &StageContext<'_>,
    doc: &FetchedDoc,
    style: PatchStyle,
    patch: GeneratedPatch,
) -> Result<(), StageError> {
    let proposal = PatchProposal {
        tenant_id: candidate.tenant_id.clone(),
        id: PatchProposal::id_for(&candidate.tenant_id, candidate.id, candidate.edit_cycle),
        drift_id: candidate.id,
        doc_system: doc.doc_system,
        doc_id: doc.doc_id.clone(),
        doc_title: doc.title.clone(),
        patch_style: style,
        unified_diff: patch.unified_diff,
        confidence: patch.confidence.clamp(0.0, 1.0),
        summary: patch.summary,
        created_at: ctx.services.clock.now(),
    };
    debug!(proposal_id = %proposal.id, edit_cycle = candidate.edit_cycle, "proposal stored");
    ctx.services
        .store
        .put_proposal(proposal)
        .await
        .map_err(store_unavailable)
}

#[cfg(test)]
mod tests {
    use super::GenerateStage;
    use crate::app::dispatcher::StageHandler;
    use crate::app::harness::RunStatus;
    use crate::app::testkit::{TestEngine, merged_pr, test_config};
    use crate::domain::{CandidateState, ErrorCode, PlanSource};
    use crate::ports::TenantCapabilities;

    #[tokio::test]
    async fn regenerating_after_a_lost_persist_keeps_one_proposal() {
        let mut config = test_config();
        config.max_transitions_per_invocation = 1;
        let engine = TestEngine::builder().config(config).build();
        let id = engine.ingest(merged_pr(0.85)).await;
        engine.run_until(id, CandidateState::PatchPlanned).await;

        // the generator ran and stored its proposal, but the candidate was never saved
        let caps = TenantCapabilities::default();
        let mut unsaved = engine.candidate(id).await;
        let next = GenerateStage
            .handle(&mut unsaved, &engine.context(&caps))
            .await
            .unwrap();
        assert_eq!(next, CandidateState::PatchGenerated);
        assert_eq!(engine.proposals(id).await.len(), 1);
        assert_eq!(engine.candidate(id).await.state, CandidateState::PatchPlanned);

        assert_eq!(engine.drain(id).await.status, RunStatus::Waiting);

        let proposals = engine.proposals(id).await;
        assert_eq!(proposals.len(), 1);
        assert_eq!(engine.notifier.sent().len(), 1);
    }

    #[tokio::test]
    async fn planner_outage_falls_back_to_heuristic_plan() {
        let engine = TestEngine::new();
        let id = engine.ingest(merged_pr(0.85)).await;
        engine.agents.planner.failures.fail_next(1);

        assert_eq!(engine.drain(id).await.status, RunStatus::Waiting);

        let c = engine.candidate(id).await;
        assert_eq!(c.retry_count, 0);
        assert_eq!(c.patch_plan().map(|p| p.source), Some(PlanSource::Heuristic));
        assert_eq!(engine.proposals(id).await.len(), 1);
    }

    #[tokio::test]
    async fn proposal_below_confidence_floor_fails_validation() {
        let mut config = test_config();
        config.min_proposal_confidence = 0.9;
        let engine = TestEngine::builder().config(config).build();
        let id = engine.ingest(merged_pr(0.85)).await;

        assert_eq!(engine.drain(id).await.status, RunStatus::Failed);

        let c = engine.candidate(id).await;
        assert_eq!(c.state, CandidateState::Failed);
        assert_eq!(c.last_error_code, Some(ErrorCode::PatchValidationFailed));
        assert!(c.validation().is_some_and(|r| !r.passed()));
        assert!(engine.notifier.sent().is_empty());
    }

    #[tokio::test]
    async fn edit_without_instructions_is_terminal() {
        let engine = TestEngine::new();
        let id = engine.ingest(merged_pr(0.85)).await;
        engine.drain(id).await;

        // force EDIT_REQUESTED without instructions
        let mut c = engine.candidate(id).await;
        c.state = CandidateState::EditRequested;
        crate::ports::CandidateStore::save(engine.store.as_ref(), &c)
            .await
            .unwrap();

        assert_eq!(engine.drain(id).await.status, RunStatus::Failed);
        assert_eq!(
            engine.candidate(id).await.last_error_code,
            Some(ErrorCode::MissingArtifact)
        );
    }
}
