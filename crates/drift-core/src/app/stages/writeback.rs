//! Writeback: revision check, optimistic write, finalize.

use async_trait::async_trait;
use tracing::{info, warn};

use crate::app::dispatcher::StageHandler;
use crate::app::services::StageContext;
use crate::domain::{
    CandidateState, DriftCandidate, ErrorCode, FetchedDoc, PatchProposal, Resolution, StageError,
};
use crate::error::DocError;
use crate::patch::UnifiedDiff;
use crate::ports::DocAdapter;

use super::{doc_error, fetched_doc, latest_proposal};

fn adapter<'a>(
    ctx: &'a StageContext<'_>,
    doc: &FetchedDoc,
) -> Result<&'a std::sync::Arc<dyn DocAdapter>, StageError> {
    ctx.services.docs.get(doc.doc_system).ok_or_else(|| {
        StageError::terminal(
            ErrorCode::WritebackFailed,
            format!("no adapter for {}", doc.doc_system),
        )
    })
}

fn patched_content(doc: &FetchedDoc, proposal: &PatchProposal) -> Result<String, StageError> {
    UnifiedDiff::parse(&proposal.unified_diff)
        .and_then(|diff| diff.apply(&doc.content))
        .map_err(|e| StageError::terminal(ErrorCode::PatchApplyFailed, e.to_string()))
}

/// The doc must still be at the revision the patch was generated against,
/// and the patch must still apply.
pub struct RevisionCheckStage;

#[async_trait]
impl StageHandler for RevisionCheckStage {
    async fn handle(
        &self,
        candidate: &mut DriftCandidate,
        ctx: &StageContext<'_>,
    ) -> Result<CandidateState, StageError> {
        let doc = fetched_doc(candidate)?;
        let current = adapter(ctx, doc)?.fetch(&doc.doc_id).await.map_err(doc_error)?;
        if current.revision != doc.revision {
            return Err(StageError::terminal(
                ErrorCode::RevisionConflict,
                format!(
                    "{} moved from revision {} to {}",
                    doc.doc_id, doc.revision, current.revision
                ),
            ));
        }

        let proposal = latest_proposal(candidate, ctx).await?;
        patched_content(doc, &proposal)?;
        Ok(CandidateState::WritebackValidated)
    }
}

/// Writes the patched doc with the fetched revision as base.
///
/// A conflict where the doc already holds exactly our content is a write
/// that succeeded before the candidate was persisted; it is not an error.
pub struct WriteStage;

#[async_trait]
impl StageHandler for WriteStage {
    async fn handle(
        &self,
        candidate: &mut DriftCandidate,
        ctx: &StageContext<'_>,
    ) -> Result<CandidateState, StageError> {
        let doc = fetched_doc(candidate)?.clone();
        let proposal = latest_proposal(candidate, ctx).await?;
        let content = patched_content(&doc, &proposal)?;
        let adapter = adapter(ctx, &doc)?;

        let revision = match adapter.write(&doc.doc_id, &doc.revision, &content).await {
            Ok(revision) => revision,
            Err(DocError::Conflict { current, .. }) => {
                let live = adapter.fetch(&doc.doc_id).await.map_err(doc_error)?;
                if live.content != content {
                    return Err(StageError::terminal(
                        ErrorCode::RevisionConflict,
                        format!("{} changed underneath the patch (now {current})", doc.doc_id),
                    ));
                }
                warn!(doc_id = %doc.doc_id, revision = %live.revision, "patch already written");
                live.revision
            }
            Err(e) => return Err(doc_error(e)),
        };

        info!(doc_id = %doc.doc_id, revision = %revision, "written back");
        candidate.resolution = Some(Resolution::WrittenBack { revision });
        Ok(CandidateState::WrittenBack)
    }
}

pub struct FinalizeStage;

#[async_trait]
impl StageHandler for FinalizeStage {
    async fn handle(
        &self,
        candidate: &mut DriftCandidate,
        _ctx: &StageContext<'_>,
    ) -> Result<CandidateState, StageError> {
        match candidate.resolution.clone() {
            Some(resolution @ Resolution::WrittenBack { .. }) => {
                Ok(candidate.complete_with(resolution))
            }
            _ => Err(StageError::terminal(
                ErrorCode::MissingArtifact,
                "written-back revision missing",
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::WriteStage;
    use crate::app::dispatcher::StageHandler;
    use crate::app::events::approve;
    use crate::app::harness::RunStatus;
    use crate::app::testkit::{PAYMENTS_CONTENT, PAYMENTS_DOC, TestEngine, merged_pr, test_config};
    use crate::domain::{CandidateId, CandidateState, ErrorCode, Resolution};
    use crate::ports::TenantCapabilities;

    async fn approved(engine: &TestEngine) -> CandidateId {
        let id = engine.ingest(merged_pr(0.85)).await;
        engine.run_until(id, CandidateState::AwaitingHuman).await;
        approve(&engine.executor, &engine.tenant, id, "alice")
            .await
            .unwrap();
        engine.run_until(id, CandidateState::WritebackValidated).await;
        id
    }

    fn one_step_engine() -> TestEngine {
        let mut config = test_config();
        config.max_transitions_per_invocation = 1;
        TestEngine::builder().config(config).build()
    }

    #[tokio::test]
    async fn replayed_write_of_our_own_content_counts_as_written() {
        let engine = one_step_engine();
        let id = approved(&engine).await;

        // the write landed but the candidate was never saved
        let caps = TenantCapabilities::default();
        let mut unsaved = engine.candidate(id).await;
        WriteStage
            .handle(&mut unsaved, &engine.context(&caps))
            .await
            .unwrap();
        let written = engine.docs.content(PAYMENTS_DOC).unwrap();
        let revision = engine.docs.revision(PAYMENTS_DOC).unwrap();
        assert_ne!(written, PAYMENTS_CONTENT);
        assert_eq!(
            engine.candidate(id).await.state,
            CandidateState::WritebackValidated
        );

        assert_eq!(engine.drain(id).await.status, RunStatus::Complete);

        let c = engine.candidate(id).await;
        assert_eq!(c.state, CandidateState::Completed);
        assert_eq!(
            c.resolution,
            Some(Resolution::WrittenBack {
                revision: revision.to_string()
            })
        );
        assert_eq!(engine.docs.content(PAYMENTS_DOC).unwrap(), written);
        assert_eq!(engine.docs.revision(PAYMENTS_DOC), Some(revision));
    }

    #[tokio::test]
    async fn write_stage_conflicts_on_foreign_content() {
        let engine = one_step_engine();
        let id = approved(&engine).await;
        engine.docs.edit(PAYMENTS_DOC, "# Payments API\nrewritten by hand\n");

        let caps = TenantCapabilities::default();
        let mut c = engine.candidate(id).await;
        let err = WriteStage
            .handle(&mut c, &engine.context(&caps))
            .await
            .unwrap_err();

        assert_eq!(err.code(), ErrorCode::RevisionConflict);
        assert_eq!(
            engine.docs.content(PAYMENTS_DOC).unwrap(),
            "# Payments API\nrewritten by hand\n"
        );
    }
}
