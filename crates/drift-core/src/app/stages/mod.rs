//! Stages - 状態ごとのハンドラ実装
//!
//! | モジュール | 担当状態 |
//! |---|---|
//! | `intake` | INGESTED, ELIGIBILITY_CHECKED, SIGNALS_CORRELATED |
//! | `docs` | DRIFT_CLASSIFIED, DOCS_RESOLVED, DOCS_FETCHED, DOC_CONTEXT_EXTRACTED |
//! | `patching` | BASELINE_CHECKED, PATCH_PLANNED, PATCH_GENERATED, EDIT_REQUESTED |
//! | `notify` | PATCH_VALIDATED, OWNER_RESOLVED, SLACK_SENT |
//! | `writeback` | APPROVED, WRITEBACK_VALIDATED, WRITTEN_BACK |
//!
//! 外部依存の失敗は `StageError` に写像する。一時的なものは Retryable、
//! 業務・設定上のものは Terminal。

pub mod docs;
pub mod intake;
pub mod notify;
pub mod patching;
pub mod writeback;

use crate::domain::{
    CandidateState, DriftCandidate, ErrorCode, FetchedDoc, PatchProposal, SignalEvent, StageError,
};
use crate::error::{DocError, StoreError};

use super::dispatcher::{BuildError, StageDispatcher};
use super::services::StageContext;

/// The dispatcher with every built-in stage registered.
pub fn standard_dispatcher() -> Result<StageDispatcher, BuildError> {
    use CandidateState::*;

    StageDispatcher::builder()
        .register(Ingested, intake::EligibilityStage)?
        .register(EligibilityChecked, intake::CorrelationStage)?
        .register(SignalsCorrelated, intake::ClassificationStage)?
        .register(DriftClassified, docs::DedupAndResolveStage)?
        .register(DocsResolved, docs::FetchStage)?
        .register(DocsFetched, docs::ContextStage)?
        .register(DocContextExtracted, docs::BaselineStage)?
        .register(BaselineChecked, patching::PlanStage)?
        .register(PatchPlanned, patching::GenerateStage)?
        .register(PatchGenerated, patching::ValidateStage)?
        .register(EditRequested, patching::EditStage)?
        .register(PatchValidated, notify::OwnerStage)?
        .register(OwnerResolved, notify::RouteAndSendStage)?
        .register(SlackSent, notify::GateStage)?
        .register(Approved, writeback::RevisionCheckStage)?
        .register(WritebackValidated, writeback::WriteStage)?
        .register(WrittenBack, writeback::FinalizeStage)?
        .build()
}

pub(crate) fn store_unavailable(e: StoreError) -> StageError {
    StageError::retryable(ErrorCode::DependencyUnavailable, e.to_string())
}

pub(crate) fn doc_error(e: DocError) -> StageError {
    match e {
        DocError::Unavailable(msg) => StageError::retryable(ErrorCode::DependencyUnavailable, msg),
        DocError::NotFound(doc_id) => {
            StageError::terminal(ErrorCode::DocNotFound, format!("document {doc_id} not found"))
        }
        e @ DocError::Conflict { .. } => {
            StageError::terminal(ErrorCode::RevisionConflict, e.to_string())
        }
        DocError::Rejected(msg) => StageError::terminal(ErrorCode::WritebackFailed, msg),
    }
}

fn missing(what: &str) -> StageError {
    StageError::terminal(ErrorCode::MissingArtifact, format!("{what} missing"))
}

pub(crate) async fn load_signal(
    candidate: &DriftCandidate,
    ctx: &StageContext<'_>,
) -> Result<SignalEvent, StageError> {
    ctx.services
        .signals
        .get_signal(&candidate.tenant_id, candidate.signal_event_id)
        .await
        .map_err(store_unavailable)?
        .ok_or_else(|| {
            StageError::terminal(
                ErrorCode::SignalMissing,
                format!("signal {} not found", candidate.signal_event_id),
            )
        })
}

pub(crate) fn fetched_doc(candidate: &DriftCandidate) -> Result<&FetchedDoc, StageError> {
    candidate.fetched_doc().ok_or_else(|| missing("fetched document"))
}

pub(crate) async fn latest_proposal(
    candidate: &DriftCandidate,
    ctx: &StageContext<'_>,
) -> Result<PatchProposal, StageError> {
    ctx.services
        .store
        .latest_proposal(&candidate.tenant_id, candidate.id)
        .await
        .map_err(store_unavailable)?
        .ok_or_else(|| missing("patch proposal"))
}
