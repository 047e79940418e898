use thiserror::Error;

use crate::domain::{CandidateId, CandidateState, TenantId};

/// Errors from the persistence substrate.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("version conflict for {candidate_id}: expected {expected}, found {actual}")]
    VersionConflict {
        candidate_id: CandidateId,
        expected: u64,
        actual: u64,
    },

    #[error("record already exists: {0}")]
    AlreadyExists(String),

    #[error("storage backend: {0}")]
    Backend(String),
}

/// Errors from the lock provider itself (not "someone else holds it").
#[derive(Debug, Error)]
pub enum LockError {
    #[error("lock backend: {0}")]
    Backend(String),
}

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("delivery signature mismatch")]
    BadSignature,

    #[error("malformed job message: {0}")]
    Malformed(String),

    #[error("queue operation failed: {0}")]
    OperationFailed(String),
}

/// Errors from a document-system adapter. The variants decide how a stage reacts.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DocError {
    /// Base revision no longer current.
    #[error("revision conflict on {doc_id}: base={base}, current={current}")]
    Conflict {
        doc_id: String,
        base: String,
        current: String,
    },

    #[error("document not found: {0}")]
    NotFound(String),

    /// Transient; retry later.
    #[error("document system unavailable: {0}")]
    Unavailable(String),

    /// The system refused the write for good.
    #[error("write rejected: {0}")]
    Rejected(String),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid config: {0}")]
    Invalid(String),

    #[error("config parse: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Crate-level error for infrastructure failures the harness cannot absorb
/// into candidate state.
#[derive(Debug, Error)]
pub enum DriftError {
    #[error("candidate not found: tenant={tenant_id} id={candidate_id}")]
    CandidateNotFound {
        tenant_id: TenantId,
        candidate_id: CandidateId,
    },

    #[error("no stage handler for state={0}")]
    HandlerNotFound(CandidateState),

    #[error("illegal transition {from} -> {to}")]
    IllegalTransition {
        from: CandidateState,
        to: CandidateState,
    },

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Lock(#[from] LockError),

    #[error(transparent)]
    Queue(#[from] QueueError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}
