//! Transition history for audit ("why did this candidate end up here?").

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::errors::ErrorCode;
use super::ids::{CandidateId, TenantId};
use super::state::CandidateState;

/// One persisted step of a candidate.
///
/// `from == to` records a transient failure (the candidate stayed put).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransitionRecord {
    pub tenant_id: TenantId,
    pub candidate_id: CandidateId,
    pub from: CandidateState,
    pub to: CandidateState,
    pub attempt: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_code: Option<ErrorCode>,
    /// Who moved it: a stage name, "harness" or an external event.
    pub actor: String,
    pub at: DateTime<Utc>,
}

impl TransitionRecord {
    pub fn new(
        tenant_id: TenantId,
        candidate_id: CandidateId,
        from: CandidateState,
        to: CandidateState,
        attempt: u32,
        actor: impl Into<String>,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            tenant_id,
            candidate_id,
            from,
            to,
            attempt,
            error_code: None,
            actor: actor.into(),
            at,
        }
    }

    pub fn with_error(mut self, code: ErrorCode) -> Self {
        self.error_code = Some(code);
        self
    }

    pub fn is_retry(&self) -> bool {
        self.from == self.to
    }
}
