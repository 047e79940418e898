//! Domain model (IDs, candidate, signal, proposal, state, errors, ...).
//!
//! 永続化やキューを前提にしない純粋なデータ型だけを置く。

pub mod candidate;
pub mod decision;
pub mod errors;
pub mod findings;
pub mod history;
pub mod ids;
pub mod job;
pub mod proposal;
pub mod retry;
pub mod routing;
pub mod signal;
pub mod state;

pub use candidate::{DriftCandidate, Evidence, Fingerprint, Resolution, RiskLevel};
pub use decision::{Decider, Decision, RetryDecider};
pub use errors::{ErrorCode, ErrorKind, StageError};
pub use findings::{
    BaselineMatch, BaselineReport, DocCandidate, DocSection, DocSystem, ExtractedContext,
    FetchedDoc, MatchKind, PatchPlan, PatchStyle, PlanSource, StageFinding, ValidationCheck,
    ValidationReport,
};
pub use history::TransitionRecord;
pub use ids::{CandidateId, ProposalId, SignalId, TenantId};
pub use job::{JobMessage, MessageId, SignedDelivery};
pub use proposal::PatchProposal;
pub use retry::RetryPolicy;
pub use routing::{
    NotificationReceipt, OwnerHit, OwnerResolution, OwnerSourceKind, OwnerTarget, Priority,
    RoutingAction, RoutingDecision,
};
pub use signal::{SignalEvent, SourceType};
pub use state::CandidateState;
