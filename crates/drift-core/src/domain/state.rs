//! Candidate workflow state machine.
//!
//! State transitions (happy path):
//! - INGESTED -> ELIGIBILITY_CHECKED -> SIGNALS_CORRELATED -> DRIFT_CLASSIFIED
//! - -> DOCS_RESOLVED -> DOCS_FETCHED -> DOC_CONTEXT_EXTRACTED -> BASELINE_CHECKED
//! - -> PATCH_PLANNED -> PATCH_GENERATED -> PATCH_VALIDATED -> OWNER_RESOLVED
//! - -> SLACK_SENT -> AWAITING_HUMAN
//! - (human) APPROVED -> WRITEBACK_VALIDATED -> WRITTEN_BACK -> COMPLETED
//! - (human) EDIT_REQUESTED -> PATCH_GENERATED (re-enters the pipeline)
//!
//! Design note: the edge list lives in `can_transition_to` so neither the
//! harness nor the event handlers can move a candidate along an edge that
//! isn't in the table.

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CandidateState {
    Ingested,
    EligibilityChecked,
    SignalsCorrelated,
    DriftClassified,
    DocsResolved,
    DocsFetched,
    DocContextExtracted,
    BaselineChecked,
    PatchPlanned,
    PatchGenerated,
    PatchValidated,
    OwnerResolved,
    SlackSent,
    AwaitingHuman,
    Approved,
    EditRequested,
    WritebackValidated,
    WrittenBack,
    Completed,
    Failed,
    FailedNeedsMapping,
}

impl CandidateState {
    pub const ALL: [CandidateState; 21] = [
        CandidateState::Ingested,
        CandidateState::EligibilityChecked,
        CandidateState::SignalsCorrelated,
        CandidateState::DriftClassified,
        CandidateState::DocsResolved,
        CandidateState::DocsFetched,
        CandidateState::DocContextExtracted,
        CandidateState::BaselineChecked,
        CandidateState::PatchPlanned,
        CandidateState::PatchGenerated,
        CandidateState::PatchValidated,
        CandidateState::OwnerResolved,
        CandidateState::SlackSent,
        CandidateState::AwaitingHuman,
        CandidateState::Approved,
        CandidateState::EditRequested,
        CandidateState::WritebackValidated,
        CandidateState::WrittenBack,
        CandidateState::Completed,
        CandidateState::Failed,
        CandidateState::FailedNeedsMapping,
    ];

    /// Is this a terminal state (no further transitions)?
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            CandidateState::Completed | CandidateState::Failed | CandidateState::FailedNeedsMapping
        )
    }

    /// Does progress from here require an external approval/edit event?
    pub fn is_human_gated(self) -> bool {
        matches!(self, CandidateState::AwaitingHuman)
    }

    /// States that must have a registered stage handler.
    pub fn requires_handler(self) -> bool {
        !self.is_terminal() && !self.is_human_gated()
    }

    /// Is `next` a legal successor of `self`?
    ///
    /// Any non-terminal state may fall to FAILED (retry budget exhausted or a
    /// terminal stage error); everything else follows the transition table.
    pub fn can_transition_to(self, next: CandidateState) -> bool {
        use CandidateState::*;

        if self.is_terminal() {
            return false;
        }
        if next == Failed {
            return true;
        }

        match self {
            Ingested => matches!(next, EligibilityChecked | Completed),
            EligibilityChecked => matches!(next, SignalsCorrelated),
            SignalsCorrelated => matches!(next, DriftClassified | Completed),
            DriftClassified => matches!(next, DocsResolved | Completed | FailedNeedsMapping),
            DocsResolved => matches!(next, DocsFetched | Completed | FailedNeedsMapping),
            DocsFetched => matches!(next, DocContextExtracted),
            DocContextExtracted => matches!(next, BaselineChecked),
            BaselineChecked => matches!(next, PatchPlanned),
            PatchPlanned => matches!(next, PatchGenerated),
            PatchGenerated => matches!(next, PatchValidated),
            PatchValidated => matches!(next, OwnerResolved),
            OwnerResolved => matches!(next, SlackSent | Completed),
            SlackSent => matches!(next, AwaitingHuman | Approved),
            AwaitingHuman => matches!(next, Approved | EditRequested | Completed),
            Approved => matches!(next, WritebackValidated),
            EditRequested => matches!(next, PatchGenerated),
            WritebackValidated => matches!(next, WrittenBack),
            WrittenBack => matches!(next, Completed),
            Completed | Failed | FailedNeedsMapping => false,
        }
    }

    pub fn as_str(self) -> &'static str {
        use CandidateState::*;
        match self {
            Ingested => "INGESTED",
            EligibilityChecked => "ELIGIBILITY_CHECKED",
            SignalsCorrelated => "SIGNALS_CORRELATED",
            DriftClassified => "DRIFT_CLASSIFIED",
            DocsResolved => "DOCS_RESOLVED",
            DocsFetched => "DOCS_FETCHED",
            DocContextExtracted => "DOC_CONTEXT_EXTRACTED",
            BaselineChecked => "BASELINE_CHECKED",
            PatchPlanned => "PATCH_PLANNED",
            PatchGenerated => "PATCH_GENERATED",
            PatchValidated => "PATCH_VALIDATED",
            OwnerResolved => "OWNER_RESOLVED",
            SlackSent => "SLACK_SENT",
            AwaitingHuman => "AWAITING_HUMAN",
            Approved => "APPROVED",
            EditRequested => "EDIT_REQUESTED",
            WritebackValidated => "WRITEBACK_VALIDATED",
            WrittenBack => "WRITTEN_BACK",
            Completed => "COMPLETED",
            Failed => "FAILED",
            FailedNeedsMapping => "FAILED_NEEDS_MAPPING",
        }
    }
}

impl fmt::Display for CandidateState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
