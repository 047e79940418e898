//! DriftCandidate: the entity the harness orchestrates.
//!
//! Design:
//! - Mutated only by the harness (and the locked event handlers).
//! - State transitions via methods (not direct field access), following the
//!   same pattern as the task record this crate grew out of.
//! - Never deleted; terminal candidates stay for audit.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::errors::ErrorCode;
use super::findings::{
    BaselineReport, DocCandidate, ExtractedContext, FetchedDoc, PatchPlan, StageFinding,
    ValidationReport,
};
use super::ids::{CandidateId, SignalId, TenantId};
use super::routing::{NotificationReceipt, OwnerResolution, RoutingDecision};
use super::state::CandidateState;

/// Hex content hash identifying semantically identical drift.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn new(hex: impl Into<String>) -> Self {
        Self(hex.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    #[default]
    Low,
    Medium,
    High,
    Critical,
}

impl RiskLevel {
    pub fn is_elevated(self) -> bool {
        matches!(self, RiskLevel::High | RiskLevel::Critical)
    }
}

/// What the classifier saw; feeds key-token extraction and the baseline check.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Evidence {
    pub summary: String,
    #[serde(default)]
    pub old_terms: Vec<String>,
    #[serde(default)]
    pub new_terms: Vec<String>,
}

/// Why a candidate ended in COMPLETED.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Resolution {
    NotActionable { reason: String },
    NoDrift,
    Duplicate { of: CandidateId },
    NoDocs,
    RoutingSuppressed { reason: String },
    Digest,
    Rejected { reason: String },
    WrittenBack { revision: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriftCandidate {
    // identity
    pub tenant_id: TenantId,
    pub id: CandidateId,
    pub signal_event_id: SignalId,

    // workflow
    pub state: CandidateState,
    pub state_updated_at: DateTime<Utc>,
    pub retry_count: u32,
    pub last_error_code: Option<ErrorCode>,
    pub last_error_message: Option<String>,

    // classification
    pub drift_type: Option<String>,
    pub drift_domains: Vec<String>,
    pub confidence: f64,
    pub drift_score: f64,
    pub risk_level: RiskLevel,
    pub evidence: Evidence,

    // dedup
    pub fingerprint: Option<Fingerprint>,
    pub duplicate_of: Option<CandidateId>,

    // correlation
    pub correlated_signals: Vec<SignalId>,
    pub correlation_boost: f64,
    pub correlation_reason: Option<String>,

    // working memory
    pub doc_candidates: Vec<DocCandidate>,
    pub findings: Vec<StageFinding>,

    // ownership / routing
    pub owner_resolution: Option<OwnerResolution>,
    pub routing: Option<RoutingDecision>,
    pub notification: Option<NotificationReceipt>,

    // human loop
    pub edit_cycle: u32,
    pub edit_instructions: Option<String>,
    pub resolution: Option<Resolution>,

    /// Optimistic write token, bumped by the store on every save.
    pub version: u64,
    pub created_at: DateTime<Utc>,
}

impl DriftCandidate {
    /// A fresh candidate in INGESTED.
    pub fn ingested(
        tenant_id: TenantId,
        id: CandidateId,
        signal_event_id: SignalId,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            tenant_id,
            id,
            signal_event_id,
            state: CandidateState::Ingested,
            state_updated_at: now,
            retry_count: 0,
            last_error_code: None,
            last_error_message: None,
            drift_type: None,
            drift_domains: Vec::new(),
            confidence: 0.0,
            drift_score: 0.0,
            risk_level: RiskLevel::Low,
            evidence: Evidence::default(),
            fingerprint: None,
            duplicate_of: None,
            correlated_signals: Vec::new(),
            correlation_boost: 0.0,
            correlation_reason: None,
            doc_candidates: Vec::new(),
            findings: Vec::new(),
            owner_resolution: None,
            routing: None,
            notification: None,
            edit_cycle: 0,
            edit_instructions: None,
            resolution: None,
            version: 0,
            created_at: now,
        }
    }

    /// Move to `next` after a successful stage.
    ///
    /// `retry_count` is a per-candidate budget and is never reset; only the
    /// last-error fields are cleared.
    pub fn advance(&mut self, next: CandidateState, now: DateTime<Utc>) {
        self.state = next;
        self.state_updated_at = now;
        self.last_error_code = None;
        self.last_error_message = None;
    }

    /// Stay put after a transient failure.
    pub fn record_retry(&mut self, code: ErrorCode, message: impl Into<String>) {
        self.retry_count += 1;
        self.last_error_code = Some(code);
        self.last_error_message = Some(message.into());
    }

    /// Force FAILED with a structured error.
    pub fn mark_failed(&mut self, code: ErrorCode, message: impl Into<String>, now: DateTime<Utc>) {
        self.fail_as(CandidateState::Failed, code, message, now);
    }

    /// Force a failure state (FAILED or FAILED_NEEDS_MAPPING).
    pub fn fail_as(
        &mut self,
        state: CandidateState,
        code: ErrorCode,
        message: impl Into<String>,
        now: DateTime<Utc>,
    ) {
        self.state = state;
        self.state_updated_at = now;
        self.last_error_code = Some(code);
        self.last_error_message = Some(message.into());
    }

    /// Complete without error, recording why.
    pub fn complete_with(&mut self, resolution: Resolution) -> CandidateState {
        self.resolution = Some(resolution);
        CandidateState::Completed
    }

    /// Insert or replace the finding of the same kind, keeping stage order.
    pub fn set_finding(&mut self, finding: StageFinding) {
        match self.findings.iter_mut().find(|f| f.same_kind(&finding)) {
            Some(slot) => *slot = finding,
            None => self.findings.push(finding),
        }
    }

    pub fn fetched_doc(&self) -> Option<&FetchedDoc> {
        self.findings.iter().find_map(|f| match f {
            StageFinding::FetchedDoc(doc) => Some(doc),
            _ => None,
        })
    }

    pub fn extracted_context(&self) -> Option<&ExtractedContext> {
        self.findings.iter().find_map(|f| match f {
            StageFinding::ExtractedContext(ctx) => Some(ctx),
            _ => None,
        })
    }

    pub fn baseline(&self) -> Option<&BaselineReport> {
        self.findings.iter().find_map(|f| match f {
            StageFinding::BaselineMatch(report) => Some(report),
            _ => None,
        })
    }

    pub fn patch_plan(&self) -> Option<&PatchPlan> {
        self.findings.iter().find_map(|f| match f {
            StageFinding::PatchPlan(plan) => Some(plan),
            _ => None,
        })
    }

    pub fn validation(&self) -> Option<&ValidationReport> {
        self.findings.iter().find_map(|f| match f {
            StageFinding::Validation(report) => Some(report),
            _ => None,
        })
    }
}
