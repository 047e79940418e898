//! CandidateStore port - candidate / proposal / 遷移履歴の正本
//!
//! # 設計原則
//! - 1 レコード単位の durable write + 楽観的バージョンチェック
//!   （並行制御そのものはロックが担う。バージョンは取りこぼし検知用）
//! - candidate は削除しない
//! - proposal は candidate ごとに追記。最新（created_at）が正
//! - fingerprint の占有は insert-if-absent-or-stale を 1 操作で行う

use async_trait::async_trait;

use crate::domain::{
    CandidateId, DriftCandidate, Fingerprint, PatchProposal, TenantId, TransitionRecord,
};
use crate::error::StoreError;

/// Result of trying to become the canonical holder of a fingerprint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FingerprintClaim {
    Claimed,
    /// A live (non-terminal) candidate already holds it.
    HeldBy(CandidateId),
}

#[async_trait]
pub trait CandidateStore: Send + Sync {
    async fn insert(&self, candidate: DriftCandidate) -> Result<(), StoreError>;

    async fn get(
        &self,
        tenant_id: &TenantId,
        candidate_id: CandidateId,
    ) -> Result<Option<DriftCandidate>, StoreError>;

    /// Write `candidate` if the stored version still equals `candidate.version`.
    ///
    /// Returns the new version.
    async fn save(&self, candidate: &DriftCandidate) -> Result<u64, StoreError>;

    /// The candidate currently registered under `fingerprint`, if any.
    async fn fingerprint_holder(
        &self,
        tenant_id: &TenantId,
        fingerprint: &Fingerprint,
    ) -> Result<Option<DriftCandidate>, StoreError>;

    /// Atomically register `candidate_id` as the holder of `fingerprint`.
    ///
    /// Succeeds when the slot is empty, already held by `candidate_id`, held by
    /// a terminal candidate, or held by `supersedes`.
    async fn claim_fingerprint(
        &self,
        tenant_id: &TenantId,
        fingerprint: &Fingerprint,
        candidate_id: CandidateId,
        supersedes: Option<CandidateId>,
    ) -> Result<FingerprintClaim, StoreError>;

    /// Insert, or replace the proposal with the same id.
    async fn put_proposal(&self, proposal: PatchProposal) -> Result<(), StoreError>;

    async fn latest_proposal(
        &self,
        tenant_id: &TenantId,
        drift_id: CandidateId,
    ) -> Result<Option<PatchProposal>, StoreError>;

    /// All proposals for a candidate, oldest first.
    async fn proposals(
        &self,
        tenant_id: &TenantId,
        drift_id: CandidateId,
    ) -> Result<Vec<PatchProposal>, StoreError>;

    async fn append_transition(&self, record: TransitionRecord) -> Result<(), StoreError>;

    async fn transitions(
        &self,
        tenant_id: &TenantId,
        candidate_id: CandidateId,
    ) -> Result<Vec<TransitionRecord>, StoreError>;
}
