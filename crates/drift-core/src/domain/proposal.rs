//! Patch proposals: append-only per candidate, latest by `created_at` wins.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::findings::{DocSystem, PatchStyle};
use super::ids::{CandidateId, ProposalId, TenantId};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatchProposal {
    pub tenant_id: TenantId,
    pub id: ProposalId,
    pub drift_id: CandidateId,
    pub doc_system: DocSystem,
    pub doc_id: String,
    pub doc_title: String,
    pub patch_style: PatchStyle,
    pub unified_diff: String,
    pub confidence: f64,
    pub summary: String,
    pub created_at: DateTime<Utc>,
}

impl PatchProposal {
    /// Proposal id for one generation cycle of a candidate.
    ///
    /// Cycle 0 is the first generation; every accepted edit request bumps it.
    /// Re-running the same cycle yields the same id, so the store upserts.
    pub fn id_for(tenant_id: &TenantId, drift_id: CandidateId, edit_cycle: u32) -> ProposalId {
        ProposalId::derive(&[
            tenant_id.as_str(),
            &drift_id.to_string(),
            &edit_cycle.to_string(),
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ulid::Ulid;

    #[test]
    fn id_is_stable_per_cycle() {
        let tenant = TenantId::new("acme");
        let drift = CandidateId::from_ulid(Ulid::new());

        assert_eq!(
            PatchProposal::id_for(&tenant, drift, 0),
            PatchProposal::id_for(&tenant, drift, 0)
        );
        assert_ne!(
            PatchProposal::id_for(&tenant, drift, 0),
            PatchProposal::id_for(&tenant, drift, 1)
        );
        assert_ne!(
            PatchProposal::id_for(&TenantId::new("other"), drift, 0),
            PatchProposal::id_for(&tenant, drift, 0)
        );
    }
}
