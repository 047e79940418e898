//! InMemoryStore - テスト用の正本
//!
//! CandidateStore と SignalStore を 1 つの RwLock 配下で実装する。
//!
//! # 制限
//! - プロセス内のみ、永続化なし

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use crate::domain::{
    CandidateId, DriftCandidate, Fingerprint, PatchProposal, SignalEvent, SignalId, TenantId,
    TransitionRecord,
};
use crate::error::StoreError;
use crate::ports::{CandidateStore, FingerprintClaim, SignalStore};

type Key<T> = (TenantId, T);

#[derive(Default)]
struct StoreState {
    candidates: HashMap<Key<CandidateId>, DriftCandidate>,
    fingerprints: HashMap<Key<Fingerprint>, CandidateId>,
    proposals: HashMap<Key<CandidateId>, Vec<PatchProposal>>,
    transitions: HashMap<Key<CandidateId>, Vec<TransitionRecord>>,
    signals: HashMap<Key<SignalId>, SignalEvent>,
}

#[derive(Default)]
pub struct InMemoryStore {
    state: RwLock<StoreState>,
}

fn poison_err<T>(_: PoisonError<T>) -> StoreError {
    StoreError::Backend("store lock poisoned".to_string())
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CandidateStore for InMemoryStore {
    async fn insert(&self, candidate: DriftCandidate) -> Result<(), StoreError> {
        let mut state = self.state.write().map_err(poison_err)?;
        let key = (candidate.tenant_id.clone(), candidate.id);
        if state.candidates.contains_key(&key) {
            return Err(StoreError::AlreadyExists(candidate.id.to_string()));
        }
        state.candidates.insert(key, candidate);
        Ok(())
    }

    async fn get(
        &self,
        tenant_id: &TenantId,
        candidate_id: CandidateId,
    ) -> Result<Option<DriftCandidate>, StoreError> {
        let state = self.state.read().map_err(poison_err)?;
        Ok(state
            .candidates
            .get(&(tenant_id.clone(), candidate_id))
            .cloned())
    }

    async fn save(&self, candidate: &DriftCandidate) -> Result<u64, StoreError> {
        let mut state = self.state.write().map_err(poison_err)?;
        let key = (candidate.tenant_id.clone(), candidate.id);
        let stored = state
            .candidates
            .get_mut(&key)
            .ok_or_else(|| StoreError::Backend(format!("unknown candidate {}", candidate.id)))?;

        if stored.version != candidate.version {
            return Err(StoreError::VersionConflict {
                candidate_id: candidate.id,
                expected: candidate.version,
                actual: stored.version,
            });
        }

        let mut next = candidate.clone();
        next.version += 1;
        let version = next.version;
        *stored = next;
        Ok(version)
    }

    async fn fingerprint_holder(
        &self,
        tenant_id: &TenantId,
        fingerprint: &Fingerprint,
    ) -> Result<Option<DriftCandidate>, StoreError> {
        let state = self.state.read().map_err(poison_err)?;
        Ok(state
            .fingerprints
            .get(&(tenant_id.clone(), fingerprint.clone()))
            .and_then(|id| state.candidates.get(&(tenant_id.clone(), *id)))
            .cloned())
    }

    async fn claim_fingerprint(
        &self,
        tenant_id: &TenantId,
        fingerprint: &Fingerprint,
        candidate_id: CandidateId,
        supersedes: Option<CandidateId>,
    ) -> Result<FingerprintClaim, StoreError> {
        let mut state = self.state.write().map_err(poison_err)?;
        let key = (tenant_id.clone(), fingerprint.clone());

        if let Some(&holder) = state.fingerprints.get(&key) {
            let replaceable = holder == candidate_id
                || Some(holder) == supersedes
                || state
                    .candidates
                    .get(&(tenant_id.clone(), holder))
                    .is_none_or(|c| c.state.is_terminal());
            if !replaceable {
                return Ok(FingerprintClaim::HeldBy(holder));
            }
        }

        state.fingerprints.insert(key, candidate_id);
        Ok(FingerprintClaim::Claimed)
    }

    async fn put_proposal(&self, proposal: PatchProposal) -> Result<(), StoreError> {
        let mut state = self.state.write().map_err(poison_err)?;
        let list = state
            .proposals
            .entry((proposal.tenant_id.clone(), proposal.drift_id))
            .or_default();
        match list.iter_mut().find(|p| p.id == proposal.id) {
            Some(existing) => *existing = proposal,
            None => list.push(proposal),
        }
        Ok(())
    }

    async fn latest_proposal(
        &self,
        tenant_id: &TenantId,
        drift_id: CandidateId,
    ) -> Result<Option<PatchProposal>, StoreError> {
        let state = self.state.read().map_err(poison_err)?;
        Ok(state
            .proposals
            .get(&(tenant_id.clone(), drift_id))
            .and_then(|list| list.iter().max_by_key(|p| p.created_at))
            .cloned())
    }

    async fn proposals(
        &self,
        tenant_id: &TenantId,
        drift_id: CandidateId,
    ) -> Result<Vec<PatchProposal>, StoreError> {
        let state = self.state.read().map_err(poison_err)?;
        let mut list = state
            .proposals
            .get(&(tenant_id.clone(), drift_id))
            .cloned()
            .unwrap_or_default();
        list.sort_by_key(|p| p.created_at);
        Ok(list)
    }

    async fn append_transition(&self, record: TransitionRecord) -> Result<(), StoreError> {
        let mut state = self.state.write().map_err(poison_err)?;
        state
            .transitions
            .entry((record.tenant_id.clone(), record.candidate_id))
            .or_default()
            .push(record);
        Ok(())
    }

    async fn transitions(
        &self,
        tenant_id: &TenantId,
        candidate_id: CandidateId,
    ) -> Result<Vec<TransitionRecord>, StoreError> {
        let state = self.state.read().map_err(poison_err)?;
        Ok(state
            .transitions
            .get(&(tenant_id.clone(), candidate_id))
            .cloned()
            .unwrap_or_default())
    }
}

#[async_trait]
impl SignalStore for InMemoryStore {
    async fn insert_signal(&self, signal: SignalEvent) -> Result<(), StoreError> {
        let mut state = self.state.write().map_err(poison_err)?;
        let key = (signal.tenant_id.clone(), signal.id);
        if state.signals.contains_key(&key) {
            return Err(StoreError::AlreadyExists(signal.id.to_string()));
        }
        state.signals.insert(key, signal);
        Ok(())
    }

    async fn get_signal(
        &self,
        tenant_id: &TenantId,
        signal_id: SignalId,
    ) -> Result<Option<SignalEvent>, StoreError> {
        let state = self.state.read().map_err(poison_err)?;
        Ok(state.signals.get(&(tenant_id.clone(), signal_id)).cloned())
    }

    async fn signals_for_service(
        &self,
        tenant_id: &TenantId,
        service: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<SignalEvent>, StoreError> {
        let state = self.state.read().map_err(poison_err)?;
        let mut found: Vec<SignalEvent> = state
            .signals
            .iter()
            .filter(|((tenant, _), s)| {
                tenant == tenant_id
                    && s.service.as_deref() == Some(service)
                    && s.occurred_at >= since
            })
            .map(|(_, s)| s.clone())
            .collect();
        found.sort_by_key(|s| s.occurred_at);
        Ok(found)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{CandidateState, DocSystem, PatchStyle};
    use chrono::Duration;
    use ulid::Ulid;

    fn candidate() -> DriftCandidate {
        DriftCandidate::ingested(
            TenantId::new("t1"),
            CandidateId::from_ulid(Ulid::new()),
            SignalId::from_ulid(Ulid::new()),
            Utc::now(),
        )
    }

    #[tokio::test]
    async fn save_checks_version() {
        let store = InMemoryStore::new();
        let c = candidate();
        store.insert(c.clone()).await.unwrap();

        let v1 = store.save(&c).await.unwrap();
        assert_eq!(v1, 1);

        // stale copy still carries version 0
        let err = store.save(&c).await.unwrap_err();
        assert!(matches!(
            err,
            StoreError::VersionConflict {
                expected: 0,
                actual: 1,
                ..
            }
        ));

        let fresh = store.get(&c.tenant_id, c.id).await.unwrap().unwrap();
        assert_eq!(fresh.version, 1);
    }

    #[tokio::test]
    async fn insert_twice_fails() {
        let store = InMemoryStore::new();
        let c = candidate();
        store.insert(c.clone()).await.unwrap();
        assert!(matches!(
            store.insert(c).await,
            Err(StoreError::AlreadyExists(_))
        ));
    }

    #[tokio::test]
    async fn fingerprint_claim_rules() {
        let store = InMemoryStore::new();
        let tenant = TenantId::new("t1");
        let fp = Fingerprint::new("abc");
        let mut first = candidate();
        let second = candidate();
        store.insert(first.clone()).await.unwrap();
        store.insert(second.clone()).await.unwrap();

        assert_eq!(
            store.claim_fingerprint(&tenant, &fp, first.id, None).await.unwrap(),
            FingerprintClaim::Claimed
        );
        // replay by the holder is fine
        assert_eq!(
            store.claim_fingerprint(&tenant, &fp, first.id, None).await.unwrap(),
            FingerprintClaim::Claimed
        );
        assert_eq!(
            store.claim_fingerprint(&tenant, &fp, second.id, None).await.unwrap(),
            FingerprintClaim::HeldBy(first.id)
        );
        assert_eq!(
            store.fingerprint_holder(&tenant, &fp).await.unwrap().map(|c| c.id),
            Some(first.id)
        );

        // once the holder is terminal the slot is free again
        first.state = CandidateState::Completed;
        store.save(&first).await.unwrap();
        assert_eq!(
            store.claim_fingerprint(&tenant, &fp, second.id, None).await.unwrap(),
            FingerprintClaim::Claimed
        );
    }

    #[tokio::test]
    async fn fingerprint_can_be_superseded_explicitly() {
        let store = InMemoryStore::new();
        let tenant = TenantId::new("t1");
        let fp = Fingerprint::new("abc");
        let first = candidate();
        let second = candidate();
        store.insert(first.clone()).await.unwrap();
        store.insert(second.clone()).await.unwrap();

        store.claim_fingerprint(&tenant, &fp, first.id, None).await.unwrap();
        assert_eq!(
            store
                .claim_fingerprint(&tenant, &fp, second.id, Some(first.id))
                .await
                .unwrap(),
            FingerprintClaim::Claimed
        );
    }

    #[tokio::test]
    async fn proposals_upsert_by_id_and_latest_wins() {
        let store = InMemoryStore::new();
        let tenant = TenantId::new("t1");
        let drift = CandidateId::from_ulid(Ulid::new());
        let now = Utc::now();
        let proposal = |cycle: u32, summary: &str, at| PatchProposal {
            tenant_id: tenant.clone(),
            id: PatchProposal::id_for(&tenant, drift, cycle),
            drift_id: drift,
            doc_system: DocSystem::Notion,
            doc_id: "n1".into(),
            doc_title: "Doc".into(),
            patch_style: PatchStyle::AddNote,
            unified_diff: String::new(),
            confidence: 0.5,
            summary: summary.into(),
            created_at: at,
        };

        store.put_proposal(proposal(0, "first", now)).await.unwrap();
        store.put_proposal(proposal(0, "first again", now)).await.unwrap();
        store
            .put_proposal(proposal(1, "edited", now + Duration::seconds(5)))
            .await
            .unwrap();

        let all = store.proposals(&tenant, drift).await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].summary, "first again");
        let latest = store.latest_proposal(&tenant, drift).await.unwrap().unwrap();
        assert_eq!(latest.summary, "edited");
    }
}
