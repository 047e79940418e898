//! InMemoryLockProvider - 開発用の TTL リース
//!
//! # 制限
//! - プロセス内のみ（複数プロセス間では共有されない）
//! - 永続化なし

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;
use ulid::Ulid;

use crate::domain::{CandidateId, TenantId};
use crate::error::LockError;
use crate::ports::lock::lock_key;
use crate::ports::{Clock, LeaseToken, LockProvider, SystemClock};

#[derive(Debug, Clone)]
struct Lease {
    token: LeaseToken,
    expires_at: DateTime<Utc>,
}

pub struct InMemoryLockProvider {
    leases: RwLock<HashMap<String, Lease>>,
    ttl: Duration,
    clock: Arc<dyn Clock>,
}

fn poison_err<T>(_: PoisonError<T>) -> LockError {
    LockError::Backend("lease table lock poisoned".to_string())
}

impl InMemoryLockProvider {
    pub fn new(ttl: Duration) -> Self {
        Self::with_clock(ttl, Arc::new(SystemClock))
    }

    pub fn with_clock(ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            leases: RwLock::new(HashMap::new()),
            ttl,
            clock,
        }
    }

    /// True while a live lease exists for the candidate.
    pub fn is_held(&self, tenant_id: &TenantId, candidate_id: CandidateId) -> bool {
        let now = self.clock.now();
        self.leases
            .read()
            .map(|leases| {
                leases
                    .get(&lock_key(tenant_id, candidate_id))
                    .is_some_and(|l| l.expires_at > now)
            })
            .unwrap_or(false)
    }
}

#[async_trait]
impl LockProvider for InMemoryLockProvider {
    async fn acquire(
        &self,
        tenant_id: &TenantId,
        candidate_id: CandidateId,
    ) -> Result<Option<LeaseToken>, LockError> {
        let key = lock_key(tenant_id, candidate_id);
        let now = self.clock.now();
        let expires_at = chrono::Duration::from_std(self.ttl)
            .ok()
            .and_then(|ttl| now.checked_add_signed(ttl))
            .ok_or_else(|| LockError::Backend(format!("lease ttl out of range: {:?}", self.ttl)))?;
        let mut leases = self.leases.write().map_err(poison_err)?;

        if let Some(lease) = leases.get(&key)
            && lease.expires_at > now
        {
            tracing::debug!(%key, token = %lease.token, "lease held elsewhere");
            return Ok(None);
        }

        let token = LeaseToken::new(Ulid::new().to_string());
        leases.insert(
            key,
            Lease {
                token: token.clone(),
                expires_at,
            },
        );
        Ok(Some(token))
    }

    async fn release(
        &self,
        tenant_id: &TenantId,
        candidate_id: CandidateId,
        token: &LeaseToken,
    ) -> Result<(), LockError> {
        let key = lock_key(tenant_id, candidate_id);
        let mut leases = self.leases.write().map_err(poison_err)?;
        let holder = leases.get(&key).map(|l| l.token.clone());
        match holder {
            Some(holder) if &holder == token => {
                leases.remove(&key);
            }
            Some(holder) => {
                tracing::warn!(%key, ours = %token, %holder, "lease passed to another holder, leaving it");
            }
            None => {}
        }
        Ok(())
    }
}
