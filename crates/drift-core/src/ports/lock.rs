//! LockProvider port - candidate ごとのリース
//!
//! # 設計原則
//! - ロックではなくリース: TTL 付きなので、クラッシュしたワーカーが
//!   candidate を永久に塞ぐことはない
//! - 取得失敗はエラーではない（`Ok(None)`）: 他のワーカーが処理中というだけ
//! - release は冪等。ただし自分のトークンのリースしか消さない
//!   （期限切れ後に引き継いだ後続ワーカーのリースを守る）

use async_trait::async_trait;
use std::fmt;

use crate::domain::{CandidateId, TenantId};
use crate::error::LockError;

/// Proof of one acquisition; `release` only drops the lease it names.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LeaseToken(String);

impl LeaseToken {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LeaseToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[async_trait]
pub trait LockProvider: Send + Sync {
    /// Try to take the lease for `(tenant, candidate)`.
    ///
    /// Returns `Ok(None)` when a live lease is held by someone else.
    async fn acquire(
        &self,
        tenant_id: &TenantId,
        candidate_id: CandidateId,
    ) -> Result<Option<LeaseToken>, LockError>;

    /// Drop the lease if `token` still owns it. Succeeds when the lease is
    /// gone or has passed to another holder.
    async fn release(
        &self,
        tenant_id: &TenantId,
        candidate_id: CandidateId,
        token: &LeaseToken,
    ) -> Result<(), LockError>;
}

/// Lock key layout shared by implementations.
pub fn lock_key(tenant_id: &TenantId, candidate_id: CandidateId) -> String {
    format!("drift-lock:{tenant_id}:{candidate_id}")
}
