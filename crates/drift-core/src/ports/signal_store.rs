//! SignalStore port - 取り込み済みシグナル（不変）

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::{SignalEvent, SignalId, TenantId};
use crate::error::StoreError;

#[async_trait]
pub trait SignalStore: Send + Sync {
    async fn insert_signal(&self, signal: SignalEvent) -> Result<(), StoreError>;

    async fn get_signal(
        &self,
        tenant_id: &TenantId,
        signal_id: SignalId,
    ) -> Result<Option<SignalEvent>, StoreError>;

    /// Signals for `service` that occurred at or after `since`, oldest first.
    async fn signals_for_service(
        &self,
        tenant_id: &TenantId,
        service: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<SignalEvent>, StoreError>;
}
