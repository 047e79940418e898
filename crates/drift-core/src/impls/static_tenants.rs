//! StaticTenantDirectory - 設定から作る固定のテナント一覧

use async_trait::async_trait;
use std::collections::HashMap;

use crate::domain::TenantId;
use crate::error::StoreError;
use crate::ports::{TenantCapabilities, TenantDirectory};

/// Per-tenant capabilities with a shared default for unknown tenants.
#[derive(Debug, Clone, Default)]
pub struct StaticTenantDirectory {
    default: TenantCapabilities,
    tenants: HashMap<TenantId, TenantCapabilities>,
}

impl StaticTenantDirectory {
    pub fn new(default: TenantCapabilities) -> Self {
        Self {
            default,
            tenants: HashMap::new(),
        }
    }

    pub fn with_tenant(mut self, tenant_id: TenantId, capabilities: TenantCapabilities) -> Self {
        self.tenants.insert(tenant_id, capabilities);
        self
    }
}

#[async_trait]
impl TenantDirectory for StaticTenantDirectory {
    async fn capabilities(&self, tenant_id: &TenantId) -> Result<TenantCapabilities, StoreError> {
        Ok(self
            .tenants
            .get(tenant_id)
            .cloned()
            .unwrap_or_else(|| self.default.clone()))
    }
}
