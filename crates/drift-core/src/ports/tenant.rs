//! TenantDirectory port - テナントごとの任意機能
//!
//! インストール ID、有効なドキュメントシステム、ワークスペース既定オーナー、
//! 通知の有効/無効は 1 つの `TenantCapabilities` にまとめ、1 実行につき 1 回だけ引く。

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::{DocSystem, OwnerTarget, TenantId};
use crate::error::StoreError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TenantCapabilities {
    pub doc_systems: Vec<DocSystem>,
    pub notifications_enabled: bool,
    pub workspace_default_owner: Option<OwnerTarget>,
    pub installation_id: Option<String>,
}

impl Default for TenantCapabilities {
    fn default() -> Self {
        Self {
            doc_systems: vec![DocSystem::Confluence, DocSystem::Notion, DocSystem::Github],
            notifications_enabled: true,
            workspace_default_owner: None,
            installation_id: None,
        }
    }
}

impl TenantCapabilities {
    pub fn allows(&self, system: DocSystem) -> bool {
        self.doc_systems.contains(&system)
    }
}

#[async_trait]
pub trait TenantDirectory: Send + Sync {
    async fn capabilities(&self, tenant_id: &TenantId) -> Result<TenantCapabilities, StoreError>;
}
