//! NotificationChannel port - オーナーへの通知

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::OwnerTarget;

/// What the channel reports back. Failures are data, not errors.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SendResult {
    pub ok: bool,
    /// Provider message timestamp / id, used to thread follow-ups.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ts: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SendResult {
    pub fn sent(ts: impl Into<String>) -> Self {
        Self {
            ok: true,
            ts: Some(ts.into()),
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            ok: false,
            ts: None,
            error: Some(error.into()),
        }
    }
}

#[async_trait]
pub trait NotificationChannel: Send + Sync {
    async fn send(
        &self,
        target: &OwnerTarget,
        message: &str,
        blocks: &[serde_json::Value],
    ) -> SendResult;
}
