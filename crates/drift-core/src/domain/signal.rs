//! Immutable ingested signals.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::ids::{SignalId, TenantId};

/// Where a signal came from. Routing thresholds and correlation weights are
/// keyed by this.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceType {
    GithubPr,
    Incident,
    SlackThread,
    Deploy,
    Other(String),
}

impl SourceType {
    pub fn as_str(&self) -> &str {
        match self {
            SourceType::GithubPr => "github_pr",
            SourceType::Incident => "incident",
            SourceType::SlackThread => "slack_thread",
            SourceType::Deploy => "deploy",
            SourceType::Other(s) => s,
        }
    }

    /// Parse the external name; anything unknown is kept as `Other`.
    pub fn parse(s: &str) -> Self {
        match s {
            "github_pr" => SourceType::GithubPr,
            "incident" => SourceType::Incident,
            "slack_thread" => SourceType::SlackThread,
            "deploy" => SourceType::Deploy,
            other => SourceType::Other(other.to_string()),
        }
    }
}

impl fmt::Display for SourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An ingested event. Created once, never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalEvent {
    pub tenant_id: TenantId,
    pub id: SignalId,
    pub source_type: SourceType,
    pub occurred_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repo: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service: Option<String>,
    /// Fields pulled out by the ingestion collaborator (title, merged, summary, ...).
    #[serde(default)]
    pub extracted: serde_json::Map<String, serde_json::Value>,
    #[serde(default)]
    pub raw_payload: serde_json::Map<String, serde_json::Value>,
}

impl SignalEvent {
    pub fn extracted_str(&self, key: &str) -> Option<&str> {
        self.extracted.get(key).and_then(|v| v.as_str())
    }

    pub fn extracted_bool(&self, key: &str) -> Option<bool> {
        self.extracted.get(key).and_then(|v| v.as_bool())
    }

    /// String list under `key`; non-string entries are skipped.
    pub fn extracted_strings(&self, key: &str) -> Vec<String> {
        self.extracted
            .get(key)
            .and_then(|v| v.as_array())
            .map(|items| {
                items
                    .iter()
                    .filter_map(|v| v.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default()
    }
}
