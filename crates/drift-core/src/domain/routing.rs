//! Ownership and routing records stored on the candidate.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Who gets told about a candidate: a chat channel or a user handle.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OwnerTarget(String);

impl OwnerTarget {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OwnerTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Ownership sources, in resolution priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OwnerSourceKind {
    ExplicitMapping,
    RepoMetadata,
    WorkspaceDefault,
}

/// One source that produced an owner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OwnerHit {
    pub source: OwnerSourceKind,
    pub target: OwnerTarget,
    /// What matched (service name, repo prefix, ...).
    pub matched: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct OwnerResolution {
    pub primary: Option<OwnerTarget>,
    pub fallback: Option<OwnerTarget>,
    pub sources: Vec<OwnerHit>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoutingAction {
    Ignore,
    Digest,
    Notify,
    AutoApprove,
}

impl RoutingAction {
    /// Ordering by how much human attention the action asks for.
    pub fn aggressiveness(self) -> u8 {
        match self {
            RoutingAction::Ignore => 0,
            RoutingAction::Digest => 1,
            RoutingAction::Notify => 2,
            RoutingAction::AutoApprove => 3,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    Normal,
    High,
    Urgent,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutingDecision {
    pub action: RoutingAction,
    pub should_notify: bool,
    pub channel: Option<OwnerTarget>,
    pub priority: Priority,
    pub reason: String,
}

/// What the notification channel gave back when we sent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationReceipt {
    pub target: OwnerTarget,
    pub ts: Option<String>,
    pub sent_at: DateTime<Utc>,
}
