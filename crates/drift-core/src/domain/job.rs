//! Job messages: the queue wire contract.
//!
//! The queue carries only `{tenantId, candidateId, attempt}`. All state lives
//! in the candidate store; a message is just "go look at this candidate".

use serde::{Deserialize, Serialize};
use std::fmt;

use super::ids::{CandidateId, TenantId};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobMessage {
    pub tenant_id: TenantId,
    pub candidate_id: CandidateId,
    /// Carried through follow-ups unchanged; 1-indexed.
    pub attempt: u32,
}

impl JobMessage {
    pub fn new(tenant_id: TenantId, candidate_id: CandidateId, attempt: u32) -> Self {
        Self {
            tenant_id,
            candidate_id,
            attempt,
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn from_json(body: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(body)
    }
}

/// Opaque id handed back by the queue on enqueue.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(String);

impl MessageId {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// A message as received from the queue: the raw body plus the provider's
/// signature over it. The body must not be trusted until the signature checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedDelivery {
    pub message_id: MessageId,
    pub body: String,
    pub signature: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use ulid::Ulid;

    #[test]
    fn wire_format_is_camel_case() {
        let id = CandidateId::from_ulid(Ulid::new());
        let msg = JobMessage::new(TenantId::new("acme"), id, 3);

        let v: serde_json::Value = serde_json::from_str(&msg.to_json().unwrap()).unwrap();
        assert_eq!(v["tenantId"], "acme");
        assert_eq!(v["candidateId"], id.as_ulid().to_string());
        assert_eq!(v["attempt"], 3);
    }

    #[test]
    fn rejects_missing_fields() {
        let err = JobMessage::from_json(r#"{"tenantId":"acme","attempt":1}"#);
        assert!(err.is_err());
    }
}
