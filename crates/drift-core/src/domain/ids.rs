//! Domain identifiers (strongly-typed IDs).
//!
//! # ULID ベースの ID + ジェネリック実装
//! candidate / signal / proposal の ID はすべて ULID。
//! Phantom type パターンで `Id<T>` の実装を共有しつつ、
//! `CandidateId` と `SignalId` を取り違えるとコンパイルエラーになる。
//!
//! テナントは外部システムから渡される文字列なので `TenantId` は newtype。

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};
use std::fmt;
use std::marker::PhantomData;
use std::str::FromStr;
use ulid::Ulid;

/// IdMarker は各 ID 型のマーカー trait
///
/// Display で使うプレフィックス（"drift-", "sig-", "patch-"）を提供します。
pub trait IdMarker: Send + Sync + 'static {
    fn prefix() -> &'static str;
}

/// ジェネリック ID 型
///
/// Serialized as the bare ULID string so wire payloads stay language-neutral;
/// the prefix only shows up in `Display`.
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Id<T: IdMarker> {
    ulid: Ulid,
    _marker: PhantomData<T>,
}

impl<T: IdMarker> Id<T> {
    pub fn from_ulid(ulid: Ulid) -> Self {
        Self {
            ulid,
            _marker: PhantomData,
        }
    }

    pub fn as_ulid(&self) -> Ulid {
        self.ulid
    }

    /// Derive an id from arbitrary key material.
    ///
    /// Same parts always give the same id, which lets a replayed stage upsert
    /// the row it wrote the first time instead of appending another.
    pub fn derive(parts: &[&str]) -> Self {
        let mut hasher = Sha256::new();
        for part in parts {
            hasher.update(part.as_bytes());
            hasher.update(b"\x1f");
        }
        let digest = hasher.finalize();
        let mut bytes = [0u8; 16];
        bytes.copy_from_slice(&digest[..16]);
        Self::from_ulid(Ulid::from_bytes(bytes))
    }
}

impl<T: IdMarker> From<Ulid> for Id<T> {
    fn from(ulid: Ulid) -> Self {
        Self::from_ulid(ulid)
    }
}

impl<T: IdMarker> fmt::Display for Id<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", T::prefix(), self.ulid)
    }
}

/// Accepts both the bare ULID and the prefixed `Display` form.
impl<T: IdMarker> FromStr for Id<T> {
    type Err = ulid::DecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let raw = s.strip_prefix(T::prefix()).unwrap_or(s);
        Ulid::from_string(raw).map(Self::from_ulid)
    }
}

impl<T: IdMarker> Serialize for Id<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.ulid.serialize(serializer)
    }
}

impl<'de, T: IdMarker> Deserialize<'de> for Id<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ulid::deserialize(deserializer).map(Self::from_ulid)
    }
}

// ========================================
// マーカー型の定義
// ========================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Candidate {}

impl IdMarker for Candidate {
    fn prefix() -> &'static str {
        "drift-"
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Signal {}

impl IdMarker for Signal {
    fn prefix() -> &'static str {
        "sig-"
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Proposal {}

impl IdMarker for Proposal {
    fn prefix() -> &'static str {
        "patch-"
    }
}

/// Identifier of a drift candidate (the orchestrated entity).
pub type CandidateId = Id<Candidate>;

/// Identifier of an immutable ingested signal.
pub type SignalId = Id<Signal>;

/// Identifier of a patch proposal.
pub type ProposalId = Id<Proposal>;

/// Tenant (workspace) identifier as handed to us by the ingestion side.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TenantId(String);

impl TenantId {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TenantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_uses_type_prefix() {
        let ulid = Ulid::new();
        let candidate = CandidateId::from_ulid(ulid);
        let signal = SignalId::from_ulid(ulid);

        assert!(candidate.to_string().starts_with("drift-"));
        assert!(signal.to_string().starts_with("sig-"));
        // let _: CandidateId = signal; // <- does not compile
    }

    #[test]
    fn serializes_as_bare_ulid_string() {
        let ulid = Ulid::new();
        let id = CandidateId::from_ulid(ulid);

        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, format!("\"{ulid}\""));

        let back: CandidateId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }

    #[test]
    fn parses_prefixed_and_bare_forms() {
        let id = CandidateId::from_ulid(Ulid::new());

        let from_display: CandidateId = id.to_string().parse().unwrap();
        let from_bare: CandidateId = id.as_ulid().to_string().parse().unwrap();

        assert_eq!(from_display, id);
        assert_eq!(from_bare, id);
        assert!("drift-not-a-ulid".parse::<CandidateId>().is_err());
    }

    #[test]
    fn derived_ids_are_stable() {
        let a = ProposalId::derive(&["t1", "drift-x", "0"]);
        let b = ProposalId::derive(&["t1", "drift-x", "0"]);
        let c = ProposalId::derive(&["t1", "drift-x", "1"]);

        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn phantom_data_does_not_consume_memory() {
        use std::mem::size_of;
        assert_eq!(size_of::<CandidateId>(), size_of::<Ulid>());
    }
}
