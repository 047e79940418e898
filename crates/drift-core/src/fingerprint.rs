//! Fingerprint engine: content hash of "the same drift" plus the dedup check.
//!
//! The hash covers tenant, service, drift type, domains and the top key tokens.
//! Inputs are normalized first so the same drift always yields the same
//! fingerprint regardless of input order or casing.

use sha2::{Digest, Sha256};
use std::collections::{HashMap, HashSet};

use crate::domain::{CandidateId, DriftCandidate, Evidence, Fingerprint, TenantId};

const STOP_WORDS: &[&str] = &[
    "about", "after", "all", "also", "and", "any", "are", "been", "before", "being", "but", "can",
    "could", "does", "for", "from", "had", "has", "have", "how", "into", "its", "not", "now",
    "our", "per", "should", "than", "that", "the", "their", "then", "there", "these", "this",
    "was", "were", "what", "when", "where", "which", "who", "will", "with", "would", "you",
    "your",
];

/// Tolerance for the re-notify comparison so 0.70 + 0.15 >= 0.85 holds.
const CONFIDENCE_EPSILON: f64 = 1e-9;

/// Length-prefixed field writer, so `("ab", "c")` and `("a", "bc")` differ.
struct Canonical(Sha256);

impl Canonical {
    fn field(&mut self, value: &str) -> &mut Self {
        self.0.update((value.len() as u64).to_be_bytes());
        self.0.update(value.as_bytes());
        self
    }

    fn list(&mut self, values: &[String]) -> &mut Self {
        self.0.update((values.len() as u64).to_be_bytes());
        for value in values {
            self.field(value);
        }
        self
    }
}

/// Compute the dedup fingerprint.
///
/// Domains are lowercased, trimmed, deduplicated and sorted. Tokens are
/// normalized the same way but keep their rank order until the first
/// `key_token_limit` are taken; the kept set is then sorted.
pub fn compute_fingerprint(
    tenant_id: &TenantId,
    service: Option<&str>,
    drift_type: &str,
    drift_domains: &[String],
    key_tokens: &[String],
    key_token_limit: usize,
) -> Fingerprint {
    let mut domains = normalize(drift_domains);
    domains.sort();

    let mut tokens = normalize(key_tokens);
    tokens.truncate(key_token_limit);
    tokens.sort();

    let mut canonical = Canonical(Sha256::new());
    canonical
        .field(tenant_id.as_str())
        .field(&service.unwrap_or_default().trim().to_lowercase())
        .field(&drift_type.trim().to_lowercase())
        .list(&domains)
        .list(&tokens);
    Fingerprint::new(hex::encode(canonical.0.finalize()))
}

/// Lowercase, trim, drop empties and duplicates; first occurrence wins.
fn normalize(items: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    items
        .iter()
        .map(|s| s.trim().to_lowercase())
        .filter(|s| !s.is_empty())
        .filter(|s| seen.insert(s.clone()))
        .collect()
}

/// Deterministic key-token extraction.
///
/// Splits on anything that is not alphanumeric, `_`, `.` or `-`; drops stop
/// words, tokens shorter than 3 chars and pure numbers; ranks by frequency
/// then lexicographically.
pub fn extract_key_tokens(text: &str, limit: usize) -> Vec<String> {
    let mut counts: HashMap<String, usize> = HashMap::new();
    for raw in text.split(|c: char| !(c.is_alphanumeric() || matches!(c, '_' | '.' | '-'))) {
        let token = raw
            .trim_matches(|c: char| matches!(c, '_' | '.' | '-'))
            .to_lowercase();
        if token.chars().count() < 3 || is_numeric(&token) || STOP_WORDS.contains(&token.as_str())
        {
            continue;
        }
        *counts.entry(token).or_default() += 1;
    }

    let mut ranked: Vec<(String, usize)> = counts.into_iter().collect();
    ranked.sort_by(|(a, ca), (b, cb)| cb.cmp(ca).then_with(|| a.cmp(b)));
    ranked.into_iter().take(limit).map(|(t, _)| t).collect()
}

/// Key tokens of a classified candidate's evidence.
pub fn evidence_tokens(evidence: &Evidence, limit: usize) -> Vec<String> {
    let text = format!(
        "{} {} {}",
        evidence.summary,
        evidence.old_terms.join(" "),
        evidence.new_terms.join(" ")
    );
    extract_key_tokens(&text, limit)
}

fn is_numeric(token: &str) -> bool {
    token.chars().any(|c| c.is_ascii_digit())
        && token
            .chars()
            .all(|c| c.is_ascii_digit() || matches!(c, '.' | '-' | '_'))
}

/// Outcome of comparing a candidate against the current fingerprint holder.
#[derive(Debug, Clone, PartialEq)]
pub struct DuplicateCheck {
    pub is_duplicate: bool,
    pub existing_candidate_id: Option<CandidateId>,
    pub should_notify: bool,
    pub reason: String,
}

/// Decide whether `candidate` duplicates `holder`.
///
/// Only a non-terminal holder counts. A duplicate is suppressed unless it is
/// at least `renotify_delta` more confident than the holder.
pub fn check_duplicate(
    candidate: &DriftCandidate,
    holder: Option<&DriftCandidate>,
    renotify_delta: f64,
) -> DuplicateCheck {
    let not_duplicate = |reason: &str| DuplicateCheck {
        is_duplicate: false,
        existing_candidate_id: None,
        should_notify: true,
        reason: reason.to_string(),
    };

    let Some(holder) = holder else {
        return not_duplicate("no_existing_candidate");
    };
    if holder.id == candidate.id {
        return not_duplicate("already_holder");
    }
    if holder.state.is_terminal() {
        return not_duplicate("existing_candidate_closed");
    }

    let renotify = candidate.confidence + CONFIDENCE_EPSILON >= holder.confidence + renotify_delta;
    DuplicateCheck {
        is_duplicate: true,
        existing_candidate_id: Some(holder.id),
        should_notify: renotify,
        reason: if renotify {
            format!(
                "confidence_increase: {:.2} -> {:.2}",
                holder.confidence, candidate.confidence
            )
        } else {
            format!("duplicate_of: {}", holder.id)
        },
    }
}
