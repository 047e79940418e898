//! Engine configuration.
//!
//! Every section is `#[serde(default)]`, so a config file only needs the keys
//! it changes. Environment overrides (`DRIFT_*`) are layered on top and the
//! result is validated once at startup.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::str::FromStr;

use crate::domain::{DocSystem, OwnerTarget, RetryPolicy, SourceType};
use crate::error::ConfigError;

/// One day. A lease longer than this outlives any reasonable stage.
pub const MAX_LOCK_TTL_SECS: u64 = 86_400;
/// One year.
pub const MAX_CORRELATION_WINDOW_HOURS: i64 = 24 * 365;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Transient failures tolerated per candidate before MAX_RETRIES_EXCEEDED.
    pub max_retries: u32,
    /// Transitions one harness invocation may run before yielding.
    pub max_transitions_per_invocation: u32,
    pub lock_ttl_secs: u64,
    pub correlation_window_hours: i64,
    pub max_correlation_boost: f64,
    pub key_token_limit: usize,
    /// How much more confident a duplicate must be to notify again.
    pub renotify_confidence_delta: f64,
    /// Doc candidates below this are dropped.
    pub doc_min_confidence: f64,
    pub context_max_sections: usize,
    pub context_max_section_chars: usize,
    pub max_diff_changed_lines: usize,
    /// Proposals below this confidence fail validation.
    pub min_proposal_confidence: f64,
    /// When false, an auto-approve routing still waits for a human.
    pub auto_approve_writeback: bool,
    /// Where digest entries go when no owner accepts them.
    pub digest_channel: OwnerTarget,
    pub retry: RetryPolicy,
    pub routing: RoutingConfig,
    pub mappings: ServiceMappings,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_retries: 10,
            max_transitions_per_invocation: 4,
            lock_ttl_secs: 300,
            correlation_window_hours: 168,
            max_correlation_boost: 0.3,
            key_token_limit: 6,
            renotify_confidence_delta: 0.15,
            doc_min_confidence: 0.3,
            context_max_sections: 4,
            context_max_section_chars: 2_000,
            max_diff_changed_lines: 200,
            min_proposal_confidence: 0.3,
            auto_approve_writeback: false,
            digest_channel: OwnerTarget::new("#docs-drift-digest"),
            retry: RetryPolicy::default(),
            routing: RoutingConfig::default(),
            mappings: ServiceMappings::default(),
        }
    }
}

impl EngineConfig {
    /// Parse a JSON config and validate it.
    pub fn from_json_str(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Overlay `DRIFT_*` variables from the process environment.
    pub fn apply_env(self) -> Result<Self, ConfigError> {
        self.apply_env_with(|key| std::env::var(key).ok())
    }

    /// Overlay `DRIFT_*` variables from a custom source, then validate.
    pub fn apply_env_with<F>(mut self, get_env: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        override_from(&get_env, "DRIFT_MAX_RETRIES", &mut self.max_retries)?;
        override_from(
            &get_env,
            "DRIFT_MAX_TRANSITIONS",
            &mut self.max_transitions_per_invocation,
        )?;
        override_from(&get_env, "DRIFT_LOCK_TTL_SECS", &mut self.lock_ttl_secs)?;
        override_from(
            &get_env,
            "DRIFT_CORRELATION_WINDOW_HOURS",
            &mut self.correlation_window_hours,
        )?;
        override_from(
            &get_env,
            "DRIFT_RENOTIFY_DELTA",
            &mut self.renotify_confidence_delta,
        )?;
        override_from(
            &get_env,
            "DRIFT_AUTO_APPROVE_WRITEBACK",
            &mut self.auto_approve_writeback,
        )?;
        override_from(&get_env, "DRIFT_RETRY_BASE_MS", &mut self.retry.base_delay_ms)?;
        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_retries == 0 {
            return Err(invalid("max_retries must be positive"));
        }
        if self.max_transitions_per_invocation == 0 {
            return Err(invalid("max_transitions_per_invocation must be positive"));
        }
        if !(1..=MAX_LOCK_TTL_SECS).contains(&self.lock_ttl_secs) {
            return Err(invalid(format!(
                "lock_ttl_secs must be within 1..={MAX_LOCK_TTL_SECS}"
            )));
        }
        if !(1..=MAX_CORRELATION_WINDOW_HOURS).contains(&self.correlation_window_hours) {
            return Err(invalid(format!(
                "correlation_window_hours must be within 1..={MAX_CORRELATION_WINDOW_HOURS}"
            )));
        }
        if !(0.0..=1.0).contains(&self.max_correlation_boost) {
            return Err(invalid("max_correlation_boost must be within [0, 1]"));
        }
        if self.key_token_limit == 0 {
            return Err(invalid("key_token_limit must be positive"));
        }
        if self.renotify_confidence_delta < 0.0 {
            return Err(invalid("renotify_confidence_delta must not be negative"));
        }
        if self.context_max_sections == 0 || self.context_max_section_chars == 0 {
            return Err(invalid("context limits must be positive"));
        }
        if self.max_diff_changed_lines == 0 {
            return Err(invalid("max_diff_changed_lines must be positive"));
        }
        if self.digest_channel.as_str().is_empty() {
            return Err(invalid("digest_channel must not be empty"));
        }
        self.routing.validate()
    }
}

/// Confidence cut-offs for one source type. Must be strictly descending.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RoutingThresholds {
    pub auto_approve: f64,
    pub slack_notify: f64,
    pub digest_only: f64,
    pub ignore: f64,
}

impl Default for RoutingThresholds {
    fn default() -> Self {
        Self {
            auto_approve: 0.9,
            slack_notify: 0.6,
            digest_only: 0.4,
            ignore: 0.2,
        }
    }
}

impl RoutingThresholds {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let ordered = [self.auto_approve, self.slack_notify, self.digest_only, self.ignore];
        if ordered.iter().any(|t| !(0.0..=1.0).contains(t)) {
            return Err(invalid(format!("thresholds must be within [0, 1]: {self:?}")));
        }
        if ordered.windows(2).any(|w| w[0] <= w[1]) {
            return Err(invalid(format!(
                "thresholds must be strictly descending (auto_approve > slack_notify > digest_only > ignore): {self:?}"
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoutingConfig {
    pub default: RoutingThresholds,
    /// Overrides keyed by source type name (`github_pr`, `incident`, ...).
    pub per_source: HashMap<String, RoutingThresholds>,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        let mut per_source = HashMap::new();
        // incidents are noisy: never auto-approve from one, but notify early
        per_source.insert(
            "incident".to_string(),
            RoutingThresholds {
                auto_approve: 0.99,
                slack_notify: 0.5,
                digest_only: 0.35,
                ignore: 0.15,
            },
        );
        Self {
            default: RoutingThresholds::default(),
            per_source,
        }
    }
}

impl RoutingConfig {
    pub fn thresholds_for(&self, source_type: &SourceType) -> RoutingThresholds {
        self.per_source
            .get(source_type.as_str())
            .copied()
            .unwrap_or(self.default)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.default.validate()?;
        for (source, thresholds) in &self.per_source {
            thresholds
                .validate()
                .map_err(|e| invalid(format!("routing.per_source.{source}: {e}")))?;
        }
        Ok(())
    }
}

/// A document explicitly mapped to a service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocMapping {
    pub doc_system: DocSystem,
    pub doc_id: String,
    #[serde(default)]
    pub title: String,
}

/// Repository-prefix ownership rule; the longest matching prefix wins.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepoOwnerRule {
    pub prefix: String,
    pub target: OwnerTarget,
}

/// Operator-maintained mappings used by doc resolution and ownership.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceMappings {
    pub docs: HashMap<String, Vec<DocMapping>>,
    pub owners: HashMap<String, OwnerTarget>,
    pub repo_owners: Vec<RepoOwnerRule>,
}

impl ServiceMappings {
    pub fn docs_for(&self, service: Option<&str>) -> &[DocMapping] {
        service
            .and_then(|s| self.docs.get(s))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}

fn invalid(msg: impl Into<String>) -> ConfigError {
    ConfigError::Invalid(msg.into())
}

fn override_from<F, T>(get_env: &F, key: &str, slot: &mut T) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    let Some(raw) = get_env(key) else {
        return Ok(());
    };
    *slot = raw
        .trim()
        .parse()
        .map_err(|_| invalid(format!("{key} has an invalid value: '{raw}'")))?;
    Ok(())
}
