//! Services - ハーネスとステージが共有する依存のまとめ
//!
//! # 設計原則
//! - 起動時に一度だけ組み立てて `Clone`（中身は Arc）で配る
//! - 設定の検証はここで行う（Fail-fast）
//! - テナント能力は実行ごとに解決し、`StageContext` に載せる

use std::sync::Arc;

use crate::config::EngineConfig;
use crate::correlation::SignalCorrelator;
use crate::error::ConfigError;
use crate::ownership::OwnershipResolver;
use crate::patch::ValidationLimits;
use crate::ports::{
    Agents, CandidateStore, Clock, DocAdapters, NotificationChannel, SignalStore,
    TenantCapabilities, TenantDirectory,
};
use crate::routing::NotificationRouter;

/// External collaborators, supplied by whoever wires the engine.
#[derive(Clone)]
pub struct Collaborators {
    pub store: Arc<dyn CandidateStore>,
    pub signals: Arc<dyn SignalStore>,
    pub agents: Agents,
    pub docs: DocAdapters,
    pub notifier: Arc<dyn NotificationChannel>,
    pub tenants: Arc<dyn TenantDirectory>,
    pub clock: Arc<dyn Clock>,
}

#[derive(Clone)]
pub struct Services {
    pub store: Arc<dyn CandidateStore>,
    pub signals: Arc<dyn SignalStore>,
    pub agents: Agents,
    pub docs: DocAdapters,
    pub notifier: Arc<dyn NotificationChannel>,
    pub tenants: Arc<dyn TenantDirectory>,
    pub clock: Arc<dyn Clock>,
    pub router: Arc<NotificationRouter>,
    pub ownership: Arc<OwnershipResolver>,
    pub correlator: Arc<SignalCorrelator>,
    pub config: Arc<EngineConfig>,
}

impl Services {
    pub fn new(config: EngineConfig, parts: Collaborators) -> Result<Self, ConfigError> {
        config.validate()?;
        let router = NotificationRouter::new(config.routing.clone())?;
        let ownership = OwnershipResolver::new(config.mappings.clone());
        let correlator = SignalCorrelator::new(
            parts.signals.clone(),
            config.correlation_window_hours,
            config.max_correlation_boost,
        )?;

        Ok(Self {
            store: parts.store,
            signals: parts.signals,
            agents: parts.agents,
            docs: parts.docs,
            notifier: parts.notifier,
            tenants: parts.tenants,
            clock: parts.clock,
            router: Arc::new(router),
            ownership: Arc::new(ownership),
            correlator: Arc::new(correlator),
            config: Arc::new(config),
        })
    }

    pub fn validation_limits(&self) -> ValidationLimits {
        ValidationLimits {
            max_changed_lines: self.config.max_diff_changed_lines,
            min_confidence: self.config.min_proposal_confidence,
        }
    }
}

/// What a stage handler sees for one run.
pub struct StageContext<'a> {
    pub services: &'a Services,
    pub capabilities: &'a TenantCapabilities,
}
