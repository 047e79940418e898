//! Signal correlator: other signals on the same service raise confidence.

use chrono::{DateTime, Duration, Utc};
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::domain::{SignalEvent, SignalId, SourceType};
use crate::error::{ConfigError, StoreError};
use crate::ports::SignalStore;

#[derive(Debug, Clone, PartialEq, Default)]
pub struct CorrelationResult {
    pub correlated_signals: Vec<SignalId>,
    pub confidence_boost: f64,
    pub join_reason: Option<String>,
}

/// Boost one corroborating signal of this type contributes.
pub fn source_weight(source_type: &SourceType) -> f64 {
    match source_type {
        SourceType::Incident => 0.15,
        SourceType::GithubPr => 0.10,
        SourceType::Deploy => 0.05,
        SourceType::SlackThread => 0.05,
        SourceType::Other(_) => 0.02,
    }
}

/// Add a boost, capping confidence at 1.0.
pub fn apply_boost(confidence: f64, boost: f64) -> f64 {
    (confidence + boost).clamp(0.0, 1.0)
}

pub struct SignalCorrelator {
    signals: Arc<dyn SignalStore>,
    window: Duration,
    max_boost: f64,
}

impl SignalCorrelator {
    pub fn new(
        signals: Arc<dyn SignalStore>,
        window_hours: i64,
        max_boost: f64,
    ) -> Result<Self, ConfigError> {
        let window = Duration::try_hours(window_hours).ok_or_else(|| {
            ConfigError::Invalid(format!("correlation window of {window_hours}h is out of range"))
        })?;
        Ok(Self {
            signals,
            window,
            max_boost,
        })
    }

    /// Find signals on the same service within the window around `signal`.
    ///
    /// The window is centred on the signal's own `occurred_at`, so the result
    /// does not depend on when the stage happens to run.
    pub async fn join_signals(&self, signal: &SignalEvent) -> Result<CorrelationResult, StoreError> {
        let Some(service) = signal.service.as_deref() else {
            return Ok(CorrelationResult::default());
        };

        // clamp at the ends of the timeline
        let since = signal
            .occurred_at
            .checked_sub_signed(self.window)
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        let until = signal
            .occurred_at
            .checked_add_signed(self.window)
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        let related: Vec<SignalEvent> = self
            .signals
            .signals_for_service(&signal.tenant_id, service, since)
            .await?
            .into_iter()
            .filter(|s| s.id != signal.id && s.occurred_at <= until)
            .collect();

        if related.is_empty() {
            return Ok(CorrelationResult::default());
        }

        let raw: f64 = related.iter().map(|s| source_weight(&s.source_type)).sum();
        let mut by_type: BTreeMap<&str, usize> = BTreeMap::new();
        for s in &related {
            *by_type.entry(s.source_type.as_str()).or_default() += 1;
        }
        let breakdown = by_type
            .iter()
            .map(|(t, n)| format!("{t} x{n}"))
            .collect::<Vec<_>>()
            .join(", ");

        Ok(CorrelationResult {
            correlated_signals: related.iter().map(|s| s.id).collect(),
            confidence_boost: raw.min(self.max_boost),
            join_reason: Some(format!(
                "{} related signal(s) on {service} within {}h: {breakdown}",
                related.len(),
                self.window.num_hours()
            )),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::TenantId;
    use crate::impls::InMemoryStore;
    use ulid::Ulid;

    fn signal(source_type: SourceType, service: &str, at: DateTime<Utc>) -> SignalEvent {
        SignalEvent {
            tenant_id: TenantId::new("t1"),
            id: SignalId::from_ulid(Ulid::new()),
            source_type,
            occurred_at: at,
            repo: None,
            service: Some(service.to_string()),
            extracted: Default::default(),
            raw_payload: Default::default(),
        }
    }

    #[test]
    fn boost_caps_confidence() {
        assert_eq!(apply_boost(0.9, 0.3), 1.0);
        assert!((apply_boost(0.5, 0.15) - 0.65).abs() < 1e-9);
    }

    #[tokio::test]
    async fn joins_same_service_within_window() {
        let store = Arc::new(InMemoryStore::new());
        let now = Utc::now();
        let me = signal(SourceType::GithubPr, "payments", now);
        let incident = signal(SourceType::Incident, "payments", now - Duration::hours(2));
        let deploy = signal(SourceType::Deploy, "payments", now - Duration::hours(30));
        let too_old = signal(SourceType::Incident, "payments", now - Duration::hours(200));
        let other_service = signal(SourceType::Incident, "search", now);
        for s in [&me, &incident, &deploy, &too_old, &other_service] {
            store.insert_signal(s.clone()).await.unwrap();
        }

        let correlator = SignalCorrelator::new(store, 168, 0.3).unwrap();
        let result = correlator.join_signals(&me).await.unwrap();

        assert_eq!(result.correlated_signals.len(), 2);
        assert!(result.correlated_signals.contains(&incident.id));
        assert!(result.correlated_signals.contains(&deploy.id));
        assert!((result.confidence_boost - 0.20).abs() < 1e-9);
        let reason = result.join_reason.unwrap();
        assert!(reason.contains("deploy x1"));
        assert!(reason.contains("incident x1"));
    }

    #[tokio::test]
    async fn boost_is_capped() {
        let store = Arc::new(InMemoryStore::new());
        let now = Utc::now();
        let me = signal(SourceType::Deploy, "payments", now);
        store.insert_signal(me.clone()).await.unwrap();
        for _ in 0..5 {
            store
                .insert_signal(signal(SourceType::Incident, "payments", now))
                .await
                .unwrap();
        }

        let correlator = SignalCorrelator::new(store, 168, 0.3).unwrap();
        let result = correlator.join_signals(&me).await.unwrap();

        assert_eq!(result.correlated_signals.len(), 5);
        assert_eq!(result.confidence_boost, 0.3);
    }

    #[tokio::test]
    async fn no_service_means_no_correlation() {
        let store = Arc::new(InMemoryStore::new());
        let mut me = signal(SourceType::Incident, "payments", Utc::now());
        me.service = None;

        let correlator = SignalCorrelator::new(store, 168, 0.3).unwrap();
        let result = correlator.join_signals(&me).await.unwrap();

        assert_eq!(result, CorrelationResult::default());
    }

    #[test]
    fn unrepresentable_window_is_a_config_error() {
        let store = Arc::new(InMemoryStore::new());
        assert!(SignalCorrelator::new(store, i64::MAX / 2, 0.3).is_err());
    }

    #[tokio::test]
    async fn window_is_clamped_at_the_end_of_time() {
        let store = Arc::new(InMemoryStore::new());
        let me = signal(SourceType::Incident, "payments", DateTime::<Utc>::MAX_UTC);
        let earlier = signal(
            SourceType::Deploy,
            "payments",
            DateTime::<Utc>::MAX_UTC - Duration::hours(1),
        );
        for s in [&me, &earlier] {
            store.insert_signal(s.clone()).await.unwrap();
        }

        let correlator = SignalCorrelator::new(store, 168, 0.3).unwrap();
        let result = correlator.join_signals(&me).await.unwrap();

        assert_eq!(result.correlated_signals, vec![earlier.id]);
    }
}
