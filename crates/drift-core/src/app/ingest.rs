//! Ingestion: persist the signal, create the candidate, schedule the first job.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{info, instrument};

use crate::domain::{CandidateId, DriftCandidate, SignalEvent, SignalId, SourceType, TenantId};
use crate::error::DriftError;
use crate::ports::{Clock, IdGenerator};

use super::executor::JobExecutor;
use super::harness::{FollowUp, RunOutcome};

/// A signal as delivered by an ingestion collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewSignal {
    pub tenant_id: TenantId,
    pub source_type: SourceType,
    /// Defaults to ingestion time.
    #[serde(default)]
    pub occurred_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub repo: Option<String>,
    #[serde(default)]
    pub service: Option<String>,
    #[serde(default)]
    pub extracted: serde_json::Map<String, serde_json::Value>,
    #[serde(default)]
    pub raw_payload: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone)]
pub struct IngestReceipt {
    pub signal_id: SignalId,
    pub candidate_id: CandidateId,
    pub follow_up: FollowUp,
    /// Set when the queue was unconfigured and the work ran inline.
    pub outcome: Option<RunOutcome>,
}

#[instrument(skip_all, fields(tenant_id = %input.tenant_id, source_type = %input.source_type))]
pub async fn ingest_signal(
    executor: &JobExecutor,
    ids: &dyn IdGenerator,
    input: NewSignal,
) -> Result<IngestReceipt, DriftError> {
    let services = executor.harness().services();
    let now = services.clock.now();

    let signal = SignalEvent {
        tenant_id: input.tenant_id,
        id: ids.generate_signal_id(),
        source_type: input.source_type,
        occurred_at: input.occurred_at.unwrap_or(now),
        repo: input.repo,
        service: input.service,
        extracted: input.extracted,
        raw_payload: input.raw_payload,
    };
    let tenant_id = signal.tenant_id.clone();
    let signal_id = signal.id;
    services.signals.insert_signal(signal).await?;

    let candidate_id = ids.generate_candidate_id();
    services
        .store
        .insert(DriftCandidate::ingested(tenant_id.clone(), candidate_id, signal_id, now))
        .await?;
    info!(%signal_id, %candidate_id, "signal ingested");

    let follow_up = executor
        .harness()
        .schedule(&tenant_id, candidate_id, 1, Duration::ZERO)
        .await?;
    let outcome = executor
        .follow_up(&tenant_id, candidate_id, 1, &follow_up)
        .await?;

    Ok(IngestReceipt {
        signal_id,
        candidate_id,
        follow_up,
        outcome,
    })
}
