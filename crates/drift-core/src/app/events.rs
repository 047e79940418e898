//! External events: approve / request edit / reject.
//!
//! These write `state`, so they take the same lock as the harness. Work
//! unlocked by the event is scheduled after the lock is released.

use std::time::Duration;

use tracing::{info, instrument, warn};

use crate::domain::{
    CandidateId, CandidateState, Resolution, TenantId, TransitionRecord,
};
use crate::error::DriftError;
use crate::ports::Clock;

use super::executor::JobExecutor;
use super::harness::{FollowUp, RunOutcome};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HumanEvent {
    Approve,
    RequestEdit { instructions: String },
    Reject { reason: String },
}

impl HumanEvent {
    fn name(&self) -> &'static str {
        match self {
            HumanEvent::Approve => "approve",
            HumanEvent::RequestEdit { .. } => "request_edit",
            HumanEvent::Reject { .. } => "reject",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventOutcome {
    Accepted {
        state: CandidateState,
        follow_up: FollowUp,
        /// Present when the follow-up ran inline.
        run: Option<RunOutcome>,
    },
    /// The candidate is not waiting on a human.
    InvalidState { state: CandidateState },
    /// Another worker holds the candidate's lock; try again later.
    Busy,
}

pub async fn approve(
    executor: &JobExecutor,
    tenant_id: &TenantId,
    candidate_id: CandidateId,
    actor: &str,
) -> Result<EventOutcome, DriftError> {
    apply_event(executor, tenant_id, candidate_id, HumanEvent::Approve, actor).await
}

pub async fn request_edit(
    executor: &JobExecutor,
    tenant_id: &TenantId,
    candidate_id: CandidateId,
    instructions: impl Into<String>,
    actor: &str,
) -> Result<EventOutcome, DriftError> {
    let event = HumanEvent::RequestEdit {
        instructions: instructions.into(),
    };
    apply_event(executor, tenant_id, candidate_id, event, actor).await
}

pub async fn reject(
    executor: &JobExecutor,
    tenant_id: &TenantId,
    candidate_id: CandidateId,
    reason: impl Into<String>,
    actor: &str,
) -> Result<EventOutcome, DriftError> {
    let event = HumanEvent::Reject {
        reason: reason.into(),
    };
    apply_event(executor, tenant_id, candidate_id, event, actor).await
}

#[instrument(skip(executor, tenant_id, candidate_id, event), fields(tenant_id = %tenant_id, candidate_id = %candidate_id, event = event.name()))]
pub async fn apply_event(
    executor: &JobExecutor,
    tenant_id: &TenantId,
    candidate_id: CandidateId,
    event: HumanEvent,
    actor: &str,
) -> Result<EventOutcome, DriftError> {
    let harness = executor.harness();
    let lock = harness.lock();
    let Some(lease) = lock.acquire(tenant_id, candidate_id).await? else {
        info!("candidate busy");
        return Ok(EventOutcome::Busy);
    };

    let applied = apply_locked(executor, tenant_id, candidate_id, event, actor).await;
    if let Err(e) = lock.release(tenant_id, candidate_id, &lease).await {
        warn!(error = %e, "lock release failed");
    }
    let state = match applied? {
        Ok(state) => state,
        Err(state) => return Ok(EventOutcome::InvalidState { state }),
    };

    if !state.requires_handler() {
        return Ok(EventOutcome::Accepted {
            state,
            follow_up: FollowUp::None,
            run: None,
        });
    }
    let follow_up = harness
        .schedule(tenant_id, candidate_id, 1, Duration::ZERO)
        .await?;
    let run = executor
        .follow_up(tenant_id, candidate_id, 1, &follow_up)
        .await?;
    Ok(EventOutcome::Accepted {
        state,
        follow_up,
        run,
    })
}

/// `Ok(new_state)` when applied, `Err(current_state)` when not applicable.
async fn apply_locked(
    executor: &JobExecutor,
    tenant_id: &TenantId,
    candidate_id: CandidateId,
    event: HumanEvent,
    actor: &str,
) -> Result<Result<CandidateState, CandidateState>, DriftError> {
    let services = executor.harness().services();
    let mut candidate = services
        .store
        .get(tenant_id, candidate_id)
        .await?
        .ok_or_else(|| DriftError::CandidateNotFound {
            tenant_id: tenant_id.clone(),
            candidate_id,
        })?;

    let from = candidate.state;
    if !from.is_human_gated() {
        info!(state = %from, "event ignored in this state");
        return Ok(Err(from));
    }

    let next = match event {
        HumanEvent::Approve => CandidateState::Approved,
        HumanEvent::RequestEdit { instructions } => {
            candidate.edit_cycle += 1;
            candidate.edit_instructions = Some(instructions);
            CandidateState::EditRequested
        }
        HumanEvent::Reject { reason } => candidate.complete_with(Resolution::Rejected { reason }),
    };
    if !from.can_transition_to(next) {
        return Err(DriftError::IllegalTransition { from, to: next });
    }

    let now = services.clock.now();
    candidate.advance(next, now);
    services.store.save(&candidate).await?;
    services
        .store
        .append_transition(TransitionRecord::new(
            tenant_id.clone(),
            candidate_id,
            from,
            next,
            0,
            actor,
            now,
        ))
        .await?;
    info!(from = %from, to = %next, actor, "event applied");
    Ok(Ok(next))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::harness::RunStatus;
    use crate::app::testkit::{TestEngine, merged_pr};
    use crate::domain::ErrorCode;
    use crate::ports::LockProvider;

    async fn waiting(engine: &TestEngine) -> CandidateId {
        let id = engine.ingest(merged_pr(0.85)).await;
        assert_eq!(engine.drain(id).await.status, RunStatus::Waiting);
        id
    }

    #[tokio::test]
    async fn approve_writes_back_and_completes() {
        let engine = TestEngine::builder().unconfigured_queue().build();
        let id = engine.ingest_receipt(merged_pr(0.85)).await.candidate_id;

        let outcome = approve(&engine.executor, &engine.tenant, id, "alice").await.unwrap();

        let EventOutcome::Accepted { state, run, .. } = outcome else {
            panic!("expected Accepted, got {outcome:?}");
        };
        assert_eq!(state, CandidateState::Approved);
        assert_eq!(run.map(|r| r.status), Some(RunStatus::Complete));

        let c = engine.candidate(id).await;
        assert_eq!(c.state, CandidateState::Completed);
        assert!(matches!(c.resolution, Some(Resolution::WrittenBack { .. })));
        let content = engine.docs.content("docs/payments.md").unwrap();
        assert!(content.contains("/v2/charges"));
        assert!(!content.contains("/v1/charges"));

        let history = engine.history(id).await;
        assert!(history.iter().any(|r| r.actor == "alice" && r.to == CandidateState::Approved));
    }

    #[tokio::test]
    async fn doc_changed_since_fetch_is_a_revision_conflict() {
        let engine = TestEngine::builder().unconfigured_queue().build();
        let id = engine.ingest_receipt(merged_pr(0.85)).await.candidate_id;
        engine
            .docs
            .edit("docs/payments.md", "# Payments API\nrewritten by someone else\n");

        approve(&engine.executor, &engine.tenant, id, "alice").await.unwrap();

        let c = engine.candidate(id).await;
        assert_eq!(c.state, CandidateState::Failed);
        assert_eq!(c.last_error_code, Some(ErrorCode::RevisionConflict));
    }

    #[tokio::test]
    async fn rejected_writeback_fails_terminally() {
        let engine = TestEngine::builder().unconfigured_queue().build();
        let id = engine.ingest_receipt(merged_pr(0.85)).await.candidate_id;
        engine.docs.reject_writes(true);

        approve(&engine.executor, &engine.tenant, id, "alice").await.unwrap();

        let c = engine.candidate(id).await;
        assert_eq!(c.state, CandidateState::Failed);
        assert_eq!(c.last_error_code, Some(ErrorCode::WritebackFailed));
    }

    #[tokio::test]
    async fn edit_request_regenerates_and_returns_to_the_gate() {
        let engine = TestEngine::new();
        let id = waiting(&engine).await;

        let outcome = request_edit(
            &engine.executor,
            &engine.tenant,
            id,
            "replace \"/v2/charges\" with \"/v2/payments/charges\"",
            "bob",
        )
        .await
        .unwrap();
        assert!(matches!(
            outcome,
            EventOutcome::Accepted { state: CandidateState::EditRequested, .. }
        ));
        assert_eq!(engine.drain(id).await.status, RunStatus::Waiting);

        let c = engine.candidate(id).await;
        assert_eq!(c.edit_cycle, 1);
        let proposals = engine.proposals(id).await;
        assert_eq!(proposals.len(), 2);
        assert!(proposals[1].unified_diff.contains("/v2/payments/charges"));
        assert_eq!(engine.notifier.sent().len(), 2);
    }

    #[tokio::test]
    async fn reject_completes_without_follow_up() {
        let engine = TestEngine::new();
        let id = waiting(&engine).await;
        let pending = engine.queue.pending().await;

        let outcome = reject(&engine.executor, &engine.tenant, id, "not our doc", "carol")
            .await
            .unwrap();

        assert_eq!(
            outcome,
            EventOutcome::Accepted {
                state: CandidateState::Completed,
                follow_up: FollowUp::None,
                run: None,
            }
        );
        assert_eq!(
            engine.candidate(id).await.resolution,
            Some(Resolution::Rejected { reason: "not our doc".into() })
        );
        assert_eq!(engine.queue.pending().await, pending);
    }

    #[tokio::test]
    async fn events_outside_the_gate_are_invalid() {
        let engine = TestEngine::new();
        let id = engine.ingest(merged_pr(0.85)).await;

        let outcome = approve(&engine.executor, &engine.tenant, id, "alice").await.unwrap();
        assert_eq!(
            outcome,
            EventOutcome::InvalidState { state: CandidateState::Ingested }
        );
        assert!(!engine.lock.is_held(&engine.tenant, id));
    }

    #[tokio::test]
    async fn events_respect_the_lock() {
        let engine = TestEngine::new();
        let id = waiting(&engine).await;
        assert!(engine.lock.acquire(&engine.tenant, id).await.unwrap().is_some());

        let outcome = approve(&engine.executor, &engine.tenant, id, "alice").await.unwrap();

        assert_eq!(outcome, EventOutcome::Busy);
        assert_eq!(engine.candidate(id).await.state, CandidateState::AwaitingHuman);
    }
}
