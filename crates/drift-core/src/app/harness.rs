//! JobHarness - ロック付きの有界遷移ループ
//!
//! 1 回の `run` は次の順で進む:
//! lock → load → (terminal / human-gated / retry budget の判定) →
//! 最大 N 回の dispatch → persist → unlock → 必要ならフォローアップ
//!
//! # 設計原則
//! - 遷移ごとに永続化し、ストアから読み直す（作業コピーを信用しない）
//! - ロックはどの経路でも必ず解放する
//! - インフラ系のエラー（store / lock / queue）は `DriftError` で呼び出し元へ返す
//!
//! # 学習ポイント
//! - `Decider` によるリトライ判定（遅延 or 打ち切り）
//! - `#[instrument]` で tenant / candidate / attempt を span に載せる

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, instrument, warn};

use crate::domain::{
    CandidateId, CandidateState, Decider, Decision, DriftCandidate, ErrorCode, JobMessage,
    MessageId, RetryDecider, StageError, TenantId, TransitionRecord,
};
use crate::error::DriftError;
use crate::ports::{Clock, JobQueue, LockProvider};

use super::dispatcher::StageDispatcher;
use super::services::{Services, StageContext};

const HARNESS_ACTOR: &str = "harness";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    /// Another worker holds the lock; nothing was touched.
    Skipped,
    /// Terminal state reached (or already there).
    Complete,
    /// Parked at the human gate.
    Waiting,
    /// Ended in FAILED or FAILED_NEEDS_MAPPING.
    Failed,
    /// Transition budget spent with work remaining.
    Continued,
    /// A stage failed transiently and will be retried.
    Retrying,
}

/// How the remaining work gets picked up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FollowUp {
    None,
    Enqueued(MessageId),
    /// The queue is unconfigured; the caller should run again after `delay`.
    RunInline { delay: Duration },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOutcome {
    pub status: RunStatus,
    pub transitions: u32,
    pub final_state: Option<CandidateState>,
    pub follow_up: FollowUp,
}

impl RunOutcome {
    fn stopped(status: RunStatus, state: CandidateState) -> Self {
        Self {
            status,
            transitions: 0,
            final_state: Some(state),
            follow_up: FollowUp::None,
        }
    }
}

pub struct JobHarness {
    services: Services,
    dispatcher: Arc<StageDispatcher>,
    lock: Arc<dyn LockProvider>,
    queue: Arc<dyn JobQueue>,
    decider: RetryDecider,
}

impl JobHarness {
    pub fn new(
        services: Services,
        dispatcher: Arc<StageDispatcher>,
        lock: Arc<dyn LockProvider>,
        queue: Arc<dyn JobQueue>,
    ) -> Self {
        let decider = RetryDecider::new(services.config.retry.clone());
        Self {
            services,
            dispatcher,
            lock,
            queue,
            decider,
        }
    }

    pub fn services(&self) -> &Services {
        &self.services
    }

    pub fn lock(&self) -> &Arc<dyn LockProvider> {
        &self.lock
    }

    /// Execute bounded rounds of transitions for one candidate.
    #[instrument(skip(self, tenant_id, candidate_id), fields(tenant_id = %tenant_id, candidate_id = %candidate_id))]
    pub async fn run(
        &self,
        tenant_id: &TenantId,
        candidate_id: CandidateId,
        attempt: u32,
    ) -> Result<RunOutcome, DriftError> {
        let Some(lease) = self.lock.acquire(tenant_id, candidate_id).await? else {
            info!("lock held elsewhere, skipping");
            return Ok(RunOutcome {
                status: RunStatus::Skipped,
                transitions: 0,
                final_state: None,
                follow_up: FollowUp::None,
            });
        };

        let result = self.run_locked(tenant_id, candidate_id, attempt).await;

        if let Err(e) = self.lock.release(tenant_id, candidate_id, &lease).await {
            warn!(error = %e, "lock release failed");
        }

        // enqueue only after release, so the next worker is not turned away
        let (mut outcome, pending) = result?;
        if let Some(delay) = pending {
            outcome.follow_up = self.schedule(tenant_id, candidate_id, attempt, delay).await?;
        }
        Ok(outcome)
    }

    /// Returns the outcome and, when work remains, the delay before the
    /// follow-up should run.
    async fn run_locked(
        &self,
        tenant_id: &TenantId,
        candidate_id: CandidateId,
        attempt: u32,
    ) -> Result<(RunOutcome, Option<Duration>), DriftError> {
        let config = &self.services.config;
        let mut candidate = self.load(tenant_id, candidate_id).await?;

        if candidate.state.is_terminal() {
            return Ok((RunOutcome::stopped(RunStatus::Complete, candidate.state), None));
        }
        if candidate.state.is_human_gated() {
            return Ok((RunOutcome::stopped(RunStatus::Waiting, candidate.state), None));
        }
        if candidate.retry_count >= config.max_retries {
            let from = candidate.state;
            candidate.mark_failed(
                ErrorCode::MaxRetriesExceeded,
                format!("retry budget of {} spent", config.max_retries),
                self.services.clock.now(),
            );
            self.persist(&candidate, from, attempt, Some(ErrorCode::MaxRetriesExceeded))
                .await?;
            warn!(retry_count = candidate.retry_count, "max retries exceeded");
            let mut outcome = RunOutcome::stopped(RunStatus::Failed, CandidateState::Failed);
            outcome.transitions = 1;
            return Ok((outcome, None));
        }

        let capabilities = self.services.tenants.capabilities(tenant_id).await?;
        let ctx = StageContext {
            services: &self.services,
            capabilities: &capabilities,
        };

        let mut transitions = 0;
        let mut retry_delay = None;
        while transitions < config.max_transitions_per_invocation {
            let from = candidate.state;
            let result = self.dispatcher.execute_transition(&candidate, &ctx).await?;
            let mut next = result.candidate;

            match result.error {
                None => {
                    next.advance(result.next_state, self.services.clock.now());
                    self.persist(&next, from, attempt, None).await?;
                    transitions += 1;
                    info!(from = %from, to = %result.next_state, "transition");
                }
                Some(error @ StageError::Retryable { .. }) => {
                    next.record_retry(error.code(), error.message());
                    self.persist(&next, from, attempt, Some(error.code())).await?;
                    let delay = match self.decider.decide(next.retry_count, config.max_retries) {
                        Decision::Retry { delay, reason } => {
                            warn!(state = %from, code = %error.code(), error = error.message(), %reason, "stage will retry");
                            delay
                        }
                        Decision::GiveUp { reason } => {
                            warn!(state = %from, code = %error.code(), %reason, "retry budget spent");
                            Duration::ZERO
                        }
                    };
                    retry_delay = Some(delay);
                }
                Some(error @ StageError::Terminal { .. }) => {
                    next.fail_as(
                        result.next_state,
                        error.code(),
                        error.message(),
                        self.services.clock.now(),
                    );
                    self.persist(&next, from, attempt, Some(error.code())).await?;
                    transitions += 1;
                    warn!(from = %from, to = %result.next_state, code = %error.code(), error = error.message(), "stage failed");
                }
            }

            candidate = self.load(tenant_id, candidate_id).await?;
            if retry_delay.is_some() || !result.enqueue_next {
                break;
            }
        }

        let state = candidate.state;
        let (status, pending) = if state.is_terminal() {
            let status = if state == CandidateState::Completed {
                RunStatus::Complete
            } else {
                RunStatus::Failed
            };
            (status, None)
        } else if state.is_human_gated() {
            (RunStatus::Waiting, None)
        } else if let Some(delay) = retry_delay {
            (RunStatus::Retrying, Some(delay))
        } else {
            (RunStatus::Continued, Some(Duration::ZERO))
        };

        let outcome = RunOutcome {
            status,
            transitions,
            final_state: Some(state),
            follow_up: FollowUp::None,
        };
        Ok((outcome, pending))
    }

    /// Enqueue a job for the candidate, or ask for inline execution when
    /// the queue is unconfigured.
    pub async fn schedule(
        &self,
        tenant_id: &TenantId,
        candidate_id: CandidateId,
        attempt: u32,
        delay: Duration,
    ) -> Result<FollowUp, DriftError> {
        let job = JobMessage::new(tenant_id.clone(), candidate_id, attempt);
        Ok(match self.queue.enqueue(&job, delay).await? {
            Some(id) => FollowUp::Enqueued(id),
            None => FollowUp::RunInline { delay },
        })
    }

    async fn load(
        &self,
        tenant_id: &TenantId,
        candidate_id: CandidateId,
    ) -> Result<DriftCandidate, DriftError> {
        self.services
            .store
            .get(tenant_id, candidate_id)
            .await?
            .ok_or_else(|| DriftError::CandidateNotFound {
                tenant_id: tenant_id.clone(),
                candidate_id,
            })
    }

    /// Save the candidate and append its audit record.
    async fn persist(
        &self,
        candidate: &DriftCandidate,
        from: CandidateState,
        attempt: u32,
        error_code: Option<ErrorCode>,
    ) -> Result<(), DriftError> {
        self.services.store.save(candidate).await?;
        let mut record = TransitionRecord::new(
            candidate.tenant_id.clone(),
            candidate.id,
            from,
            candidate.state,
            attempt,
            HARNESS_ACTOR,
            candidate.state_updated_at,
        );
        if let Some(code) = error_code {
            record = record.with_error(code);
        }
        self.services.store.append_transition(record).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::testkit::{GatedTriage, TestEngine, merged_pr};
    use crate::domain::Resolution;

    #[tokio::test]
    async fn walks_a_merged_pr_to_the_human_gate() {
        let engine = TestEngine::new();
        let id = engine.ingest(merged_pr(0.85)).await;

        let outcome = engine.drain(id).await;

        assert_eq!(outcome.status, RunStatus::Waiting);
        let c = engine.candidate(id).await;
        assert_eq!(c.state, CandidateState::AwaitingHuman);
        assert!(c.fingerprint.is_some());
        assert_eq!(engine.notifier.sent().len(), 1);

        let history = engine.history(id).await;
        assert!(history.iter().any(|r| r.to == CandidateState::SlackSent));
        assert_eq!(history.last().map(|r| r.to), Some(CandidateState::AwaitingHuman));
    }

    #[tokio::test]
    async fn each_run_is_bounded() {
        let engine = TestEngine::new();
        let id = engine.ingest(merged_pr(0.85)).await;

        let outcome = engine.run(id).await;

        assert_eq!(outcome.status, RunStatus::Continued);
        assert_eq!(outcome.transitions, 4);
        assert_eq!(outcome.final_state, Some(CandidateState::DocsResolved));
        assert!(matches!(outcome.follow_up, FollowUp::Enqueued(_)));
    }

    #[tokio::test]
    async fn lock_held_elsewhere_skips_without_touching_state() {
        let engine = TestEngine::new();
        let id = engine.ingest(merged_pr(0.85)).await;
        let before = engine.candidate(id).await;

        assert!(engine.lock.acquire(&engine.tenant, id).await.unwrap().is_some());
        let outcome = engine.run(id).await;

        assert_eq!(outcome.status, RunStatus::Skipped);
        assert_eq!(outcome.follow_up, FollowUp::None);
        assert_eq!(engine.candidate(id).await, before);
        // the holder's lease is not released by the skipped run
        assert!(engine.lock.is_held(&engine.tenant, id));
    }

    #[tokio::test]
    async fn lock_is_released_after_every_run() {
        let engine = TestEngine::new();
        let id = engine.ingest(merged_pr(0.85)).await;

        engine.run(id).await;
        assert!(!engine.lock.is_held(&engine.tenant, id));

        let missing = CandidateId::from_ulid(ulid::Ulid::new());
        let err = engine.harness.run(&engine.tenant, missing, 1).await;
        assert!(matches!(err, Err(DriftError::CandidateNotFound { .. })));
        assert!(!engine.lock.is_held(&engine.tenant, missing));
    }

    #[tokio::test]
    async fn max_retries_fails_on_next_invocation_without_enqueue() {
        let engine = TestEngine::new();
        let id = engine.ingest(merged_pr(0.85)).await;
        engine.agents.triage.failures.fail_next(u32::MAX);

        // retries until the budget is spent
        let mut last = engine.run(id).await;
        for _ in 0..20 {
            if last.status != RunStatus::Retrying && last.status != RunStatus::Continued {
                break;
            }
            last = engine.run(id).await;
        }

        assert_eq!(last.status, RunStatus::Failed);
        assert_eq!(last.follow_up, FollowUp::None);
        let c = engine.candidate(id).await;
        assert_eq!(c.state, CandidateState::Failed);
        assert_eq!(c.last_error_code, Some(ErrorCode::MaxRetriesExceeded));
        assert_eq!(c.retry_count, engine.config().max_retries);

        let queued = engine.queue.pending().await;
        let again = engine.run(id).await;
        assert_eq!(again.status, RunStatus::Complete);
        assert_eq!(engine.queue.pending().await, queued);
    }

    #[tokio::test]
    async fn retry_count_never_exceeds_budget() {
        let engine = TestEngine::new();
        let id = engine.ingest(merged_pr(0.85)).await;
        engine.agents.triage.failures.fail_next(u32::MAX);

        for _ in 0..30 {
            engine.run(id).await;
            let c = engine.candidate(id).await;
            assert!(c.retry_count <= engine.config().max_retries);
        }
        assert_eq!(engine.candidate(id).await.state, CandidateState::Failed);
    }

    #[tokio::test]
    async fn transient_failure_recovers_in_place() {
        let engine = TestEngine::new();
        let id = engine.ingest(merged_pr(0.85)).await;
        engine.agents.generator.failures.fail_next(2);

        let outcome = engine.drain(id).await;

        assert_eq!(outcome.status, RunStatus::Waiting);
        let c = engine.candidate(id).await;
        assert_eq!(c.retry_count, 2);
        assert!(c.last_error_code.is_none());
        let retries: Vec<_> = engine
            .history(id)
            .await
            .into_iter()
            .filter(TransitionRecord::is_retry)
            .collect();
        assert_eq!(retries.len(), 2);
        assert!(retries.iter().all(|r| r.from == CandidateState::PatchPlanned));
    }

    #[tokio::test]
    async fn redelivered_job_does_not_repeat_side_effects() {
        let engine = TestEngine::new();
        let id = engine.ingest(merged_pr(0.85)).await;
        engine.drain(id).await;
        let settled = engine.candidate(id).await;

        for _ in 0..3 {
            let outcome = engine.run(id).await;
            assert_eq!(outcome.status, RunStatus::Waiting);
        }

        assert_eq!(engine.candidate(id).await, settled);
        assert_eq!(engine.notifier.sent().len(), 1);
        assert_eq!(engine.proposals(id).await.len(), 1);
    }

    #[tokio::test]
    async fn concurrent_runs_admit_one_worker() {
        let gate = Arc::new(GatedTriage::default());
        let engine = TestEngine::builder().triage(gate.clone()).build();
        let id = engine.ingest(merged_pr(0.85)).await;

        let first = engine.harness.run(&engine.tenant, id, 1);
        let second = async {
            // wait until the first run is parked inside triage, holding the lock
            gate.entered.notified().await;
            let outcome = engine.harness.run(&engine.tenant, id, 1).await;
            gate.release.notify_one();
            outcome
        };
        let (first, second) = tokio::join!(first, second);

        assert_eq!(second.unwrap().status, RunStatus::Skipped);
        assert_eq!(first.unwrap().status, RunStatus::Continued);
        assert_eq!(engine.history(id).await.len(), 4);
    }

    #[tokio::test]
    async fn terminal_candidates_are_left_alone() {
        let engine = TestEngine::new();
        let id = engine.ingest(merged_pr(0.01)).await;
        let outcome = engine.drain(id).await;
        assert_eq!(outcome.status, RunStatus::Complete);
        let c = engine.candidate(id).await;
        assert!(matches!(c.resolution, Some(Resolution::RoutingSuppressed { .. })));

        let again = engine.run(id).await;
        assert_eq!(again, RunOutcome::stopped(RunStatus::Complete, CandidateState::Completed));
    }
}
