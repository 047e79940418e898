//! Worker group - キューからジョブを受け取りハーネスを回す
//!
//! # 設計原則
//! - `watch` チャネルで停止要求を配り、`receive` と `select!` で競合させる
//! - 実行中のハーネスは中断しない（次の receive を止めるだけ）
//! - 署名が合わない / 壊れたメッセージは再配送しても直らないので ack して捨てる
//!
//! # ack の方針
//! - 実行が終わった（Waiting / Continued / Retrying / Complete / Failed）→ ack。
//!   フォローアップはハーネスが別メッセージとして積んでいる
//! - ロック競合で Skipped → ack しない。可視性タイムアウト後に再配送される
//! - ストアやキューの障害 → ack しない

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::domain::SignedDelivery;
use crate::error::{DriftError, QueueError};
use crate::impls::JobSigner;
use crate::ports::JobQueue;

use super::executor::JobExecutor;
use super::harness::RunStatus;

const RECEIVE_TIMEOUT: Duration = Duration::from_secs(1);
const BACKOFF_ON_QUEUE_ERROR: Duration = Duration::from_millis(500);

/// Worker group handle.
/// - `shutdown_and_join()` で全ワーカーの終了を待てる
pub struct WorkerGroup {
    shutdown_tx: watch::Sender<bool>,
    joins: Vec<JoinHandle<()>>,
}

impl WorkerGroup {
    /// Spawn `n` workers.
    pub fn spawn(
        n: usize,
        queue: Arc<dyn JobQueue>,
        signer: JobSigner,
        executor: JobExecutor,
    ) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let joins = (0..n)
            .map(|worker_id| {
                let worker = Worker {
                    id: worker_id,
                    queue: Arc::clone(&queue),
                    signer: signer.clone(),
                    executor: executor.clone(),
                };
                let mut rx = shutdown_rx.clone();
                tokio::spawn(async move { worker.run(&mut rx).await })
            })
            .collect();

        Self { shutdown_tx, joins }
    }

    /// Stop taking new jobs. In-flight harness runs finish normally.
    pub fn request_shutdown(&self) {
        // receivers may already be gone
        let _ = self.shutdown_tx.send(true);
    }

    pub async fn shutdown_and_join(self) {
        self.request_shutdown();
        for join in self.joins {
            if let Err(e) = join.await {
                warn!(error = %e, "worker task ended abnormally");
            }
        }
    }
}

struct Worker {
    id: usize,
    queue: Arc<dyn JobQueue>,
    signer: JobSigner,
    executor: JobExecutor,
}

impl Worker {
    async fn run(&self, shutdown_rx: &mut watch::Receiver<bool>) {
        info!(worker_id = self.id, "worker started");
        loop {
            if *shutdown_rx.borrow() {
                break;
            }

            let received = tokio::select! {
                _ = shutdown_rx.changed() => continue,
                received = self.queue.receive(RECEIVE_TIMEOUT) => received,
            };

            match received {
                Ok(Some(delivery)) => self.handle(delivery).await,
                Ok(None) => {}
                Err(e) => {
                    warn!(worker_id = self.id, error = %e, "receive failed");
                    tokio::time::sleep(BACKOFF_ON_QUEUE_ERROR).await;
                }
            }
        }
        info!(worker_id = self.id, "worker stopped");
    }

    async fn handle(&self, delivery: SignedDelivery) {
        let job = match self.signer.verify(&delivery) {
            Ok(job) => job,
            Err(e @ (QueueError::BadSignature | QueueError::Malformed(_))) => {
                warn!(worker_id = self.id, message_id = %delivery.message_id, error = %e, "dropping delivery");
                self.ack(&delivery).await;
                return;
            }
            Err(e) => {
                warn!(worker_id = self.id, message_id = %delivery.message_id, error = %e, "verify failed");
                return;
            }
        };

        let result = self
            .executor
            .execute(&job.tenant_id, job.candidate_id, job.attempt)
            .await;
        match result {
            Ok(outcome) if outcome.status == RunStatus::Skipped => {
                debug!(worker_id = self.id, candidate_id = %job.candidate_id, "busy, leaving for redelivery");
            }
            Ok(outcome) => {
                debug!(worker_id = self.id, status = ?outcome.status, transitions = outcome.transitions, "job done");
                self.ack(&delivery).await;
            }
            Err(DriftError::CandidateNotFound { .. }) => {
                warn!(worker_id = self.id, candidate_id = %job.candidate_id, "candidate gone, dropping job");
                self.ack(&delivery).await;
            }
            Err(e) => {
                warn!(worker_id = self.id, candidate_id = %job.candidate_id, error = %e, "job failed, leaving for redelivery");
            }
        }
    }

    async fn ack(&self, delivery: &SignedDelivery) {
        if let Err(e) = self.queue.ack(&delivery.message_id).await {
            warn!(worker_id = self.id, message_id = %delivery.message_id, error = %e, "ack failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::testkit::{TestEngine, merged_pr};
    use crate::domain::{CandidateId, CandidateState, JobMessage, MessageId, TenantId};

    async fn wait_for_state(engine: &TestEngine, id: CandidateId, state: CandidateState) {
        for _ in 0..500 {
            if engine.candidate(id).await.state == state {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("candidate never reached {state}");
    }

    fn spawn(engine: &TestEngine, n: usize) -> WorkerGroup {
        WorkerGroup::spawn(
            n,
            engine.queue.clone(),
            JobSigner::new("test-secret"),
            engine.executor.clone(),
        )
    }

    #[tokio::test]
    async fn worker_drives_candidate_to_the_gate() {
        let engine = TestEngine::new();
        let id = engine.ingest(merged_pr(0.85)).await;

        let workers = spawn(&engine, 1);
        wait_for_state(&engine, id, CandidateState::AwaitingHuman).await;
        workers.shutdown_and_join().await;

        assert_eq!(engine.queue.pending().await, 0);
        assert_eq!(engine.notifier.sent().len(), 1);
    }

    #[tokio::test]
    async fn forged_and_malformed_deliveries_are_dropped() {
        let engine = TestEngine::new();
        let body = JobMessage::new(
            TenantId::new("t1"),
            CandidateId::from_ulid(ulid::Ulid::new()),
            1,
        )
        .to_json()
        .unwrap();
        engine
            .queue
            .push_raw(SignedDelivery {
                message_id: MessageId::new("forged"),
                body,
                signature: "00".repeat(32),
            })
            .await;
        let garbage = JobSigner::new("test-secret").sign("not json").unwrap();
        engine
            .queue
            .push_raw(SignedDelivery {
                message_id: MessageId::new("garbage"),
                body: "not json".into(),
                signature: garbage,
            })
            .await;

        let workers = spawn(&engine, 1);
        for _ in 0..500 {
            if engine.queue.pending().await == 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        workers.shutdown_and_join().await;

        assert_eq!(engine.queue.pending().await, 0);
    }

    #[tokio::test]
    async fn jobs_for_missing_candidates_are_acked() {
        let engine = TestEngine::new();
        let signer = JobSigner::new("test-secret");
        let job = JobMessage::new(
            TenantId::new("t1"),
            CandidateId::from_ulid(ulid::Ulid::new()),
            1,
        );
        let body = job.to_json().unwrap();
        engine
            .queue
            .push_raw(SignedDelivery {
                message_id: MessageId::new("orphan"),
                signature: signer.sign(&body).unwrap(),
                body,
            })
            .await;

        let workers = spawn(&engine, 1);
        for _ in 0..500 {
            if engine.queue.pending().await == 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        workers.shutdown_and_join().await;

        assert_eq!(engine.queue.pending().await, 0);
    }

    #[tokio::test]
    async fn shutdown_returns_promptly_when_idle() {
        let engine = TestEngine::new();
        let workers = spawn(&engine, 3);
        tokio::time::timeout(Duration::from_secs(5), workers.shutdown_and_join())
            .await
            .expect("workers stopped");
    }
}
