//! JobExecutor - フォローアップの実行（キュー未設定時はインライン）

use std::sync::Arc;

use tracing::debug;

use crate::domain::{CandidateId, TenantId};
use crate::error::DriftError;

use super::harness::{FollowUp, JobHarness, RunOutcome};

#[derive(Clone)]
pub struct JobExecutor {
    harness: Arc<JobHarness>,
}

impl JobExecutor {
    pub fn new(harness: Arc<JobHarness>) -> Self {
        Self { harness }
    }

    pub fn harness(&self) -> &Arc<JobHarness> {
        &self.harness
    }

    /// Run the harness, then keep running inline for as long as it asks to.
    ///
    /// With a configured queue the first run enqueues its own follow-up and
    /// this returns after one run.
    pub async fn execute(
        &self,
        tenant_id: &TenantId,
        candidate_id: CandidateId,
        attempt: u32,
    ) -> Result<RunOutcome, DriftError> {
        let mut outcome = self.harness.run(tenant_id, candidate_id, attempt).await?;
        while let FollowUp::RunInline { delay } = outcome.follow_up {
            debug!(?delay, "running follow-up inline");
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            outcome = self.harness.run(tenant_id, candidate_id, attempt).await?;
        }
        Ok(outcome)
    }

    /// Act on a follow-up produced outside a harness run (ingest, events).
    pub async fn follow_up(
        &self,
        tenant_id: &TenantId,
        candidate_id: CandidateId,
        attempt: u32,
        follow_up: &FollowUp,
    ) -> Result<Option<RunOutcome>, DriftError> {
        match follow_up {
            FollowUp::RunInline { delay } => {
                if !delay.is_zero() {
                    tokio::time::sleep(*delay).await;
                }
                self.execute(tenant_id, candidate_id, attempt).await.map(Some)
            }
            FollowUp::None | FollowUp::Enqueued(_) => Ok(None),
        }
    }
}
