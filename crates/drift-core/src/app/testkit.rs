//! In-memory engine for tests.

use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;

use crate::config::EngineConfig;
use crate::domain::{
    CandidateId, CandidateState, DocCandidate, DocSystem, DriftCandidate, OwnerTarget, PatchProposal, RetryPolicy,
    SourceType, TenantId, TransitionRecord,
};
use crate::impls::{
    DocIndexEntry, InMemoryDocAdapter, InMemoryJobQueue, InMemoryLockProvider, InMemoryStore,
    JobSigner, RecordingNotifier, RuleAgents, StaticTenantDirectory, UnconfiguredQueue,
};
use crate::impls::rule_agents::RuleTriageAgent;
use crate::ports::{
    Agent, AgentResponse, CandidateStore, DocAdapters, JobQueue, SystemClock, TenantCapabilities,
    TriageInput, TriageOutput, UlidGenerator,
};

use super::executor::JobExecutor;
use super::harness::{JobHarness, RunOutcome, RunStatus};
use super::ingest::{IngestReceipt, NewSignal, ingest_signal};
use super::services::{Collaborators, Services, StageContext};
use super::stages::standard_dispatcher;

pub const PAYMENTS_DOC: &str = "docs/payments.md";
pub const PAYMENTS_CONTENT: &str = "# Payments API\n## Creating charges\nSend a POST to /v1/charges with the amount.\n## Refunds\nRefunds are created under /v1/refunds.\n";

pub fn test_config() -> EngineConfig {
    let mut config = EngineConfig {
        retry: RetryPolicy::immediate(),
        ..EngineConfig::default()
    };
    config.routing.per_source.insert(
        "github_pr".into(),
        crate::config::RoutingThresholds {
            auto_approve: 0.98,
            slack_notify: 0.40,
            digest_only: 0.3,
            ignore: 0.1,
        },
    );
    config
        .mappings
        .owners
        .insert("payments".into(), OwnerTarget::new("#payments-docs"));
    config
}

/// A merged PR against the payments service moving `/v1/charges` to `/v2/charges`.
pub fn merged_pr(confidence: f64) -> NewSignal {
    let extracted = json!({
        "title": "Move charges endpoint to v2",
        "merged": true,
        "old_terms": ["/v1/charges"],
        "new_terms": ["/v2/charges"],
        "confidence": confidence,
    });
    NewSignal {
        tenant_id: TenantId::new("t1"),
        source_type: SourceType::GithubPr,
        occurred_at: None,
        repo: Some("acme/payments-api".into()),
        service: Some("payments".into()),
        extracted: extracted.as_object().cloned().unwrap_or_default(),
        raw_payload: Default::default(),
    }
}

/// Triage that parks inside the call until released.
#[derive(Default)]
pub struct GatedTriage {
    pub entered: Notify,
    pub release: Notify,
    pub inner: RuleTriageAgent,
}

#[async_trait]
impl Agent<TriageInput, TriageOutput> for GatedTriage {
    async fn call(&self, input: &TriageInput) -> AgentResponse<TriageOutput> {
        self.entered.notify_one();
        self.release.notified().await;
        self.inner.call(input).await
    }
}

#[derive(Default)]
pub struct TestEngineBuilder {
    config: Option<EngineConfig>,
    triage: Option<Arc<dyn Agent<TriageInput, TriageOutput>>>,
    unconfigured_queue: bool,
}

impl TestEngineBuilder {
    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = Some(config);
        self
    }

    pub fn triage(mut self, triage: Arc<dyn Agent<TriageInput, TriageOutput>>) -> Self {
        self.triage = Some(triage);
        self
    }

    /// Follow-ups run inline instead of being enqueued.
    pub fn unconfigured_queue(mut self) -> Self {
        self.unconfigured_queue = true;
        self
    }

    pub fn build(self) -> TestEngine {
        let config = self.config.unwrap_or_else(test_config);
        let tenant = TenantId::new("t1");
        let store = Arc::new(InMemoryStore::new());
        let lock = Arc::new(InMemoryLockProvider::new(Duration::from_secs(
            config.lock_ttl_secs,
        )));
        let notifier = Arc::new(RecordingNotifier::new());
        let queue = Arc::new(InMemoryJobQueue::new(JobSigner::new("test-secret")));

        let docs = Arc::new(InMemoryDocAdapter::new(DocSystem::Github));
        docs.put(PAYMENTS_DOC, "Payments API", PAYMENTS_CONTENT);
        let agents = RuleAgents::new(vec![DocIndexEntry {
            doc: DocCandidate {
                doc_system: DocSystem::Github,
                doc_id: PAYMENTS_DOC.into(),
                title: "Payments API".into(),
                confidence: 0.0,
                reason: String::new(),
            },
            keywords: vec!["payments".into(), "charges".into()],
        }]);
        let mut bundle = agents.agents();
        if let Some(triage) = self.triage {
            bundle.triage = triage;
        }

        let services = Services::new(
            config,
            Collaborators {
                store: store.clone(),
                signals: store.clone(),
                agents: bundle,
                docs: DocAdapters::new().with(docs.clone()),
                notifier: notifier.clone(),
                tenants: Arc::new(StaticTenantDirectory::new(TenantCapabilities::default())),
                clock: Arc::new(SystemClock),
            },
        )
        .expect("valid test config");
        let job_queue: Arc<dyn JobQueue> = if self.unconfigured_queue {
            Arc::new(UnconfiguredQueue)
        } else {
            queue.clone()
        };
        let dispatcher = standard_dispatcher().expect("complete dispatcher");
        let harness = Arc::new(JobHarness::new(
            services,
            Arc::new(dispatcher),
            lock.clone(),
            job_queue,
        ));

        TestEngine {
            tenant,
            store,
            queue,
            lock,
            notifier,
            agents,
            docs,
            executor: JobExecutor::new(harness.clone()),
            harness,
        }
    }
}

pub struct TestEngine {
    pub tenant: TenantId,
    pub store: Arc<InMemoryStore>,
    /// Unused by the harness when built with `unconfigured_queue`.
    pub queue: Arc<InMemoryJobQueue>,
    pub lock: Arc<InMemoryLockProvider>,
    pub notifier: Arc<RecordingNotifier>,
    pub agents: RuleAgents,
    pub docs: Arc<InMemoryDocAdapter>,
    pub harness: Arc<JobHarness>,
    pub executor: JobExecutor,
}

impl TestEngine {
    pub fn new() -> Self {
        Self::builder().build()
    }

    pub fn builder() -> TestEngineBuilder {
        TestEngineBuilder::default()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.harness.services().config
    }

    pub fn context<'a>(&'a self, capabilities: &'a TenantCapabilities) -> StageContext<'a> {
        StageContext {
            services: self.harness.services(),
            capabilities,
        }
    }

    pub async fn ingest_receipt(&self, input: NewSignal) -> IngestReceipt {
        ingest_signal(&self.executor, &UlidGenerator::new(SystemClock), input)
            .await
            .expect("ingest")
    }

    pub async fn ingest(&self, input: NewSignal) -> CandidateId {
        self.ingest_receipt(input).await.candidate_id
    }

    /// One harness invocation, as a worker would run it.
    pub async fn run(&self, id: CandidateId) -> RunOutcome {
        self.harness.run(&self.tenant, id, 1).await.expect("harness run")
    }

    /// Run until the candidate stops asking for more work.
    pub async fn drain(&self, id: CandidateId) -> RunOutcome {
        let mut outcome = self.run(id).await;
        for _ in 0..50 {
            if !matches!(outcome.status, RunStatus::Continued | RunStatus::Retrying) {
                break;
            }
            outcome = self.run(id).await;
        }
        outcome
    }

    /// Run one invocation at a time until the candidate sits in `state`.
    pub async fn run_until(&self, id: CandidateId, state: CandidateState) {
        for _ in 0..50 {
            if self.candidate(id).await.state == state {
                return;
            }
            self.run(id).await;
        }
        panic!("candidate never reached {state}");
    }

    pub async fn candidate(&self, id: CandidateId) -> DriftCandidate {
        self.store
            .get(&self.tenant, id)
            .await
            .expect("store")
            .expect("candidate exists")
    }

    pub async fn history(&self, id: CandidateId) -> Vec<TransitionRecord> {
        self.store.transitions(&self.tenant, id).await.expect("store")
    }

    pub async fn proposals(&self, id: CandidateId) -> Vec<PatchProposal> {
        self.store.proposals(&self.tenant, id).await.expect("store")
    }
}
