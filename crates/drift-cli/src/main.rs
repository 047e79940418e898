//! drift-cli - インメモリ構成でワークフローを一周させるデモ
//!
//! 1) マージ済み PR のシグナルを投入
//! 2) ワーカーがキューからジョブを受け取り、人間ゲート（AWAITING_HUMAN）まで進める
//! 3) 承認イベントを送り、書き戻し → COMPLETED を確認
//!
//! 設定: 第 1 引数に JSON ファイル（省略可）、その上に `DRIFT_*` 環境変数。
//! ログ: `RUST_LOG`（既定 info）。

use serde_json::json;
use std::error::Error;
use std::sync::Arc;
use std::time::Duration;

use tracing::info;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use drift_core::app::{
    Collaborators, JobExecutor, JobHarness, NewSignal, Services, WorkerGroup, approve,
    candidate_status, ingest_signal, standard_dispatcher,
};
use drift_core::config::{DocMapping, EngineConfig};
use drift_core::domain::{CandidateId, CandidateState, DocSystem, OwnerTarget, SourceType, TenantId};
use drift_core::impls::{
    InMemoryDocAdapter, InMemoryJobQueue, InMemoryLockProvider, InMemoryStore, JobSigner,
    RecordingNotifier, RuleAgents, StaticTenantDirectory,
};
use drift_core::ports::{
    DocAdapters, JobQueue, SystemClock, TenantCapabilities, UlidGenerator,
};

const DOC_ID: &str = "docs/payments.md";
const DOC_CONTENT: &str = "# Payments API\n\n## Creating charges\n\nSend a POST to /v1/charges with the amount in cents.\n\n## Refunds\n\nRefunds are created under /v1/refunds.\n";

fn load_config() -> Result<EngineConfig, Box<dyn Error>> {
    let config = match std::env::args().nth(1) {
        Some(path) => EngineConfig::from_json_str(&std::fs::read_to_string(path)?)?,
        None => {
            let mut config = EngineConfig::default();
            config
                .mappings
                .owners
                .insert("payments".into(), OwnerTarget::new("#payments-docs"));
            config.mappings.docs.insert(
                "payments".into(),
                vec![DocMapping {
                    doc_system: DocSystem::Github,
                    doc_id: DOC_ID.into(),
                    title: "Payments API".into(),
                }],
            );
            config
        }
    };
    Ok(config.apply_env()?)
}

async fn wait_for(
    store: &InMemoryStore,
    tenant: &TenantId,
    id: CandidateId,
    state: CandidateState,
) -> Result<(), Box<dyn Error>> {
    for _ in 0..200 {
        if candidate_status(store, tenant, id).await?.state == state {
            return Ok(());
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    Err(format!("candidate {id} did not reach {state}").into())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = load_config()?;
    let secret = std::env::var("DRIFT_QUEUE_SECRET").unwrap_or_else(|_| "dev-secret".into());
    let signer = JobSigner::new(secret);

    // (A) collaborators
    let store = Arc::new(InMemoryStore::new());
    let docs = Arc::new(InMemoryDocAdapter::new(DocSystem::Github));
    docs.put(DOC_ID, "Payments API", DOC_CONTENT);
    let notifier = Arc::new(RecordingNotifier::new());
    let queue = Arc::new(InMemoryJobQueue::new(signer.clone()));
    let lock = Arc::new(InMemoryLockProvider::new(Duration::from_secs(
        config.lock_ttl_secs,
    )));
    let agents = RuleAgents::new(Vec::new());

    let services = Services::new(
        config,
        Collaborators {
            store: store.clone(),
            signals: store.clone(),
            agents: agents.agents(),
            docs: DocAdapters::new().with(docs.clone()),
            notifier: notifier.clone(),
            tenants: Arc::new(StaticTenantDirectory::new(TenantCapabilities::default())),
            clock: Arc::new(SystemClock),
        },
    )?;

    // (B) harness + workers
    let job_queue: Arc<dyn JobQueue> = queue.clone();
    let harness = Arc::new(JobHarness::new(
        services,
        Arc::new(standard_dispatcher()?),
        lock,
        job_queue.clone(),
    ));
    let executor = JobExecutor::new(harness);
    let workers = WorkerGroup::spawn(2, job_queue, signer, executor.clone());

    // (C) ingest a merged PR
    let tenant = TenantId::new("acme");
    let extracted = json!({
        "title": "Move charges endpoint to v2",
        "merged": true,
        "old_terms": ["/v1/charges"],
        "new_terms": ["/v2/charges"],
        "confidence": 0.8,
    });
    let receipt = ingest_signal(
        &executor,
        &UlidGenerator::new(SystemClock),
        NewSignal {
            tenant_id: tenant.clone(),
            source_type: SourceType::GithubPr,
            occurred_at: None,
            repo: Some("acme/payments-api".into()),
            service: Some("payments".into()),
            extracted: extracted.as_object().cloned().unwrap_or_default(),
            raw_payload: Default::default(),
        },
    )
    .await?;
    let id = receipt.candidate_id;

    wait_for(&store, &tenant, id, CandidateState::AwaitingHuman).await?;
    for message in notifier.sent() {
        info!(channel = %message.target.as_str(), "notified:\n{}", message.text);
    }

    // (D) approve and let the workers write back
    let outcome = approve(&executor, &tenant, id, "cli").await?;
    info!(?outcome, "approval sent");
    wait_for(&store, &tenant, id, CandidateState::Completed).await?;
    workers.shutdown_and_join().await;

    let status = candidate_status(store.as_ref(), &tenant, id).await?;
    println!("{}", serde_json::to_string_pretty(&status)?);
    println!("{}", docs.content(DOC_ID).unwrap_or_default());
    Ok(())
}
