//! Impls - ports の実装（開発用・テスト用）
//!
//! すべてプロセス内で完結する。本番の DB / ブローカー / ドキュメント
//! システム実装は同じ trait を別クレートで実装する想定。
//!
//! # 含まれる実装
//! - **InMemoryStore**: CandidateStore + SignalStore
//! - **InMemoryJobQueue**: 署名付き配送・遅延・可視性タイムアウト
//! - **InMemoryLockProvider**: TTL リース
//! - **InMemoryDocAdapter** / **RecordingNotifier**: 外部システムの代役
//! - **RuleAgents**: 決定的なエージェント実装

pub mod inmem_docs;
pub mod inmem_lock;
pub mod inmem_notify;
pub mod inmem_queue;
pub mod inmem_store;
pub mod rule_agents;
pub mod signing;
pub mod static_tenants;

pub use self::inmem_docs::InMemoryDocAdapter;
pub use self::inmem_lock::InMemoryLockProvider;
pub use self::inmem_notify::{RecordingNotifier, SentMessage};
pub use self::inmem_queue::{InMemoryJobQueue, UnconfiguredQueue};
pub use self::inmem_store::InMemoryStore;
pub use self::rule_agents::{DocIndexEntry, RuleAgents};
pub use self::signing::JobSigner;
pub use self::static_tenants::StaticTenantDirectory;
