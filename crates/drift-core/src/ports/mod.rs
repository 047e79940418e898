//! Ports - 抽象化レイヤー
//!
//! このモジュールは Hexagonal Architecture の「ポート」を定義します。
//! 各 trait は外部システム（DB, ブローカー, LLM エージェント, ドキュメントシステム,
//! チャット通知）へのインターフェースを提供し、実装の詳細を隠蔽します。
//!
//! # 設計原則
//! - CandidateStore が source of truth（正本）
//! - JobQueue は配送だけ（candidate_id のみ）
//! - LockProvider は TTL リース。並行制御はここで行う

pub mod agents;
pub mod candidate_store;
pub mod clock;
pub mod doc_adapter;
pub mod id_generator;
pub mod job_queue;
pub mod lock;
pub mod notifier;
pub mod signal_store;
pub mod tenant;

// 主要な trait を再エクスポート
pub use self::agents::{
    Agent, AgentResponse, Agents, DocResolveInput, DocResolveOutput, EditInput, GenerateInput,
    GeneratedPatch, PlanInput, PlanOutput, TriageInput, TriageOutput,
};
pub use self::candidate_store::{CandidateStore, FingerprintClaim};
pub use self::clock::{Clock, FixedClock, SystemClock};
pub use self::doc_adapter::{DocAdapter, DocAdapters, FetchedContent};
pub use self::id_generator::{IdGenerator, UlidGenerator};
pub use self::job_queue::JobQueue;
pub use self::lock::{LeaseToken, LockProvider};
pub use self::notifier::{NotificationChannel, SendResult};
pub use self::signal_store::SignalStore;
pub use self::tenant::{TenantCapabilities, TenantDirectory};
