//! App - アプリケーション層
//!
//! このモジュールは、ports を組み合わせてワークフローを実装します。
//!
//! # 主要コンポーネント
//! - **StageDispatcher**: 状態 → ステージハンドラの対応表（Fail-fast で構築）
//! - **JobHarness**: ロック付きの有界遷移ループ
//! - **JobExecutor**: フォローアップの実行（キュー未設定時はインライン）
//! - **WorkerGroup**: キュー受信ループ
//! - **ingest / events**: 外部からの入口（シグナル投入、人間の承認・修正・却下）
//! - **status**: 状態照会

pub mod dispatcher;
pub mod events;
pub mod executor;
pub mod harness;
pub mod ingest;
pub mod services;
pub mod stages;
pub mod status;
pub mod worker;

#[cfg(test)]
pub(crate) mod testkit;

// 主要な型を再エクスポート
pub use self::dispatcher::{BuildError, StageDispatcher, StageHandler, TransitionResult};
pub use self::events::{EventOutcome, HumanEvent, apply_event, approve, reject, request_edit};
pub use self::executor::JobExecutor;
pub use self::harness::{FollowUp, JobHarness, RunOutcome, RunStatus};
pub use self::ingest::{IngestReceipt, NewSignal, ingest_signal};
pub use self::services::{Collaborators, Services, StageContext};
pub use self::stages::standard_dispatcher;
pub use self::status::{CandidateStatus, ProposalSummary, candidate_status};
pub use self::worker::WorkerGroup;
