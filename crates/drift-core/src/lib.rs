//! drift-core
//!
//! Drift candidate orchestration: a per-candidate state machine that takes a
//! change signal (merged PR, incident, deploy, ...) through classification,
//! dedup, doc resolution, patch generation, owner routing and a human gate,
//! and finally writes the approved patch back to the doc system.
//!
//! # モジュール構成
//! - **domain**: ドメインモデル（ids, state, candidate, signal, proposal, errors, retry）
//! - **ports**: 抽象化レイヤー（CandidateStore, JobQueue, LockProvider, DocAdapter, Agent, ...）
//! - **app**: ハーネス、ディスパッチャ、ステージ、ワーカー、外部イベント
//! - **impls**: 実装（インメモリ版・ルールベースのエージェント）
//! - **config**: 設定（JSON + `DRIFT_*` 環境変数）
//! - 純粋ロジック: fingerprint / correlation / ownership / routing / patch

pub mod app;
pub mod config;
pub mod correlation;
pub mod domain;
pub mod error;
pub mod fingerprint;
pub mod impls;
pub mod ownership;
pub mod patch;
pub mod ports;
pub mod routing;
