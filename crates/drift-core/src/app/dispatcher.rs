//! StageDispatcher - 状態ごとのステージハンドラ表
//!
//! # 設計原則
//! - グローバルなレジストリは持たない。`DispatcherBuilder` で一度だけ組み立てて注入する
//! - 起動時検証（Fail-fast）: 必須状態のハンドラ欠落・二重登録は `BuildError`
//! - ハンドラは作業コピーを受け取り、エラー時はそのコピーを捨てる
//!
//! # 学習ポイント
//! - `HashMap<CandidateState, Arc<dyn StageHandler>>` による型消去
//! - `Result<CandidateState, StageError>` を遷移結果へ写像する

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

use crate::domain::{CandidateState, DriftCandidate, StageError};
use crate::error::DriftError;

use super::services::StageContext;

/// Performs the work that moves a candidate out of one state.
///
/// The handler may overwrite any field it owns on `candidate`; the dispatcher
/// only keeps those writes when the handler succeeds.
#[async_trait]
pub trait StageHandler: Send + Sync {
    async fn handle(
        &self,
        candidate: &mut DriftCandidate,
        ctx: &StageContext<'_>,
    ) -> Result<CandidateState, StageError>;
}

#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("Stage handler for state '{0}' is already registered")]
    AlreadyRegistered(CandidateState),

    #[error("State '{0}' is terminal or human-gated and cannot have a stage handler")]
    NotDispatchable(CandidateState),

    #[error("Missing stage handlers: {0:?}. These states need a handler but none was registered.")]
    MissingHandlers(Vec<CandidateState>),
}

/// Outcome of one dispatched transition.
#[derive(Debug, Clone)]
pub struct TransitionResult {
    /// Where the candidate should go. Equal to the current state on a retryable error.
    pub next_state: CandidateState,
    /// Whether more automatic work remains after this transition.
    pub enqueue_next: bool,
    pub error: Option<StageError>,
    /// The handler's working copy on success; an untouched copy otherwise.
    pub candidate: DriftCandidate,
}

pub struct StageDispatcher {
    handlers: HashMap<CandidateState, Arc<dyn StageHandler>>,
}

impl StageDispatcher {
    pub fn builder() -> DispatcherBuilder {
        DispatcherBuilder::default()
    }

    pub fn handles(&self, state: CandidateState) -> bool {
        self.handlers.contains_key(&state)
    }

    pub async fn execute_transition(
        &self,
        candidate: &DriftCandidate,
        ctx: &StageContext<'_>,
    ) -> Result<TransitionResult, DriftError> {
        let state = candidate.state;
        let handler = self
            .handlers
            .get(&state)
            .ok_or(DriftError::HandlerNotFound(state))?;

        let mut working = candidate.clone();
        match handler.handle(&mut working, ctx).await {
            Ok(next) => {
                if !state.can_transition_to(next) {
                    return Err(DriftError::IllegalTransition { from: state, to: next });
                }
                Ok(TransitionResult {
                    next_state: next,
                    enqueue_next: !next.is_terminal() && !next.is_human_gated(),
                    error: None,
                    candidate: working,
                })
            }
            Err(error @ StageError::Retryable { .. }) => Ok(TransitionResult {
                next_state: state,
                enqueue_next: true,
                error: Some(error),
                candidate: candidate.clone(),
            }),
            Err(error @ StageError::Terminal { .. }) => {
                let next_state = if error.code().needs_mapping() {
                    CandidateState::FailedNeedsMapping
                } else {
                    CandidateState::Failed
                };
                Ok(TransitionResult {
                    next_state,
                    enqueue_next: false,
                    error: Some(error),
                    candidate: candidate.clone(),
                })
            }
        }
    }
}

#[derive(Default)]
pub struct DispatcherBuilder {
    handlers: HashMap<CandidateState, Arc<dyn StageHandler>>,
}

impl DispatcherBuilder {
    pub fn register<H: StageHandler + 'static>(
        mut self,
        state: CandidateState,
        handler: H,
    ) -> Result<Self, BuildError> {
        if !state.requires_handler() {
            return Err(BuildError::NotDispatchable(state));
        }
        if self.handlers.contains_key(&state) {
            return Err(BuildError::AlreadyRegistered(state));
        }
        self.handlers.insert(state, Arc::new(handler));
        Ok(self)
    }

    /// Every state that requires a handler must have one.
    pub fn build(self) -> Result<StageDispatcher, BuildError> {
        let missing: Vec<CandidateState> = CandidateState::ALL
            .into_iter()
            .filter(|s| s.requires_handler() && !self.handlers.contains_key(s))
            .collect();
        if !missing.is_empty() {
            return Err(BuildError::MissingHandlers(missing));
        }
        Ok(StageDispatcher {
            handlers: self.handlers,
        })
    }
}
