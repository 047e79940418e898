//! Errors - ステージ実行エラーと分類
//!
//! ハンドラは例外で制御フローを表現しない。
//! `Result<CandidateState, StageError>` を返し、ハーネスは
//! retryable / terminal のタグで分岐する。

use serde::{Deserialize, Serialize};
use std::fmt;

/// ErrorKind は実行エラーの運用分類
///
/// - Transient: 一時的なエラー（同じ状態のままリトライ）
/// - Terminal: 恒久的なエラー（FAILED へ遷移）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Transient,
    Terminal,
}

/// Structured error codes surfaced on the candidate (`last_error_code`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    MaxRetriesExceeded,
    AgentUnavailable,
    DependencyUnavailable,
    NotificationFailed,
    NoDocMapping,
    DocNotFound,
    PatchValidationFailed,
    PatchApplyFailed,
    RevisionConflict,
    WritebackFailed,
    MissingArtifact,
    SignalMissing,
}

impl ErrorCode {
    /// Operator-fixable configuration problems end in FAILED_NEEDS_MAPPING.
    pub fn needs_mapping(self) -> bool {
        matches!(self, ErrorCode::NoDocMapping | ErrorCode::DocNotFound)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCode::MaxRetriesExceeded => "MAX_RETRIES_EXCEEDED",
            ErrorCode::AgentUnavailable => "AGENT_UNAVAILABLE",
            ErrorCode::DependencyUnavailable => "DEPENDENCY_UNAVAILABLE",
            ErrorCode::NotificationFailed => "NOTIFICATION_FAILED",
            ErrorCode::NoDocMapping => "NO_DOC_MAPPING",
            ErrorCode::DocNotFound => "DOC_NOT_FOUND",
            ErrorCode::PatchValidationFailed => "PATCH_VALIDATION_FAILED",
            ErrorCode::PatchApplyFailed => "PATCH_APPLY_FAILED",
            ErrorCode::RevisionConflict => "REVISION_CONFLICT",
            ErrorCode::WritebackFailed => "WRITEBACK_FAILED",
            ErrorCode::MissingArtifact => "MISSING_ARTIFACT",
            ErrorCode::SignalMissing => "SIGNAL_MISSING",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned by a stage handler.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum StageError {
    /// Stay in the current state, bump `retry_count`, re-enqueue.
    #[error("retryable {code}: {message}")]
    Retryable { code: ErrorCode, message: String },

    /// Move to FAILED with this code.
    #[error("terminal {code}: {message}")]
    Terminal { code: ErrorCode, message: String },
}

impl StageError {
    pub fn retryable(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::Retryable {
            code,
            message: message.into(),
        }
    }

    pub fn terminal(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::Terminal {
            code,
            message: message.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            StageError::Retryable { .. } => ErrorKind::Transient,
            StageError::Terminal { .. } => ErrorKind::Terminal,
        }
    }

    pub fn code(&self) -> ErrorCode {
        match self {
            StageError::Retryable { code, .. } | StageError::Terminal { code, .. } => *code,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            StageError::Retryable { message, .. } | StageError::Terminal { message, .. } => message,
        }
    }
}
