//! Worker error types.

use thiserror::Error;

pub type WorkerResult<T> = Result<T, WorkerError>;

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("Run cancelled")]
    Cancelled,

    #[error("Run timed out after {0}s")]
    Timeout(u64),

    #[error("Persistence failed: {0}")]
    PersistenceFailed(String),

    #[error("Too many consecutive unreadable frames: {skipped} ending at frame {frame}")]
    TooManySkippedFrames { skipped: u32, frame: u64 },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Media error: {0}")]
    Media(#[from] courtside_media::MediaError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl WorkerError {
    pub fn persistence_failed(msg: impl Into<String>) -> Self {
        Self::PersistenceFailed(msg.into())
    }

    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Cancellation and timeout end a run without a result; nothing is persisted.
    pub fn is_aborted(&self) -> bool {
        matches!(self, WorkerError::Cancelled | WorkerError::Timeout(_))
    }

    /// Short label used for metrics and status reports.
    pub fn kind(&self) -> &'static str {
        match self {
            WorkerError::Cancelled => "cancelled",
            WorkerError::Timeout(_) => "timeout",
            WorkerError::PersistenceFailed(_) => "persistence",
            WorkerError::TooManySkippedFrames { .. } => "skipped_frames",
            WorkerError::Config(_) => "config",
            WorkerError::Internal(_) => "internal",
            WorkerError::Media(_) => "media",
            WorkerError::Io(_) => "io",
            WorkerError::Json(_) => "json",
        }
    }
}
