//! Error types for the sidecar supervisor.
//!
//! Only two of these should ever require a human to act: `Spawn` (the worker
//! executable is missing or not runnable) and `RetryExhausted` (the restart
//! cap was hit). Everything else is either surfaced to the specific caller it
//! affects (`Timeout`, `WorkerExited`, `Worker`) or recovered internally.

use thiserror::Error;

/// Errors produced by the supervisor and surfaced through its call interface.
#[derive(Debug, Clone, Error)]
pub enum SidecarError {
    /// Worker executable missing or not runnable. Non-retryable.
    #[error("failed to spawn worker: {message}")]
    Spawn { message: String },

    /// The worker process died while the call was pending.
    #[error("worker exited while request was in flight")]
    WorkerExited,

    /// A specific call exceeded its deadline. Does not by itself mean the
    /// worker is unhealthy; a single slow call never triggers a restart.
    #[error("request '{name}' timed out")]
    Timeout { name: String },

    /// The worker answered the call with an application-level error.
    #[error("worker error: {message}")]
    Worker { message: String },

    /// Restart cap reached; no further automatic restarts until an explicit
    /// `start()` resets the counter.
    #[error("worker restart retries exhausted")]
    RetryExhausted,

    /// The supervisor itself has shut down and can no longer accept calls.
    #[error("supervisor is closed")]
    Closed,

    /// Generic internal error.
    #[error("internal error: {0}")]
    Internal(String),
}

/// Result type for supervisor operations.
pub type SidecarResult<T> = Result<T, SidecarError>;

impl SidecarError {
    /// Create a spawn error.
    pub fn spawn(message: impl Into<String>) -> Self {
        SidecarError::Spawn {
            message: message.into(),
        }
    }

    /// Create a timeout error carrying the call's logical name.
    pub fn timeout(name: impl Into<String>) -> Self {
        SidecarError::Timeout { name: name.into() }
    }

    /// Create a worker-reported error.
    pub fn worker(message: impl Into<String>) -> Self {
        SidecarError::Worker {
            message: message.into(),
        }
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        SidecarError::Internal(message.into())
    }
}
