//! Runtime error types.

use thiserror::Error;

/// Errors that can occur during runtime orchestration.
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// `run` was called while the event loops were already consumed.
    #[error("Runtime is already running")]
    AlreadyRunning,

    /// Configuration loading or extraction failed.
    #[error("Configuration error: {0}")]
    Config(#[from] figment::Error),
}

/// Result type for runtime operations.
pub type RuntimeResult<T> = Result<T, RuntimeError>;
