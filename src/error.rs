//! Application error types
//!
//! Each layer owns a `thiserror` enum; [`AppError`] aggregates them for the
//! binary, which logs the error and exits with status 1.

use crate::config::ConfigError;
use crate::lifecycle::LifecycleError;
use crate::params::ValidationError;
use thiserror::Error;

/// Top-level error for a subscriber run
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Invalid arguments: {0}")]
    Validation(#[from] ValidationError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),
}

/// Result type for subscriber operations
pub type AppResult<T> = Result<T, AppError>;
