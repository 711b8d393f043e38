//! Error types for queue construction and configuration.

use thiserror::Error;

/// Errors produced when constructing or configuring an event queue.
#[derive(Debug, Error)]
pub enum QueueError {
    /// `max_concurrency` was zero.
    #[error("max_concurrency must be greater than 0")]
    InvalidConcurrency,
    /// Configuration validation or parsing failed.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Application-facing result using anyhow for higher-level contexts.
pub type AppResult<T> = Result<T, anyhow::Error>;
