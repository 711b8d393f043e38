//! Build an [`EventQueue`] from a validated configuration.

use crate::config::QueueConfig;
use crate::core::{EventQueue, QueueError};

/// Validate `cfg` and construct an event queue from it.
///
/// # Errors
///
/// Returns [`QueueError::InvalidConfig`] when validation fails.
pub fn build_queue(cfg: &QueueConfig) -> Result<EventQueue, QueueError> {
    cfg.validate().map_err(QueueError::InvalidConfig)?;
    EventQueue::with_concurrency(cfg.max_concurrency, cfg.background_concurrency())
}
