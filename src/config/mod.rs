//! Configuration models for the event queue.

pub mod queue;

pub use queue::{QueueConfig, DEFAULT_BACKGROUND_MULTIPLIER};
