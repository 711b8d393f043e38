//! Core scheduling: lanes, worker pools, fail-fast capture, drain tracking.

pub mod error;
pub mod event_queue;

pub use error::{AppResult, QueueError};
pub use event_queue::{Action, EventQueue, Priority};
