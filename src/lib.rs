//! # lanequeue
//!
//! A fail-fast two-lane work scheduler: the execution core of a build
//! orchestrator.
//!
//! This library provides a concurrent scheduler that accepts units of work
//! (build actions) at two priority levels and runs them against bounded
//! worker pools. It guarantees that all accepted work either completes or is
//! deterministically abandoned after a first failure, and that callers can
//! wait for full drainage and retrieve at most one captured failure.
//!
//! ## Core Problem Solved
//!
//! Build orchestration has scheduling constraints that general-purpose
//! executors don't address directly:
//!
//! - **Fail fast**: once any build action fails, running the rest of the
//!   normal backlog is wasted work - it must be abandoned deterministically
//! - **Background work is different**: bookkeeping (cache uploads, log
//!   flushes) must keep running through a build failure, in its own pool,
//!   without competing with build throughput
//! - **One error, surfaced once**: callers want a single aggregate answer
//!   after drainage, not a stream of secondary failures
//!
//! ## Key Features
//!
//! - **Two independent lanes**: unbounded MPMC FIFO queues for `Normal` and
//!   `Background` work
//! - **Lazy worker pools**: `N` normal and `4N` background OS threads,
//!   started exactly once on the first completion wait
//! - **First-failure-wins capture**: one error slot, written under a lock
//!   with an unlocked fast-path check
//! - **Drain tracking**: an atomic outstanding-work counter and a
//!   single-fire completion signal
//!
//! ## Example
//!
//! ```rust
//! use lanequeue::{EventQueue, Priority};
//!
//! let queue = EventQueue::new(2)?;
//!
//! queue.enqueue(Priority::Normal, || {
//!     // run a build action
//!     Ok(())
//! });
//! queue.enqueue(Priority::Background, || {
//!     // flush some logs
//!     Ok(())
//! });
//!
//! // Starts the pools, waits for drainage, joins workers, and returns the
//! // first captured failure (if any).
//! assert!(queue.wait_completion().is_none());
//! # Ok::<(), lanequeue::QueueError>(())
//! ```
//!
//! For complete examples, see `tests/event_queue_test.rs`.

#![deny(warnings)]
#![deny(missing_docs)]
#![deny(unsafe_code)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

/// Core scheduling: lanes, worker pools, fail-fast capture, drain tracking.
pub mod core;
/// Configuration models for the event queue.
pub mod config;
/// Builders to construct event queues from configuration.
pub mod builders;
/// Shared utilities.
pub mod util;

pub use crate::builders::build_queue;
pub use crate::config::QueueConfig;
pub use crate::core::{Action, AppResult, EventQueue, Priority, QueueError};
