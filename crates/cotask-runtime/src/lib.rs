//! # cotask-runtime
//!
//! Runtime side of the cotask pool.
//!
//! This crate provides:
//! - Stack memory (mmap with guard pages on unix, heap elsewhere)
//! - Scheduler configuration with environment overrides
//! - The [`Scheduler`] aggregate: task table, stack pool, counters
//! - The run-to-completion dispatcher, exclusive or behind a ticket lock

pub mod config;
pub mod memory;
pub mod scheduler;
pub mod dispatcher;

use cotask_core::ticket::TicketLock;

// Re-exports
pub use config::{ConfigError, SchedulerConfig};
pub use scheduler::{DispatchStats, Scheduler};
pub use dispatcher::{run_one_shared, run_pass_shared, run_shared, run_until_idle_shared};

/// A scheduler shared between threads
///
/// Every table and pool operation goes through the ticket lock, so
/// creators are admitted in arrival order.
pub type SharedScheduler = TicketLock<Scheduler>;
