//! # cotask-core
//!
//! Core types for the cotask cooperative task pool.
//!
//! This crate is platform-agnostic and contains no OS-specific code.
//! The mmap-backed stack allocator and the dispatcher live in `cotask-runtime`.
//!
//! ## Modules
//!
//! - `id` - Task handle type
//! - `state` - State of an occupied task slot
//! - `stack` - Bounded LIFO pool of fixed-size stacks
//! - `task` - Fixed-capacity task table and task entries
//! - `ticket` - FIFO-fair ticket spinlock
//! - `error` - Error types
//! - `fatal` - Unrecoverable invariant violations
//! - `traits` - Platform allocation trait
//! - `kprint` - Kernel-style debug printing macros
//! - `env` - Environment variable utilities

pub mod id;
pub mod state;
pub mod stack;
pub mod task;
pub mod ticket;
pub mod error;
pub mod fatal;
pub mod traits;
pub mod kprint;
pub mod env;

// Re-exports for convenience
pub use id::TaskId;
pub use state::TaskState;
pub use stack::{HeapStacks, StackPool, StackToken};
pub use task::{Task, TaskEntry, TaskTable};
pub use ticket::{RawTicketLock, TicketLock, TicketLockGuard};
pub use error::{MemoryError, SchedError, SchedResult};
pub use fatal::FatalMode;
pub use traits::StackAllocator;
pub use env::{env_get, env_get_bool, env_get_opt};

/// Constants for the pool layout
pub mod constants {
    /// Default number of task slots (and stacks)
    pub const MAX_TASKS: usize = 64;

    /// Default stack size: one 4 KB page
    pub const STACK_SIZE: usize = 4096;

    /// Smallest stack the pool will hand out
    pub const MIN_STACK_SIZE: usize = 4096;

    /// Stack alignment for heap-backed stacks
    pub const STACK_ALIGN: usize = 16;

    /// No task sentinel value
    pub const TASK_NONE: u32 = u32::MAX;
}
