//! # cotask - Cooperative Task Pool
//!
//! A fixed-capacity pool of run-to-completion tasks, each holding one
//! fixed-size stack from a bounded LIFO pool, plus a FIFO-fair ticket lock.
//!
//! ## Features
//!
//! - **Bounded**: task slots and stacks are sized once at startup and never grow
//! - **Run to completion**: entries run in table order on the dispatching thread
//! - **Handles**: `create` returns a [`TaskId`]; stale handles are rejected
//! - **Fair locking**: [`TicketLock`] admits contenders strictly in arrival order
//!
//! ## Quick Start
//!
//! ```ignore
//! use cotask::{Runtime, SchedulerConfig};
//!
//! fn main() {
//!     let runtime = Runtime::new(SchedulerConfig::new().capacity(2)).unwrap();
//!     let handle = runtime.handle();
//!
//!     handle.create(|a: u32, b: u32| println!("{} + {} = {}", a, b, a + b), 1, 2).unwrap();
//!
//!     // Tasks may create more tasks through a cloned handle
//!     let inner = handle.clone();
//!     handle.spawn(move || {
//!         inner.spawn(|| println!("created from a task")).unwrap();
//!     }).unwrap();
//!
//!     runtime.run_until_idle();
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      User Code                              │
//! │            Handle::create(), Runtime::run()                 │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                 TicketLock<Scheduler>                       │
//! │        held to claim and to retire, not while running       │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!          ┌───────────────────┴───────────────────┐
//!          ▼                                       ▼
//!    ┌─────────────┐                        ┌─────────────┐
//!    │ Task Table  │ ── one token per ───▶  │ Stack Pool  │
//!    │  C slots    │    active task         │  C stacks   │
//!    └─────────────┘                        └─────────────┘
//! ```

use std::sync::Arc;

// Re-export core types
pub use cotask_core::{
    TaskId,
    TaskState,
    TaskEntry,
    SchedError,
    SchedResult,
    MemoryError,
    FatalMode,
    RawTicketLock,
    TicketLock,
    TicketLockGuard,
    StackAllocator,
};

// Re-export kprint macros for debug logging
pub use cotask_core::{kprint, kprintln, kerror, kwarn, kinfo, kdebug, ktrace, fatal};
pub use cotask_core::kprint::{LogLevel, init as init_logging, set_log_level, set_flush_enabled};

// Re-export env utilities
pub use cotask_core::{env_get, env_get_bool, env_get_opt};

// Re-export runtime types
pub use cotask_runtime::{
    ConfigError,
    DispatchStats,
    Scheduler,
    SchedulerConfig,
    SharedScheduler,
};

use cotask_runtime::dispatcher;

/// Owns a shared scheduler and drives its dispatch loop
///
/// Tasks are created through [`Handle`]s, which can be cloned into other
/// threads or into the tasks themselves.
pub struct Runtime {
    shared: Arc<SharedScheduler>,
}

impl Runtime {
    /// Build the task table and stack pool for `config`
    pub fn new(config: SchedulerConfig) -> SchedResult<Self> {
        init_logging();
        if config.debug_logging {
            config.log_summary();
        }
        let scheduler = Scheduler::new(config)?;
        Ok(Self {
            shared: Arc::new(TicketLock::new(scheduler)),
        })
    }

    /// Build from defaults with `COTASK_*` environment overrides
    pub fn from_env() -> SchedResult<Self> {
        Self::new(SchedulerConfig::from_env())
    }

    /// A handle for creating tasks
    pub fn handle(&self) -> Handle {
        Handle {
            shared: Arc::clone(&self.shared),
        }
    }

    /// Create a task running `f(arg1, arg2)`
    pub fn create<F, A, B>(&self, f: F, arg1: A, arg2: B) -> SchedResult<TaskId>
    where
        F: FnOnce(A, B) + Send + 'static,
        A: Send + 'static,
        B: Send + 'static,
    {
        self.shared.lock().create(f, arg1, arg2)
    }

    /// Create a task from a closure
    pub fn spawn<F>(&self, f: F) -> SchedResult<TaskId>
    where
        F: FnOnce() + Send + 'static,
    {
        self.shared.lock().spawn(f)
    }

    /// Run the first pending task in table order and retire it
    pub fn run_one(&self) -> Option<TaskId> {
        dispatcher::run_one_shared(&self.shared)
    }

    /// One scan over the table; returns how many tasks ran
    pub fn run_pass(&self) -> usize {
        dispatcher::run_pass_shared(&self.shared)
    }

    /// Dispatch until a pass finds nothing to run
    pub fn run_until_idle(&self) -> usize {
        dispatcher::run_until_idle_shared(&self.shared)
    }

    /// Dispatch forever on the calling thread
    pub fn run(&self) -> ! {
        dispatcher::run_shared(&self.shared)
    }

    #[inline]
    pub fn outstanding(&self) -> usize {
        self.shared.lock().outstanding()
    }

    #[inline]
    pub fn active_count(&self) -> usize {
        self.shared.lock().active_count()
    }

    pub fn stats(&self) -> DispatchStats {
        self.shared.lock().stats()
    }

    /// Run `f` with the scheduler locked
    ///
    /// Do not call back into the runtime or a handle from `f`; the lock
    /// is not reentrant.
    pub fn with_scheduler<R>(&self, f: impl FnOnce(&mut Scheduler) -> R) -> R {
        let mut guard = self.shared.lock();
        f(&mut *guard)
    }
}

/// Cloneable task-creation handle
#[derive(Clone)]
pub struct Handle {
    shared: Arc<SharedScheduler>,
}

impl Handle {
    /// Create a task running `f(arg1, arg2)`
    ///
    /// Exhaustion (`NoStack`, `NoSlot`) is returned, never waited on.
    pub fn create<F, A, B>(&self, f: F, arg1: A, arg2: B) -> SchedResult<TaskId>
    where
        F: FnOnce(A, B) + Send + 'static,
        A: Send + 'static,
        B: Send + 'static,
    {
        self.shared.lock().create(f, arg1, arg2)
    }

    pub fn spawn<F>(&self, f: F) -> SchedResult<TaskId>
    where
        F: FnOnce() + Send + 'static,
    {
        self.shared.lock().spawn(f)
    }

    /// Retire a running task by handle, typically from inside its own entry
    pub fn exit_task(&self, id: TaskId) -> SchedResult<()> {
        self.shared.lock().exit_task(id)
    }

    /// State of a live task, `None` once retired
    pub fn task_state(&self, id: TaskId) -> Option<TaskState> {
        self.shared.lock().task_state(id)
    }

    #[inline]
    pub fn outstanding(&self) -> usize {
        self.shared.lock().outstanding()
    }
}
