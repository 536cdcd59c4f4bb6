//! Task lifecycle
//!
//! [`Scheduler`] bundles the task table, the stack pool and the dispatch
//! counters into one owned aggregate. It is not internally synchronized:
//! drive it from a single flow of control through `&mut`, or share it as a
//! [`SharedScheduler`](crate::SharedScheduler) behind the ticket lock.

use crate::config::SchedulerConfig;
use crate::memory;

use cotask_core::error::{SchedError, SchedResult};
use cotask_core::id::TaskId;
use cotask_core::stack::StackPool;
use cotask_core::state::TaskState;
use cotask_core::task::{TaskEntry, TaskTable};
use cotask_core::traits::StackAllocator;
use cotask_core::{fatal, kdebug, kinfo, ktrace};

/// Counters kept by the scheduler and dispatcher
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DispatchStats {
    /// Completed dispatch passes
    pub passes: u64,
    /// Entries run to completion (including ones that panicked)
    pub tasks_run: u64,
    /// Entries that panicked
    pub tasks_panicked: u64,
    /// `create` calls refused with NoStack or NoSlot
    pub create_failures: u64,
}

/// Task table + stack pool
pub struct Scheduler {
    config: SchedulerConfig,

    pub(crate) table: TaskTable,

    pub(crate) pool: StackPool,

    pub(crate) stats: DispatchStats,
}

impl Scheduler {
    /// Build a scheduler with the platform stack allocator
    ///
    /// Configuration errors are returned; failing to allocate the stacks
    /// is fatal.
    pub fn new(config: SchedulerConfig) -> SchedResult<Self> {
        config.validate()?;
        let allocator = memory::stack_allocator(&config);
        Self::with_allocator(config, allocator)
    }

    /// Build a scheduler on a caller-supplied stack allocator
    pub fn with_allocator(
        config: SchedulerConfig,
        allocator: Box<dyn StackAllocator>,
    ) -> SchedResult<Self> {
        config.validate()?;

        let pool = StackPool::new(config.num_stacks, config.stack_size, allocator);
        let table = TaskTable::new(config.max_tasks);

        kinfo!(
            "task pool ready: {} slots, {} x {} byte stacks ({})",
            table.capacity(),
            pool.capacity(),
            pool.stack_size(),
            pool.allocator_name()
        );

        Ok(Self {
            config,
            table,
            pool,
            stats: DispatchStats::default(),
        })
    }

    /// Create a task running `f(arg1, arg2)`
    ///
    /// Fails with `NoStack` when the pool is exhausted and `NoSlot` when
    /// the table is full; a failed call changes nothing but the failure
    /// counter.
    pub fn create<F, A, B>(&mut self, f: F, arg1: A, arg2: B) -> SchedResult<TaskId>
    where
        F: FnOnce(A, B) + Send + 'static,
        A: Send + 'static,
        B: Send + 'static,
    {
        self.create_entry(TaskEntry::new(f, arg1, arg2))
    }

    /// Create a task from a closure that captured its own arguments
    pub fn spawn<F>(&mut self, f: F) -> SchedResult<TaskId>
    where
        F: FnOnce() + Send + 'static,
    {
        self.create_entry(TaskEntry::from_fn(f))
    }

    /// Create a task from a prepared entry
    pub fn create_entry(&mut self, entry: TaskEntry) -> SchedResult<TaskId> {
        if self.pool.is_exhausted() {
            return Err(self.refuse(SchedError::NoStack));
        }
        let Some(slot) = self.table.first_free() else {
            return Err(self.refuse(SchedError::NoSlot));
        };

        let mut stack = self.pool.acquire()?;
        if self.config.zero_stacks {
            stack.zero();
        }
        let stack_index = stack.index();
        let id = self.table.insert(slot, entry, stack);

        if self.config.debug_logging {
            kdebug!("created task {} on stack {}", id, stack_index);
        } else {
            ktrace!("created task {} on stack {}", id, stack_index);
        }
        Ok(id)
    }

    fn refuse(&mut self, err: SchedError) -> SchedError {
        self.stats.create_failures += 1;
        kdebug!("create refused: {}", err);
        err
    }

    /// Retire the first active task in table order
    ///
    /// Selection is purely by scan position, not by which entry returned.
    /// With nothing active this is fatal.
    pub fn exit(&mut self) -> TaskId {
        let Some((id, stack)) = self
            .table
            .first_active()
            .and_then(|slot| self.table.remove_at(slot))
        else {
            fatal!("no task to exit")
        };
        self.pool.release(stack);
        self.log_retired(id);
        id
    }

    /// Retire the running task named by `id`
    ///
    /// Stale handles get `TaskNotFound`; a task whose entry has not been
    /// claimed yet gets `NotRunning` and stays queued. A task retired here
    /// while its entry runs is skipped by the dispatcher when it returns.
    pub fn exit_task(&mut self, id: TaskId) -> SchedResult<()> {
        match self.table.get(id).map(|t| t.state()) {
            None => return Err(SchedError::TaskNotFound(id)),
            Some(TaskState::Pending) => return Err(SchedError::NotRunning(id)),
            Some(TaskState::Running) => {}
        }
        self.retire(id);
        Ok(())
    }

    /// Free a task the caller knows is live
    pub(crate) fn retire(&mut self, id: TaskId) {
        let Some(stack) = self.table.remove(id) else {
            fatal!("task {} vanished before retirement", id)
        };
        self.pool.release(stack);
        self.log_retired(id);
    }

    fn log_retired(&self, id: TaskId) {
        if self.config.debug_logging {
            kdebug!("retired task {} ({} stacks out)", id, self.pool.outstanding());
        } else {
            ktrace!("retired task {} ({} stacks out)", id, self.pool.outstanding());
        }
    }

    /// State of a live task, `None` once retired
    pub fn task_state(&self, id: TaskId) -> Option<TaskState> {
        self.table.get(id).map(|t| t.state())
    }

    /// Stacks currently held by tasks
    #[inline]
    pub fn outstanding(&self) -> usize {
        self.pool.outstanding()
    }

    /// Stacks free for new tasks
    #[inline]
    pub fn available(&self) -> usize {
        self.pool.available()
    }

    /// Occupied task slots
    #[inline]
    pub fn active_count(&self) -> usize {
        self.table.active_count()
    }

    /// Task table slots
    #[inline]
    pub fn task_capacity(&self) -> usize {
        self.table.capacity()
    }

    /// Handles of all live tasks in table order
    pub fn task_ids(&self) -> Vec<TaskId> {
        self.table.ids().collect()
    }

    #[inline]
    pub fn stats(&self) -> DispatchStats {
        self.stats
    }

    #[inline]
    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    pub fn stack_pool(&self) -> &StackPool {
        &self.pool
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        // Hand live stacks back so the pool can unmap its regions
        let live = self.table.active_count();
        for id in self.task_ids() {
            if let Some(stack) = self.table.remove(id) {
                self.pool.release(stack);
            }
        }
        if live > 0 {
            kdebug!("scheduler dropped with {} live task(s)", live);
        }
    }
}
