//! Fixed-capacity task table
//!
//! A slot is active iff it holds a task, and every task owns exactly one
//! [`StackToken`]. Free slots are found by scanning from slot 0; the first
//! free slot wins.

use core::fmt;

use crate::id::TaskId;
use crate::stack::StackToken;
use crate::state::TaskState;

/// A task's entry point with its two arguments bound in
///
/// The arguments are moved into the entry, so they are owned by the task
/// rather than borrowed from the creator.
pub struct TaskEntry(Box<dyn FnOnce() + Send + 'static>);

impl TaskEntry {
    /// Bind `f` to its two arguments
    pub fn new<F, A, B>(f: F, arg1: A, arg2: B) -> Self
    where
        F: FnOnce(A, B) + Send + 'static,
        A: Send + 'static,
        B: Send + 'static,
    {
        TaskEntry(Box::new(move || f(arg1, arg2)))
    }

    /// Wrap a closure that already captured what it needs
    pub fn from_fn<F>(f: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        TaskEntry(Box::new(f))
    }

    /// Run the entry to completion
    #[inline]
    pub fn run(self) {
        (self.0)()
    }
}

impl fmt::Debug for TaskEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("TaskEntry(..)")
    }
}

/// An occupied slot
#[derive(Debug)]
pub struct Task {
    /// Taken by the dispatcher when the task starts running
    entry: Option<TaskEntry>,
    stack: StackToken,
}

impl Task {
    #[inline]
    pub fn state(&self) -> TaskState {
        if self.entry.is_some() {
            TaskState::Pending
        } else {
            TaskState::Running
        }
    }

    #[inline]
    pub fn stack(&self) -> &StackToken {
        &self.stack
    }
}

#[derive(Debug, Default)]
struct Slot {
    /// Bumped on every insert, so stale handles stop matching
    generation: u32,
    task: Option<Task>,
}

/// Fixed-capacity registry of tasks
#[derive(Debug)]
pub struct TaskTable {
    slots: Box<[Slot]>,
    active: usize,
}

impl TaskTable {
    /// Create a table with `capacity` free slots
    pub fn new(capacity: usize) -> Self {
        let slots: Vec<Slot> = (0..capacity).map(|_| Slot::default()).collect();
        Self {
            slots: slots.into_boxed_slice(),
            active: 0,
        }
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Number of occupied slots
    #[inline]
    pub fn active_count(&self) -> usize {
        self.active
    }

    #[inline]
    pub fn is_full(&self) -> bool {
        self.active == self.slots.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.active == 0
    }

    /// First free slot in table order
    pub fn first_free(&self) -> Option<usize> {
        self.slots.iter().position(|s| s.task.is_none())
    }

    /// First occupied slot in table order
    pub fn first_active(&self) -> Option<usize> {
        self.slots.iter().position(|s| s.task.is_some())
    }

    /// Occupy a free slot
    ///
    /// The caller picks `slot` with [`first_free`](Self::first_free); handing
    /// in an occupied or out-of-range slot is a bookkeeping bug and fatal.
    pub fn insert(&mut self, slot: usize, entry: TaskEntry, stack: StackToken) -> TaskId {
        let Some(s) = self.slots.get_mut(slot) else {
            crate::fatal!("task slot {} out of range", slot)
        };
        if s.task.is_some() {
            crate::fatal!("task slot {} already occupied", slot);
        }
        s.generation = s.generation.wrapping_add(1);
        s.task = Some(Task { entry: Some(entry), stack });
        self.active += 1;
        TaskId::new(slot as u32, s.generation)
    }

    /// Handle of the task in `slot`, if occupied
    pub fn id_at(&self, slot: usize) -> Option<TaskId> {
        let s = self.slots.get(slot)?;
        s.task.as_ref().map(|_| TaskId::new(slot as u32, s.generation))
    }

    /// Look up a live task by handle
    pub fn get(&self, id: TaskId) -> Option<&Task> {
        let s = self.slots.get(id.slot())?;
        if s.generation != id.generation() {
            return None;
        }
        s.task.as_ref()
    }

    #[inline]
    pub fn contains(&self, id: TaskId) -> bool {
        self.get(id).is_some()
    }

    /// Claim the entry of a pending task in `slot`
    ///
    /// The slot stays occupied (and keeps its stack) in `Running` state
    /// until it is removed.
    pub fn take_entry(&mut self, slot: usize) -> Option<(TaskId, TaskEntry)> {
        let s = self.slots.get_mut(slot)?;
        let generation = s.generation;
        let task = s.task.as_mut()?;
        if !task.state().is_runnable() {
            return None;
        }
        let entry = task.entry.take()?;
        Some((TaskId::new(slot as u32, generation), entry))
    }

    /// Free the slot named by `id`, returning its stack
    ///
    /// A pending entry that never ran is dropped.
    pub fn remove(&mut self, id: TaskId) -> Option<StackToken> {
        let s = self.slots.get_mut(id.slot())?;
        if s.generation != id.generation() {
            return None;
        }
        let task = s.task.take()?;
        self.active -= 1;
        Some(task.stack)
    }

    /// Free whatever occupies `slot`
    pub fn remove_at(&mut self, slot: usize) -> Option<(TaskId, StackToken)> {
        let id = self.id_at(slot)?;
        self.remove(id).map(|stack| (id, stack))
    }

    /// Handles of all live tasks in table order
    pub fn ids(&self) -> impl Iterator<Item = TaskId> + '_ {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, s)| s.task.is_some())
            .map(|(i, s)| TaskId::new(i as u32, s.generation))
    }
}
