//! Task handle type

use core::fmt;
use crate::constants::TASK_NONE;

/// Handle to a task created in a [`TaskTable`](crate::task::TaskTable)
///
/// The slot index locates the task; the generation tells a live task apart
/// from an earlier occupant of the same slot. A handle whose task has been
/// retired never matches again, even after the slot is reused.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TaskId {
    slot: u32,
    generation: u32,
}

impl TaskId {
    /// Sentinel value indicating no task
    pub const NONE: TaskId = TaskId { slot: TASK_NONE, generation: 0 };

    #[inline]
    pub const fn new(slot: u32, generation: u32) -> Self {
        TaskId { slot, generation }
    }

    /// Slot index in the task table
    #[inline]
    pub const fn slot(self) -> usize {
        self.slot as usize
    }

    #[inline]
    pub const fn generation(self) -> u32 {
        self.generation
    }

    /// Check if this is the NONE sentinel
    #[inline]
    pub const fn is_none(self) -> bool {
        self.slot == TASK_NONE
    }

}

impl fmt::Debug for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_none() {
            write!(f, "TaskId(NONE)")
        } else {
            write!(f, "TaskId({}#{})", self.slot, self.generation)
        }
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_none() {
            write!(f, "none")
        } else {
            write!(f, "{}#{}", self.slot, self.generation)
        }
    }
}

impl Default for TaskId {
    fn default() -> Self {
        TaskId::NONE
    }
}
