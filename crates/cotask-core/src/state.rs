//! Task slot state

use core::fmt;

/// State of an occupied task slot
///
/// A free slot has no state at all: it holds no task and no stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum TaskState {
    /// Created, entry not yet claimed by the dispatcher
    Pending = 0,

    /// Entry claimed by the dispatcher and executing (or just returned)
    Running = 1,
}

impl TaskState {
    /// Check if the dispatcher may claim this task's entry
    #[inline]
    pub const fn is_runnable(&self) -> bool {
        matches!(self, TaskState::Pending)
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskState::Pending => write!(f, "PENDING"),
            TaskState::Running => write!(f, "RUNNING"),
        }
    }
}
