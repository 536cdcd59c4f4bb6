//! Error types for the task pool
//!
//! Only recoverable conditions are represented here. Broken invariants
//! (double release, exit with nothing active) go through [`crate::fatal`].

use core::fmt;
use crate::id::TaskId;

/// Result type for pool operations
pub type SchedResult<T> = Result<T, SchedError>;

/// Errors that can occur in pool operations
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchedError {
    /// Stack pool has no free stacks
    NoStack,

    /// Every task table slot is occupied
    NoSlot,

    /// Handle does not name a live task (retired or never created)
    TaskNotFound(TaskId),

    /// Task has not started; only a running task can be retired by handle
    NotRunning(TaskId),

    /// Configuration rejected before the pool was built
    InvalidConfig(&'static str),

    /// Stack memory allocation/mapping failed
    MemoryError(MemoryError),
}

impl SchedError {
    /// True for the resource exhaustion class: retry once tasks complete
    #[inline]
    pub fn is_exhaustion(&self) -> bool {
        matches!(self, SchedError::NoStack | SchedError::NoSlot)
    }
}

impl fmt::Display for SchedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SchedError::NoStack => write!(f, "no stacks available"),
            SchedError::NoSlot => write!(f, "no task slots available"),
            SchedError::TaskNotFound(id) => write!(f, "task {} not found", id),
            SchedError::NotRunning(id) => write!(f, "task {} is not running", id),
            SchedError::InvalidConfig(msg) => write!(f, "invalid config: {}", msg),
            SchedError::MemoryError(e) => write!(f, "memory error: {}", e),
        }
    }
}

impl std::error::Error for SchedError {}

/// Memory-related errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MemoryError {
    /// mmap or the heap allocator failed
    AllocationFailed,

    /// mprotect on the guard page failed
    ProtectionFailed,

    /// Zero or overflowing stack size
    InvalidSize,
}

impl fmt::Display for MemoryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MemoryError::AllocationFailed => write!(f, "stack allocation failed"),
            MemoryError::ProtectionFailed => write!(f, "guard page protection failed"),
            MemoryError::InvalidSize => write!(f, "invalid stack size"),
        }
    }
}

impl From<MemoryError> for SchedError {
    fn from(e: MemoryError) -> Self {
        SchedError::MemoryError(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        assert_eq!(format!("{}", SchedError::NoStack), "no stacks available");
        assert_eq!(
            format!("{}", SchedError::TaskNotFound(TaskId::new(2, 5))),
            "task 2#5 not found"
        );

        let e = SchedError::MemoryError(MemoryError::AllocationFailed);
        assert_eq!(format!("{}", e), "memory error: stack allocation failed");
    }

    #[test]
    fn test_error_conversion() {
        let sched_err: SchedError = MemoryError::ProtectionFailed.into();
        assert!(matches!(sched_err, SchedError::MemoryError(MemoryError::ProtectionFailed)));
    }

    #[test]
    fn test_exhaustion_class() {
        assert!(SchedError::NoStack.is_exhaustion());
        assert!(SchedError::NoSlot.is_exhaustion());
        assert!(!SchedError::InvalidConfig("x").is_exhaustion());
    }
}
