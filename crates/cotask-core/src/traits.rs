//! Platform traits
//!
//! The interface between the platform-agnostic pool and the
//! platform-specific stack memory in `cotask-runtime`.

use core::ptr::NonNull;
use crate::error::SchedResult;

/// Source of fixed-size stack regions
///
/// The pool asks for every region once at startup and hands them back only
/// when the pool itself is dropped. Regions are never returned mid-life.
pub trait StackAllocator: Send + Sync {
    /// Allocate one region of at least `size` usable bytes
    ///
    /// The returned pointer is the lowest usable address; the region spans
    /// `[ptr, ptr + size)`. Contents need not be zeroed.
    fn allocate_stack(&self, size: usize) -> SchedResult<NonNull<u8>>;

    /// Return a region obtained from `allocate_stack` with the same `size`
    ///
    /// # Safety
    ///
    /// `base` must come from this allocator with this `size`, and no
    /// reference into the region may outlive the call.
    unsafe fn release_stack(&self, base: NonNull<u8>, size: usize);

    /// Backend name for logging (e.g., "mmap", "heap")
    fn name(&self) -> &'static str;
}
