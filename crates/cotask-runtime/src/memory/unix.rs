//! Unix stack memory using mmap

use core::ptr::NonNull;

use cotask_core::error::{MemoryError, SchedResult};
use cotask_core::traits::StackAllocator;
use nix::unistd::{sysconf, SysconfVar};

use super::round_to_pages;

/// Used when sysconf cannot report a page size
const FALLBACK_PAGE_SIZE: usize = 4096;

/// System page size
pub fn page_size() -> usize {
    match sysconf(SysconfVar::PAGE_SIZE) {
        Ok(Some(n)) if n > 0 => n as usize,
        _ => FALLBACK_PAGE_SIZE,
    }
}

/// Stack allocator backed by anonymous private mappings
///
/// Each stack is its own mapping, rounded up to whole pages. With
/// `guard_page` set, one extra `PROT_NONE` page sits directly below the
/// usable range, so running off the bottom of a downward-growing stack
/// faults instead of corrupting a neighbour.
#[derive(Debug, Clone, Copy)]
pub struct MmapStacks {
    guard_page: bool,
    page: usize,
}

impl MmapStacks {
    pub fn new(guard_page: bool) -> Self {
        Self {
            guard_page,
            page: page_size(),
        }
    }

    /// (guard bytes, total mapping bytes) for a stack of `size`
    fn geometry(&self, size: usize) -> SchedResult<(usize, usize)> {
        let usable = round_to_pages(size, self.page).ok_or(MemoryError::InvalidSize)?;
        let guard = if self.guard_page { self.page } else { 0 };
        let total = usable.checked_add(guard).ok_or(MemoryError::InvalidSize)?;
        Ok((guard, total))
    }
}

impl StackAllocator for MmapStacks {
    fn allocate_stack(&self, size: usize) -> SchedResult<NonNull<u8>> {
        if size == 0 {
            return Err(MemoryError::InvalidSize.into());
        }
        let (guard, total) = self.geometry(size)?;

        let region = unsafe {
            libc::mmap(
                core::ptr::null_mut(),
                total,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_PRIVATE | libc::MAP_ANONYMOUS,
                -1,
                0,
            )
        };
        if region == libc::MAP_FAILED {
            return Err(MemoryError::AllocationFailed.into());
        }

        if guard > 0 {
            let ret = unsafe { libc::mprotect(region, guard, libc::PROT_NONE) };
            if ret != 0 {
                unsafe { libc::munmap(region, total) };
                return Err(MemoryError::ProtectionFailed.into());
            }
        }

        // Safety: the mapping spans `total` bytes and guard < total
        let base = unsafe { (region as *mut u8).add(guard) };
        NonNull::new(base).ok_or_else(|| MemoryError::AllocationFailed.into())
    }

    unsafe fn release_stack(&self, base: NonNull<u8>, size: usize) {
        if let Ok((guard, total)) = self.geometry(size) {
            let region = base.as_ptr().sub(guard) as *mut libc::c_void;
            libc::munmap(region, total);
        }
    }

    fn name(&self) -> &'static str {
        if self.guard_page {
            "mmap+guard"
        } else {
            "mmap"
        }
    }
}
