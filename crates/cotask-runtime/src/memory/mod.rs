//! Stack memory for the pool
//!
//! Platform-specific implementations of [`StackAllocator`]. Unix maps each
//! stack with `mmap` and can fence it with a guard page; other platforms
//! fall back to the portable heap allocator from the core crate.

use cotask_core::traits::StackAllocator;

use crate::config::SchedulerConfig;

cfg_if::cfg_if! {
    if #[cfg(unix)] {
        mod unix;
        pub use unix::{page_size, MmapStacks};

        fn platform_allocator(config: &SchedulerConfig) -> Box<dyn StackAllocator> {
            Box::new(MmapStacks::new(config.guard_page))
        }
    } else {
        pub use cotask_core::stack::HeapStacks;

        /// Page size assumed where the platform is not asked
        pub fn page_size() -> usize {
            4096
        }

        fn platform_allocator(_config: &SchedulerConfig) -> Box<dyn StackAllocator> {
            Box::new(HeapStacks::new())
        }
    }
}

/// Allocator the scheduler uses for `config`
pub fn stack_allocator(config: &SchedulerConfig) -> Box<dyn StackAllocator> {
    platform_allocator(config)
}

/// Round `size` up to a whole number of pages
pub fn round_to_pages(size: usize, page: usize) -> Option<usize> {
    debug_assert!(page.is_power_of_two());
    size.checked_add(page - 1).map(|s| s & !(page - 1))
}
