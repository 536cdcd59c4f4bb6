//! Bounded pool of fixed-size task stacks
//!
//! Every region is allocated once when the pool is built and then only
//! recycled between tasks. Tokens are handed out from a LIFO free stack so
//! the most recently released region, still warm in cache, goes out first.

use core::fmt;
use core::ptr::NonNull;
use std::alloc::{self, Layout};

use crate::constants::STACK_ALIGN;
use crate::error::{MemoryError, SchedError, SchedResult};
use crate::traits::StackAllocator;

/// Exclusive handle to one stack region owned by a [`StackPool`]
///
/// Not `Clone`: a region has exactly one holder, either the pool's free
/// stack or a single task.
pub struct StackToken {
    index: u32,
    base: NonNull<u8>,
    size: usize,
}

// Safety: the token is the only handle to its region; moving it moves
// exclusive access.
unsafe impl Send for StackToken {}

impl StackToken {
    /// Index of the region within its pool
    #[inline]
    pub fn index(&self) -> usize {
        self.index as usize
    }

    /// Lowest usable address
    #[inline]
    pub fn base(&self) -> *mut u8 {
        self.base.as_ptr()
    }

    /// One past the highest usable address (initial stack pointer)
    #[inline]
    pub fn top(&self) -> *mut u8 {
        // Safety: base..base+size is one allocation
        unsafe { self.base.as_ptr().add(self.size) }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.size
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    /// Zero-fill the whole region
    pub fn zero(&mut self) {
        // Safety: exclusive token, region outlives every token (see StackPool drop)
        unsafe { core::ptr::write_bytes(self.base.as_ptr(), 0, self.size) }
    }

    /// The region as a byte slice
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        // Safety: as for `zero`
        unsafe { core::slice::from_raw_parts_mut(self.base.as_ptr(), self.size) }
    }
}

impl fmt::Debug for StackToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StackToken")
            .field("index", &self.index)
            .field("base", &self.base)
            .field("size", &self.size)
            .finish()
    }
}

/// Fixed-capacity reservoir of stack regions
pub struct StackPool {
    /// LIFO stack of free tokens
    free: Vec<StackToken>,

    /// Base of every region, indexed by token index
    regions: Box<[NonNull<u8>]>,

    /// Usable bytes per region
    stack_size: usize,

    allocator: Box<dyn StackAllocator>,
}

// Safety: regions are reachable only through tokens or the pool's own
// bookkeeping, and all mutation requires `&mut self`.
unsafe impl Send for StackPool {}
unsafe impl Sync for StackPool {}

impl StackPool {
    /// Build a pool of `capacity` stacks of `stack_size` bytes
    ///
    /// Running out of memory here is fatal: the pool is a startup
    /// invariant, not something to retry.
    pub fn new(capacity: usize, stack_size: usize, allocator: Box<dyn StackAllocator>) -> Self {
        match Self::try_new(capacity, stack_size, allocator) {
            Ok(pool) => pool,
            Err(e) => crate::fatal!("out of memory: {}", e),
        }
    }

    /// Build a pool, reporting allocation failure instead of terminating
    ///
    /// Regions allocated before the failure are given back.
    pub fn try_new(
        capacity: usize,
        stack_size: usize,
        allocator: Box<dyn StackAllocator>,
    ) -> SchedResult<Self> {
        if capacity == 0 || capacity > u32::MAX as usize {
            return Err(SchedError::InvalidConfig("stack pool capacity out of range"));
        }
        if stack_size == 0 {
            return Err(MemoryError::InvalidSize.into());
        }

        let mut regions = Vec::with_capacity(capacity);
        for _ in 0..capacity {
            match allocator.allocate_stack(stack_size) {
                Ok(base) => regions.push(base),
                Err(e) => {
                    for base in regions {
                        // Safety: allocated just above with the same size
                        unsafe { allocator.release_stack(base, stack_size) };
                    }
                    return Err(e);
                }
            }
        }

        // Reverse so the first acquire hands out region 0
        let free = regions
            .iter()
            .enumerate()
            .rev()
            .map(|(index, &base)| StackToken { index: index as u32, base, size: stack_size })
            .collect();

        crate::kdebug!(
            "stack pool: {} x {} bytes from {}",
            capacity,
            stack_size,
            allocator.name()
        );

        Ok(Self {
            free,
            regions: regions.into_boxed_slice(),
            stack_size,
            allocator,
        })
    }

    /// Take the most recently released stack
    ///
    /// Returns `NoStack` when every stack is checked out.
    #[inline]
    pub fn acquire(&mut self) -> SchedResult<StackToken> {
        self.free.pop().ok_or(SchedError::NoStack)
    }

    /// Give a stack back
    ///
    /// Releasing into a full pool, or releasing a token from another pool,
    /// is fatal.
    pub fn release(&mut self, token: StackToken) {
        if self.free.len() == self.capacity() {
            crate::fatal!("stack pool underflow");
        }
        if self.regions.get(token.index()) != Some(&token.base) {
            crate::fatal!("stack {} does not belong to this pool", token.index());
        }
        self.free.push(token);
    }

    /// Number of stacks currently checked out
    #[inline]
    pub fn outstanding(&self) -> usize {
        self.capacity() - self.free.len()
    }

    /// Number of stacks ready to hand out
    #[inline]
    pub fn available(&self) -> usize {
        self.free.len()
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.regions.len()
    }

    #[inline]
    pub fn stack_size(&self) -> usize {
        self.stack_size
    }

    #[inline]
    pub fn is_exhausted(&self) -> bool {
        self.free.is_empty()
    }

    pub fn allocator_name(&self) -> &'static str {
        self.allocator.name()
    }
}

impl Drop for StackPool {
    fn drop(&mut self) {
        let outstanding = self.outstanding();
        if outstanding != 0 {
            // Live tokens still point into the regions
            crate::kwarn!("stack pool dropped with {} stacks out; leaking regions", outstanding);
            return;
        }
        self.free.clear();
        for &base in self.regions.iter() {
            // Safety: every token is back, so nothing references the region
            unsafe { self.allocator.release_stack(base, self.stack_size) };
        }
    }
}

/// Portable stack allocator on the global heap
#[derive(Debug, Default, Clone, Copy)]
pub struct HeapStacks;

impl HeapStacks {
    pub const fn new() -> Self {
        HeapStacks
    }

    fn layout(size: usize) -> SchedResult<Layout> {
        Layout::from_size_align(size, STACK_ALIGN).map_err(|_| MemoryError::InvalidSize.into())
    }
}

impl StackAllocator for HeapStacks {
    fn allocate_stack(&self, size: usize) -> SchedResult<NonNull<u8>> {
        if size == 0 {
            return Err(MemoryError::InvalidSize.into());
        }
        let layout = Self::layout(size)?;
        // Safety: non-zero size checked above
        let ptr = unsafe { alloc::alloc(layout) };
        NonNull::new(ptr).ok_or_else(|| MemoryError::AllocationFailed.into())
    }

    unsafe fn release_stack(&self, base: NonNull<u8>, size: usize) {
        if let Ok(layout) = Self::layout(size) {
            alloc::dealloc(base.as_ptr(), layout);
        }
    }

    fn name(&self) -> &'static str {
        "heap"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fatal::{set_mode, FatalMode};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// Heap allocator that counts live regions and can fail on demand
    struct CountingStacks {
        live: Arc<AtomicUsize>,
        fail_at: Option<usize>,
        calls: AtomicUsize,
    }

    impl CountingStacks {
        fn new(live: Arc<AtomicUsize>, fail_at: Option<usize>) -> Self {
            Self { live, fail_at, calls: AtomicUsize::new(0) }
        }
    }

    impl StackAllocator for CountingStacks {
        fn allocate_stack(&self, size: usize) -> SchedResult<NonNull<u8>> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if Some(call) == self.fail_at {
                return Err(MemoryError::AllocationFailed.into());
            }
            let base = HeapStacks.allocate_stack(size)?;
            self.live.fetch_add(1, Ordering::SeqCst);
            Ok(base)
        }

        unsafe fn release_stack(&self, base: NonNull<u8>, size: usize) {
            self.live.fetch_sub(1, Ordering::SeqCst);
            HeapStacks.release_stack(base, size);
        }

        fn name(&self) -> &'static str {
            "counting"
        }
    }

    fn heap_pool(capacity: usize) -> StackPool {
        StackPool::new(capacity, 4096, Box::new(HeapStacks))
    }

    #[test]
    fn test_acquire_in_index_order() {
        let mut pool = heap_pool(3);
        let a = pool.acquire().unwrap();
        let b = pool.acquire().unwrap();
        assert_eq!(a.index(), 0);
        assert_eq!(b.index(), 1);
        assert_eq!(pool.outstanding(), 2);
        assert_eq!(pool.available(), 1);
        pool.release(b);
        pool.release(a);
    }

    #[test]
    fn test_release_is_lifo() {
        let mut pool = heap_pool(4);
        let a = pool.acquire().unwrap();
        let b = pool.acquire().unwrap();
        let (ia, ib) = (a.index(), b.index());

        pool.release(a);
        pool.release(b);

        // Most recently released comes back first
        let first = pool.acquire().unwrap();
        let second = pool.acquire().unwrap();
        assert_eq!(first.index(), ib);
        assert_eq!(second.index(), ia);
        pool.release(first);
        pool.release(second);
    }

    #[test]
    fn test_exhaustion() {
        let mut pool = heap_pool(2);
        let a = pool.acquire().unwrap();
        let b = pool.acquire().unwrap();

        assert!(pool.is_exhausted());
        assert_eq!(pool.acquire().unwrap_err(), SchedError::NoStack);
        assert_eq!(pool.outstanding(), 2);

        pool.release(a);
        let c = pool.acquire().unwrap();
        pool.release(b);
        pool.release(c);
        assert_eq!(pool.outstanding(), 0);
    }

    #[test]
    #[should_panic(expected = "stack pool underflow")]
    fn test_release_into_full_pool_is_fatal() {
        set_mode(FatalMode::Panic);
        let mut donor = heap_pool(1);
        let mut full = heap_pool(1);
        let token = donor.acquire().unwrap();
        full.release(token);
    }

    #[test]
    #[should_panic(expected = "does not belong to this pool")]
    fn test_release_foreign_token_is_fatal() {
        set_mode(FatalMode::Panic);
        let mut donor = heap_pool(2);
        let mut other = heap_pool(2);
        let _held = other.acquire().unwrap();
        let token = donor.acquire().unwrap();
        other.release(token);
    }

    #[test]
    fn test_token_geometry_and_zero() {
        let mut pool = heap_pool(1);
        let mut token = pool.acquire().unwrap();
        assert_eq!(token.len(), 4096);
        assert_eq!(token.top() as usize - token.base() as usize, 4096);
        assert_eq!(token.base() as usize % STACK_ALIGN, 0);

        token.as_mut_slice().fill(0xAB);
        token.zero();
        assert!(token.as_mut_slice().iter().all(|&b| b == 0));
        pool.release(token);
    }

    #[test]
    fn test_drop_returns_regions() {
        let live = Arc::new(AtomicUsize::new(0));
        {
            let pool = StackPool::new(5, 4096, Box::new(CountingStacks::new(live.clone(), None)));
            assert_eq!(live.load(Ordering::SeqCst), 5);
            assert_eq!(pool.allocator_name(), "counting");
        }
        assert_eq!(live.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_drop_with_outstanding_leaks() {
        let live = Arc::new(AtomicUsize::new(0));
        let token;
        {
            let mut pool =
                StackPool::new(2, 4096, Box::new(CountingStacks::new(live.clone(), None)));
            token = pool.acquire().unwrap();
        }
        // Regions stay mapped while a token is alive
        assert_eq!(live.load(Ordering::SeqCst), 2);
        assert_eq!(token.len(), 4096);
    }

    #[test]
    fn test_try_new_failure_releases_partial() {
        let live = Arc::new(AtomicUsize::new(0));
        let result = StackPool::try_new(4, 4096, Box::new(CountingStacks::new(live.clone(), Some(2))));
        assert!(matches!(
            result,
            Err(SchedError::MemoryError(MemoryError::AllocationFailed))
        ));
        assert_eq!(live.load(Ordering::SeqCst), 0);
    }

    #[test]
    #[should_panic(expected = "out of memory")]
    fn test_new_failure_is_fatal() {
        set_mode(FatalMode::Panic);
        let live = Arc::new(AtomicUsize::new(0));
        let _pool = StackPool::new(3, 4096, Box::new(CountingStacks::new(live, Some(0))));
    }

    #[test]
    fn test_invalid_geometry() {
        assert!(matches!(
            StackPool::try_new(0, 4096, Box::new(HeapStacks)),
            Err(SchedError::InvalidConfig(_))
        ));
        assert!(matches!(
            StackPool::try_new(1, 0, Box::new(HeapStacks)),
            Err(SchedError::MemoryError(MemoryError::InvalidSize))
        ));
    }
}
