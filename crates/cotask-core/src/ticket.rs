//! FIFO-fair ticket spinlock
//!
//! Two monotonically increasing counters: `ticket` (next ticket to hand
//! out) and `turn` (ticket allowed to proceed). A contender takes a ticket
//! with one atomic fetch-add and spins until `turn` reaches it, so waiters
//! are admitted strictly in the order their fetch-adds landed.
//!
//! All counter accesses are `SeqCst`. Counters wrap; only equality and
//! wrapping distance are ever compared.
//!
//! Use [`TicketLock<T>`] to protect data. [`RawTicketLock`] is the bare
//! acquire/release primitive for callers that manage the critical section
//! themselves.

use core::cell::UnsafeCell;
use core::ops::{Deref, DerefMut};
use core::sync::atomic::{AtomicUsize, Ordering};

/// Spins per position in the queue before re-reading `turn`
const SPINS_PER_WAITER: usize = 16;

/// Upper bound on one backoff burst
const MAX_SPIN_BURST: usize = 1024;

/// Re-reads of `turn` before the waiter starts yielding its OS thread
const YIELD_AFTER: u32 = 64;

/// Bare ticket lock without protected data
pub struct RawTicketLock {
    ticket: AtomicUsize,
    turn: AtomicUsize,
}

impl RawTicketLock {
    /// Both counters start at zero
    #[inline]
    pub const fn new() -> Self {
        Self {
            ticket: AtomicUsize::new(0),
            turn: AtomicUsize::new(0),
        }
    }

    /// Take a ticket and wait for its turn
    ///
    /// Never times out. Returns the ticket that was served.
    #[inline]
    pub fn acquire(&self) -> usize {
        let my_ticket = self.ticket.fetch_add(1, Ordering::SeqCst);
        if self.turn.load(Ordering::SeqCst) != my_ticket {
            self.wait_turn(my_ticket);
        }
        my_ticket
    }

    #[cold]
    fn wait_turn(&self, my_ticket: usize) {
        let mut polls: u32 = 0;
        loop {
            let turn = self.turn.load(Ordering::SeqCst);
            if turn == my_ticket {
                return;
            }
            // Back off in proportion to how many holders are ahead of us
            let ahead = my_ticket.wrapping_sub(turn);
            for _ in 0..ahead.saturating_mul(SPINS_PER_WAITER).min(MAX_SPIN_BURST) {
                core::hint::spin_loop();
            }
            polls = polls.saturating_add(1);
            if polls > YIELD_AFTER {
                relax_thread();
            }
        }
    }

    /// Take the lock only if nobody holds it or waits for it
    ///
    /// Never enqueues: on failure no ticket has been consumed.
    #[inline]
    pub fn try_acquire(&self) -> Option<usize> {
        let turn = self.turn.load(Ordering::SeqCst);
        self.ticket
            .compare_exchange(turn, turn.wrapping_add(1), Ordering::SeqCst, Ordering::SeqCst)
            .ok()
    }

    /// Admit the next ticket holder
    ///
    /// Must be called exactly once per successful acquire, by the holder.
    /// Releasing a lock that is visibly unheld is fatal.
    #[inline]
    pub fn release(&self) {
        let turn = self.turn.load(Ordering::SeqCst);
        if self.ticket.load(Ordering::SeqCst) == turn {
            crate::fatal!("ticket lock released while not held (turn {})", turn);
        }
        self.turn.store(turn.wrapping_add(1), Ordering::SeqCst);
    }

    /// Check if the lock is held (or about to be, by a waiter)
    #[inline]
    pub fn is_locked(&self) -> bool {
        self.ticket.load(Ordering::SeqCst) != self.turn.load(Ordering::SeqCst)
    }

    /// Holder plus waiters (snapshot)
    #[inline]
    pub fn queue_len(&self) -> usize {
        let turn = self.turn.load(Ordering::SeqCst);
        self.ticket.load(Ordering::SeqCst).wrapping_sub(turn)
    }

    /// Ticket currently allowed to proceed
    #[inline]
    pub fn now_serving(&self) -> usize {
        self.turn.load(Ordering::SeqCst)
    }

    /// Ticket the next contender will draw
    #[inline]
    pub fn next_ticket(&self) -> usize {
        self.ticket.load(Ordering::SeqCst)
    }
}

impl Default for RawTicketLock {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Debug for RawTicketLock {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("RawTicketLock")
            .field("ticket", &self.next_ticket())
            .field("turn", &self.now_serving())
            .finish()
    }
}

cfg_if::cfg_if! {
    if #[cfg(feature = "pure-spin")] {
        #[inline(always)]
        fn relax_thread() {
            core::hint::spin_loop();
        }
    } else {
        /// A preempted holder can only make progress if waiters give up the CPU
        #[inline(always)]
        fn relax_thread() {
            std::thread::yield_now();
        }
    }
}

/// Ticket lock protecting a value
///
/// Contenders are served in arrival order. Holding the guard across
/// long-running work stalls every waiter on a busy spin.
pub struct TicketLock<T> {
    raw: RawTicketLock,
    data: UnsafeCell<T>,
}

// Safety: TicketLock provides exclusive access to T
unsafe impl<T: Send> Send for TicketLock<T> {}
unsafe impl<T: Send> Sync for TicketLock<T> {}

impl<T> TicketLock<T> {
    #[inline]
    pub const fn new(value: T) -> Self {
        TicketLock {
            raw: RawTicketLock::new(),
            data: UnsafeCell::new(value),
        }
    }

    /// Acquire the lock, waiting for every earlier contender first
    #[inline]
    pub fn lock(&self) -> TicketLockGuard<'_, T> {
        let ticket = self.raw.acquire();
        TicketLockGuard { lock: self, ticket }
    }

    /// Acquire the lock only if it is free right now
    #[inline]
    pub fn try_lock(&self) -> Option<TicketLockGuard<'_, T>> {
        self.raw
            .try_acquire()
            .map(|ticket| TicketLockGuard { lock: self, ticket })
    }

    #[inline]
    pub fn is_locked(&self) -> bool {
        self.raw.is_locked()
    }

    /// Holder plus waiters (snapshot)
    #[inline]
    pub fn queue_len(&self) -> usize {
        self.raw.queue_len()
    }

    /// Get mutable access through exclusive ownership
    #[inline]
    pub fn get_mut(&mut self) -> &mut T {
        self.data.get_mut()
    }

    pub fn into_inner(self) -> T {
        self.data.into_inner()
    }
}

impl<T: Default> Default for TicketLock<T> {
    fn default() -> Self {
        TicketLock::new(T::default())
    }
}

/// Guard that admits the next ticket when dropped
pub struct TicketLockGuard<'a, T> {
    lock: &'a TicketLock<T>,
    ticket: usize,
}

impl<'a, T> TicketLockGuard<'a, T> {
    /// Ticket this guard was served under
    #[inline]
    pub fn ticket(&self) -> usize {
        self.ticket
    }
}

impl<'a, T> Deref for TicketLockGuard<'a, T> {
    type Target = T;

    #[inline]
    fn deref(&self) -> &T {
        // Safety: We hold the lock
        unsafe { &*self.lock.data.get() }
    }
}

impl<'a, T> DerefMut for TicketLockGuard<'a, T> {
    #[inline]
    fn deref_mut(&mut self) -> &mut T {
        // Safety: We hold the lock
        unsafe { &mut *self.lock.data.get() }
    }
}

impl<'a, T> Drop for TicketLockGuard<'a, T> {
    #[inline]
    fn drop(&mut self) {
        self.lock.raw.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fatal::{set_mode, FatalMode};
    use std::sync::atomic::{AtomicBool, AtomicUsize};
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    fn wait_for(cond: impl Fn() -> bool) {
        let start = std::time::Instant::now();
        while !cond() {
            assert!(start.elapsed() < Duration::from_secs(10), "condition never became true");
            thread::yield_now();
        }
    }

    #[test]
    fn test_raw_counters() {
        let lock = RawTicketLock::new();
        assert_eq!(lock.next_ticket(), 0);
        assert_eq!(lock.now_serving(), 0);
        assert!(!lock.is_locked());

        assert_eq!(lock.acquire(), 0);
        assert!(lock.is_locked());
        assert_eq!(lock.queue_len(), 1);
        lock.release();

        assert_eq!(lock.acquire(), 1);
        lock.release();
        assert_eq!(lock.next_ticket(), 2);
        assert_eq!(lock.now_serving(), 2);
        assert!(!lock.is_locked());
    }

    #[test]
    fn test_try_lock() {
        let lock = TicketLock::new(0u32);

        let guard = lock.try_lock();
        assert!(guard.is_some());
        assert!(lock.try_lock().is_none());

        // A failed try_lock must not consume a ticket
        assert_eq!(lock.queue_len(), 1);
        drop(guard);
        assert_eq!(lock.queue_len(), 0);

        let guard = lock.try_lock().unwrap();
        assert_eq!(guard.ticket(), 1);
    }

    #[test]
    fn test_lock_basic() {
        let lock = TicketLock::new(0u32);
        {
            let mut guard = lock.lock();
            *guard = 42;
        }
        assert_eq!(*lock.lock(), 42);
        assert_eq!(lock.into_inner(), 42);
    }

    #[test]
    fn test_counters_wrap() {
        let lock = RawTicketLock {
            ticket: AtomicUsize::new(usize::MAX),
            turn: AtomicUsize::new(usize::MAX),
        };
        assert_eq!(lock.acquire(), usize::MAX);
        assert_eq!(lock.queue_len(), 1);
        lock.release();
        assert_eq!(lock.acquire(), 0);
        lock.release();
        assert!(!lock.is_locked());
    }

    #[test]
    #[should_panic(expected = "released while not held")]
    fn test_release_unheld_is_fatal() {
        set_mode(FatalMode::Panic);
        let lock = RawTicketLock::new();
        lock.release();
    }

    #[test]
    fn test_mutual_exclusion() {
        let lock = Arc::new(TicketLock::new(0u64));
        let inside = Arc::new(AtomicUsize::new(0));
        let mut handles = vec![];

        for _ in 0..4 {
            let lock = Arc::clone(&lock);
            let inside = Arc::clone(&inside);
            handles.push(thread::spawn(move || {
                for _ in 0..1000 {
                    let mut guard = lock.lock();
                    assert_eq!(inside.fetch_add(1, Ordering::SeqCst), 0);
                    *guard += 1;
                    inside.fetch_sub(1, Ordering::SeqCst);
                }
            }));
        }

        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(*lock.lock(), 4000);
    }

    #[test]
    fn test_fifo_admission() {
        const N: usize = 6;
        let lock = Arc::new(TicketLock::new(Vec::new()));
        let holder = lock.lock();
        let mut handles = vec![];

        // Start contenders one at a time so ticket order is known
        for i in 0..N {
            let contender = Arc::clone(&lock);
            handles.push(thread::spawn(move || {
                let mut guard = contender.lock();
                let ticket = guard.ticket();
                guard.push((i, ticket));
            }));
            let lock = Arc::clone(&lock);
            wait_for(move || lock.raw.next_ticket() == i + 2);
        }

        drop(holder);
        for h in handles {
            h.join().unwrap();
        }

        let order = lock.lock().clone();
        let expected: Vec<(usize, usize)> = (0..N).map(|i| (i, i + 1)).collect();
        assert_eq!(order, expected);
    }

    #[test]
    fn test_waiter_blocks_until_release() {
        let lock = Arc::new(RawTicketLock::new());
        let entered = Arc::new(AtomicUsize::new(0));
        let released = Arc::new(AtomicBool::new(false));

        // A: ticket 0
        assert_eq!(lock.acquire(), 0);

        // B: ticket 1
        let b = {
            let lock = Arc::clone(&lock);
            let entered = Arc::clone(&entered);
            let released = Arc::clone(&released);
            thread::spawn(move || {
                let ticket = lock.acquire();
                // B may only get in after A released
                assert!(released.load(Ordering::SeqCst));
                entered.fetch_add(1, Ordering::SeqCst);
                lock.release();
                ticket
            })
        };

        {
            let lock = Arc::clone(&lock);
            wait_for(move || lock.next_ticket() == 2);
        }
        thread::sleep(Duration::from_millis(50));
        assert_eq!(entered.load(Ordering::SeqCst), 0);

        released.store(true, Ordering::SeqCst);
        lock.release();

        assert_eq!(b.join().unwrap(), 1);
        assert_eq!(entered.load(Ordering::SeqCst), 1);
        assert!(!lock.is_locked());
    }
}
