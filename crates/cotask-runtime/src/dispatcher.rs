//! Dispatch loop
//!
//! Scans the task table from slot 0, runs each pending entry to completion
//! on the calling thread and retires the task straight after. Nothing is
//! preempted and nothing suspends; one entry owns the flow of control until
//! it returns.
//!
//! Two drive modes:
//!
//! - **Exclusive**: methods on `&mut Scheduler`. Entries cannot reach the
//!   scheduler, so the task just run is always the first active slot.
//! - **Shared**: free functions on a [`SharedScheduler`]. The ticket lock is
//!   held to claim an entry and again to retire it, never while the entry
//!   runs, so entries and other threads can create tasks mid-pass.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};

use cotask_core::id::TaskId;
use cotask_core::kprint::{clear_task_slot, set_task_slot};
use cotask_core::task::TaskEntry;
use cotask_core::{kerror, ktrace};

use crate::scheduler::Scheduler;
use crate::SharedScheduler;

/// Run one entry with log lines tagged by its slot
///
/// Returns false if the entry panicked.
fn run_entry(id: TaskId, entry: TaskEntry) -> bool {
    set_task_slot(id.slot());
    let result = panic::catch_unwind(AssertUnwindSafe(|| entry.run()));
    clear_task_slot();

    match result {
        Ok(()) => true,
        Err(payload) => {
            kerror!("task {} panicked: {}", id, panic_message(&*payload));
            false
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "<non-string payload>"
    }
}

impl Scheduler {
    /// Claim the first pending entry at or after `start`
    fn claim_from(&mut self, start: usize) -> Option<(usize, TaskId, TaskEntry)> {
        (start..self.table.capacity())
            .find_map(|slot| self.table.take_entry(slot).map(|(id, entry)| (slot, id, entry)))
    }

    /// Retire a task whose entry has returned
    ///
    /// In shared mode the entry, or another thread, may already have
    /// retired it through `exit_task` or `exit`.
    fn finish(&mut self, id: TaskId, completed: bool) {
        if self.table.contains(id) {
            self.retire(id);
        } else {
            ktrace!("task {} was retired while running", id);
        }
        self.stats.tasks_run += 1;
        if !completed {
            self.stats.tasks_panicked += 1;
        }
    }

    fn dispatch_from(&mut self, start: usize) -> Option<(usize, TaskId)> {
        let (slot, id, entry) = self.claim_from(start)?;
        let completed = run_entry(id, entry);

        // Exclusive mode: handle and scan-order retirement agree
        debug_assert_eq!(self.table.first_active(), Some(slot));
        self.finish(id, completed);
        Some((slot, id))
    }

    /// Run the first pending task in table order and retire it
    pub fn run_one(&mut self) -> Option<TaskId> {
        self.dispatch_from(0).map(|(_, id)| id)
    }

    /// One scan over the table; returns how many tasks ran
    pub fn run_pass(&mut self) -> usize {
        let mut ran = 0;
        let mut next = 0;
        while let Some((slot, _)) = self.dispatch_from(next) {
            ran += 1;
            next = slot + 1;
        }
        self.stats.passes += 1;
        ran
    }

    /// Scan until a pass runs nothing; returns the total run
    pub fn run_until_idle(&mut self) -> usize {
        let mut total = 0;
        loop {
            let ran = self.run_pass();
            if ran == 0 {
                return total;
            }
            total += ran;
        }
    }

    /// Dispatch forever
    pub fn run(&mut self) -> ! {
        ktrace!("dispatcher entering run loop");
        loop {
            if self.run_pass() == 0 && self.config().idle_yield {
                std::thread::yield_now();
            }
        }
    }
}

/// One scan over a shared scheduler; returns how many tasks ran
///
/// Tasks created behind the scan position during the pass are left for the
/// next pass.
pub fn run_pass_shared(shared: &SharedScheduler) -> usize {
    let mut ran = 0;
    let mut next = 0;
    loop {
        let claimed = shared.lock().claim_from(next);
        let Some((slot, id, entry)) = claimed else {
            break;
        };

        let completed = run_entry(id, entry);
        shared.lock().finish(id, completed);

        ran += 1;
        next = slot + 1;
    }
    shared.lock().stats.passes += 1;
    ran
}

/// Run the first pending task of a shared scheduler and retire it
pub fn run_one_shared(shared: &SharedScheduler) -> Option<TaskId> {
    let claimed = shared.lock().claim_from(0);
    let (_, id, entry) = claimed?;
    let completed = run_entry(id, entry);
    shared.lock().finish(id, completed);
    Some(id)
}

/// Scan a shared scheduler until a pass runs nothing
pub fn run_until_idle_shared(shared: &SharedScheduler) -> usize {
    let mut total = 0;
    loop {
        let ran = run_pass_shared(shared);
        if ran == 0 {
            return total;
        }
        total += ran;
    }
}

/// Dispatch a shared scheduler forever
pub fn run_shared(shared: &SharedScheduler) -> ! {
    let idle_yield = shared.lock().config().idle_yield;
    ktrace!("shared dispatcher entering run loop");
    loop {
        if run_pass_shared(shared) == 0 && idle_yield {
            std::thread::yield_now();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SchedulerConfig;
    use cotask_core::error::SchedError;
    use cotask_core::ticket::TicketLock;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    fn scheduler(capacity: usize) -> Scheduler {
        Scheduler::new(SchedulerConfig::new().capacity(capacity)).unwrap()
    }

    fn shared(capacity: usize) -> Arc<SharedScheduler> {
        Arc::new(TicketLock::new(scheduler(capacity)))
    }

    #[test]
    fn test_entry_gets_both_arguments() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut sched = scheduler(2);

        let log = seen.clone();
        sched
            .create(
                move |a: &'static str, b: u64| log.lock().unwrap().push(format!("{}:{}", a, b)),
                "left",
                7,
            )
            .unwrap();

        assert_eq!(sched.run_pass(), 1);
        assert_eq!(*seen.lock().unwrap(), vec!["left:7".to_string()]);
    }

    #[test]
    fn test_capacity_two_scenario() {
        let mut sched = scheduler(2);
        let f = |_: u8, _: u8| {};

        sched.create(f, 1, 2).unwrap();
        assert_eq!(sched.outstanding(), 1);
        sched.create(f, 3, 4).unwrap();
        assert_eq!(sched.outstanding(), 2);

        assert_eq!(sched.create(f, 5, 6), Err(SchedError::NoStack));
        assert_eq!(sched.outstanding(), 2);

        assert!(sched.run_one().is_some());
        assert_eq!(sched.outstanding(), 1);

        sched.create(f, 5, 6).unwrap();
        assert_eq!(sched.outstanding(), 2);
    }

    #[test]
    fn test_pass_runs_in_table_order() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let mut sched = scheduler(4);
        for i in 0..4usize {
            let order = order.clone();
            sched.spawn(move || order.lock().unwrap().push(i)).unwrap();
        }

        assert_eq!(sched.run_until_idle(), 4);
        assert_eq!(*order.lock().unwrap(), vec![0, 1, 2, 3]);
        assert_eq!(sched.outstanding(), 0);
        assert_eq!(sched.active_count(), 0);

        let stats = sched.stats();
        assert_eq!(stats.tasks_run, 4);
        // One pass that ran everything, one that found nothing
        assert_eq!(stats.passes, 2);
    }

    #[test]
    fn test_panicking_task_is_retired() {
        let mut sched = scheduler(2);
        sched.spawn(|| panic!("task blew up")).unwrap();
        let after = Arc::new(AtomicUsize::new(0));
        let a = after.clone();
        sched.spawn(move || {
            a.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();

        assert_eq!(sched.run_pass(), 2);
        assert_eq!(after.load(Ordering::SeqCst), 1);
        assert_eq!(sched.outstanding(), 0);
        assert_eq!(sched.stats().tasks_panicked, 1);
    }

    #[test]
    fn test_run_one_on_empty_table() {
        let mut sched = scheduler(2);
        assert_eq!(sched.run_one(), None);
        assert_eq!(sched.run_until_idle(), 0);
    }

    #[test]
    fn test_task_creates_into_earlier_slot() {
        let sched = shared(4);
        let runs = Arc::new([AtomicUsize::new(0), AtomicUsize::new(0), AtomicUsize::new(0)]);

        let r = runs.clone();
        sched.lock().spawn(move || {
            r[0].fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();

        let (r, s) = (runs.clone(), sched.clone());
        let b = sched
            .lock()
            .spawn(move || {
                r[1].fetch_add(1, Ordering::SeqCst);
                let r = r.clone();
                // Slot 0 is free again by now
                let c = s
                    .lock()
                    .spawn(move || {
                        r[2].fetch_add(1, Ordering::SeqCst);
                    })
                    .unwrap();
                assert_eq!(c.slot(), 0);
            })
            .unwrap();
        assert_eq!(b.slot(), 1);

        // B retires itself, not the freshly created task in slot 0
        assert_eq!(run_pass_shared(&sched), 2);
        assert_eq!(runs[2].load(Ordering::SeqCst), 0);
        assert_eq!(sched.lock().active_count(), 1);

        assert_eq!(run_until_idle_shared(&sched), 1);
        for r in runs.iter() {
            assert_eq!(r.load(Ordering::SeqCst), 1);
        }
        assert_eq!(sched.lock().outstanding(), 0);
    }

    #[test]
    fn test_task_retires_itself_by_handle() {
        use std::sync::OnceLock;

        let sched = shared(2);
        let own_id = Arc::new(OnceLock::new());
        let outcome = Arc::new(Mutex::new(None));

        let (s, id_cell, out) = (sched.clone(), own_id.clone(), outcome.clone());
        let id = sched
            .lock()
            .spawn(move || {
                let id = *id_cell.get().unwrap();
                let result = s.lock().exit_task(id);
                *out.lock().unwrap() = Some(result);
            })
            .unwrap();
        own_id.set(id).unwrap();

        assert_eq!(run_pass_shared(&sched), 1);
        assert_eq!(*outcome.lock().unwrap(), Some(Ok(())));

        let sched = sched.lock();
        assert_eq!(sched.outstanding(), 0);
        assert_eq!(sched.active_count(), 0);
        assert_eq!(sched.task_state(id), None);
        assert_eq!(sched.stats().tasks_run, 1);
    }

    #[test]
    fn test_scan_order_exit_from_running_task() {
        let sched = shared(3);
        let s = sched.clone();
        let exited = Arc::new(Mutex::new(None));
        let out = exited.clone();
        let id = sched
            .lock()
            .spawn(move || {
                *out.lock().unwrap() = Some(s.lock().exit());
            })
            .unwrap();

        assert_eq!(run_one_shared(&sched), Some(id));
        assert_eq!(*exited.lock().unwrap(), Some(id));
        assert_eq!(sched.lock().outstanding(), 0);

        // The freed slot is reused without confusing the finished task
        let next = sched.lock().spawn(|| {}).unwrap();
        assert_eq!(next.slot(), id.slot());
        assert_eq!(run_until_idle_shared(&sched), 1);
        assert_eq!(sched.lock().outstanding(), 0);
    }

    #[test]
    fn test_run_one_shared_runs_single_task() {
        let sched = shared(2);
        let first = sched.lock().spawn(|| {}).unwrap();
        sched.lock().spawn(|| {}).unwrap();

        assert_eq!(run_one_shared(&sched), Some(first));
        assert_eq!(sched.lock().outstanding(), 1);
        assert!(run_one_shared(&sched).is_some());
        assert_eq!(run_one_shared(&sched), None);
    }

    #[test]
    fn test_concurrent_producers() {
        const PRODUCERS: usize = 4;
        const PER_PRODUCER: usize = 200;

        let sched = shared(8);
        let done = Arc::new(AtomicUsize::new(0));

        let producers: Vec<_> = (0..PRODUCERS)
            .map(|_| {
                let sched = sched.clone();
                let done = done.clone();
                std::thread::spawn(move || {
                    let mut created = 0;
                    while created < PER_PRODUCER {
                        let done = done.clone();
                        let result = sched.lock().create(
                            move |_: usize, _: usize| {
                                done.fetch_add(1, Ordering::SeqCst);
                            },
                            created,
                            0,
                        );
                        match result {
                            Ok(_) => created += 1,
                            Err(e) if e.is_exhaustion() => std::thread::yield_now(),
                            Err(e) => panic!("unexpected create error: {}", e),
                        }
                    }
                })
            })
            .collect();

        let total = PRODUCERS * PER_PRODUCER;
        while done.load(Ordering::SeqCst) < total {
            if run_pass_shared(&sched) == 0 {
                std::thread::yield_now();
            }
        }
        for p in producers {
            p.join().unwrap();
        }
        run_until_idle_shared(&sched);

        let sched = sched.lock();
        assert_eq!(done.load(Ordering::SeqCst), total);
        assert_eq!(sched.outstanding(), 0);
        assert_eq!(sched.stats().tasks_run, total as u64);
    }
}
