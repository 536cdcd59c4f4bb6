//! Ticket lock contention test
//!
//! N threads hammer one `TicketLock`. Each critical section records its
//! ticket; afterwards the log must be strictly increasing (FIFO admission)
//! and no two holders may ever overlap.
//!
//! Usage: contention [threads] [iterations]

use cotask::{kinfo, TicketLock};
use crossbeam_queue::ArrayQueue;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

fn main() {
    println!("=== cotask Ticket Lock Contention ===\n");

    let mut args = std::env::args().skip(1);
    let threads: usize = args.next().and_then(|s| s.parse().ok()).unwrap_or(8);
    let iterations: usize = args.next().and_then(|s| s.parse().ok()).unwrap_or(10_000);
    let total = threads * iterations;

    println!("{} threads x {} iterations", threads, iterations);

    let lock = Arc::new(TicketLock::new(0u64));
    let admitted = Arc::new(ArrayQueue::new(total));
    let holders = Arc::new(AtomicUsize::new(0));
    let overlaps = Arc::new(AtomicUsize::new(0));

    let start = Instant::now();
    let handles: Vec<_> = (0..threads)
        .map(|_| {
            let lock = lock.clone();
            let admitted = admitted.clone();
            let holders = holders.clone();
            let overlaps = overlaps.clone();
            std::thread::spawn(move || {
                for _ in 0..iterations {
                    let mut guard = lock.lock();
                    if holders.fetch_add(1, Ordering::SeqCst) != 0 {
                        overlaps.fetch_add(1, Ordering::SeqCst);
                    }
                    *guard += 1;
                    // Capacity is exactly `total`, so this never fails
                    let _ = admitted.push(guard.ticket());
                    holders.fetch_sub(1, Ordering::SeqCst);
                }
            })
        })
        .collect();

    for h in handles {
        if h.join().is_err() {
            eprintln!("contender thread panicked");
            std::process::exit(1);
        }
    }
    let elapsed = start.elapsed();

    let mut previous: Option<usize> = None;
    let mut out_of_order = 0usize;
    let mut recorded = 0usize;
    while let Some(ticket) = admitted.pop() {
        if previous.is_some_and(|p| ticket <= p) {
            out_of_order += 1;
        }
        previous = Some(ticket);
        recorded += 1;
    }

    let counter = *lock.lock();
    kinfo!("contention run finished in {:?}", elapsed);

    println!("\nResults:");
    println!("  counter:        {} (expected {})", counter, total);
    println!("  admissions:     {}", recorded);
    println!("  out of order:   {}", out_of_order);
    println!("  overlaps:       {}", overlaps.load(Ordering::SeqCst));
    println!("  time:           {:?}", elapsed);
    println!(
        "  throughput:     {:.0} lock/s",
        total as f64 / elapsed.as_secs_f64()
    );

    let ok = counter == total as u64
        && recorded == total
        && out_of_order == 0
        && overlaps.load(Ordering::SeqCst) == 0;
    if ok {
        println!("\n=== PASSED ===");
    } else {
        println!("\n=== FAILED ===");
        std::process::exit(1);
    }
}
