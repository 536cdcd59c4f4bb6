//! Basic cotask example
//!
//! Fills a two-task pool, shows exhaustion, then dispatches and refills.
//!
//! # Environment Variables
//!
//! - `COTASK_FLUSH_EPRINT=1` - Flush debug output immediately
//! - `COTASK_LOG_LEVEL=debug` - Set log level (off, error, warn, info, debug, trace)

use cotask::{kdebug, kinfo, Runtime, SchedError, SchedulerConfig};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

// COTASK_LOG_LEVEL=debug cargo run -p cotask-basic
fn main() {
    println!("=== cotask Basic Example ===\n");

    let config = SchedulerConfig::new().capacity(2).debug_logging(true);
    let runtime = match Runtime::new(config) {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("failed to build runtime: {}", e);
            std::process::exit(1);
        }
    };
    let handle = runtime.handle();
    let completed = Arc::new(AtomicUsize::new(0));

    let add = {
        let completed = completed.clone();
        move |a: u32, b: u32| {
            kdebug!("{} + {} = {}", a, b, a + b);
            completed.fetch_add(1, Ordering::SeqCst);
        }
    };

    for (a, b) in [(1, 2), (3, 4)] {
        match handle.create(add.clone(), a, b) {
            Ok(id) => println!("Created task {} (outstanding={})", id, handle.outstanding()),
            Err(e) => println!("create({}, {}) failed: {}", a, b, e),
        }
    }

    // Third create exceeds the pool
    match handle.create(add.clone(), 5, 6) {
        Err(SchedError::NoStack) => println!("Pool exhausted as expected (outstanding={})", handle.outstanding()),
        other => println!("Unexpected result: {:?}", other),
    }

    if let Some(id) = runtime.run_one() {
        kinfo!("dispatched task {}", id);
    }
    println!("After running one task: outstanding={}", handle.outstanding());

    match handle.create(add, 5, 6) {
        Ok(id) => println!("Retry created task {}", id),
        Err(e) => println!("Retry failed: {}", e),
    }
    runtime.run_until_idle();

    println!("\n{} task(s) completed", completed.load(Ordering::SeqCst));
    println!("{:?}", runtime.stats());
    println!("\n=== Example Complete ===");
}
