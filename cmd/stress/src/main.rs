//! Stress test - create/dispatch churn
//!
//! Producer threads create tasks through handles while the main thread
//! dispatches. Exhaustion is retried; at the end every task must have run
//! once and every stack must be back in the pool.
//!
//! Usage: stress [tasks] [producers]

use cotask::{Runtime, SchedulerConfig};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

fn main() {
    println!("=== cotask Stress Test ===\n");

    let mut args = std::env::args().skip(1);
    let num_tasks: u64 = args.next().and_then(|s| s.parse().ok()).unwrap_or(100_000);
    let producers: u64 = args.next().and_then(|s| s.parse().ok()).unwrap_or(4);
    let per_producer = num_tasks / producers.max(1);
    let expected = per_producer * producers.max(1);

    // COTASK_MAX_TASKS / COTASK_NUM_STACKS shape the pool
    let config = SchedulerConfig::from_env().zero_stacks(false);
    println!(
        "{} tasks from {} producers, {} slots / {} stacks",
        expected, producers, config.max_tasks, config.num_stacks
    );

    let runtime = match Runtime::new(config) {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("failed to build runtime: {}", e);
            std::process::exit(1);
        }
    };

    let completed = Arc::new(AtomicU64::new(0));
    let checksum = Arc::new(AtomicU64::new(0));
    let start = Instant::now();

    let threads: Vec<_> = (0..producers.max(1))
        .map(|p| {
            let handle = runtime.handle();
            let completed = completed.clone();
            let checksum = checksum.clone();
            std::thread::spawn(move || {
                let mut retries = 0u64;
                let mut i = 0;
                while i < per_producer {
                    let completed = completed.clone();
                    let checksum = checksum.clone();
                    let result = handle.create(
                        move |p: u64, i: u64| {
                            checksum.fetch_add(p ^ i, Ordering::Relaxed);
                            completed.fetch_add(1, Ordering::SeqCst);
                        },
                        p,
                        i,
                    );
                    match result {
                        Ok(_) => i += 1,
                        Err(e) if e.is_exhaustion() => {
                            retries += 1;
                            std::thread::yield_now();
                        }
                        Err(e) => {
                            eprintln!("producer {}: {}", p, e);
                            return retries;
                        }
                    }
                }
                retries
            })
        })
        .collect();

    let timeout = Duration::from_secs(60);
    while completed.load(Ordering::SeqCst) < expected {
        if runtime.run_pass() == 0 {
            std::thread::yield_now();
        }
        if start.elapsed() > timeout {
            println!("WARNING: Timeout!");
            break;
        }
    }

    let mut retries = 0;
    for t in threads {
        retries += t.join().unwrap_or(0);
    }
    runtime.run_until_idle();
    let elapsed = start.elapsed();

    let want_checksum: u64 = (0..producers.max(1))
        .flat_map(|p| (0..per_producer).map(move |i| p ^ i))
        .sum();
    let done = completed.load(Ordering::SeqCst);
    let stats = runtime.stats();

    println!("\nResults:");
    println!("  completed:      {}/{}", done, expected);
    println!("  outstanding:    {}", runtime.outstanding());
    println!("  create retries: {}", retries);
    println!("  passes:         {}", stats.passes);
    println!("  time:           {:?}", elapsed);
    println!(
        "  throughput:     {:.0} tasks/sec",
        done as f64 / elapsed.as_secs_f64()
    );

    let ok = done == expected
        && runtime.outstanding() == 0
        && checksum.load(Ordering::Relaxed) == want_checksum
        && stats.create_failures == retries;
    if ok {
        println!("\n=== PASSED ===");
    } else {
        println!("\n=== FAILED ===");
        std::process::exit(1);
    }
}
