//! Basic jobsys example
//!
//! Submits raw, typed, closure and blocking jobs on one completion state
//! and waits for them from the primary thread.
//!
//! # Environment Variables
//!
//! - `JOBSYS_FLUSH_EPRINT=1` - Flush debug output immediately (useful for crash debugging)
//! - `JOBSYS_LOG_LEVEL=debug` - Set log level (off, error, warn, info, debug, trace)
//! - `JOBSYS_NUM_WORKERS=<n>` - Override the worker count

use jobsys::{Job, JobOptions, JobParams, JobResult, Priority, Runtime, SchedulerConfig};
use jobsys::{kdebug, kinfo};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

static CHECKSUM: AtomicU64 = AtomicU64::new(0);
static SQUARES: AtomicU64 = AtomicU64::new(0);

/// Raw job: adds up its parameter bytes
fn checksum(params: &JobParams) {
    if let Some(bytes) = params.bytes() {
        let sum: u64 = bytes.iter().map(|&b| b as u64).sum();
        kdebug!("[Checksum] {} bytes -> {}", bytes.len(), sum);
        CHECKSUM.fetch_add(sum, Ordering::SeqCst);
    }
}

#[derive(Clone, Copy)]
struct Square {
    value: u64,
}

impl Job for Square {
    const NAME: &'static str = "Square";

    fn run(self) {
        SQUARES.fetch_add(self.value * self.value, Ordering::SeqCst);
    }
}

// JOBSYS_LOG_LEVEL=debug JOBSYS_FLUSH_EPRINT=1 cargo run -p jobsys-basic
fn main() {
    println!("=== jobsys Basic Example ===\n");

    if let Err(e) = run() {
        eprintln!("error: {}", e);
        std::process::exit(1);
    }

    println!("\n=== Example Complete ===");
}

fn run() -> JobResult<()> {
    let config = SchedulerConfig::from_env()
        .num_helper_workers(1)
        .num_blocking_workers(1)
        .worker_boost(true);
    config.print();

    let runtime = Runtime::new(config)?;
    let (workers, helpers, blocking) = runtime.manager().worker_counts();
    println!("Workers: {} regular, {} helper, {} blocking\n", workers, helpers, blocking);

    let closures = Arc::new(AtomicU64::new(0));

    runtime.block_on(|mgr| {
        mgr.register_primary_thread();
        let state = mgr.acquire_state()?;

        kinfo!("Submitting jobs...");
        let raw = mgr.get_or_register_job_handle("Checksum", checksum)?;
        for i in 0..4u8 {
            let params = [i; 16];
            mgr.add_job(&raw, &params, JobOptions::new().priority(Priority::High).state(&state))?;
        }

        let square = mgr.register_typed::<Square>()?;
        for value in 1..=10 {
            mgr.add_typed(&square, Square { value }, JobOptions::new().state(&state))?;
        }

        for i in 0..8 {
            let c = closures.clone();
            mgr.add_lambda(
                "Count",
                move || {
                    c.fetch_add(i, Ordering::SeqCst);
                },
                JobOptions::new().priority(Priority::Low).state(&state),
            )?;
        }

        mgr.add_lambda(
            "SlowIo",
            || {
                kdebug!("[SlowIo] sleeping");
                std::thread::sleep(Duration::from_millis(20));
            },
            JobOptions::new().blocking(true).state(&state),
        )?;

        println!("Waiting for jobs to complete...");
        mgr.wait_for_job(&state);

        println!("Checksum: {}", CHECKSUM.load(Ordering::SeqCst));
        println!("Squares:  {}", SQUARES.load(Ordering::SeqCst));
        println!("Closures: {}", closures.load(Ordering::SeqCst));

        let stats = mgr.stats();
        println!(
            "\nExecuted: thread={} blocking={} inline={} overflowed={}",
            stats.thread_executed, stats.blocking_executed, stats.fallback_executed, stats.overflowed
        );
        mgr.dump_job_list();
        Ok(())
    })
}
