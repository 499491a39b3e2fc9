//! Stress test - many small jobs from many producers
//!
//! Usage: `stress [jobs] [producers] [frames]`
//!
//! Each frame, every producer submits its share of jobs at a rotating
//! priority on its own completion state and waits for them. Frame
//! statistics come from the profiler after each frame closes.

use jobsys::{
    BackendKind, JobError, JobOptions, JobResult, JobSortOrder, Priority, Runtime, SchedulerConfig, WorkerError,
};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

const PRIORITIES: [Priority; 4] = [Priority::High, Priority::Regular, Priority::Low, Priority::Stream];

fn arg(n: usize, default: usize) -> usize {
    std::env::args().nth(n).and_then(|s| s.parse().ok()).unwrap_or(default)
}

fn main() {
    println!("=== jobsys Stress Test ===\n");

    let num_jobs = arg(1, 100_000);
    let producers = arg(2, 4).max(1);
    let frames = arg(3, 10).max(1);

    if let Err(e) = run(num_jobs, producers, frames) {
        eprintln!("error: {}", e);
        std::process::exit(1);
    }

    println!("\n=== Stress Test Complete ===");
}

fn run(num_jobs: usize, producers: usize, frames: usize) -> JobResult<()> {
    let config = SchedulerConfig::from_env()
        .profiling(true)
        .uniform_queue_capacity(1024);
    let runtime = Runtime::new(config)?;
    let (workers, helpers, _) = runtime.manager().worker_counts();
    println!(
        "{} jobs, {} producers, {} frames on {} workers (+{} helpers)",
        num_jobs, producers, frames, workers, helpers
    );

    let completed = Arc::new(AtomicU64::new(0));
    let per_frame = num_jobs / frames;
    let per_producer = per_frame / producers;
    let expected = (per_producer * producers * frames) as u64;

    runtime.block_on(|mgr| -> JobResult<()> {
        let start = Instant::now();
        let mut frame_times = Vec::with_capacity(frames);

        for frame in 0..frames {
            let frame_start = Instant::now();
            std::thread::scope(|s| -> JobResult<()> {
                let handles: Vec<_> = (0..producers)
                    .map(|p| {
                        let completed = completed.clone();
                        s.spawn(move || -> JobResult<()> {
                            let state = mgr.acquire_state()?;
                            for i in 0..per_producer {
                                let completed = completed.clone();
                                let priority = PRIORITIES[(p + i) % PRIORITIES.len()];
                                mgr.add_lambda(
                                    "Spin",
                                    move || {
                                        let mut x = i as u64;
                                        for _ in 0..64 {
                                            x = std::hint::black_box(x.wrapping_mul(31).wrapping_add(7));
                                        }
                                        completed.fetch_add(1, Ordering::Relaxed);
                                    },
                                    JobOptions::new().priority(priority).state(&state),
                                )?;
                            }
                            mgr.wait_for_job(&state);
                            Ok(())
                        })
                    })
                    .collect();
                for h in handles {
                    h.join()
                        .unwrap_or(Err(JobError::Worker(WorkerError::Panicked)))?;
                }
                Ok(())
            })?;
            mgr.update_frame();
            frame_times.push(frame_start.elapsed());

            if let Some(fs) = mgr.frame_stats(BackendKind::Thread) {
                println!(
                    "frame {:3}: {:8} jobs  {:10.3?}  util {:5.1}%",
                    frame,
                    fs.total_jobs(),
                    frame_start.elapsed(),
                    fs.avg_utilization()
                );
            }
        }

        let total_time = start.elapsed();
        let stats = mgr.stats();
        let slowest = frame_times.iter().max().copied().unwrap_or(Duration::ZERO);

        println!("\n=== Results ===");
        println!("Total jobs:      {}", expected);
        println!("Completed:       {}", completed.load(Ordering::Relaxed));
        println!("Overflowed:      {}", stats.overflowed);
        println!("Ran inline:      {}", stats.fallback_executed);
        println!("Slowest frame:   {:?}", slowest);
        println!("Total time:      {:?}", total_time);
        println!(
            "Throughput:      {:.0} jobs/sec",
            expected as f64 / total_time.as_secs_f64()
        );

        println!("\nLast frame by job type:");
        for js in mgr.job_frame_stats(BackendKind::Thread, JobSortOrder::TimeHighToLow) {
            println!("  {:<16} {:8} jobs {:8} us", js.name, js.count, js.exec_us);
        }

        let samples = mgr.samples();
        if !samples.is_empty() {
            let avg_ns = samples.iter().map(|s| s.duration_ns()).sum::<u64>() / samples.len() as u64;
            println!("\n{} samples kept, mean {} ns", samples.len(), avg_ns);
        }
        Ok(())
    })
}
