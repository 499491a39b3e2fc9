//! # jobsys-runtime
//!
//! Threads and policy for the jobsys job scheduler.
//!
//! This crate provides:
//! - Configuration (compile-time defaults, `JOBSYS_*` environment overrides)
//! - Worker parking (futex on Linux, condvar elsewhere)
//! - The per-priority job ring and the overflow queue
//! - Worker pools: thread, blocking and synchronous fallback backends
//! - The job-type registry and profiler
//! - `JobManager`, the scheduler entry point

pub mod config;
pub mod clock;
pub mod cpu;
pub mod tls;
pub mod parking;
pub mod queue;
pub mod backend;
mod invoke;
pub mod registry;
pub mod profiler;
pub mod scheduler;

// Re-exports
pub use config::SchedulerConfig;
pub use parking::{new_parking, WorkerParking};
pub use queue::{JobRing, OverflowQueue, PriorityJobQueue};
pub use backend::{Backend, BlockingBackend, FallbackBackend, HelperGuard, JobRunner, ThreadBackend, WorkerPool};
pub use registry::{JobHandle, JobRegistry, JobType};
pub use profiler::{
    BackendProfiler, FrameStats, JobFrameStats, JobSortOrder, Sample, SampleKind, SampleRing,
    WorkerFrameStats,
};
pub use scheduler::{JobManager, JobOptions, JobState, SchedulerStats};
