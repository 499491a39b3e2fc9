//! # jobsys-core
//!
//! Core types for the jobsys job scheduler.
//!
//! This crate is platform-agnostic and contains no OS-specific code.
//! Threads, parking and queues live in `jobsys-runtime`.
//!
//! ## Modules
//!
//! - `id` - Job type, signal and worker identifiers
//! - `state` - Priority levels and ring slot states
//! - `descriptor` - Fixed-size job descriptor and inline parameter block
//! - `job` - Typed jobs (`Job` trait)
//! - `completion` - Pooled, reference-counted completion signals
//! - `error` - Error types
//! - `kprint` - Kernel-style logging macros with a pluggable sink
//! - `env` - Environment variable utilities

pub mod id;
pub mod state;
pub mod descriptor;
pub mod job;
pub mod completion;
pub mod error;
pub mod kprint;
pub mod env;

// Re-exports for convenience
pub use id::{BackendKind, JobTypeId, SignalHandle, WorkerId};
pub use state::{Priority, SlotState};
pub use descriptor::{Invoker, JobDescriptor, JobParams, MAX_PARAM_SIZE, PARAM_ALIGN};
pub use job::Job;
pub use completion::CompletionPool;
pub use error::{JobError, JobResult, WorkerError};
pub use env::{env_get, env_get_bool, env_get_list, env_get_opt};

/// Sizing constants
pub mod constants {
    cfg_if::cfg_if! {
        if #[cfg(all(target_arch = "aarch64", target_os = "macos"))] {
            /// Cache line size for alignment
            pub const CACHE_LINE_SIZE: usize = 128;
        } else {
            /// Cache line size for alignment
            pub const CACHE_LINE_SIZE: usize = 64;
        }
    }

    /// Maximum workers per backend (worker index must fit the profiler tables)
    pub const MAX_WORKERS: usize = 64;

    /// Maximum distinct job types tracked by the profiler
    pub const MAX_JOB_TYPES: usize = 1024;
}
