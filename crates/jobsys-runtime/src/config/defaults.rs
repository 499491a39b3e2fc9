//! Compile-time configuration defaults

/// Regular workers; 0 sizes the pool from the CPU topology
pub const NUM_WORKERS: usize = 0;

/// Cores left to submitting threads when sizing from topology
pub const RESERVED_THREADS: usize = 1;

/// Normally-parked helper workers in the thread backend
pub const NUM_HELPER_WORKERS: usize = 2;

/// Workers in the blocking backend
pub const NUM_BLOCKING_WORKERS: usize = 1;

/// Ring slots per priority: High, Regular, Low, Stream
pub const QUEUE_CAPACITY: [usize; 4] = [256, 1024, 512, 256];

/// Non-worker producers block on a full ring instead of spilling
pub const BLOCK_ON_FULL: bool = true;

/// Empty polls before a worker parks
pub const IDLE_SPINS: u32 = 10;

/// Upper bound on one park
pub const PARK_TIMEOUT_MS: u64 = 100;

/// Completion signals in the pool
pub const COMPLETION_POOL_SIZE: usize = 1024;

/// Scheduler enabled; when off every job runs on the submitting thread
pub const ENABLED: bool = true;

/// A waiting primary thread may kick a helper worker
pub const WORKER_BOOST: bool = true;

/// Record execution samples and frame statistics
pub const PROFILING: bool = false;

/// Recent samples kept for profiling consumers
pub const SAMPLE_CAPACITY: usize = 4096;
