//! Error types for the job scheduler

use core::fmt;

/// Result type for scheduler operations
pub type JobResult<T> = Result<T, JobError>;

/// Errors that can occur in scheduler operations
///
/// A full ring is not an error: submission either blocks or spills into
/// the overflow queue. A disabled or filtered job type is not an error
/// either; it runs synchronously.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobError {
    /// Scheduler not initialized
    NotInitialized,

    /// Scheduler already initialized
    AlreadyInitialized,

    /// Configuration rejected by validation
    InvalidConfig(&'static str),

    /// Parameter block does not fit the descriptor's inline buffer
    ParamsTooLarge { size: usize, max: usize },

    /// Job name already registered with a different parameter type
    JobTypeMismatch(String),

    /// Every completion signal stayed owned for the whole acquire spin
    SignalPoolExhausted,

    /// Signal handle out of range or released by a non-owner
    InvalidSignal,

    /// Worker thread error
    Worker(WorkerError),
}

impl fmt::Display for JobError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobError::NotInitialized => write!(f, "job manager not initialized"),
            JobError::AlreadyInitialized => write!(f, "job manager already initialized"),
            JobError::InvalidConfig(msg) => write!(f, "invalid config: {}", msg),
            JobError::ParamsTooLarge { size, max } => {
                write!(f, "job parameters too large: {} bytes (max {})", size, max)
            }
            JobError::JobTypeMismatch(name) => {
                write!(f, "job type '{}' registered with a different parameter type", name)
            }
            JobError::SignalPoolExhausted => write!(f, "completion signal pool exhausted"),
            JobError::InvalidSignal => write!(f, "invalid completion signal"),
            JobError::Worker(e) => write!(f, "worker error: {}", e),
        }
    }
}

impl std::error::Error for JobError {}

/// Worker thread related errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerError {
    /// Failed to spawn worker thread
    SpawnFailed,

    /// Worker thread panicked
    Panicked,
}

impl fmt::Display for WorkerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkerError::SpawnFailed => write!(f, "failed to spawn worker thread"),
            WorkerError::Panicked => write!(f, "worker thread panicked"),
        }
    }
}

impl From<WorkerError> for JobError {
    fn from(e: WorkerError) -> Self {
        JobError::Worker(e)
    }
}
