//! Submission options and completion state handles

use jobsys_core::completion::CompletionPool;
use jobsys_core::error::JobResult;
use jobsys_core::id::SignalHandle;
use jobsys_core::kwarn;
use jobsys_core::state::Priority;
use std::fmt;
use std::sync::Arc;

/// A held reference to a pooled completion signal
///
/// Pass it in `JobOptions` to one or more submissions, then hand it to
/// `JobManager::wait_for_job`. Cloning adds a reference; dropping the
/// last clone (after every job on it has released its own reference)
/// returns the signal to the pool.
pub struct JobState {
    pool: Arc<CompletionPool>,
    handle: SignalHandle,
    owner: usize,
}

impl JobState {
    pub(crate) fn acquire(pool: &Arc<CompletionPool>) -> JobResult<Self> {
        let owner = pool.new_owner_token();
        let handle = pool.acquire(owner)?;
        Ok(Self {
            pool: Arc::clone(pool),
            handle,
            owner,
        })
    }

    #[inline]
    pub fn handle(&self) -> SignalHandle {
        self.handle
    }

    #[inline]
    pub(crate) fn owner(&self) -> usize {
        self.owner
    }

    /// Acquired from `pool`
    #[inline]
    pub(crate) fn belongs_to(&self, pool: &Arc<CompletionPool>) -> bool {
        Arc::ptr_eq(&self.pool, pool)
    }

    /// Block until no job on this state is pending
    pub(crate) fn wait(&self) {
        self.pool.wait(self.handle);
    }

    /// Cheap check: does some job on this state still run?
    #[inline]
    pub fn needs_to_wait(&self) -> bool {
        self.pool.needs_to_wait(self.handle)
    }
}

impl Clone for JobState {
    fn clone(&self) -> Self {
        if let Err(e) = self.pool.add_ref(self.handle, self.owner) {
            kwarn!("clone of {:?}: {}", self.handle, e);
        }
        Self {
            pool: Arc::clone(&self.pool),
            handle: self.handle,
            owner: self.owner,
        }
    }
}

impl Drop for JobState {
    fn drop(&mut self) {
        if let Err(e) = self.pool.release(self.handle, self.owner) {
            kwarn!("release of {:?}: {}", self.handle, e);
        }
    }
}

impl fmt::Debug for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobState")
            .field("handle", &self.handle)
            .field("pending", &self.needs_to_wait())
            .finish()
    }
}

/// Per-submission options
#[derive(Debug, Clone, Copy, Default)]
pub struct JobOptions<'a> {
    pub priority: Priority,
    /// Route to the blocking backend
    pub blocking: bool,
    /// Completion state to signal when the job finishes
    pub state: Option<&'a JobState>,
}

impl<'a> JobOptions<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn blocking(mut self, blocking: bool) -> Self {
        self.blocking = blocking;
        self
    }

    pub fn state(mut self, state: &'a JobState) -> Self {
        self.state = Some(state);
        self
    }
}
