//! Fallback backend: synchronous execution on the submitting thread
//!
//! Used while the scheduler is disabled, for filtered job types, before
//! init and after shutdown. `submit` returns after the body has run and
//! the completion signal has been marked.

use super::{Backend, JobRunner};
use crate::tls;
use jobsys_core::descriptor::JobDescriptor;
use jobsys_core::id::BackendKind;
use std::panic;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

pub struct FallbackBackend {
    runner: Arc<JobRunner>,
    executed: AtomicU64,
}

impl FallbackBackend {
    pub fn new(runner: Arc<JobRunner>) -> Self {
        Self {
            runner,
            executed: AtomicU64::new(0),
        }
    }
}

impl Backend for FallbackBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Fallback
    }

    fn submit(&self, desc: JobDescriptor) {
        let result = self.runner.run(&desc, tls::current_worker_id(), None);
        self.executed.fetch_add(1, Ordering::Relaxed);
        // The signal is already complete; the panic belongs to the caller.
        if let Err(payload) = result {
            panic::resume_unwind(payload);
        }
    }

    fn shutdown(&self) {}

    fn executed(&self) -> u64 {
        self.executed.load(Ordering::Relaxed)
    }
}
