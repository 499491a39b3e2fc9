//! Blocking backend: a separate pool for jobs whose body may block
//!
//! Same pull loop as the thread backend, its own queue and threads, so a
//! job stuck on a slow external call never holds a regular worker.

use super::pool::WorkerPool;
use super::{Backend, JobRunner};
use crate::config::SchedulerConfig;
use crate::profiler::BackendProfiler;
use jobsys_core::descriptor::JobDescriptor;
use jobsys_core::error::JobResult;
use jobsys_core::id::BackendKind;
use std::sync::Arc;

pub struct BlockingBackend {
    pool: WorkerPool,
}

impl BlockingBackend {
    pub fn new(config: &SchedulerConfig, runner: Arc<JobRunner>) -> Self {
        let n = config.num_blocking_workers;
        Self {
            pool: WorkerPool::new(BackendKind::Blocking, config, n, n, runner),
        }
    }

    pub fn start(&self) -> JobResult<()> {
        self.pool.start()
    }

    pub fn pool(&self) -> &WorkerPool {
        &self.pool
    }
}

impl Backend for BlockingBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Blocking
    }

    fn submit(&self, desc: JobDescriptor) {
        self.pool.submit(desc);
    }

    fn shutdown(&self) {
        self.pool.shutdown();
    }

    fn profiler(&self) -> Option<&BackendProfiler> {
        Some(self.pool.profiler())
    }

    fn pending(&self) -> usize {
        self.pool.pending()
    }

    fn executed(&self) -> u64 {
        self.pool.executed()
    }
}
