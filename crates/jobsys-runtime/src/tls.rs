//! Thread-local worker identity
//!
//! Set once when a worker thread starts. Code running inside a job can ask
//! whether it is on a worker (nested submissions must never block on a
//! full ring) and which one.

use jobsys_core::id::{BackendKind, WorkerId};
use std::cell::Cell;

thread_local! {
    /// Identity of the worker owning this OS thread
    static WORKER_ID: Cell<Option<WorkerId>> = const { Cell::new(None) };

    /// Thread registered as primary (main/render); may kick helpers
    static PRIMARY: Cell<bool> = const { Cell::new(false) };
}

/// Mark the current thread as a worker
#[inline]
pub fn set_worker_id(id: Option<WorkerId>) {
    WORKER_ID.with(|cell| cell.set(id));
    jobsys_core::kprint::set_worker_tag(id);
}

/// Worker identity of the current thread, if any
#[inline]
pub fn current_worker_id() -> Option<WorkerId> {
    WORKER_ID.with(|cell| cell.get())
}

/// Check if we're running on any backend worker
#[inline]
pub fn is_worker_thread() -> bool {
    current_worker_id().is_some()
}

/// Check if we're running on a worker of the given backend
#[inline]
pub fn is_worker_of(kind: BackendKind) -> bool {
    matches!(current_worker_id(), Some(id) if id.kind == kind)
}

/// Register or unregister the current thread as primary
#[inline]
pub fn set_primary_thread(primary: bool) {
    PRIMARY.with(|cell| cell.set(primary));
}

#[inline]
pub fn is_primary_thread() -> bool {
    PRIMARY.with(|cell| cell.get())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_worker_identity() {
        std::thread::spawn(|| {
            assert!(!is_worker_thread());
            set_worker_id(Some(WorkerId::new(BackendKind::Blocking, 1)));
            assert!(is_worker_of(BackendKind::Blocking));
            assert!(!is_worker_of(BackendKind::Thread));
            set_worker_id(None);
            assert!(current_worker_id().is_none());
        })
        .join()
        .unwrap();
    }

    #[test]
    fn test_primary_flag() {
        std::thread::spawn(|| {
            assert!(!is_primary_thread());
            set_primary_thread(true);
            assert!(is_primary_thread());
        })
        .join()
        .unwrap();
    }
}
