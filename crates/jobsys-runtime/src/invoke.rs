//! Invokers for typed and closure jobs
//!
//! These read a parameter block back as a concrete type, so they are only
//! ever registered by the registry together with that type. Nothing here
//! is reachable from outside the crate.

use jobsys_core::descriptor::JobParams;
use jobsys_core::error::JobResult;
use jobsys_core::job::Job;

/// Invoker for `Job` implementations
///
/// Registered only under parameter type `J`, so the block it receives was
/// always written by `JobParams::from_value::<J>`.
pub(crate) fn invoke_typed<J: Job>(params: &JobParams) {
    // SAFETY: the registry pins this invoker's job type to parameter type J
    let job: J = unsafe { params.read::<J>() };
    job.run();
}

type BoxedClosure = Box<dyn FnOnce() + Send + 'static>;

/// Owned pointer to a boxed closure, carried inside a parameter block
#[derive(Clone, Copy)]
#[repr(transparent)]
pub(crate) struct LambdaPtr(*mut BoxedClosure);

// The pointee is Send and ownership moves with the descriptor.
unsafe impl Send for LambdaPtr {}

impl LambdaPtr {
    /// Box a closure and pack its pointer into a parameter block
    pub(crate) fn pack<F>(f: F) -> JobResult<JobParams>
    where
        F: FnOnce() + Send + 'static,
    {
        let boxed: BoxedClosure = Box::new(f);
        let ptr = LambdaPtr(Box::into_raw(Box::new(boxed)));
        JobParams::from_value(&ptr).map_err(|e| {
            // SAFETY: the pointer never left this function
            drop(unsafe { Box::from_raw(ptr.0) });
            e
        })
    }
}

/// Invoker shared by every lambda job type
///
/// Each descriptor runs exactly once, so the box is reclaimed exactly once.
pub(crate) fn invoke_lambda(params: &JobParams) {
    // SAFETY: lambda job types are registered with parameter type LambdaPtr
    let ptr: LambdaPtr = unsafe { params.read::<LambdaPtr>() };
    // SAFETY: pointer came from Box::into_raw in pack()
    let closure: Box<BoxedClosure> = unsafe { Box::from_raw(ptr.0) };
    (*closure)();
}

/// Free a packed closure without running it
///
/// # Safety
///
/// `params` must come from `LambdaPtr::pack` and must never reach
/// `invoke_lambda`.
pub(crate) unsafe fn discard_lambda(params: &JobParams) {
    let ptr: LambdaPtr = params.read::<LambdaPtr>();
    drop(Box::from_raw(ptr.0));
}
