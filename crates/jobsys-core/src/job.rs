//! Typed jobs
//!
//! The invoker that reads a `Job` back out of its parameter block is
//! private to the runtime, which registers it together with the
//! parameter type it expects.

/// A job whose parameters are a plain `Copy` struct
///
/// ```ignore
/// #[derive(Clone, Copy)]
/// struct Skin { first: u32, count: u32 }
///
/// impl Job for Skin {
///     const NAME: &'static str = "Skin";
///     fn run(self) { /* ... */ }
/// }
/// ```
pub trait Job: Copy + Send + 'static {
    /// Name the job type is interned under
    const NAME: &'static str;

    fn run(self);
}
