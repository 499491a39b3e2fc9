//! Identifier types: job types, completion signals, workers

use core::fmt;

/// Stable numeric id of a registered job type
///
/// Assigned in registration order. The maximum value (u32::MAX) is
/// reserved as a sentinel for "no job type".
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct JobTypeId(u32);

impl JobTypeId {
    /// Sentinel value indicating no job type
    pub const NONE: JobTypeId = JobTypeId(u32::MAX);

    #[inline]
    pub const fn new(id: u32) -> Self {
        JobTypeId(id)
    }

    #[inline]
    pub const fn as_u32(self) -> u32 {
        self.0
    }

    /// Get as usize for indexing
    #[inline]
    pub const fn as_usize(self) -> usize {
        self.0 as usize
    }

    #[inline]
    pub const fn is_none(self) -> bool {
        self.0 == u32::MAX
    }
}

impl fmt::Debug for JobTypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_none() {
            write!(f, "JobTypeId(NONE)")
        } else {
            write!(f, "JobTypeId({})", self.0)
        }
    }
}

impl fmt::Display for JobTypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_none() {
            write!(f, "none")
        } else {
            write!(f, "{}", self.0)
        }
    }
}

impl Default for JobTypeId {
    fn default() -> Self {
        JobTypeId::NONE
    }
}

/// Index of a completion signal inside the completion pool
///
/// 16 bits so it fits the descriptor header. `NONE` means the job carries
/// no completion signal.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct SignalHandle(u16);

impl SignalHandle {
    /// Sentinel value indicating no signal
    pub const NONE: SignalHandle = SignalHandle(u16::MAX);

    #[inline]
    pub const fn new(index: u16) -> Self {
        SignalHandle(index)
    }

    #[inline]
    pub const fn as_usize(self) -> usize {
        self.0 as usize
    }

    #[inline]
    pub const fn is_none(self) -> bool {
        self.0 == u16::MAX
    }

    #[inline]
    pub const fn is_some(self) -> bool {
        self.0 != u16::MAX
    }
}

impl fmt::Debug for SignalHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_none() {
            write!(f, "SignalHandle(NONE)")
        } else {
            write!(f, "SignalHandle({})", self.0)
        }
    }
}

impl Default for SignalHandle {
    fn default() -> Self {
        SignalHandle::NONE
    }
}

/// Which execution strategy a job was routed to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum BackendKind {
    /// Regular worker pool
    Thread = 0,
    /// Pool for jobs whose body may block
    Blocking = 1,
    /// Synchronous execution on the submitting thread
    Fallback = 2,
}

impl BackendKind {
    /// Short tag used in thread names and log lines
    pub const fn tag(&self) -> &'static str {
        match self {
            BackendKind::Thread => "W",
            BackendKind::Blocking => "B",
            BackendKind::Fallback => "F",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendKind::Thread => write!(f, "thread"),
            BackendKind::Blocking => write!(f, "blocking"),
            BackendKind::Fallback => write!(f, "fallback"),
        }
    }
}

/// Identity of a worker thread, set once when the thread starts
///
/// Helper workers of the thread backend are numbered after the regular
/// workers of that backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WorkerId {
    pub kind: BackendKind,
    pub index: u16,
}

impl WorkerId {
    #[inline]
    pub const fn new(kind: BackendKind, index: u16) -> Self {
        Self { kind, index }
    }

    /// Index for per-worker tables
    #[inline]
    pub const fn as_usize(self) -> usize {
        self.index as usize
    }
}

impl fmt::Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.kind.tag(), self.index)
    }
}
