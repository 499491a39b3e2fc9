//! Job descriptor: the fixed-size value copied into a queue slot
//!
//! A descriptor is flat plain data (no pointers into producer-owned memory
//! apart from the invoker and, for lambda jobs, a boxed closure it owns).
//! Parameters are copied by value into an inline buffer so a consumer can
//! run the job without touching the submitting thread's stack.
//!
//! Layout, 512 bytes with 64-byte alignment:
//!
//! ```text
//! 0x000  invoker        fn(&JobParams)
//! 0x008  signal_owner   usize
//! 0x010  job_type       u32
//! 0x014  signal         u16
//! 0x016  profile_frame  u16
//! 0x018  priority       u8
//! 0x019  flags          u8
//! 0x01A  params         JobParams (len, typed, 448 data bytes)
//! ```

use crate::error::{JobError, JobResult};
use crate::id::{JobTypeId, SignalHandle};
use crate::state::Priority;
use std::mem::{size_of, MaybeUninit};

/// Total size of a descriptor in bytes
pub const DESCRIPTOR_SIZE: usize = 512;

/// Parameter sizes are accounted in units of this many bytes
pub const PARAM_ALIGN: usize = 16;

/// Largest parameter block that fits inline
pub const MAX_PARAM_SIZE: usize = 448;

/// No profiling frame recorded for this job
pub const PROFILE_FRAME_NONE: u16 = u16::MAX;

/// Descriptor flag: job was routed to the blocking backend
pub const FLAG_BLOCKING: u8 = 1 << 0;

/// Function that unpacks a parameter block and runs the job body
pub type Invoker = fn(&JobParams);

/// Round a parameter size up to the alignment unit
#[inline]
pub const fn padded_param_size(len: usize) -> usize {
    (len + PARAM_ALIGN - 1) & !(PARAM_ALIGN - 1)
}

/// Inline parameter buffer
///
/// Holds either raw bytes (`from_bytes`) or one `Copy` value written with
/// `from_value`. A value block may contain padding, so it is only ever
/// read back as the value type, never as bytes.
#[repr(C)]
#[derive(Clone, Copy)]
pub struct JobParams {
    len: u16,
    typed: bool,
    data: [MaybeUninit<u8>; MAX_PARAM_SIZE],
}

impl JobParams {
    /// Empty parameter block
    pub const fn empty() -> Self {
        Self {
            len: 0,
            typed: false,
            data: [MaybeUninit::uninit(); MAX_PARAM_SIZE],
        }
    }

    /// Copy raw bytes into a new block
    pub fn from_bytes(bytes: &[u8]) -> JobResult<Self> {
        check_size(bytes.len())?;
        let mut params = Self::empty();
        // SAFETY: length checked against the buffer above
        unsafe {
            std::ptr::copy_nonoverlapping(
                bytes.as_ptr(),
                params.data.as_mut_ptr() as *mut u8,
                bytes.len(),
            );
        }
        params.len = bytes.len() as u16;
        Ok(params)
    }

    /// Copy one value into a new block
    pub fn from_value<T: Copy>(value: &T) -> JobResult<Self> {
        check_size(size_of::<T>())?;
        let mut params = Self::empty();
        // SAFETY: size checked above; the buffer has no alignment so the
        // write is unaligned
        unsafe {
            std::ptr::write_unaligned(params.data.as_mut_ptr() as *mut T, *value);
        }
        params.len = size_of::<T>() as u16;
        params.typed = true;
        Ok(params)
    }

    /// Number of meaningful bytes
    #[inline]
    pub fn len(&self) -> usize {
        self.len as usize
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Size this block occupies in alignment units
    #[inline]
    pub fn padded_len(&self) -> usize {
        padded_param_size(self.len())
    }

    /// Raw bytes of a block built with `from_bytes`
    ///
    /// Returns `None` for value blocks.
    pub fn bytes(&self) -> Option<&[u8]> {
        if self.typed {
            return None;
        }
        // SAFETY: the first `len` bytes were initialized by from_bytes
        Some(unsafe { std::slice::from_raw_parts(self.data.as_ptr() as *const u8, self.len()) })
    }

    /// Read back a value written by `from_value`
    ///
    /// # Safety
    ///
    /// The block must have been built by `from_value::<T>` with the same `T`.
    #[inline]
    pub unsafe fn read<T: Copy>(&self) -> T {
        debug_assert!(self.typed && self.len() == size_of::<T>());
        std::ptr::read_unaligned(self.data.as_ptr() as *const T)
    }
}

impl Default for JobParams {
    fn default() -> Self {
        Self::empty()
    }
}

impl std::fmt::Debug for JobParams {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobParams")
            .field("len", &self.len)
            .field("typed", &self.typed)
            .finish()
    }
}

fn check_size(size: usize) -> JobResult<()> {
    if size > MAX_PARAM_SIZE {
        return Err(JobError::ParamsTooLarge { size, max: MAX_PARAM_SIZE });
    }
    Ok(())
}

fn noop_invoker(_: &JobParams) {}

/// One submitted job
///
/// Populated by the producer, copied out by the consumer; never shared
/// mutably between threads.
#[repr(C, align(64))]
#[derive(Clone, Copy)]
pub struct JobDescriptor {
    invoker: Invoker,
    /// Owner token presented when the job releases its signal reference
    pub signal_owner: usize,
    pub job_type: JobTypeId,
    pub signal: SignalHandle,
    pub profile_frame: u16,
    pub priority: Priority,
    pub flags: u8,
    params: JobParams,
}

impl JobDescriptor {
    /// Create a descriptor with no signal and no profiling frame
    pub fn new(invoker: Invoker, job_type: JobTypeId, priority: Priority, params: JobParams) -> Self {
        Self {
            invoker,
            signal_owner: 0,
            job_type,
            signal: SignalHandle::NONE,
            profile_frame: PROFILE_FRAME_NONE,
            priority,
            flags: 0,
            params,
        }
    }

    /// Attach a completion signal reference held by `owner`
    #[inline]
    pub fn with_signal(mut self, signal: SignalHandle, owner: usize) -> Self {
        self.signal = signal;
        self.signal_owner = owner;
        self
    }

    #[inline]
    pub fn invoker(&self) -> Invoker {
        self.invoker
    }

    #[inline]
    pub fn params(&self) -> &JobParams {
        &self.params
    }

    #[inline]
    pub fn is_blocking(&self) -> bool {
        self.flags & FLAG_BLOCKING != 0
    }

    /// Run the job body on the current thread
    #[inline]
    pub fn invoke(&self) {
        (self.invoker)(&self.params)
    }
}

impl Default for JobDescriptor {
    fn default() -> Self {
        Self::new(noop_invoker, JobTypeId::NONE, Priority::Regular, JobParams::empty())
    }
}

impl std::fmt::Debug for JobDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobDescriptor")
            .field("job_type", &self.job_type)
            .field("priority", &self.priority)
            .field("signal", &self.signal)
            .field("params", &self.params)
            .finish()
    }
}

const _: () = assert!(size_of::<JobDescriptor>() == DESCRIPTOR_SIZE);
const _: () = assert!(MAX_PARAM_SIZE % PARAM_ALIGN == 0);
const _: () = assert!(DESCRIPTOR_SIZE % crate::constants::CACHE_LINE_SIZE == 0);
