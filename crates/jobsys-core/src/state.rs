//! Priority levels and queue slot states

use core::fmt;

/// Submission priority of a job
///
/// Lower index drains first. Workers always take the highest non-empty
/// level, so sustained `High` load starves the levels below it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum Priority {
    /// Latency-sensitive work, drained before anything else
    High = 0,

    /// Default for engine jobs
    Regular = 1,

    /// Background work
    Low = 2,

    /// Streaming work (asset loads, decompression)
    /// May be starved if higher priority work is available
    Stream = 3,
}

impl Priority {
    /// Number of priority levels
    pub const COUNT: usize = 4;

    /// Get priority as index (0 = High, 3 = Stream)
    #[inline]
    pub const fn as_index(&self) -> usize {
        *self as usize
    }

    /// Get priority from index
    #[inline]
    pub const fn from_index(idx: usize) -> Option<Priority> {
        match idx {
            0 => Some(Priority::High),
            1 => Some(Priority::Regular),
            2 => Some(Priority::Low),
            3 => Some(Priority::Stream),
            _ => None,
        }
    }

    /// Bit of this level in a non-empty mask
    #[inline]
    pub const fn mask_bit(&self) -> u8 {
        1u8 << (*self as u8)
    }

    /// Iterator over all priorities (highest to lowest)
    pub fn iter() -> impl Iterator<Item = Priority> {
        [Priority::High, Priority::Regular, Priority::Low, Priority::Stream].into_iter()
    }
}

impl Default for Priority {
    fn default() -> Self {
        Priority::Regular
    }
}

impl From<u8> for Priority {
    fn from(v: u8) -> Self {
        Priority::from_index(v as usize).unwrap_or(Priority::Regular)
    }
}

impl From<Priority> for u8 {
    fn from(p: Priority) -> u8 {
        p as u8
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Priority::High => write!(f, "HIGH"),
            Priority::Regular => write!(f, "REGULAR"),
            Priority::Low => write!(f, "LOW"),
            Priority::Stream => write!(f, "STREAM"),
        }
    }
}

/// State of one ring slot
///
/// A slot cycles `Empty -> Populating -> Ready -> Draining -> Empty`.
/// The state lives in the low two bits of the slot stamp; the remaining
/// bits hold the ring round the slot belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SlotState {
    Empty = 0,
    Populating = 1,
    Ready = 2,
    Draining = 3,
}

impl SlotState {
    const MASK: u64 = 0b11;

    /// Pack a round number and a state into a slot stamp
    #[inline]
    pub const fn stamp(round: u64, state: SlotState) -> u64 {
        (round << 2) | state as u64
    }

    /// Round number stored in a stamp
    #[inline]
    pub const fn round_of(stamp: u64) -> u64 {
        stamp >> 2
    }

    /// State stored in a stamp
    #[inline]
    pub const fn state_of(stamp: u64) -> SlotState {
        match stamp & Self::MASK {
            0 => SlotState::Empty,
            1 => SlotState::Populating,
            2 => SlotState::Ready,
            _ => SlotState::Draining,
        }
    }
}
