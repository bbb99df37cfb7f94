//! Error types for softcq.

/// Completion queue operation errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// Nothing available right now, try again later.
    Again,
    /// An error completion is pending and must be drained with
    /// [`read_error`](crate::cq::CompletionQueue::read_error) before
    /// ordinary reads can make progress.
    ErrorPending,
    /// Invalid attribute supplied at open time.
    Invalid,
    /// Allocation failed; the queue is left in its prior state.
    NoMem,
    /// References are still outstanding, retry after releasing them.
    Busy,
    /// Operation not supported for this mode/format combination.
    Unsupported,
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::Again => write!(f, "No completions available, try again"),
            Error::ErrorPending => write!(f, "Error completion pending, drain with read_error"),
            Error::Invalid => write!(f, "Invalid queue attribute"),
            Error::NoMem => write!(f, "Out of memory"),
            Error::Busy => write!(f, "References still outstanding"),
            Error::Unsupported => write!(f, "Operation not supported"),
        }
    }
}

impl std::error::Error for Error {}

/// Result type for softcq operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Provider-specific error code carried by an error completion.
///
/// `Success` never appears inside an error completion; it exists so the
/// code space starts at zero and a raw `0` in a ring slot means "no error".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum ProvErrno {
    /// No error.
    Success = 0,
    /// Frame failed CRC validation.
    Crc = 1,
    /// Receive truncated by an undersized buffer.
    Trunc = 2,
    /// Hardware reported a timeout.
    Timeout = 3,
    /// Unclassified internal failure.
    Internal = 4,
}

impl ProvErrno {
    /// Decode a raw code stored in a ring slot.
    pub fn from_u32(v: u32) -> Self {
        match v {
            0 => Self::Success,
            1 => Self::Crc,
            2 => Self::Trunc,
            3 => Self::Timeout,
            _ => Self::Internal,
        }
    }

    /// Human-readable description of the code.
    pub fn describe(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Crc => "CRC error",
            Self::Trunc => "receive truncated",
            Self::Timeout => "operation timed out",
            Self::Internal => "internal provider error",
        }
    }
}

impl std::fmt::Display for ProvErrno {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.describe())
    }
}
