//! Normalized hardware completion records.
//!
//! A [`CompletionRecord`] is the provider-neutral form of one completion as
//! reported by a hardware source. It is transient: a record is either
//! translated straight into a caller buffer (hard mode) or stored into a
//! ring slot (soft mode) and never kept beyond that.

use crate::error::ProvErrno;

/// Kind of operation the completion reports on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionKind {
    /// Send-side completion.
    Send,
    /// Receive-side completion.
    Recv,
}

/// Outcome carried by a completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionStatus {
    /// Operation completed successfully.
    Success,
    /// Operation failed with a provider error code.
    Error(ProvErrno),
}

/// One hardware completion in normalized form.
#[derive(Debug, Clone, Copy)]
pub struct CompletionRecord {
    /// Caller context associated with the original request.
    pub context: u64,
    /// Operation kind.
    pub kind: CompletionKind,
    /// On-wire byte count reported by hardware.
    pub bytes: usize,
    /// Completion outcome.
    pub status: CompletionStatus,
}

impl CompletionRecord {
    /// Construct a successful completion.
    pub fn success(context: u64, kind: CompletionKind, bytes: usize) -> Self {
        Self {
            context,
            kind,
            bytes,
            status: CompletionStatus::Success,
        }
    }

    /// Construct an error completion.
    pub fn error(context: u64, kind: CompletionKind, errno: ProvErrno) -> Self {
        Self {
            context,
            kind,
            bytes: 0,
            status: CompletionStatus::Error(errno),
        }
    }

    /// Whether this completion carries an error.
    #[inline]
    pub fn is_error(&self) -> bool {
        matches!(self.status, CompletionStatus::Error(_))
    }

    /// Provider error code, `Success` for successful completions.
    #[inline]
    pub fn prov_errno(&self) -> ProvErrno {
        match self.status {
            CompletionStatus::Success => ProvErrno::Success,
            CompletionStatus::Error(e) => e,
        }
    }
}
