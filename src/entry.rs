//! Caller-visible completion entry shapes and the format translator.
//!
//! A queue is opened with one of three output formats; every completion it
//! delivers is translated into exactly one entry of that shape. The shapes
//! are layout contracts with the caller, so they are `#[repr(C)]`.
//!
//! Reported lengths are corrected for on-wire framing so they match what
//! the caller originally supplied to the send/receive call, see
//! [`adjusted_len`].

use bitflags::bitflags;

use crate::completion::{CompletionKind, CompletionRecord};
use crate::error::{Error, ProvErrno, Result};
use crate::source::EpMode;

/// Size of the encapsulation header (Ethernet 14 + IPv4 20 + UDP 8) that
/// hardware counts into receive lengths.
pub const UDP_HDR_LEN: usize = 42;

/// Advertised per-message prefix buffer size for prefix-mode endpoints.
/// Larger than the real header for alignment, so prefix-mode corrections
/// use the padding delta `HDR_BUF_ENTRY - UDP_HDR_LEN`.
pub const HDR_BUF_ENTRY: usize = 64;

/// Output entry format, fixed at open time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CqFormat {
    /// Context pointer only.
    Context,
    /// Context, operation flags and length.
    Msg,
    /// As `Msg`, plus remote data and buffer reference.
    Data,
}

bitflags! {
    /// Operation flags reported in `Msg` and `Data` entries.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct CompletionFlags: u64 {
        /// Message-level operation.
        const MSG = 1 << 1;
        /// Receive-side completion.
        const RECV = 1 << 6;
        /// Send-side completion.
        const SEND = 1 << 7;
    }
}

/// Derive entry flags from the operation kind.
pub fn flags_for(kind: CompletionKind) -> CompletionFlags {
    match kind {
        CompletionKind::Send => CompletionFlags::MSG | CompletionFlags::SEND,
        CompletionKind::Recv => CompletionFlags::MSG | CompletionFlags::RECV,
    }
}

/// Correct a hardware-reported length so it reflects the length the caller
/// supplied, independent of on-wire framing.
///
/// Receives include the encapsulation header unless the endpoint runs in
/// prefix mode, where the caller's buffer already covers the advertised
/// prefix and only the padding delta is missing. Sends report the payload
/// length and need the full prefix added back in prefix mode.
pub fn adjusted_len(kind: CompletionKind, bytes: usize, mode: EpMode) -> usize {
    match kind {
        CompletionKind::Recv => {
            if mode.contains(EpMode::MSG_PREFIX) {
                bytes + (HDR_BUF_ENTRY - UDP_HDR_LEN)
            } else {
                bytes.saturating_sub(UDP_HDR_LEN)
            }
        }
        CompletionKind::Send => {
            if mode.contains(EpMode::MSG_PREFIX) {
                bytes + HDR_BUF_ENTRY
            } else {
                bytes
            }
        }
    }
}

/// Context-only completion entry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[repr(C)]
pub struct CtxEntry {
    /// Caller context of the completed operation.
    pub context: u64,
}

/// Message completion entry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[repr(C)]
pub struct MsgEntry {
    /// Caller context of the completed operation.
    pub context: u64,
    /// Operation flags.
    pub flags: CompletionFlags,
    /// Corrected byte length.
    pub len: usize,
}

/// Extended-data completion entry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[repr(C)]
pub struct DataEntry {
    /// Caller context of the completed operation.
    pub context: u64,
    /// Operation flags.
    pub flags: CompletionFlags,
    /// Corrected byte length.
    pub len: usize,
    /// Receive buffer reference, zero when not tracked.
    pub buf: u64,
    /// Remote-supplied data, zero when not tracked.
    pub data: u64,
}

/// Error completion entry returned by the error side-channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ErrEntry {
    /// Caller context of the failed operation.
    pub context: u64,
    /// Operation flags (unset for error entries).
    pub flags: CompletionFlags,
    /// Provider-specific error code.
    pub prov_errno: ProvErrno,
}

/// Mutable view over the caller's output buffer, one variant per format.
///
/// The variant must agree with the queue's configured format; a mismatch
/// fails the read with [`Error::Unsupported`].
#[derive(Debug)]
pub enum EntryBuf<'a> {
    /// Buffer of context-only entries.
    Context(&'a mut [CtxEntry]),
    /// Buffer of message entries.
    Msg(&'a mut [MsgEntry]),
    /// Buffer of extended-data entries.
    Data(&'a mut [DataEntry]),
}

impl<'a> EntryBuf<'a> {
    /// Format this buffer holds entries for.
    pub fn format(&self) -> CqFormat {
        match self {
            EntryBuf::Context(_) => CqFormat::Context,
            EntryBuf::Msg(_) => CqFormat::Msg,
            EntryBuf::Data(_) => CqFormat::Data,
        }
    }

    /// Number of entries the buffer can hold.
    pub fn capacity(&self) -> usize {
        match self {
            EntryBuf::Context(s) => s.len(),
            EntryBuf::Msg(s) => s.len(),
            EntryBuf::Data(s) => s.len(),
        }
    }

    /// Reborrow the buffer for a shorter lifetime.
    ///
    /// Lets a blocking loop hand the buffer to repeated non-blocking read
    /// attempts without consuming it.
    pub fn reborrow(&mut self) -> EntryBuf<'_> {
        match self {
            EntryBuf::Context(s) => EntryBuf::Context(&mut s[..]),
            EntryBuf::Msg(s) => EntryBuf::Msg(&mut s[..]),
            EntryBuf::Data(s) => EntryBuf::Data(&mut s[..]),
        }
    }

    /// Translate one completion record into the entry at `idx`.
    ///
    /// `mode` is the endpoint mode of the source that produced the record,
    /// used for length correction.
    pub(crate) fn write_record(
        &mut self,
        idx: usize,
        rec: &CompletionRecord,
        mode: EpMode,
    ) -> Result<()> {
        match self {
            EntryBuf::Context(s) => {
                let entry = s.get_mut(idx).ok_or(Error::Invalid)?;
                entry.context = rec.context;
            }
            EntryBuf::Msg(s) => {
                let entry = s.get_mut(idx).ok_or(Error::Invalid)?;
                entry.context = rec.context;
                entry.flags = flags_for(rec.kind);
                entry.len = adjusted_len(rec.kind, rec.bytes, mode);
            }
            EntryBuf::Data(s) => {
                let entry = s.get_mut(idx).ok_or(Error::Invalid)?;
                entry.context = rec.context;
                entry.flags = flags_for(rec.kind);
                entry.len = adjusted_len(rec.kind, rec.bytes, mode);
                entry.buf = 0;
                entry.data = 0;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::completion::CompletionKind;

    #[test]
    fn test_flags_for_kind() {
        assert_eq!(
            flags_for(CompletionKind::Send),
            CompletionFlags::MSG | CompletionFlags::SEND
        );
        assert_eq!(
            flags_for(CompletionKind::Recv),
            CompletionFlags::MSG | CompletionFlags::RECV
        );
    }

    #[test]
    fn test_recv_len_strips_header() {
        assert_eq!(
            adjusted_len(CompletionKind::Recv, 142, EpMode::empty()),
            100
        );
    }

    #[test]
    fn test_recv_len_prefix_mode_adds_padding() {
        assert_eq!(
            adjusted_len(CompletionKind::Recv, 100, EpMode::MSG_PREFIX),
            100 + (HDR_BUF_ENTRY - UDP_HDR_LEN)
        );
    }

    #[test]
    fn test_send_len_only_adjusted_in_prefix_mode() {
        assert_eq!(adjusted_len(CompletionKind::Send, 100, EpMode::empty()), 100);
        assert_eq!(
            adjusted_len(CompletionKind::Send, 100, EpMode::MSG_PREFIX),
            100 + HDR_BUF_ENTRY
        );
    }

    #[test]
    fn test_recv_len_never_underflows() {
        assert_eq!(adjusted_len(CompletionKind::Recv, 10, EpMode::empty()), 0);
    }

    #[test]
    fn test_write_record_data_zeroes_untracked_fields() {
        let mut entries = [DataEntry {
            buf: 0xdead,
            data: 0xbeef,
            ..Default::default()
        }];
        let rec = CompletionRecord::success(0x42, CompletionKind::Recv, 142);
        EntryBuf::Data(&mut entries)
            .write_record(0, &rec, EpMode::empty())
            .unwrap();
        assert_eq!(entries[0].context, 0x42);
        assert_eq!(entries[0].len, 100);
        assert_eq!(entries[0].buf, 0);
        assert_eq!(entries[0].data, 0);
    }
}
