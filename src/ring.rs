//! Bounded circular buffer backing soft-mode queues.
//!
//! Entries are written only at the head index and consumed only at the
//! tail; both wrap at capacity. `head == tail` alone is ambiguous, so a
//! last-operation tag disambiguates: the ring is empty when the last
//! operation was a read, full when it was a write.
//!
//! Overflow policy: a write into a full ring drops the *new* entry and
//! never overwrites unread data. This is a documented trade-off of the
//! bounded multiplexer; consumers that cannot tolerate loss must drain
//! often enough.

use crate::entry::CompletionFlags;
use crate::error::{Error, Result};

/// Last operation performed on the ring, for empty/full disambiguation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LastOp {
    Read,
    Write,
}

/// One pre-translated completion stored in the ring.
///
/// `prov_errno > 0` marks an error sentinel: the slot carries a failed
/// completion and blocks ordinary reads until the error side-channel
/// consumes it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SoftEntry {
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
    /// Raw provider error code, zero for successful completions.
    pub prov_errno: u32,
}

/// Index-based circular buffer of [`SoftEntry`] slots.
#[derive(Debug)]
pub struct SoftRing {
    slots: Box<[SoftEntry]>,
    head: usize,
    tail: usize,
    last_op: LastOp,
}

impl SoftRing {
    /// Allocate a ring with `capacity` slots.
    ///
    /// Fails with [`Error::NoMem`] when the backing storage cannot be
    /// allocated, or [`Error::Invalid`] for a zero capacity.
    pub fn new(capacity: usize) -> Result<Self> {
        if capacity == 0 {
            return Err(Error::Invalid);
        }
        let mut slots = Vec::new();
        slots
            .try_reserve_exact(capacity)
            .map_err(|_| Error::NoMem)?;
        slots.resize(capacity, SoftEntry::default());
        Ok(Self {
            slots: slots.into_boxed_slice(),
            head: 0,
            tail: 0,
            last_op: LastOp::Read,
        })
    }

    /// Number of slots.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Whether the ring holds no entries.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.head == self.tail && self.last_op == LastOp::Read
    }

    /// Whether the ring is full.
    #[inline]
    pub fn is_full(&self) -> bool {
        self.head == self.tail && self.last_op == LastOp::Write
    }

    /// Number of stored entries.
    pub fn len(&self) -> usize {
        if self.head == self.tail {
            if self.last_op == LastOp::Write {
                self.capacity()
            } else {
                0
            }
        } else {
            (self.head + self.capacity() - self.tail) % self.capacity()
        }
    }

    /// Write an entry at the head.
    ///
    /// Returns `false` when the ring is full and the entry was dropped.
    pub fn push(&mut self, entry: SoftEntry) -> bool {
        if self.is_full() {
            return false;
        }
        self.slots[self.head] = entry;
        self.head = (self.head + 1) % self.capacity();
        self.last_op = LastOp::Write;
        true
    }

    /// Entry at the tail, `None` when the ring is empty.
    pub fn peek(&self) -> Option<&SoftEntry> {
        if self.is_empty() {
            None
        } else {
            Some(&self.slots[self.tail])
        }
    }

    /// Consume the tail entry.
    ///
    /// Must only be called after [`peek`](Self::peek) returned `Some`.
    pub fn advance(&mut self) {
        debug_assert!(!self.is_empty());
        self.tail = (self.tail + 1) % self.capacity();
        self.last_op = LastOp::Read;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(context: u64) -> SoftEntry {
        SoftEntry {
            context,
            ..Default::default()
        }
    }

    #[test]
    fn test_new_ring_is_empty() {
        let ring = SoftRing::new(4).unwrap();
        assert!(ring.is_empty());
        assert!(!ring.is_full());
        assert_eq!(ring.len(), 0);
        assert!(ring.peek().is_none());
    }

    #[test]
    fn test_zero_capacity_rejected() {
        assert_eq!(SoftRing::new(0).unwrap_err(), Error::Invalid);
    }

    #[test]
    fn test_fill_to_capacity_then_drop() {
        let mut ring = SoftRing::new(3).unwrap();
        for i in 0..3 {
            assert!(ring.push(entry(i)));
        }
        assert!(ring.is_full());
        assert_eq!(ring.len(), 3);

        // Overflow drops the new entry, stored entries are untouched.
        assert!(!ring.push(entry(99)));
        assert_eq!(ring.len(), 3);
        assert_eq!(ring.peek().unwrap().context, 0);
    }

    #[test]
    fn test_fifo_order_with_wrap() {
        let mut ring = SoftRing::new(2).unwrap();
        assert!(ring.push(entry(1)));
        assert!(ring.push(entry(2)));
        assert_eq!(ring.peek().unwrap().context, 1);
        ring.advance();
        // Wraps: slot 0 is free again.
        assert!(ring.push(entry(3)));
        assert_eq!(ring.peek().unwrap().context, 2);
        ring.advance();
        assert_eq!(ring.peek().unwrap().context, 3);
        ring.advance();
        assert!(ring.is_empty());
    }

    #[test]
    fn test_head_tail_equality_disambiguated_by_last_op() {
        let mut ring = SoftRing::new(2).unwrap();
        ring.push(entry(1));
        ring.push(entry(2));
        // head == tail, last op write: full.
        assert!(ring.is_full());
        assert!(!ring.is_empty());
        ring.advance();
        ring.advance();
        // head == tail, last op read: empty.
        assert!(ring.is_empty());
        assert!(!ring.is_full());
    }

    #[test]
    fn test_capacity_one() {
        let mut ring = SoftRing::new(1).unwrap();
        assert!(ring.push(entry(7)));
        assert!(!ring.push(entry(8)));
        assert_eq!(ring.peek().unwrap().context, 7);
        ring.advance();
        assert!(ring.is_empty());
        assert!(ring.push(entry(9)));
    }
}
