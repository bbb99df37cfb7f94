//! Hardware completion sources and their queue bindings.
//!
//! A [`CompletionSource`] is the collaborator that actually produces
//! completions (a device queue fed by the message/RMA posting path). The
//! queue never calls into the producer; it only polls.
//!
//! A [`SourceBinding`] ties one source to its owning queue. Bindings are
//! shared between the queue and in-flight close/progress operations, so
//! their reference count is atomic and teardown is deferred until the
//! count reaches zero.

use std::cell::RefCell;
use std::sync::atomic::{AtomicU32, Ordering};

use bitflags::bitflags;

use crate::addr::RawSrcAddr;
use crate::completion::CompletionRecord;

bitflags! {
    /// Endpoint mode bits relevant to completion translation.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct EpMode: u64 {
        /// The endpoint exposes a length-prefix buffer to the caller.
        const MSG_PREFIX = 1 << 0;
    }
}

/// One underlying hardware completion source.
///
/// `poll` returns the next completion in hardware-delivery order, or `None`
/// when the source has nothing pending. Error completions are returned as
/// records with an error status, not as `None`.
pub trait CompletionSource {
    /// Poll the source for the next completion.
    fn poll(&mut self) -> Option<CompletionRecord>;

    /// Endpoint mode of the endpoint feeding this source.
    fn mode(&self) -> EpMode {
        EpMode::empty()
    }

    /// Raw source address parsed from the headers of the most recently
    /// polled receive completion. `None` when the last completion was not
    /// a receive or the source does not track headers.
    fn last_recv_src(&self) -> Option<RawSrcAddr> {
        None
    }
}

/// Reference-counted binding of one hardware source to a queue.
///
/// The count only gates teardown; it does not manage memory (the `Rc`
/// holding the binding does). A queue refuses to close while any of its
/// bindings still has a nonzero count.
#[derive(Debug)]
pub struct SourceBinding<S> {
    source: RefCell<S>,
    refs: AtomicU32,
}

impl<S: CompletionSource> SourceBinding<S> {
    /// Wrap a source with an initial reference count of zero.
    pub fn new(source: S) -> Self {
        Self {
            source: RefCell::new(source),
            refs: AtomicU32::new(0),
        }
    }

    /// Poll the bound source once.
    #[inline]
    pub fn poll(&self) -> Option<CompletionRecord> {
        self.source.borrow_mut().poll()
    }

    /// Endpoint mode of the bound source.
    #[inline]
    pub fn mode(&self) -> EpMode {
        self.source.borrow().mode()
    }

    /// Source address of the last receive polled from this binding.
    #[inline]
    pub fn last_recv_src(&self) -> Option<RawSrcAddr> {
        self.source.borrow().last_recv_src()
    }

    /// Take an additional reference.
    pub fn retain(&self) {
        self.refs.fetch_add(1, Ordering::Relaxed);
    }

    /// Drop one reference, returning the remaining count.
    pub fn release(&self) -> u32 {
        let prev = self.refs.fetch_sub(1, Ordering::AcqRel);
        debug_assert!(prev > 0, "release without matching retain");
        prev - 1
    }

    /// Current reference count.
    pub fn ref_count(&self) -> u32 {
        self.refs.load(Ordering::Acquire)
    }
}
