//! Common test utilities for softcq integration tests.
//!
//! Provides a scripted in-memory completion source and a toy address
//! vector so queue behavior can be exercised without hardware.

#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::net::Ipv4Addr;
use std::rc::Rc;

use softcq::{
    Addr, AddressVector, CompletionKind, CompletionRecord, CompletionSource, EpMode, ProvErrno,
    RawSrcAddr,
};

#[derive(Debug)]
struct MockInner {
    pending: VecDeque<(CompletionRecord, Option<RawSrcAddr>)>,
    last_src: Option<RawSrcAddr>,
    polls: u64,
    mode: EpMode,
}

/// Scripted hardware source. Clones share the same script, so a test can
/// keep one handle to feed records while the queue owns the other.
#[derive(Clone, Debug)]
pub struct MockSource {
    inner: Rc<RefCell<MockInner>>,
}

impl MockSource {
    pub fn new() -> Self {
        Self::with_mode(EpMode::empty())
    }

    pub fn with_mode(mode: EpMode) -> Self {
        Self {
            inner: Rc::new(RefCell::new(MockInner {
                pending: VecDeque::new(),
                last_src: None,
                polls: 0,
                mode,
            })),
        }
    }

    pub fn push_send(&self, context: u64, bytes: usize) {
        self.inner.borrow_mut().pending.push_back((
            CompletionRecord::success(context, CompletionKind::Send, bytes),
            None,
        ));
    }

    pub fn push_recv(&self, context: u64, bytes: usize) {
        self.inner.borrow_mut().pending.push_back((
            CompletionRecord::success(context, CompletionKind::Recv, bytes),
            None,
        ));
    }

    pub fn push_recv_from(&self, context: u64, bytes: usize, src: RawSrcAddr) {
        self.inner.borrow_mut().pending.push_back((
            CompletionRecord::success(context, CompletionKind::Recv, bytes),
            Some(src),
        ));
    }

    pub fn push_error(&self, context: u64, errno: ProvErrno) {
        self.inner.borrow_mut().pending.push_back((
            CompletionRecord::error(context, CompletionKind::Send, errno),
            None,
        ));
    }

    /// Number of poll calls the queue has made against this source.
    pub fn poll_count(&self) -> u64 {
        self.inner.borrow().polls
    }
}

impl CompletionSource for MockSource {
    fn poll(&mut self) -> Option<CompletionRecord> {
        let mut inner = self.inner.borrow_mut();
        inner.polls += 1;
        match inner.pending.pop_front() {
            Some((rec, src)) => {
                inner.last_src = src;
                Some(rec)
            }
            None => None,
        }
    }

    fn mode(&self) -> EpMode {
        self.inner.borrow().mode
    }

    fn last_recv_src(&self) -> Option<RawSrcAddr> {
        self.inner.borrow().last_src
    }
}

/// Toy address vector backed by a hash map.
pub struct MockAv {
    map: HashMap<RawSrcAddr, Addr>,
    next: u64,
    pub fail: bool,
}

impl MockAv {
    pub fn new() -> Self {
        Self {
            map: HashMap::new(),
            next: 1,
            fail: false,
        }
    }
}

impl AddressVector for MockAv {
    fn resolve_or_insert(&mut self, src: RawSrcAddr) -> Option<Addr> {
        if self.fail {
            return None;
        }
        let next = &mut self.next;
        Some(*self.map.entry(src).or_insert_with(|| {
            let addr = Addr(*next);
            *next += 1;
            addr
        }))
    }
}

/// A distinct raw peer address per index.
pub fn peer(n: u8) -> RawSrcAddr {
    RawSrcAddr {
        ip: Ipv4Addr::new(10, 0, 0, n),
        port: 7000 + n as u16,
    }
}
