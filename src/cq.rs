//! Completion queue core.
//!
//! A queue starts in **hard** mode: it is backed by at most one hardware
//! source and reads pass completions straight through the format
//! translator into the caller's buffer. [`convert_to_soft`] upgrades it to
//! **soft** mode, where any number of sources are multiplexed through a
//! bounded ring of pre-translated entries; reads drain the sources into
//! the ring and then copy from it. Conversions only ever go hard to soft.
//!
//! Error completions never mix into the ordinary entry stream. In hard
//! mode the most recent error parks in a single-slot side channel; in soft
//! mode it becomes a sentinel slot inside the ring. Either way ordinary
//! reads fail with [`Error::ErrorPending`] until
//! [`read_error`](CompletionQueue::read_error) drains the record.
//!
//! All operations run synchronously on the calling thread and assume a
//! single reader per queue. The blocking read suspends cooperatively via
//! timed sleeps with exponential backoff; it never parks on a condition
//! variable.

use std::rc::Rc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::thread;
use std::time::Duration;

use tracing::{trace, warn};

use crate::addr::{Addr, AddressVector};
use crate::backoff::Backoff;
use crate::completion::CompletionKind;
use crate::entry::{adjusted_len, flags_for, CompletionFlags, CqFormat, CtxEntry, EntryBuf, ErrEntry};
use crate::error::{Error, ProvErrno, Result};
use crate::ring::{SoftEntry, SoftRing};
use crate::source::{CompletionSource, SourceBinding};

/// Provider maximum for queue capacity.
pub const MAX_CQE: usize = 65535;

/// Wait object selector. Only [`WaitObj::None`] is supported; the queue is
/// purely poll-driven.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WaitObj {
    /// No wait object, poll-only.
    #[default]
    None,
    /// File-descriptor wait object (unsupported).
    Fd,
    /// Wait-set membership (unsupported).
    Set,
    /// Mutex/condvar pair (unsupported).
    MutexCond,
}

/// Queue creation attributes.
#[derive(Debug, Clone, Default)]
pub struct CqConfig {
    /// Requested capacity; zero means "use the provider maximum".
    pub size: usize,
    /// Output entry format; `None` defaults to [`CqFormat::Context`].
    pub format: Option<CqFormat>,
    /// Wait object selector.
    pub wait_obj: WaitObj,
}

/// Most recent error completion, parked until the error-read path drains it.
#[derive(Debug, Clone, Copy)]
struct PendingError {
    context: u64,
    errno: ProvErrno,
}

/// Mode-dependent queue state. An explicit tag, so mode tests never rely
/// on comparing dispatch-table identities.
#[derive(Debug)]
enum CqState<S> {
    Hard {
        binding: Option<Rc<SourceBinding<S>>>,
    },
    Soft {
        ring: SoftRing,
        sources: Vec<Rc<SourceBinding<S>>>,
    },
}

/// Dual-mode completion queue, generic over the hardware source type.
#[derive(Debug)]
pub struct CompletionQueue<S: CompletionSource> {
    format: CqFormat,
    capacity: usize,
    refs: AtomicU32,
    error_slot: Option<PendingError>,
    state: CqState<S>,
}

impl<S: CompletionSource> CompletionQueue<S> {
    /// Open a queue from creation attributes.
    ///
    /// The capacity and format are fixed for the queue's lifetime. The
    /// queue starts in hard mode with no bound source.
    pub fn open(config: &CqConfig) -> Result<Self> {
        trace!(?config, "cq open");

        if config.wait_obj != WaitObj::None {
            return Err(Error::Unsupported);
        }
        if config.size > MAX_CQE {
            return Err(Error::Invalid);
        }
        let capacity = if config.size == 0 {
            MAX_CQE
        } else {
            config.size
        };
        let format = config.format.unwrap_or(CqFormat::Context);

        Ok(Self {
            format,
            capacity,
            refs: AtomicU32::new(0),
            error_slot: None,
            state: CqState::Hard { binding: None },
        })
    }

    /// Output format fixed at open time.
    pub fn format(&self) -> CqFormat {
        self.format
    }

    /// Queue capacity (ring capacity once converted to soft mode).
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Whether the queue runs in soft (ring-buffered) mode.
    pub fn is_soft(&self) -> bool {
        matches!(self.state, CqState::Soft { .. })
    }

    /// Take an outstanding reference on the queue (an endpoint binding).
    pub fn retain(&self) {
        self.refs.fetch_add(1, Ordering::Relaxed);
    }

    /// Drop an outstanding reference, returning the remaining count.
    pub fn release(&self) -> u32 {
        let prev = self.refs.fetch_sub(1, Ordering::AcqRel);
        debug_assert!(prev > 0, "release without matching retain");
        prev - 1
    }

    /// Current outstanding-reference count.
    pub fn outstanding_refs(&self) -> u32 {
        self.refs.load(Ordering::Acquire)
    }

    /// Bind a hardware source to the queue.
    ///
    /// A hard queue owns exactly one source and fails with
    /// [`Error::Busy`] if one is already bound; a soft queue appends the
    /// source to its multiplexing set. The returned binding handle is
    /// shared with the queue.
    pub fn bind_source(&mut self, source: S) -> Result<Rc<SourceBinding<S>>> {
        let binding = Rc::new(SourceBinding::new(source));
        match &mut self.state {
            CqState::Hard { binding: slot } => {
                if slot.is_some() {
                    return Err(Error::Busy);
                }
                *slot = Some(Rc::clone(&binding));
            }
            CqState::Soft { sources, .. } => sources.push(Rc::clone(&binding)),
        }
        Ok(binding)
    }

    /// Convert a hard queue to soft mode with a ring of `capacity` slots.
    ///
    /// An already-bound source is carried into the multiplexing set as its
    /// first member; moving the shared binding preserves its reference
    /// count. Allocation failure leaves the queue unchanged in hard mode.
    /// Converting an already-soft queue is a no-op success and never
    /// reallocates.
    pub fn convert_to_soft(&mut self, capacity: usize) -> Result<()> {
        if self.is_soft() {
            return Ok(());
        }

        // Allocate before touching any queue state so failure is clean.
        let ring = SoftRing::new(capacity)?;

        let binding = match &mut self.state {
            CqState::Hard { binding } => binding.take(),
            CqState::Soft { .. } => None,
        };
        let mut sources = Vec::new();
        if let Some(b) = binding {
            sources.push(b);
        }

        self.capacity = capacity;
        self.state = CqState::Soft { ring, sources };
        trace!(capacity, "cq converted to soft mode");
        Ok(())
    }

    /// Read up to `buf.capacity()` completions without blocking.
    ///
    /// Returns the number of entries written (possibly fewer than
    /// requested), [`Error::Again`] when nothing was available, or
    /// [`Error::ErrorPending`] when an error completion blocks the queue.
    pub fn read(&mut self, buf: EntryBuf<'_>) -> Result<usize> {
        if self.error_slot.is_some() {
            return Err(Error::ErrorPending);
        }
        if buf.format() != self.format {
            warn!(
                configured = ?self.format,
                supplied = ?buf.format(),
                "unexpected CQ entry format"
            );
            return Err(Error::Unsupported);
        }
        match self.state {
            CqState::Hard { .. } => self.read_hard(buf),
            CqState::Soft { .. } => {
                self.drain();
                self.read_soft(buf)
            }
        }
    }

    /// Hard-mode read: poll the bound source directly, translating each
    /// successful completion into the caller buffer.
    fn read_hard(&mut self, mut buf: EntryBuf<'_>) -> Result<usize> {
        let binding = match &self.state {
            CqState::Hard { binding: Some(b) } => Rc::clone(b),
            _ => return Err(Error::Again),
        };
        let mode = binding.mode();
        let count = buf.capacity();
        let mut collected = 0;

        while collected < count {
            let Some(rec) = binding.poll() else { break };
            if rec.is_error() {
                // Park the error; with prior progress it is deferred to
                // the next call, otherwise it blocks this one.
                self.error_slot = Some(PendingError {
                    context: rec.context,
                    errno: rec.prov_errno(),
                });
                if collected > 0 {
                    break;
                }
                return Err(Error::ErrorPending);
            }
            buf.write_record(collected, &rec, mode)?;
            collected += 1;
        }

        if collected > 0 {
            Ok(collected)
        } else {
            Err(Error::Again)
        }
    }

    /// Soft-mode read: copy pre-translated entries from the ring tail.
    fn read_soft(&mut self, mut buf: EntryBuf<'_>) -> Result<usize> {
        let CqState::Soft { ring, .. } = &mut self.state else {
            return Err(Error::Again);
        };
        let count = buf.capacity();
        let mut collected = 0;

        while collected < count {
            let Some(slot) = ring.peek().copied() else { break };
            if slot.prov_errno > 0 {
                // Error sentinel: stop here, leave it for read_error.
                if collected > 0 {
                    break;
                }
                return Err(Error::ErrorPending);
            }
            write_soft_entry(&mut buf, collected, &slot)?;
            ring.advance();
            collected += 1;
        }

        if collected > 0 {
            Ok(collected)
        } else {
            Err(Error::Again)
        }
    }

    /// Drain every bound source into the ring (soft mode only).
    ///
    /// Also serves as the domain-progress step: an external progress loop
    /// may call this to move completions into the ring without reading.
    /// A full ring drops newly drained entries.
    pub fn drain(&mut self) {
        let CqState::Soft { ring, sources } = &mut self.state else {
            return;
        };
        for binding in sources.iter() {
            let mode = binding.mode();
            while let Some(rec) = binding.poll() {
                let slot = if rec.is_error() {
                    SoftEntry {
                        context: rec.context,
                        prov_errno: rec.prov_errno() as u32,
                        ..Default::default()
                    }
                } else {
                    SoftEntry {
                        context: rec.context,
                        flags: flags_for(rec.kind),
                        len: adjusted_len(rec.kind, rec.bytes, mode),
                        buf: 0,
                        data: 0,
                        prov_errno: 0,
                    }
                };
                if !ring.push(slot) {
                    // Full: the new entry is dropped and this source stops
                    // draining until the reader frees slots.
                    break;
                }
            }
        }
    }

    /// Post a completion directly into the soft ring.
    ///
    /// This is the producer boundary for paths that deliver completions
    /// without going through a hardware source (e.g. software-emulated
    /// RMA). `errno` above `Success` posts an error sentinel. Posted
    /// entries carry no operation flags. Fails with
    /// [`Error::Unsupported`] on a hard queue; a full ring silently drops
    /// the entry.
    pub fn post_soft(&mut self, context: u64, len: usize, errno: ProvErrno) -> Result<()> {
        let CqState::Soft { ring, .. } = &mut self.state else {
            return Err(Error::Unsupported);
        };
        ring.push(SoftEntry {
            context,
            len,
            prov_errno: errno as u32,
            ..Default::default()
        });
        Ok(())
    }

    /// Read completions and resolve the peer address of each receive.
    ///
    /// Only hard-mode, context-format queues support this. For every
    /// receive completion the source's parsed headers are mapped through
    /// the address vector; unmappable peers yield
    /// [`Addr::NOT_AVAILABLE`] in `src_addrs` instead of failing the
    /// call. `src_addrs` is advanced only for receive completions.
    pub fn read_from<A: AddressVector>(
        &mut self,
        entries: &mut [CtxEntry],
        src_addrs: &mut [Addr],
        av: &mut A,
    ) -> Result<usize> {
        if self.format != CqFormat::Context {
            return Err(Error::Unsupported);
        }
        if self.error_slot.is_some() {
            return Err(Error::ErrorPending);
        }
        let binding = match &self.state {
            CqState::Hard { binding: Some(b) } => Rc::clone(b),
            CqState::Hard { binding: None } => return Err(Error::Again),
            CqState::Soft { .. } => return Err(Error::Unsupported),
        };

        let mut collected = 0;
        let mut resolved = 0;
        while collected < entries.len() {
            let Some(rec) = binding.poll() else { break };
            if rec.is_error() {
                self.error_slot = Some(PendingError {
                    context: rec.context,
                    errno: rec.prov_errno(),
                });
                if collected > 0 {
                    break;
                }
                return Err(Error::ErrorPending);
            }

            if rec.kind == CompletionKind::Recv {
                let addr = binding
                    .last_recv_src()
                    .and_then(|raw| av.resolve_or_insert(raw))
                    .unwrap_or(Addr::NOT_AVAILABLE);
                if let Some(slot) = src_addrs.get_mut(resolved) {
                    *slot = addr;
                }
                resolved += 1;
            }

            entries[collected].context = rec.context;
            collected += 1;
        }

        if collected > 0 {
            Ok(collected)
        } else {
            Err(Error::Again)
        }
    }

    /// Read completions, blocking until at least one arrives or the
    /// timeout elapses.
    ///
    /// Repeats the non-blocking read with an exponentially backed-off
    /// sleep between attempts. `None` blocks indefinitely;
    /// `Some(Duration::ZERO)` makes exactly one attempt. A partial batch
    /// returns immediately without sleeping.
    pub fn blocking_read(
        &mut self,
        mut buf: EntryBuf<'_>,
        timeout: Option<Duration>,
    ) -> Result<usize> {
        if self.error_slot.is_some() {
            return Err(Error::ErrorPending);
        }

        let mut backoff = Backoff::new();
        let mut spent = Duration::ZERO;
        loop {
            match self.read(buf.reborrow()) {
                Err(Error::Again) => {
                    if let Some(limit) = timeout {
                        if spent >= limit {
                            return Err(Error::Again);
                        }
                    }
                    let interval = backoff.next_interval();
                    thread::sleep(interval);
                    spent += interval;
                }
                other => return other,
            }
        }
    }

    /// Drain the pending error completion.
    ///
    /// Hard mode consumes the single error slot; soft mode consumes an
    /// error sentinel at the ring tail, so per-source errors are
    /// decoupled from the shared ring ordering. With no error pending the
    /// call fails with [`Error::Again`].
    pub fn read_error(&mut self) -> Result<ErrEntry> {
        trace!("cq read_error");

        if let CqState::Soft { ring, .. } = &mut self.state {
            if let Some(slot) = ring.peek() {
                if slot.prov_errno > 0 {
                    let entry = ErrEntry {
                        context: slot.context,
                        flags: CompletionFlags::empty(),
                        prov_errno: ProvErrno::from_u32(slot.prov_errno),
                    };
                    ring.advance();
                    return Ok(entry);
                }
            }
            // A hard-mode error parked before conversion may still sit in
            // the slot; fall through to it.
        }

        let pending = self.error_slot.take().ok_or(Error::Again)?;
        Ok(ErrEntry {
            context: pending.context,
            flags: CompletionFlags::empty(),
            prov_errno: pending.errno,
        })
    }

    /// Reserved control interface; always fails with
    /// [`Error::Unsupported`].
    pub fn control(&mut self, _command: u32) -> Result<()> {
        trace!("cq control");
        Err(Error::Unsupported)
    }

    /// Describe a provider error code.
    pub fn describe_error(errno: ProvErrno) -> &'static str {
        errno.describe()
    }

    /// Close the queue, tearing down its bindings.
    ///
    /// Fails with [`Error::Busy`] while the queue's outstanding-reference
    /// count is nonzero or, in soft mode, while any binding still has
    /// references; the queue is returned intact inside the error so the
    /// caller can retry after releasing.
    pub fn close(self) -> std::result::Result<(), CloseError<S>> {
        trace!("cq close");

        if self.outstanding_refs() > 0 {
            return Err(CloseError::new(self, Error::Busy));
        }
        if let CqState::Soft { sources, .. } = &self.state {
            if sources.iter().any(|b| b.ref_count() > 0) {
                return Err(CloseError::new(self, Error::Busy));
            }
        }
        Ok(())
    }
}

/// Copy one ring slot into the caller buffer at `idx`.
fn write_soft_entry(buf: &mut EntryBuf<'_>, idx: usize, slot: &SoftEntry) -> Result<()> {
    match buf {
        EntryBuf::Context(s) => {
            let entry = s.get_mut(idx).ok_or(Error::Invalid)?;
            entry.context = slot.context;
        }
        EntryBuf::Msg(s) => {
            let entry = s.get_mut(idx).ok_or(Error::Invalid)?;
            entry.context = slot.context;
            entry.flags = slot.flags;
            entry.len = slot.len;
        }
        EntryBuf::Data(s) => {
            let entry = s.get_mut(idx).ok_or(Error::Invalid)?;
            entry.context = slot.context;
            entry.flags = slot.flags;
            entry.len = slot.len;
            entry.buf = slot.buf;
            entry.data = slot.data;
        }
    }
    Ok(())
}

/// Failed close that hands the queue back for retry.
///
/// Closing is refused while references are outstanding; the queue and all
/// of its resources are left intact and returned to the caller.
pub struct CloseError<S: CompletionSource> {
    queue: CompletionQueue<S>,
    kind: Error,
}

impl<S: CompletionSource> CloseError<S> {
    fn new(queue: CompletionQueue<S>, kind: Error) -> Self {
        Self { queue, kind }
    }

    /// Why the close failed.
    pub fn kind(&self) -> Error {
        self.kind
    }

    /// Recover the intact queue.
    pub fn into_inner(self) -> CompletionQueue<S> {
        self.queue
    }
}

impl<S: CompletionSource> std::fmt::Debug for CloseError<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CloseError").field("kind", &self.kind).finish()
    }
}

impl<S: CompletionSource> std::fmt::Display for CloseError<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "close failed: {}", self.kind)
    }
}

impl<S: CompletionSource> std::error::Error for CloseError<S> {}
