//! # softcq - Dual-mode completion queue multiplexer
//!
//! This crate is the completion-delivery core of an RDMA-style network
//! provider: it surfaces asynchronous send/receive/RMA completions from
//! one or more hardware completion sources to the application through a
//! uniform poll/block interface.
//!
//! # Architecture
//!
//! ```text
//!  hardware sources          CompletionQueue
//!  ┌──────────┐   poll   ┌──────────────────────────────────────┐
//!  │ source 0 │─────────►│ hard mode: direct pass-through       │
//!  └──────────┘          │                                      │
//!  ┌──────────┐  drain   │ soft mode:  ┌──────────────────┐     │
//!  │ source 0 │─────────►│             │  SoftRing        │     │
//!  ├──────────┤          │   translate │  head ──► tail   │────►│ caller
//!  │ source 1 │─────────►│             └──────────────────┘     │ buffer
//!  ├──────────┤          │                                      │
//!  │ source N │─────────►│ error slot / in-ring sentinel        │
//!  └──────────┘          └──────────────────────────────────────┘
//! ```
//!
//! - **Hard mode**: exactly one bound source, polled directly; each
//!   completion is translated straight into the caller's buffer.
//! - **Soft mode**: any number of bound sources multiplexed through a
//!   bounded ring of pre-translated entries. Reads drain all sources,
//!   then copy from the ring tail. A full ring drops new entries rather
//!   than overwriting unread ones.
//! - **Blocking reads** spin with exponentially backed-off timed sleeps;
//!   there is no wait object and no internal thread.
//! - **Error completions** park in a single-slot side channel (hard) or
//!   an in-ring sentinel (soft) and are drained through
//!   [`CompletionQueue::read_error`], blocking ordinary reads meanwhile.
//!
//! Completions enter the system through the [`CompletionSource`] trait
//! (the device-queue boundary fed by the message/RMA posting path) or,
//! for software-emulated producers, directly via
//! [`CompletionQueue::post_soft`]. Peer-address resolution for
//! `read_from` is delegated to an [`AddressVector`] collaborator.
//!
//! # Module overview
//!
//! - [`cq`]: queue lifecycle, read family, mode transition
//! - [`ring`]: bounded circular buffer backing soft mode
//! - [`entry`]: output entry shapes and the format translator
//! - [`source`]: hardware-source trait and reference-counted bindings
//! - [`backoff`]: blocking-read sleep schedule
//! - [`addr`]: source-address resolution boundary
//! - [`completion`]: normalized completion records
//! - [`error`]: result codes and provider error codes

pub mod addr;
pub mod backoff;
pub mod completion;
pub mod cq;
pub mod entry;
pub mod error;
pub mod ring;
pub mod source;

pub use addr::{Addr, AddressVector, RawSrcAddr};
pub use completion::{CompletionKind, CompletionRecord, CompletionStatus};
pub use cq::{CloseError, CompletionQueue, CqConfig, WaitObj, MAX_CQE};
pub use entry::{
    CompletionFlags, CqFormat, CtxEntry, DataEntry, EntryBuf, ErrEntry, MsgEntry,
};
pub use error::{Error, ProvErrno, Result};
pub use ring::{SoftEntry, SoftRing};
pub use source::{CompletionSource, EpMode, SourceBinding};
