//! Tests for the blocking read path and its backoff-driven timeout.

mod common;

use std::time::{Duration, Instant};

use softcq::{CompletionQueue, CqConfig, CqFormat, CtxEntry, EntryBuf, Error, ProvErrno};

use common::MockSource;

fn open_hard(source: &MockSource) -> CompletionQueue<MockSource> {
    let config = CqConfig {
        size: 64,
        format: Some(CqFormat::Context),
        ..Default::default()
    };
    let mut cq = CompletionQueue::open(&config).expect("open");
    cq.bind_source(source.clone()).expect("bind");
    cq
}

#[test]
fn test_blocking_read_returns_available_data_without_sleeping() {
    let source = MockSource::new();
    source.push_send(1, 0);
    let mut cq = open_hard(&source);

    let start = Instant::now();
    let mut buf = [CtxEntry::default(); 4];
    let n = cq
        .blocking_read(EntryBuf::Context(&mut buf), None)
        .expect("blocking_read");
    assert_eq!(n, 1);
    assert_eq!(buf[0].context, 1);
    assert!(start.elapsed() < Duration::from_millis(50));
}

#[test]
fn test_blocking_read_partial_batch_returns_immediately() {
    let source = MockSource::new();
    source.push_send(1, 0);
    source.push_send(2, 0);
    let mut cq = open_hard(&source);

    // Two of four requested: no waiting for the buffer to fill.
    let start = Instant::now();
    let mut buf = [CtxEntry::default(); 4];
    assert_eq!(
        cq.blocking_read(EntryBuf::Context(&mut buf), None).unwrap(),
        2
    );
    assert!(start.elapsed() < Duration::from_millis(50));
}

#[test]
fn test_zero_timeout_makes_exactly_one_attempt() {
    let source = MockSource::new();
    let mut cq = open_hard(&source);

    let mut buf = [CtxEntry::default(); 4];
    assert_eq!(
        cq.blocking_read(EntryBuf::Context(&mut buf), Some(Duration::ZERO)),
        Err(Error::Again)
    );
    assert_eq!(source.poll_count(), 1);
}

#[test]
fn test_timeout_expires_after_roughly_the_requested_duration() {
    let source = MockSource::new();
    let mut cq = open_hard(&source);

    let limit = Duration::from_millis(10);
    let start = Instant::now();
    let mut buf = [CtxEntry::default(); 4];
    assert_eq!(
        cq.blocking_read(EntryBuf::Context(&mut buf), Some(limit)),
        Err(Error::Again)
    );
    let elapsed = start.elapsed();
    // Sleeps accumulate to at least the limit; the last interval is capped
    // at 5ms so the overshoot stays small. Loose bounds for CI jitter.
    assert!(elapsed >= limit);
    assert!(elapsed < Duration::from_millis(500));

    // The source was polled more than once along the way.
    assert!(source.poll_count() > 1);
}

#[test]
fn test_blocking_read_with_pending_error() {
    let source = MockSource::new();
    source.push_error(9, ProvErrno::Timeout);
    let mut cq = open_hard(&source);

    let mut buf = [CtxEntry::default(); 1];
    assert_eq!(cq.read(EntryBuf::Context(&mut buf)), Err(Error::ErrorPending));

    // The parked error short-circuits the blocking path.
    let start = Instant::now();
    assert_eq!(
        cq.blocking_read(EntryBuf::Context(&mut buf), None),
        Err(Error::ErrorPending)
    );
    assert!(start.elapsed() < Duration::from_millis(50));
}

#[test]
fn test_blocking_read_on_soft_queue() {
    let source = MockSource::new();
    let mut cq = open_hard(&source);
    cq.convert_to_soft(8).expect("convert");
    source.push_send(4, 0);

    let mut buf = [CtxEntry::default(); 2];
    let n = cq
        .blocking_read(EntryBuf::Context(&mut buf), Some(Duration::from_millis(10)))
        .expect("blocking_read");
    assert_eq!(n, 1);
    assert_eq!(buf[0].context, 4);
}
