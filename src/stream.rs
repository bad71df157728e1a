//! Incremental consumption of a response body.
//!
//! Chunks are handed to a [`ChunkHandler`] one at a time, in arrival order,
//! and only then counted towards throughput. The handler's `on_finish` runs
//! after the last `on_chunk` has returned, and `consume` resolves after that,
//! so a caller never observes completion before the final chunk was checked.

use futures::{pin_mut, Stream, StreamExt};
use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use std::fmt::Display;
use std::num::NonZeroU32;
use std::time::Instant;
use tracing::trace;

use crate::error::{ConsumeError, TransferError};
use crate::progress::ProgressSink;

/// Report progress every time this many bytes have arrived since the last report.
pub const DEFAULT_REPORT_EVERY: u64 = 1024 * 1024;

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

pub trait ChunkHandler {
    /// `offset` is the number of bytes consumed before `chunk` in this stream.
    fn on_chunk(&mut self, offset: u64, chunk: &[u8]) -> Result<(), TransferError>;

    /// `true` once the handler needs no further bytes; the consumer then stops
    /// reading and finishes early.
    fn is_done(&self) -> bool {
        false
    }

    /// Called once the stream has ended cleanly, after the last `on_chunk`.
    fn on_finish(&mut self, _total: u64) -> Result<(), TransferError> {
        Ok(())
    }
}

/// Handler for plain timed downloads: nothing to do per chunk.
#[derive(Debug, Default, Clone, Copy)]
pub struct Passthrough;

impl ChunkHandler for Passthrough {
    fn on_chunk(&mut self, _offset: u64, _chunk: &[u8]) -> Result<(), TransferError> {
        Ok(())
    }
}

/// Byte counter that reports a cumulative average speed to a progress sink.
pub struct Throughput<'a> {
    sink: &'a dyn ProgressSink,
    started: Instant,
    consumed: u64,
    since_report: u64,
    report_every: u64,
}

impl<'a> Throughput<'a> {
    pub fn new(sink: &'a dyn ProgressSink, report_every: u64) -> Self {
        Self {
            sink,
            started: Instant::now(),
            consumed: 0,
            since_report: 0,
            report_every: report_every.max(1),
        }
    }

    pub fn consumed(&self) -> u64 {
        self.consumed
    }

    pub fn record(&mut self, n: u64) {
        self.consumed += n;
        self.since_report += n;
        if self.since_report >= self.report_every {
            self.since_report = 0;
            self.report();
        }
    }

    /// MB/sec averaged over the whole phase; `None` before any time has passed.
    pub fn speed(&self) -> Option<f64> {
        let secs = self.started.elapsed().as_secs_f64();
        if secs > 0.0 {
            Some(self.consumed as f64 / BYTES_PER_MB / secs)
        } else {
            None
        }
    }

    pub fn report(&self) {
        self.sink.update(self.consumed, self.speed());
    }
}

/// Caps throughput at a fixed number of bytes per second.
pub struct RateLimit {
    limiter: RateLimiter<NotKeyed, InMemoryState, DefaultClock>,
    burst: NonZeroU32,
}

impl RateLimit {
    pub fn per_second(bytes: NonZeroU32) -> Self {
        Self {
            limiter: RateLimiter::direct(Quota::per_second(bytes)),
            burst: bytes,
        }
    }

    /// Wait until `n` bytes may pass. Chunks larger than one second's budget
    /// are admitted in budget-sized steps.
    pub async fn acquire(&self, n: usize) {
        let mut remaining = n as u64;
        while remaining > 0 {
            let step = remaining.min(u64::from(self.burst.get())) as u32;
            if let Some(step) = NonZeroU32::new(step) {
                if self.limiter.until_n_ready(step).await.is_err() {
                    break;
                }
            }
            remaining -= u64::from(step);
        }
    }
}

pub struct StreamConsumer<'a> {
    throughput: Throughput<'a>,
    limiter: Option<&'a RateLimit>,
}

impl<'a> StreamConsumer<'a> {
    pub fn new(sink: &'a dyn ProgressSink, report_every: u64) -> Self {
        Self {
            throughput: Throughput::new(sink, report_every),
            limiter: None,
        }
    }

    pub fn with_rate_limit(mut self, limiter: Option<&'a RateLimit>) -> Self {
        self.limiter = limiter;
        self
    }

    /// Bytes consumed so far; still valid if a `consume` future was dropped.
    pub fn consumed(&self) -> u64 {
        self.throughput.consumed()
    }

    /// Drain `stream` through `handler`, returning the total bytes consumed.
    ///
    /// A chunk that makes the handler fail still counts as consumed; nothing
    /// after it is read. Reading also stops once the handler reports done.
    pub async fn consume<S, B, E, H>(&mut self, stream: S, handler: &mut H) -> Result<u64, ConsumeError>
    where
        S: Stream<Item = Result<B, E>>,
        B: AsRef<[u8]>,
        E: Display,
        H: ChunkHandler + ?Sized,
    {
        pin_mut!(stream);

        while let Some(item) = stream.next().await {
            let chunk = match item {
                Ok(chunk) => chunk,
                Err(e) => {
                    let consumed = self.consumed();
                    return Err(ConsumeError {
                        consumed,
                        source: TransferError::StreamError {
                            consumed,
                            reason: e.to_string(),
                        },
                    });
                }
            };
            let chunk = chunk.as_ref();

            if let Some(limiter) = self.limiter {
                limiter.acquire(chunk.len()).await;
            }

            let offset = self.consumed();
            trace!(offset, len = chunk.len(), "chunk");
            let handled = handler.on_chunk(offset, chunk);
            self.throughput.record(chunk.len() as u64);
            if let Err(source) = handled {
                return Err(ConsumeError {
                    consumed: self.consumed(),
                    source,
                });
            }
            if handler.is_done() {
                trace!(consumed = self.consumed(), "handler done, leaving rest of stream unread");
                break;
            }
        }

        let total = self.consumed();
        handler
            .on_finish(total)
            .map_err(|source| ConsumeError { consumed: total, source })?;
        self.throughput.report();
        Ok(total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::TransferKind;
    use futures::stream;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingSink {
        updates: Mutex<Vec<u64>>,
    }

    impl ProgressSink for RecordingSink {
        fn start(&self, _kind: TransferKind, _total: u64, _label: &str) {}
        fn update(&self, consumed: u64, _speed: Option<f64>) {
            self.updates.lock().unwrap().push(consumed);
        }
        fn stop(&self) {}
    }

    #[derive(Default)]
    struct Recorder {
        events: Vec<String>,
        fail_at: Option<usize>,
        done_after: Option<usize>,
    }

    impl ChunkHandler for Recorder {
        fn on_chunk(&mut self, offset: u64, chunk: &[u8]) -> Result<(), TransferError> {
            let index = self.events.len();
            self.events.push(format!("chunk {} @{} [{}]", index, offset, chunk[0]));
            if self.fail_at == Some(index) {
                return Err(TransferError::RequestFailed("handler refused".into()));
            }
            Ok(())
        }

        fn is_done(&self) -> bool {
            self.done_after.is_some_and(|n| self.events.len() >= n)
        }

        fn on_finish(&mut self, total: u64) -> Result<(), TransferError> {
            self.events.push(format!("finish {}", total));
            Ok(())
        }
    }

    fn chunks(n: u8, size: usize) -> Vec<Result<Vec<u8>, std::io::Error>> {
        (0..n).map(|i| Ok(vec![i; size])).collect()
    }

    #[tokio::test]
    async fn handler_sees_every_chunk_in_order_before_finish() {
        let sink = RecordingSink::default();
        let mut consumer = StreamConsumer::new(&sink, DEFAULT_REPORT_EVERY);
        let mut recorder = Recorder::default();

        // Yield between chunks so arrival is genuinely asynchronous.
        let body = stream::iter(chunks(50, 10)).then(|c| async move {
            tokio::task::yield_now().await;
            c
        });
        let total = consumer.consume(body, &mut recorder).await.unwrap();

        assert_eq!(total, 500);
        assert_eq!(recorder.events.len(), 51);
        for (i, event) in recorder.events[..50].iter().enumerate() {
            assert_eq!(event, &format!("chunk {} @{} [{}]", i, i * 10, i));
        }
        assert_eq!(recorder.events[50], "finish 500");
    }

    #[tokio::test]
    async fn handler_failure_stops_consumption_and_keeps_count() {
        let sink = RecordingSink::default();
        let mut consumer = StreamConsumer::new(&sink, DEFAULT_REPORT_EVERY);
        let mut recorder = Recorder {
            fail_at: Some(3),
            ..Default::default()
        };

        let err = consumer
            .consume(stream::iter(chunks(10, 100)), &mut recorder)
            .await
            .unwrap_err();

        assert_eq!(err.consumed, 400);
        assert!(matches!(err.source, TransferError::RequestFailed(_)));
        assert_eq!(recorder.events.len(), 4);
        assert!(recorder.events.iter().all(|e| !e.starts_with("finish")));
    }

    #[tokio::test]
    async fn done_handler_stops_reading_and_still_finishes() {
        let sink = RecordingSink::default();
        let mut consumer = StreamConsumer::new(&sink, DEFAULT_REPORT_EVERY);
        let mut recorder = Recorder {
            done_after: Some(2),
            ..Default::default()
        };

        let total = consumer
            .consume(stream::iter(chunks(10, 100)), &mut recorder)
            .await
            .unwrap();

        assert_eq!(total, 200);
        assert_eq!(recorder.events, vec!["chunk 0 @0 [0]", "chunk 1 @100 [1]", "finish 200"]);
    }

    #[tokio::test]
    async fn stream_error_reports_bytes_before_failure() {
        let sink = RecordingSink::default();
        let mut consumer = StreamConsumer::new(&sink, DEFAULT_REPORT_EVERY);
        let mut items = chunks(5, 1024);
        items.push(Err(std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset")));
        items.extend(chunks(5, 1024));

        let err = consumer
            .consume(stream::iter(items), &mut Passthrough)
            .await
            .unwrap_err();

        assert_eq!(err.consumed, 5 * 1024);
        match err.source {
            TransferError::StreamError { consumed, reason } => {
                assert_eq!(consumed, 5 * 1024);
                assert!(reason.contains("reset"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn progress_reported_each_threshold_and_at_end() {
        let sink = RecordingSink::default();
        let mut consumer = StreamConsumer::new(&sink, 1000);
        consumer
            .consume(stream::iter(chunks(25, 100)), &mut Passthrough)
            .await
            .unwrap();
        let updates = sink.updates.lock().unwrap().clone();
        assert_eq!(updates, vec![1000, 2000, 2500]);
    }

    #[tokio::test]
    async fn rate_limit_admits_chunks_larger_than_budget() {
        let limit = RateLimit::per_second(NonZeroU32::new(1_000_000).unwrap());
        let sink = RecordingSink::default();
        let mut consumer = StreamConsumer::new(&sink, DEFAULT_REPORT_EVERY).with_rate_limit(Some(&limit));
        let total = consumer
            .consume(stream::iter(chunks(2, 300_000)), &mut Passthrough)
            .await
            .unwrap();
        assert_eq!(total, 600_000);
    }

    #[test]
    fn speed_is_cumulative_average() {
        let sink = RecordingSink::default();
        let mut throughput = Throughput::new(&sink, DEFAULT_REPORT_EVERY);
        throughput.started = Instant::now() - std::time::Duration::from_secs(2);
        throughput.record(4 * 1024 * 1024);
        let speed = throughput.speed().unwrap();
        assert!((speed - 2.0).abs() < 0.1, "speed was {speed}");
    }
}
