//! Shipping drained batches to the sink, with disk fallback on failure.
//!
//! Every non-empty batch ends in exactly one terminal state:
//!
//! ```text
//! ACCUMULATING → DRAINED → SHIPPING ─┬→ SHIPPED
//!                                    ├→ FALLBACK_WRITTEN
//!                                    └→ DROPPED
//! ```
//!
//! A batch is never split and never returned to the accumulator. There is no
//! automatic retry against the sink; fallback files are replayed by an
//! operator.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::buffer::Batch;
use crate::fallback::FallbackStore;
use crate::naming::DestinationNamer;
use crate::sink::DocumentSink;

/// What caused a flush.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FlushTrigger {
    /// The buffer reached its size threshold during an append.
    Size,
    /// The periodic flush worker fired.
    Interval,
    /// A caller invoked `flush_now`.
    Explicit,
    /// The final flush during shutdown.
    Shutdown,
}

impl fmt::Display for FlushTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Size => "size",
            Self::Interval => "interval",
            Self::Explicit => "explicit",
            Self::Shutdown => "shutdown",
        })
    }
}

/// Terminal state of one ship attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShipOutcome {
    /// Nothing was pending; the sink was not called.
    Empty,
    /// The sink accepted the batch.
    Shipped {
        /// Destination the batch was shipped to.
        destination: String,
        /// Number of documents shipped.
        count: usize,
    },
    /// The sink failed and the batch was written to a fallback file.
    FallbackWritten {
        /// Destination the batch was meant for.
        destination: String,
        /// Number of documents written.
        count: usize,
        /// The new fallback file.
        path: PathBuf,
    },
    /// The sink failed and the batch was lost.
    Dropped {
        /// Destination the batch was meant for.
        destination: String,
        /// Number of documents lost.
        count: usize,
        /// Why the batch could not be shipped or saved.
        reason: String,
    },
}

impl ShipOutcome {
    /// Returns `true` if the sink did not accept the batch.
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::FallbackWritten { .. } | Self::Dropped { .. })
    }

    /// Number of documents in the batch.
    pub fn count(&self) -> usize {
        match self {
            Self::Empty => 0,
            Self::Shipped { count, .. }
            | Self::FallbackWritten { count, .. }
            | Self::Dropped { count, .. } => *count,
        }
    }

    /// Destination the batch was addressed to, if there was a batch.
    pub fn destination(&self) -> Option<&str> {
        match self {
            Self::Empty => None,
            Self::Shipped { destination, .. }
            | Self::FallbackWritten { destination, .. }
            | Self::Dropped { destination, .. } => Some(destination),
        }
    }
}

/// Point-in-time copy of the shipper's counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ShipStats {
    /// Non-empty flushes caused by the size threshold.
    pub size_flushes: u64,
    /// Non-empty flushes caused by the periodic worker.
    pub interval_flushes: u64,
    /// Non-empty flushes requested through `flush_now`.
    pub explicit_flushes: u64,
    /// Non-empty flushes performed at shutdown.
    pub shutdown_flushes: u64,
    /// Documents accepted by the sink.
    pub documents_shipped: u64,
    /// Documents written to fallback files.
    pub documents_fallback: u64,
    /// Documents lost.
    pub documents_dropped: u64,
}

impl ShipStats {
    /// Total non-empty flushes.
    pub fn flushes(&self) -> u64 {
        self.size_flushes + self.interval_flushes + self.explicit_flushes + self.shutdown_flushes
    }
}

#[derive(Debug, Default)]
struct Counters {
    size_flushes: AtomicU64,
    interval_flushes: AtomicU64,
    explicit_flushes: AtomicU64,
    shutdown_flushes: AtomicU64,
    documents_shipped: AtomicU64,
    documents_fallback: AtomicU64,
    documents_dropped: AtomicU64,
}

impl Counters {
    fn flush(&self, trigger: FlushTrigger) {
        let counter = match trigger {
            FlushTrigger::Size => &self.size_flushes,
            FlushTrigger::Interval => &self.interval_flushes,
            FlushTrigger::Explicit => &self.explicit_flushes,
            FlushTrigger::Shutdown => &self.shutdown_flushes,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn add(counter: &AtomicU64, count: usize) {
        counter.fetch_add(count as u64, Ordering::Relaxed);
    }

    fn snapshot(&self) -> ShipStats {
        ShipStats {
            size_flushes: self.size_flushes.load(Ordering::Relaxed),
            interval_flushes: self.interval_flushes.load(Ordering::Relaxed),
            explicit_flushes: self.explicit_flushes.load(Ordering::Relaxed),
            shutdown_flushes: self.shutdown_flushes.load(Ordering::Relaxed),
            documents_shipped: self.documents_shipped.load(Ordering::Relaxed),
            documents_fallback: self.documents_fallback.load(Ordering::Relaxed),
            documents_dropped: self.documents_dropped.load(Ordering::Relaxed),
        }
    }
}

/// Ships batches to a sink, falling back to disk on failure.
///
/// Safe to call from several threads at once: each call names its own
/// destination, makes its own sink call and writes its own fallback file.
pub struct Shipper {
    namer: DestinationNamer,
    sink: Arc<dyn DocumentSink>,
    fallback: Option<FallbackStore>,
    counters: Counters,
}

impl fmt::Debug for Shipper {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Shipper")
            .field("namer", &self.namer)
            .field("fallback", &self.fallback)
            .field("counters", &self.counters)
            .finish_non_exhaustive()
    }
}

impl Shipper {
    /// Creates a shipper.
    pub fn new(
        namer: DestinationNamer,
        sink: Arc<dyn DocumentSink>,
        fallback: Option<FallbackStore>,
    ) -> Self {
        Self {
            namer,
            sink,
            fallback,
            counters: Counters::default(),
        }
    }

    /// The destination namer.
    pub fn namer(&self) -> &DestinationNamer {
        &self.namer
    }

    /// The sink batches are submitted to.
    pub fn sink(&self) -> &dyn DocumentSink {
        self.sink.as_ref()
    }

    /// Current counter values.
    pub fn stats(&self) -> ShipStats {
        self.counters.snapshot()
    }

    /// Ships `batch`, taking ownership of it.
    ///
    /// The destination is computed now, at ship time. Sink and fallback
    /// failures are logged and reported in the returned outcome; this never
    /// panics or returns an error.
    pub fn ship(&self, batch: Batch, trigger: FlushTrigger) -> ShipOutcome {
        if batch.is_empty() {
            return ShipOutcome::Empty;
        }

        self.counters.flush(trigger);
        let destination = self.namer.name_now();
        let count = batch.len();

        match self.sink.submit(&destination, &batch) {
            Ok(()) => {
                Counters::add(&self.counters.documents_shipped, count);
                tracing::debug!(%destination, count, %trigger, "shipped batch");
                ShipOutcome::Shipped { destination, count }
            }
            Err(err) => {
                tracing::warn!(%destination, count, %trigger, error = %err, "sink rejected batch");
                self.fall_back(destination, &batch, &err.to_string())
            }
        }
    }

    fn fall_back(&self, destination: String, batch: &Batch, sink_error: &str) -> ShipOutcome {
        let count = batch.len();

        let Some(fallback) = &self.fallback else {
            Counters::add(&self.counters.documents_dropped, count);
            tracing::error!(%destination, count, "no fallback directory configured, batch dropped");
            return ShipOutcome::Dropped {
                destination,
                count,
                reason: sink_error.to_string(),
            };
        };

        match fallback.write_batch(self.namer.prefix(), batch) {
            Ok(path) => {
                Counters::add(&self.counters.documents_fallback, count);
                tracing::warn!(%destination, count, path = %path.display(), "batch written to fallback file");
                ShipOutcome::FallbackWritten {
                    destination,
                    count,
                    path,
                }
            }
            Err(err) => {
                Counters::add(&self.counters.documents_dropped, count);
                tracing::error!(%destination, count, error = %err, "fallback write failed, batch dropped");
                ShipOutcome::Dropped {
                    destination,
                    count,
                    reason: format!("{sink_error}; {err}"),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    use serde_json::{Map, json};
    use tempfile::tempdir;

    use crate::document::Document;
    use crate::error::SinkError;
    use crate::naming::RotationFrequency;
    use crate::sink::MemorySink;

    struct FailingSink {
        calls: AtomicUsize,
    }

    impl FailingSink {
        fn new() -> Self {
            Self {
                calls: AtomicUsize::new(0),
            }
        }
    }

    impl DocumentSink for FailingSink {
        fn submit(&self, _destination: &str, _documents: &[Document]) -> Result<(), SinkError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(SinkError::Unreachable {
                reason: "connection refused".to_string(),
            })
        }
    }

    fn batch(n: u64) -> Batch {
        (0..n)
            .map(|i| {
                let mut fields = Map::new();
                fields.insert("seq".to_string(), json!(i));
                Document::from_fields(fields)
            })
            .collect()
    }

    fn namer() -> DestinationNamer {
        DestinationNamer::new("metrics", RotationFrequency::Never)
    }

    #[test]
    fn test_empty_batch_skips_sink() {
        let sink = Arc::new(FailingSink::new());
        let shipper = Shipper::new(namer(), sink.clone(), None);

        let outcome = shipper.ship(Vec::new(), FlushTrigger::Explicit);

        assert_eq!(outcome, ShipOutcome::Empty);
        assert_eq!(sink.calls.load(Ordering::SeqCst), 0);
        assert_eq!(shipper.stats(), ShipStats::default());
    }

    #[test]
    fn test_successful_ship() {
        let sink = Arc::new(MemorySink::new());
        let shipper = Shipper::new(namer(), sink.clone(), None);

        let outcome = shipper.ship(batch(4), FlushTrigger::Size);

        assert_eq!(
            outcome,
            ShipOutcome::Shipped {
                destination: "metrics".to_string(),
                count: 4
            }
        );
        assert!(!outcome.is_failure());
        assert_eq!(sink.submissions()[0].documents, batch(4));
        let stats = shipper.stats();
        assert_eq!(stats.size_flushes, 1);
        assert_eq!(stats.documents_shipped, 4);
    }

    #[test]
    fn test_failure_with_fallback() {
        let dir = tempdir().unwrap();
        let shipper = Shipper::new(
            namer(),
            Arc::new(FailingSink::new()),
            Some(FallbackStore::new(dir.path())),
        );

        let outcome = shipper.ship(batch(3), FlushTrigger::Explicit);

        let ShipOutcome::FallbackWritten { count, path, .. } = &outcome else {
            panic!("expected fallback, got {outcome:?}");
        };
        assert_eq!(*count, 3);
        assert!(outcome.is_failure());
        assert_eq!(FallbackStore::read_batch(path).unwrap(), batch(3));
        assert_eq!(shipper.stats().documents_fallback, 3);
    }

    #[test]
    fn test_failure_without_fallback_drops() {
        let shipper = Shipper::new(namer(), Arc::new(FailingSink::new()), None);

        let outcome = shipper.ship(batch(2), FlushTrigger::Interval);

        assert!(matches!(
            &outcome,
            ShipOutcome::Dropped { count: 2, reason, .. } if reason.contains("connection refused")
        ));
        assert_eq!(shipper.stats().documents_dropped, 2);
        assert_eq!(shipper.stats().interval_flushes, 1);
    }

    #[test]
    fn test_fallback_write_failure_drops() {
        let dir = tempdir().unwrap();
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, "x").unwrap();
        let shipper = Shipper::new(
            namer(),
            Arc::new(FailingSink::new()),
            Some(FallbackStore::new(&blocker)),
        );

        let outcome = shipper.ship(batch(2), FlushTrigger::Shutdown);

        assert!(matches!(outcome, ShipOutcome::Dropped { count: 2, .. }));
        assert_eq!(shipper.stats().documents_dropped, 2);
    }

    #[test]
    fn test_concurrent_ships() {
        let sink = Arc::new(MemorySink::new());
        let shipper = Arc::new(Shipper::new(namer(), sink.clone(), None));

        let threads: Vec<_> = (0..4)
            .map(|_| {
                let shipper = Arc::clone(&shipper);
                std::thread::spawn(move || {
                    for _ in 0..25 {
                        shipper.ship(batch(2), FlushTrigger::Size);
                    }
                })
            })
            .collect();
        for t in threads {
            t.join().unwrap();
        }

        assert_eq!(sink.submissions().len(), 100);
        assert_eq!(shipper.stats().documents_shipped, 200);
    }
}
