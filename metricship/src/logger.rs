//! The caller-facing logger and its flush lifecycle.
//!
//! # Design
//!
//! A [`MetricsLogger`] owns:
//! - the batch accumulator, shared with
//! - one background worker thread that flushes every `flush_interval`,
//! - the shipper both flush paths funnel into.
//!
//! Appends from any thread take the accumulator lock briefly. When an append
//! fills the buffer, the appending thread ships the drained batch itself,
//! outside the lock. The worker does the same on every tick. The two paths may
//! ship concurrently.
//!
//! [`MetricsLogger::shutdown`] signals the worker, waits for it to exit, then
//! performs one last flush, so no timer tick can interleave with the final
//! flush. Dropping the logger calls `shutdown`; documents are only at risk if
//! the process exits without the logger being dropped (for example via
//! `std::process::exit`).
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use metricship::config::ShipperConfig;
//! use metricship::logger::MetricsLogger;
//! use metricship::sink::MemorySink;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let sink = Arc::new(MemorySink::new());
//! let logger = MetricsLogger::new(ShipperConfig::new("app_metrics"), sink.clone())?;
//!
//! {
//!     let _timer = logger.record_timed_operation("db.query");
//!     // ... timed work ...
//! }
//!
//! let outcome = logger.shutdown();
//! assert_eq!(outcome.count(), 1);
//! assert_eq!(sink.document_count(), 1);
//! # Ok(())
//! # }
//! ```

use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use chrono::{DateTime, Local};

use crate::buffer::Accumulator;
use crate::config::ShipperConfig;
use crate::document::Document;
use crate::enrich::{EnvSource, ProcessEnv};
use crate::error::{Result, ShipError};
use crate::fallback::FallbackStore;
use crate::record::{RecordBuilder, TimedMeasurement};
use crate::shipper::{FlushTrigger, ShipOutcome, ShipStats, Shipper};
use crate::sink::DocumentSink;

/// Name of the background flush thread.
const WORKER_THREAD_NAME: &str = "metricship-flush";

/// State shared between caller threads and the flush worker.
#[derive(Debug)]
struct Shared {
    accumulator: Accumulator,
    builder: RecordBuilder,
    shipper: Shipper,
}

impl Shared {
    fn append(&self, document: Document) {
        if let Some(batch) = self.accumulator.append(document) {
            self.shipper.ship(batch, FlushTrigger::Size);
        }
    }

    fn flush(&self, trigger: FlushTrigger) -> ShipOutcome {
        self.shipper.ship(self.accumulator.drain(), trigger)
    }
}

/// Handle to the running flush worker.
#[derive(Debug)]
struct FlushWorker {
    stop: mpsc::Sender<()>,
    handle: JoinHandle<()>,
}

impl FlushWorker {
    fn spawn(shared: Arc<Shared>, interval: Duration) -> Result<Self> {
        let (stop, stop_rx) = mpsc::channel();
        let handle = std::thread::Builder::new()
            .name(WORKER_THREAD_NAME.to_string())
            .spawn(move || run_worker(&shared, interval, &stop_rx))
            .map_err(|e| ShipError::WorkerSpawn { source: e })?;
        Ok(Self { stop, handle })
    }

    /// Signals the worker and waits for it to exit.
    fn stop(self) {
        // The worker may already be gone; a closed channel stops it as well.
        let _ = self.stop.send(());
        if self.handle.join().is_err() {
            tracing::error!("flush worker panicked");
        }
    }
}

fn run_worker(shared: &Shared, interval: Duration, stop: &mpsc::Receiver<()>) {
    tracing::debug!(?interval, "flush worker started");
    loop {
        match stop.recv_timeout(interval) {
            Err(RecvTimeoutError::Timeout) => {
                shared.flush(FlushTrigger::Interval);
            }
            Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
        }
    }
    tracing::debug!("flush worker stopped");
}

/// Buffers timed-operation documents and ships them in the background.
///
/// # Thread Safety
///
/// `MetricsLogger` is `Sync`: share it by reference or behind an `Arc` and
/// record from any thread.
#[derive(Debug)]
pub struct MetricsLogger {
    config: ShipperConfig,
    shared: Arc<Shared>,
    worker: Mutex<Option<FlushWorker>>,
}

impl MetricsLogger {
    /// Validates `config` and starts a logger shipping to `sink`.
    ///
    /// Environment-resolved fields are read from the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`ShipError::Config`] if the config is invalid, or
    /// [`ShipError::WorkerSpawn`] if the flush thread cannot be started.
    pub fn new(config: ShipperConfig, sink: Arc<dyn DocumentSink>) -> Result<Self> {
        Self::with_env_source(config, sink, Arc::new(ProcessEnv))
    }

    /// Like [`MetricsLogger::new`], resolving environment fields through `env`.
    ///
    /// # Errors
    ///
    /// Returns [`ShipError::Config`] if the config is invalid, or
    /// [`ShipError::WorkerSpawn`] if the flush thread cannot be started.
    pub fn with_env_source(
        config: ShipperConfig,
        sink: Arc<dyn DocumentSink>,
        env: Arc<dyn EnvSource>,
    ) -> Result<Self> {
        config.validate()?;

        let shared = Arc::new(Shared {
            accumulator: Accumulator::new(config.buffer_size),
            builder: RecordBuilder::new(&config, env),
            shipper: Shipper::new(
                config.namer(),
                sink,
                config.fallback_dir.as_ref().map(FallbackStore::new),
            ),
        });
        let worker = FlushWorker::spawn(Arc::clone(&shared), config.flush_interval)?;

        tracing::info!(
            prefix = %config.index_prefix,
            rotation = %config.rotation,
            buffer_size = config.buffer_size,
            flush_interval = ?config.flush_interval,
            fallback = config.fallback_dir.is_some(),
            "metrics logger started"
        );

        Ok(Self {
            config,
            shared,
            worker: Mutex::new(Some(worker)),
        })
    }

    /// Starts timing an operation.
    ///
    /// The measurement is recorded when the returned guard is dropped or
    /// [`MetricTimer::stop`] is called, including when the scope is left
    /// early through `?` or a panic.
    pub fn record_timed_operation(&self, name: impl Into<String>) -> MetricTimer<'_> {
        MetricTimer {
            logger: self,
            name: Some(name.into()),
            start: Local::now(),
            started: Instant::now(),
        }
    }

    /// Records an operation with a known start time and duration.
    pub fn log_time_metric(
        &self,
        name: impl Into<String>,
        start: DateTime<Local>,
        duration: Duration,
    ) {
        self.record(&TimedMeasurement::new(name, start, duration));
    }

    /// Builds the document for `measurement` and appends it.
    ///
    /// If the buffer reaches its threshold, the batch is shipped on this
    /// thread before returning.
    pub fn record(&self, measurement: &TimedMeasurement) {
        self.shared.append(self.shared.builder.build(measurement));
    }

    /// Drains and ships everything pending, right now.
    ///
    /// Safe to call at any time and from any thread; with nothing pending it
    /// returns [`ShipOutcome::Empty`] without contacting the sink.
    pub fn flush_now(&self) -> ShipOutcome {
        self.shared.flush(FlushTrigger::Explicit)
    }

    /// Stops the flush worker and ships whatever is still pending.
    ///
    /// The worker is joined before the final flush. Calling `shutdown` again
    /// only flushes. Records appended after shutdown are still buffered and
    /// size-flushed, but no longer flushed on a timer.
    pub fn shutdown(&self) -> ShipOutcome {
        let worker = self
            .worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        if let Some(worker) = worker {
            worker.stop();
            tracing::info!(prefix = %self.config.index_prefix, "metrics logger stopped");
        }

        self.shared.flush(FlushTrigger::Shutdown)
    }

    /// Returns `true` until [`MetricsLogger::shutdown`] has been called.
    pub fn is_running(&self) -> bool {
        self.worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Number of documents waiting to be shipped.
    pub fn pending(&self) -> usize {
        self.shared.accumulator.len()
    }

    /// Flush and document counters.
    pub fn stats(&self) -> ShipStats {
        self.shared.shipper.stats()
    }

    /// The destination a batch shipped right now would go to.
    pub fn destination(&self) -> String {
        self.shared.shipper.namer().name_now()
    }

    /// The logger's configuration.
    pub fn config(&self) -> &ShipperConfig {
        &self.config
    }

    /// Checks that the sink can reach the remote store.
    ///
    /// # Errors
    ///
    /// Returns [`ShipError::Sink`] if the sink's ping fails.
    pub fn test_sink(&self) -> Result<()> {
        self.shared.shipper.sink().ping().map_err(Into::into)
    }
}

impl Drop for MetricsLogger {
    fn drop(&mut self) {
        let outcome = self.shutdown();
        if outcome.is_failure() {
            tracing::warn!(count = outcome.count(), "final flush on drop failed");
        }
    }
}

/// Scope guard timing one operation.
///
/// Created by [`MetricsLogger::record_timed_operation`]. Records the
/// measurement exactly once: on [`MetricTimer::stop`] or on drop.
#[must_use = "the measurement is recorded when the timer is dropped"]
#[derive(Debug)]
pub struct MetricTimer<'a> {
    logger: &'a MetricsLogger,
    name: Option<String>,
    start: DateTime<Local>,
    started: Instant,
}

impl MetricTimer<'_> {
    /// Wall-clock start of the timed operation.
    pub fn start(&self) -> DateTime<Local> {
        self.start
    }

    /// Time elapsed since the timer started.
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Stops the timer, records the measurement and returns it.
    pub fn stop(mut self) -> TimedMeasurement {
        let name = self.name.take().unwrap_or_default();
        self.finish(name)
    }

    fn finish(&self, name: String) -> TimedMeasurement {
        let measurement = TimedMeasurement::new(name, self.start, self.started.elapsed());
        self.logger.record(&measurement);
        measurement
    }
}

impl Drop for MetricTimer<'_> {
    fn drop(&mut self) {
        if let Some(name) = self.name.take() {
            self.finish(name);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    use crate::sink::MemorySink;

    fn logger(buffer_size: usize, interval: Duration) -> (MetricsLogger, Arc<MemorySink>) {
        let sink = Arc::new(MemorySink::new());
        let config = ShipperConfig::new("test")
            .with_buffer_size(buffer_size)
            .with_flush_interval(interval)
            .with_ecs_metadata(false);
        let logger =
            MetricsLogger::with_env_source(config, sink.clone(), Arc::new(HashMap::new())).unwrap();
        (logger, sink)
    }

    #[test]
    fn test_invalid_config_fails_fast() {
        let sink = Arc::new(MemorySink::new());
        let result = MetricsLogger::new(ShipperConfig::new("m").with_buffer_size(0), sink);
        assert!(matches!(result, Err(ShipError::Config(_))));
    }

    #[test]
    fn test_timer_records_on_drop() {
        let (logger, _sink) = logger(100, Duration::from_secs(3600));

        {
            let _timer = logger.record_timed_operation("op");
            std::thread::sleep(Duration::from_millis(5));
        }

        assert_eq!(logger.pending(), 1);
    }

    #[test]
    fn test_timer_stop_records_once() {
        let (logger, sink) = logger(100, Duration::from_secs(3600));

        let timer = logger.record_timed_operation("op");
        std::thread::sleep(Duration::from_millis(5));
        let measurement = timer.stop();

        assert_eq!(measurement.name, "op");
        assert!(measurement.duration >= Duration::from_millis(5));
        assert_eq!(logger.pending(), 1);

        logger.flush_now();
        let doc = &sink.submissions()[0].documents[0];
        let us = doc
            .get_path(&["metrics", "time", "us"])
            .and_then(serde_json::Value::as_u64)
            .unwrap();
        assert!(us >= 5_000);
    }

    #[test]
    fn test_timer_records_on_early_return() {
        fn failing_op(logger: &MetricsLogger) -> std::result::Result<u32, std::num::ParseIntError> {
            let _timer = logger.record_timed_operation("failing");
            let parsed: u32 = "not a number".parse()?;
            Ok(parsed)
        }

        let (logger, _sink) = logger(100, Duration::from_secs(3600));
        assert!(failing_op(&logger).is_err());
        assert_eq!(logger.pending(), 1);
    }

    #[test]
    fn test_flush_now_is_idempotent() {
        let (logger, sink) = logger(100, Duration::from_secs(3600));
        logger.log_time_metric("op", Local::now(), Duration::ZERO);

        assert_eq!(logger.flush_now().count(), 1);
        assert_eq!(logger.flush_now(), ShipOutcome::Empty);
        assert_eq!(sink.submissions().len(), 1);
    }

    #[test]
    fn test_shutdown_twice() {
        let (logger, sink) = logger(100, Duration::from_secs(3600));
        logger.log_time_metric("op", Local::now(), Duration::ZERO);

        assert!(logger.is_running());
        assert_eq!(logger.shutdown().count(), 1);
        assert!(!logger.is_running());
        assert_eq!(logger.shutdown(), ShipOutcome::Empty);
        assert_eq!(sink.submissions().len(), 1);
        assert_eq!(logger.stats().shutdown_flushes, 1);
    }

    #[test]
    fn test_drop_flushes_pending() {
        let (logger, sink) = logger(100, Duration::from_secs(3600));
        logger.log_time_metric("op", Local::now(), Duration::ZERO);
        logger.log_time_metric("op", Local::now(), Duration::ZERO);

        drop(logger);

        assert_eq!(sink.document_count(), 2);
    }

    #[test]
    fn test_destination_uses_prefix() {
        let (logger, _sink) = logger(100, Duration::from_secs(3600));
        assert!(logger.destination().starts_with("test-"));
    }

    #[test]
    fn test_sink_ping() {
        let (logger, _sink) = logger(100, Duration::from_secs(3600));
        assert!(logger.test_sink().is_ok());
    }
}
