//! Integration tests for sink failures and the disk fallback.

use metricship::enrich::EnvSource;
use metricship::{
    Document, DocumentSink, FallbackStore, MetricsLogger, ShipOutcome, ShipperConfig, SinkError,
};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tempfile::tempdir;

/// A sink that rejects every batch and counts the attempts.
#[derive(Default)]
struct RejectingSink {
    attempts: AtomicUsize,
}

impl DocumentSink for RejectingSink {
    fn submit(&self, destination: &str, _documents: &[Document]) -> Result<(), SinkError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err(SinkError::Rejected {
            destination: destination.to_string(),
            reason: "cluster read-only".to_string(),
        })
    }
}

fn start(config: ShipperConfig) -> (MetricsLogger, Arc<RejectingSink>) {
    let sink = Arc::new(RejectingSink::default());
    let env: Arc<dyn EnvSource> = Arc::new(HashMap::<String, String>::new());
    let logger = MetricsLogger::with_env_source(
        config
            .with_buffer_size(100)
            .with_flush_interval(Duration::from_secs(3600))
            .with_ecs_metadata(false),
        sink.clone(),
        env,
    )
    .unwrap();
    (logger, sink)
}

fn record(logger: &MetricsLogger, name: &str) {
    logger.log_time_metric(name, chrono::Local::now(), Duration::from_millis(3));
}

#[test]
fn test_failed_flush_writes_one_fallback_file() {
    let dir = tempdir().unwrap();
    let (logger, sink) = start(
        ShipperConfig::new("app")
            .with_additional_fields(serde_json::json!({ "service": "billing" }))
            .with_fallback_dir(dir.path()),
    );
    for name in ["a", "b", "c"] {
        record(&logger, name);
    }

    let outcome = logger.flush_now();

    assert!(outcome.is_failure());
    assert_eq!(outcome.count(), 3);
    let ShipOutcome::FallbackWritten { path, .. } = outcome else {
        panic!("expected fallback, got {outcome:?}");
    };
    assert_eq!(logger.pending(), 0);
    assert_eq!(sink.attempts.load(Ordering::SeqCst), 1);

    let store = FallbackStore::new(dir.path());
    assert_eq!(store.list().unwrap(), vec![path.clone()]);

    let documents = FallbackStore::read_batch(&path).unwrap();
    assert_eq!(documents.len(), 3);
    let names: Vec<_> = documents
        .iter()
        .map(|d| d.get_path(&["metrics", "name"]).unwrap().as_str().unwrap())
        .collect();
    assert_eq!(names, ["a", "b", "c"]);
    for doc in &documents {
        assert_eq!(doc.get("service").unwrap(), "billing");
        assert!(doc.get("@timestamp").is_some());
        assert_eq!(
            doc.get_path(&["metrics", "time", "us"]).unwrap(),
            &serde_json::json!(3000)
        );
    }

    assert_eq!(logger.stats().documents_fallback, 3);
}

#[test]
fn test_failed_flush_without_fallback_drops_batch() {
    let dir = tempdir().unwrap();
    let (logger, sink) = start(ShipperConfig::new("app"));
    for name in ["a", "b", "c"] {
        record(&logger, name);
    }

    let outcome = logger.flush_now();

    assert!(matches!(outcome, ShipOutcome::Dropped { count: 3, .. }));
    assert_eq!(logger.pending(), 0);
    assert_eq!(sink.attempts.load(Ordering::SeqCst), 1);
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    assert_eq!(logger.stats().documents_dropped, 3);
}

#[test]
fn test_unwritable_fallback_drops_without_panicking() {
    let dir = tempdir().unwrap();
    let blocker = dir.path().join("not-a-dir");
    std::fs::write(&blocker, "x").unwrap();
    let (logger, _sink) = start(ShipperConfig::new("app").with_fallback_dir(&blocker));
    record(&logger, "a");

    let outcome = logger.flush_now();

    assert!(matches!(outcome, ShipOutcome::Dropped { count: 1, .. }));
    assert_eq!(logger.pending(), 0);
}

#[test]
fn test_every_failed_batch_gets_its_own_file() {
    let dir = tempdir().unwrap();
    let (logger, sink) = start(ShipperConfig::new("app").with_fallback_dir(dir.path()));

    for round in 0..5 {
        record(&logger, &format!("op{round}"));
        logger.flush_now();
    }
    record(&logger, "last");
    let outcome = logger.shutdown();

    assert!(matches!(outcome, ShipOutcome::FallbackWritten { count: 1, .. }));
    assert_eq!(sink.attempts.load(Ordering::SeqCst), 6);

    let files = FallbackStore::new(dir.path()).list().unwrap();
    assert_eq!(files.len(), 6);
    let total: usize = files
        .iter()
        .map(|f| FallbackStore::read_batch(f).unwrap().len())
        .sum();
    assert_eq!(total, 6);
}

#[test]
fn test_empty_flush_never_contacts_sink() {
    let dir = tempdir().unwrap();
    let (logger, sink) = start(ShipperConfig::new("app").with_fallback_dir(dir.path()));

    assert_eq!(logger.flush_now(), ShipOutcome::Empty);
    assert_eq!(logger.shutdown(), ShipOutcome::Empty);

    assert_eq!(sink.attempts.load(Ordering::SeqCst), 0);
    assert!(FallbackStore::new(dir.path()).list().unwrap().is_empty());
}
