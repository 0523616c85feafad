//! Example demonstrating timed operations and the disk fallback.
//!
//! This example shows how to:
//! - Configure a logger with static and environment-resolved fields
//! - Time scopes with `record_timed_operation`
//! - Observe size, explicit and shutdown flushes
//! - Recover batches a failing sink could not accept

use metricship::{
    Document, DocumentSink, EnvFields, FallbackStore, MemorySink, MetricsLogger,
    RotationFrequency, ShipperConfig, SinkError,
};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

/// A sink that is always down.
struct DownSink;

impl DocumentSink for DownSink {
    fn submit(&self, _destination: &str, _documents: &[Document]) -> Result<(), SinkError> {
        Err(SinkError::Unreachable {
            reason: "connection refused".to_string(),
        })
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("metricship timed operations example");

    let config = ShipperConfig::new("example_metrics")
        .with_buffer_size(4)
        .with_flush_interval(Duration::from_millis(200))
        .with_rotation(RotationFrequency::Weekly)
        .with_additional_fields(json!({ "service": { "name": "example" } }))
        .with_env_fields(EnvFields::new().with_var("user", "USER"));

    let sink = Arc::new(MemorySink::new());
    let logger = MetricsLogger::new(config.clone(), sink.clone())?;
    println!("  destination: {}", logger.destination());

    for i in 0..10u64 {
        let _timer = logger.record_timed_operation(format!("step.{}", i % 3));
        std::thread::sleep(Duration::from_millis(i));
    }
    println!("  pending after 10 records: {}", logger.pending());

    let outcome = logger.shutdown();
    println!("  shutdown flush: {} document(s)", outcome.count());

    let stats = logger.stats();
    println!(
        "  flushes: size={} interval={} shutdown={}, shipped={}",
        stats.size_flushes, stats.interval_flushes, stats.shutdown_flushes, stats.documents_shipped
    );
    if let Some(last) = sink.submissions().last() {
        println!("  last batch -> {}:", last.destination);
        for doc in &last.documents {
            println!("    {}", serde_json::to_string(doc)?);
        }
    }

    // The same workload against a sink that is down, spooling to disk.
    let spool = tempfile::tempdir()?;
    let failing = MetricsLogger::new(
        config.with_fallback_dir(spool.path()),
        Arc::new(DownSink),
    )?;
    for _ in 0..3 {
        let _timer = failing.record_timed_operation("unreachable.op");
    }
    let outcome = failing.flush_now();
    println!("\n  failing sink outcome: {outcome:?}");

    for path in FallbackStore::new(spool.path()).list()? {
        let documents = FallbackStore::read_batch(&path)?;
        println!("  {} holds {} document(s)", path.display(), documents.len());
    }

    Ok(())
}
