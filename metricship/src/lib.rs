//! # metricship
//!
//! Buffered metric shipping for timed operations.
//!
//! metricship records how long named operations take, wraps each measurement
//! in a JSON document enriched with static, environment-derived and host
//! metadata, and ships the documents in batches to a remote document store
//! through a pluggable sink. Batches go to time-rotated destinations
//! (`<prefix>-<date suffix>`), and batches the sink rejects are spooled to
//! local files instead of being lost.
//!
//! **Status**: This crate is in early development. The API is not yet stable.
//!
//! ## Key Properties
//!
//! - Recording never blocks on the network unless it fills the buffer
//! - Flushes on buffer size, on a fixed interval, on demand and on shutdown
//! - Destination names are computed when a batch ships, not when it was recorded
//! - Sink failures never reach the recording caller
//! - One background thread per logger, joined on shutdown
//!
//! ## Quick Start
//!
//! ```rust
//! use metricship::{MemorySink, MetricsLogger, RotationFrequency, ShipperConfig};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ShipperConfig::new("app_metrics")
//!     .with_buffer_size(500)
//!     .with_flush_interval(Duration::from_secs(5))
//!     .with_rotation(RotationFrequency::Monthly)
//!     .with_additional_fields(serde_json::json!({ "service": "checkout" }));
//!
//! let sink = Arc::new(MemorySink::new());
//! let logger = MetricsLogger::new(config, sink.clone())?;
//!
//! // Time a scope; recorded when the guard drops.
//! {
//!     let _timer = logger.record_timed_operation("payment.authorize");
//!     // ... work ...
//! }
//!
//! // Or record a measurement taken elsewhere.
//! logger.log_time_metric("cache.warm", chrono::Local::now(), Duration::from_millis(12));
//!
//! logger.shutdown();
//! assert_eq!(sink.document_count(), 2);
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - [`MetricsLogger`] — Caller-facing handle; owns the buffer and flush worker
//! - [`ShipperConfig`] — Buffer, interval, naming, enrichment and fallback settings
//! - [`DocumentSink`] — Trait implemented by the transport to the remote store
//! - [`ShipOutcome`] — What happened to one flushed batch
//!
//! ## Modules
//!
//! - [`logger`] — Lifecycle, timers, flush worker
//! - [`config`] — Configuration and validation
//! - [`record`] — Measurement to document conversion
//! - [`enrich`] — Environment-resolved fields
//! - [`document`] — The JSON document type
//! - [`buffer`] — Thread-safe batch accumulator
//! - [`naming`] — Rotation frequencies and destination names
//! - [`shipper`] — Batch shipping, outcomes and counters
//! - [`sink`] — Sink trait and in-memory sink
//! - [`fallback`] — Local spool for failed batches
//! - [`error`] — Error types

pub mod buffer;
pub mod config;
pub mod document;
pub mod enrich;
pub mod error;
pub mod fallback;
pub mod logger;
pub mod naming;
pub mod record;
pub mod shipper;
pub mod sink;

// Re-export primary API types at crate root for convenience.
pub use config::ShipperConfig;
pub use document::Document;
pub use enrich::{EnvField, EnvFields, EnvSource, ProcessEnv};
pub use error::{ConfigError, FallbackError, Result, ShipError, SinkError};
pub use fallback::FallbackStore;
pub use logger::{MetricTimer, MetricsLogger};
pub use naming::{DestinationNamer, RotationFrequency};
pub use record::TimedMeasurement;
pub use shipper::{FlushTrigger, ShipOutcome, ShipStats};
pub use sink::{DocumentSink, MemorySink};
