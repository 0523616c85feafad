//! Error types for the metricship buffering and flush engine.

use std::path::PathBuf;

use thiserror::Error;

/// The main error type for all metricship operations.
///
/// Sink and fallback failures never reach the code that appends documents;
/// they surface here only when an operation is invoked directly (for example
/// [`FallbackStore::write_batch`](crate::fallback::FallbackStore::write_batch)).
#[derive(Error, Debug)]
pub enum ShipError {
    /// Invalid configuration detected at construction time.
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// The document sink rejected or could not accept a batch.
    #[error("sink error: {0}")]
    Sink(#[from] SinkError),

    /// Writing or reading a fallback file failed.
    #[error("fallback error: {0}")]
    Fallback(#[from] FallbackError),

    /// The flush worker thread could not be spawned.
    #[error("failed to spawn flush worker: {source}")]
    WorkerSpawn {
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

/// Errors raised while validating or loading a [`ShipperConfig`](crate::config::ShipperConfig).
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The buffer size threshold must be at least one document.
    #[error("invalid buffer_size: {size} (must be > 0)")]
    InvalidBufferSize {
        /// The rejected size.
        size: usize,
    },

    /// The flush interval must be non-zero.
    #[error("invalid flush_interval: must be > 0")]
    InvalidFlushInterval,

    /// The index prefix must be non-empty.
    #[error("index_prefix must not be empty")]
    EmptyIndexPrefix,

    /// The rotation frequency string is not recognised.
    #[error("unknown rotation frequency '{value}' (expected daily, weekly, monthly, yearly or never)")]
    UnknownRotation {
        /// The rejected value.
        value: String,
    },

    /// Additional fields must form a JSON object.
    #[error("additional_fields must be a JSON object, got {kind}")]
    FieldsNotObject {
        /// JSON type that was supplied instead.
        kind: &'static str,
    },

    /// The config file could not be read.
    #[error("failed to read config file '{}': {source}", path.display())]
    Read {
        /// The config file path.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The config file is not valid JSON for a `ShipperConfig`.
    #[error("failed to parse config file '{}': {source}", path.display())]
    Parse {
        /// The config file path.
        path: PathBuf,
        /// The underlying JSON error.
        #[source]
        source: serde_json::Error,
    },
}

/// Errors reported by a [`DocumentSink`](crate::sink::DocumentSink).
#[derive(Error, Debug)]
pub enum SinkError {
    /// The remote store could not be reached.
    #[error("sink unreachable: {reason}")]
    Unreachable {
        /// Description of the connectivity failure.
        reason: String,
    },

    /// The remote store refused the batch.
    #[error("sink rejected batch for '{destination}': {reason}")]
    Rejected {
        /// Destination the batch was addressed to.
        destination: String,
        /// Description of the rejection.
        reason: String,
    },

    /// The sink gave up waiting for the remote store.
    #[error("sink timed out")]
    Timeout,

    /// Any other sink-specific failure.
    #[error("{0}")]
    Other(#[from] Box<dyn std::error::Error + Send + Sync>),
}

/// Errors that can occur while writing or reading fallback files.
#[derive(Error, Debug)]
pub enum FallbackError {
    /// The fallback directory could not be created or listed.
    #[error("failed to access fallback directory '{}': {source}", path.display())]
    DirectoryAccess {
        /// The directory path.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Failed to serialize the batch to JSON.
    #[error("failed to serialize batch: {source}")]
    Serialize {
        /// The underlying JSON error.
        #[source]
        source: serde_json::Error,
    },

    /// Failed to write the fallback file to disk.
    #[error("failed to write fallback file '{}': {source}", path.display())]
    Write {
        /// The file path.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Failed to read a fallback file.
    #[error("failed to read fallback file '{}': {source}", path.display())]
    Read {
        /// The file path.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// A fallback file does not contain a JSON array of documents.
    #[error("failed to parse fallback file '{}': {source}", path.display())]
    Parse {
        /// The file path.
        path: PathBuf,
        /// The underlying JSON error.
        #[source]
        source: serde_json::Error,
    },

    /// No unused file name could be found for the batch.
    #[error("no free fallback file name in '{}' after {attempts} attempts", dir.display())]
    NameExhausted {
        /// The fallback directory.
        dir: PathBuf,
        /// How many candidate names were tried.
        attempts: u32,
    },
}

/// Type alias for `Result<T, ShipError>`.
pub type Result<T> = std::result::Result<T, ShipError>;
