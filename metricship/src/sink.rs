//! The document sink interface.
//!
//! A sink owns everything about talking to the remote document store:
//! transport, authentication, TLS, timeouts. The shipper only hands it a
//! destination name and a batch, and learns whether the batch was accepted.

use std::sync::{Mutex, PoisonError};

use crate::document::Document;
use crate::error::SinkError;

/// Accepts batches of documents for a named destination.
///
/// `submit` may be called concurrently from the flush worker and from
/// threads that trip the size threshold, and may block for as long as the
/// sink's own timeouts allow.
pub trait DocumentSink: Send + Sync {
    /// Submits `documents` to `destination` as a single batch.
    ///
    /// # Errors
    ///
    /// Returns [`SinkError`] if the batch was not accepted. The shipper then
    /// treats the whole batch as failed.
    fn submit(&self, destination: &str, documents: &[Document]) -> Result<(), SinkError>;

    /// Checks that the remote store is reachable.
    ///
    /// # Errors
    ///
    /// Returns [`SinkError`] if the store cannot be reached.
    fn ping(&self) -> Result<(), SinkError> {
        Ok(())
    }
}

/// One accepted submission recorded by a [`MemorySink`].
#[derive(Debug, Clone, PartialEq)]
pub struct Submission {
    /// Destination the batch was addressed to.
    pub destination: String,
    /// The submitted documents, in batch order.
    pub documents: Vec<Document>,
}

/// A sink that keeps every submission in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    submissions: Mutex<Vec<Submission>>,
}

impl MemorySink {
    /// Creates an empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// All submissions received so far, oldest first.
    pub fn submissions(&self) -> Vec<Submission> {
        self.submissions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Total number of documents received.
    pub fn document_count(&self) -> usize {
        self.submissions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|s| s.documents.len())
            .sum()
    }
}

impl DocumentSink for MemorySink {
    fn submit(&self, destination: &str, documents: &[Document]) -> Result<(), SinkError> {
        self.submissions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Submission {
                destination: destination.to_string(),
                documents: documents.to_vec(),
            });
        Ok(())
    }
}
