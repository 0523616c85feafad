//! Thread-safe batch accumulator with a size-triggered drain.
//!
//! All operations hold a single short-lived mutex; nothing here performs I/O.
//! Shipping happens in the caller after the lock is released.

use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::document::Document;

/// An ordered batch of documents removed from the accumulator in one step.
pub type Batch = Vec<Document>;

/// Upper bound on capacity reserved up front for a new batch.
const MAX_PREALLOCATED: usize = 4096;

/// Pending documents awaiting a flush.
#[derive(Debug)]
pub struct Accumulator {
    pending: Mutex<Batch>,
    threshold: usize,
}

impl Accumulator {
    /// Creates an accumulator that drains itself once it holds `threshold` documents.
    ///
    /// A zero threshold is treated as one.
    pub fn new(threshold: usize) -> Self {
        let threshold = threshold.max(1);
        Self {
            pending: Mutex::new(Vec::with_capacity(threshold.min(MAX_PREALLOCATED))),
            threshold,
        }
    }

    /// The configured size threshold.
    pub fn threshold(&self) -> usize {
        self.threshold
    }

    /// Appends a document.
    ///
    /// If the buffer reaches the threshold, its entire contents are taken in
    /// the same critical section and returned; the caller must ship them.
    pub fn append(&self, document: Document) -> Option<Batch> {
        let mut pending = self.lock();
        pending.push(document);
        if pending.len() >= self.threshold {
            Some(std::mem::replace(
                &mut *pending,
                Vec::with_capacity(self.threshold.min(MAX_PREALLOCATED)),
            ))
        } else {
            None
        }
    }

    /// Removes and returns every pending document, leaving the buffer empty.
    pub fn drain(&self) -> Batch {
        std::mem::take(&mut *self.lock())
    }

    /// Number of pending documents.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Returns `true` if nothing is pending.
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    // A panic while holding the lock cannot leave the Vec half-updated, so a
    // poisoned buffer is still consistent.
    fn lock(&self) -> MutexGuard<'_, Batch> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
