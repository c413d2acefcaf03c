//! Progress-callback trait for stage and batch events.
//!
//! Inject an [`Arc<dyn ProcessingProgressCallback>`] via
//! [`crate::config::ProcessingConfigBuilder::progress_callback`] to receive
//! events as the pipeline reads, tags, styles and packages a document.
//!
//! # Example
//!
//! ```rust
//! use docstyler::{ProcessingConfig, ProcessingProgressCallback};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingCallback {
//!     batches: AtomicUsize,
//! }
//!
//! impl ProcessingProgressCallback for CountingCallback {
//!     fn on_batch_complete(&self, batch: usize, total: usize, records: usize) {
//!         self.batches.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("batch {batch}/{total}: {records} paragraphs");
//!     }
//! }
//!
//! let config = ProcessingConfig::builder()
//!     .progress_callback(Arc::new(CountingCallback { batches: AtomicUsize::new(0) }))
//!     .build()
//!     .unwrap();
//! ```

use std::sync::Arc;

/// Called by the pipeline as it moves through its stages.
///
/// Batches run strictly in order, so batch events never interleave within
/// one run. Implementations are still `Send + Sync` because the host may
/// drive several runs at once with a shared callback. All methods have
/// no-op defaults.
pub trait ProcessingProgressCallback: Send + Sync {
    /// Called once the document has been split and the batches planned.
    fn on_run_start(&self, total_paragraphs: usize, total_batches: usize) {
        let _ = (total_paragraphs, total_batches);
    }

    /// Coarse progress for UI feedback.
    ///
    /// # Arguments
    /// * `percent`: 0–100
    /// * `message`: what the pipeline is doing
    fn on_stage(&self, percent: u8, message: &str) {
        let _ = (percent, message);
    }

    /// Called just before a batch is sent to the completion endpoint.
    ///
    /// `batch` is 1-indexed.
    fn on_batch_start(&self, batch: usize, total_batches: usize) {
        let _ = (batch, total_batches);
    }

    /// Called when a batch was tagged and parsed.
    ///
    /// `records` is the number of paragraph records the batch contributed.
    fn on_batch_complete(&self, batch: usize, total_batches: usize, records: usize) {
        let _ = (batch, total_batches, records);
    }

    /// Called when a batch fell back to unclassified text.
    fn on_batch_error(&self, batch: usize, total_batches: usize, error: &str) {
        let _ = (batch, total_batches, error);
    }

    /// Called once at the end of the run, successful or not.
    fn on_run_complete(&self, success: bool) {
        let _ = success;
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl ProcessingProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::ProcessingConfig`].
pub type ProgressCallback = Arc<dyn ProcessingProgressCallback>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[derive(Default)]
    struct TrackingCallback {
        starts: AtomicUsize,
        completes: AtomicUsize,
        errors: AtomicUsize,
        stages: Mutex<Vec<u8>>,
    }

    impl ProcessingProgressCallback for TrackingCallback {
        fn on_stage(&self, percent: u8, _message: &str) {
            self.stages.lock().unwrap().push(percent);
        }

        fn on_batch_start(&self, _batch: usize, _total: usize) {
            self.starts.fetch_add(1, Ordering::SeqCst);
        }

        fn on_batch_complete(&self, _batch: usize, _total: usize, _records: usize) {
            self.completes.fetch_add(1, Ordering::SeqCst);
        }

        fn on_batch_error(&self, _batch: usize, _total: usize, _error: &str) {
            self.errors.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn noop_callback_does_not_panic() {
        let cb = NoopProgressCallback;
        cb.on_run_start(50, 2);
        cb.on_stage(20, "Analysing");
        cb.on_batch_start(1, 2);
        cb.on_batch_complete(1, 2, 25);
        cb.on_batch_error(2, 2, "timeout");
        cb.on_run_complete(true);
    }

    #[test]
    fn tracking_callback_receives_events() {
        let tracker = TrackingCallback::default();
        tracker.on_stage(5, "Reading");
        tracker.on_batch_start(1, 2);
        tracker.on_batch_complete(1, 2, 25);
        tracker.on_batch_start(2, 2);
        tracker.on_batch_error(2, 2, "429");
        tracker.on_stage(100, "Done");

        assert_eq!(tracker.starts.load(Ordering::SeqCst), 2);
        assert_eq!(tracker.completes.load(Ordering::SeqCst), 1);
        assert_eq!(tracker.errors.load(Ordering::SeqCst), 1);
        assert_eq!(*tracker.stages.lock().unwrap(), vec![5, 100]);
    }
}
