//! Progress-callback trait for per-record pipeline events.
//!
//! Inject an [`Arc<dyn RunProgressCallback>`] via
//! [`crate::config::RenderConfigBuilder::progress_callback`] (or pass one to
//! the merge driver) to receive real-time events as a stage works through the
//! manifest.
//!
//! # Why callbacks instead of channels?
//!
//! The callback approach is the least-invasive integration point: callers can
//! forward events to a terminal progress bar, a log file, or a database
//! record — without the library knowing anything about how the host
//! application communicates. The trait is `Send + Sync` because the merge
//! stage runs on a blocking worker thread.

use std::sync::Arc;

/// Called by a stage driver as it processes each manifest record.
///
/// All methods have default no-op implementations so callers only override
/// what they care about. Records are processed strictly in manifest order,
/// one at a time, so implementations need no internal synchronisation beyond
/// what `Send + Sync` requires.
pub trait RunProgressCallback: Send + Sync {
    /// Called once before any record is processed.
    fn on_run_start(&self, total_records: usize) {
        let _ = total_records;
    }

    /// Called just before work begins on a record.
    ///
    /// `index` is 1-based, matching the `[i/N]` progress lines users see.
    fn on_record_start(&self, index: usize, total: usize, title: &str) {
        let _ = (index, total, title);
    }

    /// Called when a record completes successfully.
    ///
    /// `detail` is a short human-readable outcome, e.g. the file name plus
    /// an attempt or page count.
    fn on_record_complete(&self, index: usize, total: usize, detail: &str) {
        let _ = (index, total, detail);
    }

    /// Called when a record required no work (its output already exists, or
    /// its source file is absent and was skipped).
    fn on_record_skipped(&self, index: usize, total: usize, detail: &str) {
        let _ = (index, total, detail);
    }

    /// Called when a record fails for good (retries exhausted, or the source
    /// PDF could not be read).
    fn on_record_error(&self, index: usize, total: usize, error: &str) {
        let _ = (index, total, error);
    }

    /// Called once after all records have been attempted.
    fn on_run_complete(&self, total_records: usize, success_count: usize) {
        let _ = (total_records, success_count);
    }
}

/// A no-op implementation for callers that don't need progress events.
///
/// This is the default when no callback is configured.
pub struct NoopProgressCallback;

impl RunProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::RenderConfig`].
pub type ProgressCallback = Arc<dyn RunProgressCallback>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct TrackingCallback {
        starts: AtomicUsize,
        completes: AtomicUsize,
        skips: AtomicUsize,
        errors: AtomicUsize,
        final_success: AtomicUsize,
    }

    impl RunProgressCallback for TrackingCallback {
        fn on_record_start(&self, _index: usize, _total: usize, _title: &str) {
            self.starts.fetch_add(1, Ordering::SeqCst);
        }

        fn on_record_complete(&self, _index: usize, _total: usize, _detail: &str) {
            self.completes.fetch_add(1, Ordering::SeqCst);
        }

        fn on_record_skipped(&self, _index: usize, _total: usize, _detail: &str) {
            self.skips.fetch_add(1, Ordering::SeqCst);
        }

        fn on_record_error(&self, _index: usize, _total: usize, _error: &str) {
            self.errors.fetch_add(1, Ordering::SeqCst);
        }

        fn on_run_complete(&self, _total: usize, success_count: usize) {
            self.final_success.store(success_count, Ordering::SeqCst);
        }
    }

    #[test]
    fn noop_callback_does_not_panic() {
        let cb = NoopProgressCallback;
        cb.on_run_start(3);
        cb.on_record_start(1, 3, "Chapter 1");
        cb.on_record_complete(1, 3, "Chapter 1.pdf");
        cb.on_record_skipped(2, 3, "Chapter 2.pdf (already exists)");
        cb.on_record_error(3, 3, "some error");
        cb.on_run_complete(3, 1);
    }

    #[test]
    fn tracking_callback_receives_events() {
        let tracker = TrackingCallback {
            starts: AtomicUsize::new(0),
            completes: AtomicUsize::new(0),
            skips: AtomicUsize::new(0),
            errors: AtomicUsize::new(0),
            final_success: AtomicUsize::new(0),
        };

        tracker.on_run_start(3);
        tracker.on_record_start(1, 3, "A");
        tracker.on_record_complete(1, 3, "A.pdf");
        tracker.on_record_start(2, 3, "B");
        tracker.on_record_skipped(2, 3, "B.pdf (already exists)");
        tracker.on_record_start(3, 3, "C");
        tracker.on_record_error(3, 3, "renderer timeout");
        tracker.on_run_complete(3, 1);

        assert_eq!(tracker.starts.load(Ordering::SeqCst), 3);
        assert_eq!(tracker.completes.load(Ordering::SeqCst), 1);
        assert_eq!(tracker.skips.load(Ordering::SeqCst), 1);
        assert_eq!(tracker.errors.load(Ordering::SeqCst), 1);
        assert_eq!(tracker.final_success.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn arc_dyn_callback_works() {
        let cb: Arc<dyn RunProgressCallback> = Arc::new(NoopProgressCallback);
        cb.on_run_start(10);
        cb.on_record_start(1, 10, "Preface");
        cb.on_record_complete(1, 10, "Preface.pdf");
    }
}
