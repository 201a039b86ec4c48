//! Observer trait for per-file processing events.
//!
//! Inject an [`Arc<dyn ProcessingObserver>`] via
//! [`crate::config::PipelineConfigBuilder::observer`] to follow a batch as the
//! orchestrator drives each file through its lifecycle. The record store
//! remains the source of truth; these callbacks exist for progress display.
//!
//! # Example
//!
//! ```rust
//! use invoice_extract::{PipelineConfig, ProcessingObserver};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingObserver {
//!     failed: AtomicUsize,
//! }
//!
//! impl ProcessingObserver for CountingObserver {
//!     fn on_file_error(&self, _id: &str, file_name: &str, error: &str) {
//!         self.failed.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("{file_name}: {error}");
//!     }
//! }
//!
//! let observer = Arc::new(CountingObserver { failed: AtomicUsize::new(0) });
//! let config = PipelineConfig::builder()
//!     .observer(observer as Arc<dyn ProcessingObserver>)
//!     .build()
//!     .unwrap();
//! ```

use std::sync::Arc;

/// Called by the orchestrator as files move through the pipeline.
///
/// For one file the order is always `on_file_start`, then
/// `on_pages_rasterized` (skipped when decoding fails), then exactly one of
/// `on_file_complete` / `on_file_error`. Events of different files
/// interleave. All methods default to no-ops.
pub trait ProcessingObserver: Send + Sync {
    /// Called once before any file of a batch starts.
    fn on_batch_start(&self, total_files: usize) {
        let _ = total_files;
    }

    /// The record was created (or reset) in `processing`.
    fn on_file_start(&self, id: &str, file_name: &str) {
        let _ = (id, file_name);
    }

    /// Rasterization finished; the page count is now known.
    fn on_pages_rasterized(&self, id: &str, page_count: usize) {
        let _ = (id, page_count);
    }

    /// The record reached `completed`.
    fn on_file_complete(&self, id: &str, file_name: &str) {
        let _ = (id, file_name);
    }

    /// The record reached `error`.
    fn on_file_error(&self, id: &str, file_name: &str, error: &str) {
        let _ = (id, file_name, error);
    }

    /// Called once after every file of a batch reached a terminal state.
    fn on_batch_complete(&self, total_files: usize, success_count: usize) {
        let _ = (total_files, success_count);
    }
}

/// Default observer when none is configured.
pub struct NoopObserver;

impl ProcessingObserver for NoopObserver {}

/// Convenience alias matching the type stored in [`crate::config::PipelineConfig`].
pub type Observer = Arc<dyn ProcessingObserver>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct Tracking {
        started: AtomicUsize,
        pages: AtomicUsize,
        completed: AtomicUsize,
        errors: AtomicUsize,
    }

    impl ProcessingObserver for Tracking {
        fn on_file_start(&self, _id: &str, _file_name: &str) {
            self.started.fetch_add(1, Ordering::SeqCst);
        }

        fn on_pages_rasterized(&self, _id: &str, page_count: usize) {
            self.pages.fetch_add(page_count, Ordering::SeqCst);
        }

        fn on_file_complete(&self, _id: &str, _file_name: &str) {
            self.completed.fetch_add(1, Ordering::SeqCst);
        }

        fn on_file_error(&self, _id: &str, _file_name: &str, _error: &str) {
            self.errors.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn noop_observer_does_not_panic() {
        let o = NoopObserver;
        o.on_batch_start(2);
        o.on_file_start("a", "a.pdf");
        o.on_pages_rasterized("a", 3);
        o.on_file_complete("a", "a.pdf");
        o.on_file_error("b", "b.pdf", "boom");
        o.on_batch_complete(2, 1);
    }

    #[test]
    fn tracking_observer_receives_events() {
        let t = Tracking::default();
        t.on_file_start("a", "a.pdf");
        t.on_pages_rasterized("a", 2);
        t.on_file_complete("a", "a.pdf");
        t.on_file_start("b", "b.pdf");
        t.on_file_error("b", "b.pdf", "Not a valid PDF file");

        assert_eq!(t.started.load(Ordering::SeqCst), 2);
        assert_eq!(t.pages.load(Ordering::SeqCst), 2);
        assert_eq!(t.completed.load(Ordering::SeqCst), 1);
        assert_eq!(t.errors.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn arc_dyn_observer_works() {
        let o: Observer = Arc::new(NoopObserver);
        o.on_file_start("x", "x.pdf");
    }
}
