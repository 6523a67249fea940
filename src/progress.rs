//! Progress-callback trait for pipeline events.
//!
//! Inject an [`Arc<dyn PipelineProgressCallback>`] via
//! [`crate::config::PipelineConfigBuilder::progress_callback`] to observe a
//! [`crate::runtime::LocalPipeline`] run: pages split, pages recognized,
//! sections parsed.
//!
//! # Thread safety
//!
//! Pages are recognized concurrently and section parsers run concurrently,
//! so every method may be called from several tasks at once.
//!
//! # Example
//!
//! ```rust
//! use edgequake_minutebook::{PipelineConfig, PipelineProgressCallback};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct Counter(AtomicUsize);
//!
//! impl PipelineProgressCallback for Counter {
//!     fn on_page_recognized(&self, _page: u32, _total: u32, _text_len: usize) {
//!         self.0.fetch_add(1, Ordering::SeqCst);
//!     }
//! }
//!
//! let config = PipelineConfig::builder()
//!     .progress_callback(Arc::new(Counter(AtomicUsize::new(0))))
//!     .build()
//!     .unwrap();
//! ```

use std::sync::Arc;

/// Called by the pipeline as a document moves through its stages.
///
/// All methods have default no-op implementations.
pub trait PipelineProgressCallback: Send + Sync {
    /// The upload was split into `total_pages` page objects.
    fn on_document_split(&self, name: &str, total_pages: u32) {
        let _ = (name, total_pages);
    }

    /// A page's text was persisted.
    fn on_page_recognized(&self, page: u32, total_pages: u32, text_len: usize) {
        let _ = (page, total_pages, text_len);
    }

    /// A page failed recognition; it stays unrecognized until redelivered.
    fn on_page_error(&self, page: u32, total_pages: u32, error: &str) {
        let _ = (page, total_pages, error);
    }

    /// One section parser finished.
    fn on_section_complete(&self, section: &str) {
        let _ = section;
    }

    /// One section parser failed.
    fn on_section_error(&self, section: &str, error: &str) {
        let _ = (section, error);
    }

    /// The final output for `name` was written.
    fn on_document_complete(&self, name: &str, sections_ok: usize, sections_total: usize) {
        let _ = (name, sections_ok, sections_total);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl PipelineProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::PipelineConfig`].
pub type ProgressCallback = Arc<dyn PipelineProgressCallback>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct Tracking {
        recognized: AtomicUsize,
        errors: AtomicUsize,
        sections: AtomicUsize,
    }

    impl PipelineProgressCallback for Tracking {
        fn on_page_recognized(&self, _page: u32, _total: u32, _len: usize) {
            self.recognized.fetch_add(1, Ordering::SeqCst);
        }

        fn on_page_error(&self, _page: u32, _total: u32, _error: &str) {
            self.errors.fetch_add(1, Ordering::SeqCst);
        }

        fn on_section_complete(&self, _section: &str) {
            self.sections.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn noop_callback_does_not_panic() {
        let cb = NoopProgressCallback;
        cb.on_document_split("acme", 3);
        cb.on_page_recognized(1, 3, 10);
        cb.on_page_error(2, 3, "boom");
        cb.on_section_complete("directors");
        cb.on_section_error("quorum_rules", "boom");
        cb.on_document_complete("acme", 2, 3);
    }

    #[test]
    fn tracking_callback_receives_events() {
        let t = Tracking::default();
        t.on_page_recognized(1, 2, 5);
        t.on_page_recognized(2, 2, 5);
        t.on_page_error(2, 2, "timeout");
        t.on_section_complete("directors");
        assert_eq!(t.recognized.load(Ordering::SeqCst), 2);
        assert_eq!(t.errors.load(Ordering::SeqCst), 1);
        assert_eq!(t.sections.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn arc_dyn_callback_is_send_sync() {
        fn assert_send_sync<T: Send + Sync + ?Sized>() {}
        assert_send_sync::<dyn PipelineProgressCallback>();
        let cb: ProgressCallback = Arc::new(NoopProgressCallback);
        cb.on_section_complete("x");
    }
}
