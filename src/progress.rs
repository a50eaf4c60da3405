//! Progress-callback trait for per-page reconstruction events.
//!
//! Inject an [`Arc<dyn ConversionProgressCallback>`] via
//! [`crate::config::ConversionConfigBuilder::progress_callback`] to receive
//! events as the pipeline works through the deck. Events carry page numbers,
//! counts and durations only, never page content.
//!
//! # Example
//!
//! ```rust
//! use edgequake_pdf2pptx::{ConversionProgressCallback, ConversionConfig};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingCallback {
//!     completed: Arc<AtomicUsize>,
//! }
//!
//! impl ConversionProgressCallback for CountingCallback {
//!     fn on_page_complete(&self, page_num: usize, total_pages: usize, shapes: usize) {
//!         self.completed.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("Slide {}/{} rebuilt ({} shapes)", page_num, total_pages, shapes);
//!     }
//! }
//!
//! let counter = Arc::new(CountingCallback {
//!     completed: Arc::new(AtomicUsize::new(0)),
//! });
//!
//! let config = ConversionConfig::builder()
//!     .progress_callback(counter as Arc<dyn ConversionProgressCallback>)
//!     .build()
//!     .unwrap();
//! ```

use std::sync::Arc;
use std::time::Duration;

/// Called by the conversion pipeline as it processes each page.
///
/// Pages are processed strictly one at a time, so events for page `n + 1`
/// never interleave with events for page `n`. All methods have default no-op
/// implementations so callers only override what they care about.
pub trait ConversionProgressCallback: Send + Sync {
    /// Called once after the document has been opened.
    ///
    /// # Arguments
    /// * `total_pages` — number of pages that will be processed
    fn on_conversion_start(&self, total_pages: usize) {
        let _ = total_pages;
    }

    /// Called after a page has been rasterised, before the first model call.
    fn on_page_start(&self, page_num: usize, total_pages: usize) {
        let _ = (page_num, total_pages);
    }

    /// Called each time the vision model rate-limits a page.
    ///
    /// # Arguments
    /// * `page_num`   — 1-indexed page number
    /// * `attempt`    — calls made so far for this page
    /// * `next_delay` — wait before the next call
    fn on_page_rate_limited(&self, page_num: usize, attempt: u32, next_delay: Duration) {
        let _ = (page_num, attempt, next_delay);
    }

    /// Called when a page's slide has been appended to the deck.
    ///
    /// # Arguments
    /// * `page_num`    — 1-indexed page number
    /// * `total_pages` — total pages
    /// * `shapes`      — number of shapes placed on the slide
    fn on_page_complete(&self, page_num: usize, total_pages: usize, shapes: usize) {
        let _ = (page_num, total_pages, shapes);
    }

    /// Called when a page cannot be reconstructed.
    ///
    /// `error` is a content-free description of the failure.
    fn on_page_error(&self, page_num: usize, total_pages: usize, error: &str) {
        let _ = (page_num, total_pages, error);
    }

    /// Called once after the last page has been appended.
    ///
    /// # Arguments
    /// * `total_pages`   — pages processed
    /// * `success_count` — pages rebuilt from a valid analysis
    fn on_conversion_complete(&self, total_pages: usize, success_count: usize) {
        let _ = (total_pages, success_count);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl ConversionProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::ConversionConfig`].
pub type ProgressCallback = Arc<dyn ConversionProgressCallback>;
