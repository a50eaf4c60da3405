//! Conversion results: the deck plus content-free per-page metadata.
//!
//! Everything except the deck bytes is safe to log or serialise: reports
//! carry layout names, counts and timings, never titles, text, notes or
//! figure descriptions.

use crate::error::PageError;
use crate::model::LayoutCategory;
use serde::{Deserialize, Serialize};

/// Result of a full-document conversion.
#[derive(Clone)]
pub struct ConversionOutput {
    /// The assembled `.pptx` package.
    pub deck: Vec<u8>,
    /// One report per converted page, in page order.
    pub pages: Vec<PageReport>,
    pub stats: ConversionStats,
}

impl std::fmt::Debug for ConversionOutput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConversionOutput")
            .field("deck_bytes", &self.deck.len())
            .field("pages", &self.pages)
            .field("stats", &self.stats)
            .finish()
    }
}

/// Metadata for a single page's slide.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageReport {
    /// 1-indexed page number.
    pub page_num: usize,

    /// Layout the oracle assigned. `None` for placeholder slides.
    pub layout: Option<LayoutCategory>,

    /// Shapes placed on the slide.
    pub shapes: usize,

    /// Figures cropped from the page.
    pub figures: usize,

    /// Rate-limit signals received before the page settled.
    pub rate_limited: u32,

    /// Wall-clock time spent on this page in milliseconds.
    pub duration_ms: u64,

    /// Why the page became a placeholder, if it did.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<PageError>,
}

impl PageReport {
    pub fn is_placeholder(&self) -> bool {
        self.failure.is_some()
    }
}

/// Aggregate statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversionStats {
    /// Pages selected for conversion.
    pub total_pages: usize,

    /// Pages rebuilt from a valid analysis.
    pub reconstructed: usize,

    /// Pages replaced by a placeholder slide.
    pub placeholders: usize,

    /// Rate-limit retries summed over all pages.
    pub rate_limited_retries: u64,

    /// Size of the deck in bytes.
    pub deck_bytes: usize,

    pub total_duration_ms: u64,
}

impl ConversionStats {
    /// Aggregate a finished set of page reports.
    pub fn from_reports(pages: &[PageReport], deck_bytes: usize, total_duration_ms: u64) -> Self {
        let placeholders = pages.iter().filter(|p| p.is_placeholder()).count();
        Self {
            total_pages: pages.len(),
            reconstructed: pages.len() - placeholders,
            placeholders,
            rate_limited_retries: pages.iter().map(|p| p.rate_limited as u64).sum(),
            deck_bytes,
            total_duration_ms,
        }
    }
}
