//! # edgequake-pdf2pptx
//!
//! Rebuild editable PowerPoint decks from slide PDFs using Vision Language
//! Models (VLMs).
//!
//! ## Why this crate?
//!
//! A PDF export of a presentation is a flat picture of each slide: titles,
//! bullets and charts are no longer separate objects. This crate rasterises
//! every page, asks a VLM what the slide is made of (layout intent, title,
//! body text, speaker notes, and where the figures are), crops the figures
//! out of the raster, and lays everything out again as native PPTX shapes.
//!
//! ## Pipeline Overview
//!
//! ```text
//! PDF
//!  │
//!  ├─ 1. Input     resolve local file or download from URL (in memory)
//!  ├─ 2. Render    rasterise pages one at a time via pdfium (spawn_blocking)
//!  ├─ 3. Analyze   VLM layout analysis with adaptive rate-limit backoff
//!  ├─ 4. Crop      cut figures out of the page raster
//!  ├─ 5. Layout    map the layout category onto slide geometry
//!  └─ 6. Deck      append the slide to the .pptx package
//! ```
//!
//! Pages go through the pipeline strictly in order, one page at a time.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use edgequake_pdf2pptx::{convert, ConversionConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Provider auto-detected from GEMINI_API_KEY / OPENAI_API_KEY / ...
//!     let config = ConversionConfig::default();
//!     let output = convert("slides.pdf", &config).await?;
//!     std::fs::write("rebuilt_slides.pptx", &output.deck)?;
//!     eprintln!("{} slides, {} rate-limit retries",
//!         output.stats.total_pages,
//!         output.stats.rate_limited_retries);
//!     Ok(())
//! }
//! ```
//!
//! ## Page failures
//!
//! By default a page that cannot be analysed aborts the whole request, so a
//! returned deck always has one reconstructed slide per page. Choose
//! [`PageFailurePolicy::Placeholder`] to get a stand-in slide instead.
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `pdf2pptx` binary (clap + anyhow + indicatif + tracing-subscriber) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! edgequake-pdf2pptx = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod convert;
pub mod error;
pub mod model;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod stream;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{
    CancelFlag, ConversionConfig, ConversionConfigBuilder, PageFailurePolicy, PageSelection,
    RetryPolicy,
};
pub use convert::{convert, convert_from_bytes, convert_sync, convert_to_file, run_pipeline, write_deck};
pub use error::{OracleError, PageError, Pdf2PptxError};
pub use model::{
    CroppedFigure, FigureRegion, ImageShape, LayoutCategory, NormalizedBox, PageAnalysis,
    PositionedShape, Rect, Slide, TextShape, TextStyle,
};
pub use output::{ConversionOutput, ConversionStats, PageReport};
pub use pipeline::deck::{assemble, DeckAssembler};
pub use pipeline::oracle::{LayoutOracle, VisionOracle};
pub use pipeline::render::{PageImage, PageRasterizer, PageSource};
pub use pipeline::retry::{Throttle, TokioThrottle};
pub use progress::{ConversionProgressCallback, NoopProgressCallback, ProgressCallback};
pub use stream::{convert_stream, convert_stream_from_bytes, slide_stream, SlideStream, StreamedSlide};
