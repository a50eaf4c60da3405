//! Pipeline stages for PDF-to-PPTX slide reconstruction.
//!
//! Each submodule implements exactly one transformation step, so each is
//! testable on its own and the control loop in [`crate::convert`] only
//! wires them together.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ render ──▶ retry/oracle ──▶ crop ──▶ layout ──▶ deck
//! (bytes)   (pdfium)   (vision model)   (PNG)    (EMU)      (zip)
//! ```
//!
//! 1. [`input`]  resolves the user-supplied path or URL to bytes in memory
//! 2. [`render`] rasterises pages lazily on a blocking worker, because
//!    pdfium is not async-safe
//! 3. [`encode`] downsizes and PNG/base64-wraps a page for the request body
//! 4. [`oracle`] makes one vision-model call and validates its JSON
//! 5. [`retry`]  spaces calls and backs off on rate limits, reset per page
//! 6. [`crop`]   cuts figure regions out of the full-resolution raster
//! 7. [`layout`] maps a layout category onto slide geometry
//! 8. [`deck`]   appends slides to an in-memory PPTX package

pub mod crop;
pub mod deck;
pub mod encode;
pub mod input;
pub mod layout;
pub mod oracle;
pub mod render;
pub mod retry;
