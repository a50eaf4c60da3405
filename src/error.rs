//! Error types for the edgequake-pdf2pptx library.
//!
//! Three error types mirror the three layers of the pipeline:
//!
//! * [`OracleError`]: the outcome of a **single** vision-model call. The
//!   retry loop in [`crate::pipeline::retry`] is the only consumer; it recovers
//!   from [`OracleError::RateLimited`] and turns everything else into a
//!   [`PageError`].
//!
//! * [`PageError`]: one page could not be reconstructed. Under the default
//!   [`crate::config::PageFailurePolicy::Abort`] it aborts the request wrapped
//!   in [`Pdf2PptxError::PageFailed`]; under `Placeholder` it is reported in
//!   [`crate::output::PageReport`] and the page becomes a stand-in slide.
//!
//! * [`Pdf2PptxError`]: **fatal**, no deck is produced (unreadable input,
//!   malformed PDF, provider not configured, a page failure under `Abort`).
//!
//! None of these types ever carries page content, analysis content, or raw
//! model output. Messages name pages, fields, and counts only.

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the edgequake-pdf2pptx library.
#[derive(Debug, Error)]
pub enum Pdf2PptxError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("PDF file not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// The input string is not a valid file path or URL.
    #[error("Invalid input '{input}': not a file path or a valid HTTP/HTTPS URL")]
    InvalidInput { input: String },

    /// HTTP URL was syntactically valid but download failed.
    #[error("Failed to download '{url}': {reason}\nCheck your internet connection.")]
    DownloadFailed { url: String, reason: String },

    /// Download exceeded the configured timeout.
    #[error("Download timed out after {secs}s for '{url}'\nIncrease --download-timeout.")]
    DownloadTimeout { url: String, secs: u64 },

    // ── Document errors ───────────────────────────────────────────────────
    /// The bytes are not a complete, parseable PDF. Raised before any page
    /// is produced.
    #[error("Malformed document: {detail}")]
    MalformedDocument { detail: String },

    /// PDF requires a password but none was provided.
    #[error("PDF is encrypted and requires a password.\nProvide it with --password <PASSWORD>.")]
    PasswordRequired,

    /// A password was provided but it is wrong.
    #[error("Wrong password for encrypted PDF")]
    WrongPassword,

    /// The page selection matched no page of the document.
    #[error("Page {page} is out of range (document has {total} pages)")]
    PageOutOfRange { page: usize, total: usize },

    /// pdfium-render returned an error for a specific page.
    #[error("Rasterisation failed for page {page}: {detail}")]
    RasterisationFailed { page: usize, detail: String },

    /// Could not bind to a pdfium library.
    #[error(
        "Failed to bind to pdfium library: {0}\n\n\
Set PDFIUM_LIB_PATH=/path/to/dir/containing/libpdfium or install pdfium\n\
system-wide so it can be found on the library search path.\n"
    )]
    PdfiumBindingFailed(String),

    // ── Oracle / page errors ──────────────────────────────────────────────
    /// The configured provider is not initialised (missing API key etc.).
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    /// A page could not be reconstructed and the failure policy is `Abort`.
    ///
    /// No deck is returned: every slide of an output deck corresponds to a
    /// successfully analysed page.
    #[error("Conversion aborted at page {page}: {source}")]
    PageFailed {
        page: usize,
        #[source]
        source: PageError,
    },

    /// The request was cancelled. `completed` slides had been finished.
    #[error("Conversion cancelled after {completed} pages")]
    Cancelled { completed: usize },

    // ── Output errors ─────────────────────────────────────────────────────
    /// Writing a part of the PPTX package failed.
    #[error("Failed to write deck: {0}")]
    DeckWriteFailed(String),

    /// Could not create or write the output file.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<zip::result::ZipError> for Pdf2PptxError {
    fn from(e: zip::result::ZipError) -> Self {
        Pdf2PptxError::DeckWriteFailed(e.to_string())
    }
}

impl From<std::io::Error> for Pdf2PptxError {
    fn from(e: std::io::Error) -> Self {
        Pdf2PptxError::DeckWriteFailed(e.to_string())
    }
}

impl From<std::fmt::Error> for Pdf2PptxError {
    fn from(e: std::fmt::Error) -> Self {
        Pdf2PptxError::DeckWriteFailed(e.to_string())
    }
}

/// A failure confined to a single page.
#[derive(Debug, Clone, PartialEq, Eq, Error, serde::Serialize, serde::Deserialize)]
pub enum PageError {
    /// The oracle's response violated the analysis schema. Never retried.
    #[error("Page {page}: invalid analysis: {reason}")]
    InvalidAnalysis { page: usize, reason: String },

    /// The oracle kept rate-limiting until the configured ceiling was hit.
    #[error("Page {page}: still rate limited after {attempts} attempts")]
    RetryExhausted { page: usize, attempts: u32 },

    /// The oracle call failed for a reason other than rate limiting.
    #[error("Page {page}: vision model call failed: {detail}")]
    OracleFailed { page: usize, detail: String },

    /// The oracle call exceeded `api_timeout_secs`.
    #[error("Page {page}: vision model call timed out after {secs}s")]
    Timeout { page: usize, secs: u64 },

    /// A figure crop could not be encoded.
    #[error("Page {page}: figure extraction failed: {detail}")]
    FigureExtractionFailed { page: usize, detail: String },

    /// The caller cancelled while this page was waiting on the model.
    /// Never becomes a placeholder; see [`Pdf2PptxError::Cancelled`].
    #[error("Page {page}: cancelled")]
    Cancelled { page: usize },
}

impl PageError {
    /// Map a non-retried oracle failure onto the page it happened on.
    pub fn from_oracle(page: usize, err: OracleError) -> Self {
        match err {
            OracleError::InvalidAnalysis(reason) => PageError::InvalidAnalysis { page, reason },
            OracleError::Timeout { secs } => PageError::Timeout { page, secs },
            OracleError::Failed(detail) => PageError::OracleFailed { page, detail },
            // Only reachable if a caller bypasses the retry loop.
            OracleError::RateLimited => PageError::RetryExhausted { page, attempts: 1 },
        }
    }

    /// 1-indexed page number the error refers to.
    pub fn page(&self) -> usize {
        match self {
            PageError::InvalidAnalysis { page, .. }
            | PageError::RetryExhausted { page, .. }
            | PageError::OracleFailed { page, .. }
            | PageError::Timeout { page, .. }
            | PageError::FigureExtractionFailed { page, .. }
            | PageError::Cancelled { page } => *page,
        }
    }

    /// Short, content-free name of the failure kind.
    pub fn kind(&self) -> &'static str {
        match self {
            PageError::InvalidAnalysis { .. } => "invalid analysis",
            PageError::RetryExhausted { .. } => "retries exhausted",
            PageError::OracleFailed { .. } => "vision model failure",
            PageError::Timeout { .. } => "vision model timeout",
            PageError::FigureExtractionFailed { .. } => "figure extraction failure",
            PageError::Cancelled { .. } => "cancelled",
        }
    }
}

/// Outcome of one vision-model call that did not yield a valid analysis.
///
/// Together with `Ok(PageAnalysis)` this is the closed set of responses the
/// oracle contract allows.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OracleError {
    /// The service signalled its rate ceiling. Carries no payload.
    #[error("rate limited")]
    RateLimited,

    /// The response parsed (or failed to parse) but did not match the schema.
    #[error("schema violation: {0}")]
    InvalidAnalysis(String),

    /// Transport, authentication, or provider error.
    #[error("{0}")]
    Failed(String),

    /// The call did not complete within the configured timeout.
    #[error("timed out after {secs}s")]
    Timeout { secs: u64 },
}
