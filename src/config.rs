//! Configuration types for PDF-to-PPTX reconstruction.
//!
//! All conversion behaviour is controlled through [`ConversionConfig`], built
//! via its [`ConversionConfigBuilder`]. Raster resolution is not
//! configurable; see [`crate::pipeline::render::PAGE_DPI`].

use crate::error::Pdf2PptxError;
use crate::progress::ProgressCallback;
use edgequake_llm::LLMProvider;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;

/// Configuration for a PDF-to-PPTX conversion.
///
/// # Example
/// ```rust
/// use edgequake_pdf2pptx::{ConversionConfig, PageFailurePolicy, RetryPolicy};
/// use std::time::Duration;
///
/// let config = ConversionConfig::builder()
///     .model("gemini-2.0-flash")
///     .retry_policy(RetryPolicy {
///         initial_delay: Duration::from_secs(2),
///         increment: Duration::from_secs(3),
///         max_delay: Some(Duration::from_secs(30)),
///         max_attempts: Some(6),
///     })
///     .on_page_failure(PageFailurePolicy::Placeholder)
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct ConversionConfig {
    /// LLM model identifier, e.g. "gemini-2.0-flash", "gpt-4.1".
    /// If None, uses the provider default chosen during resolution.
    pub model: Option<String>,

    /// LLM provider name (e.g. "gemini", "openai", "anthropic").
    pub provider_name: Option<String>,

    /// Pre-constructed LLM provider. Takes precedence over `provider_name`.
    pub provider: Option<Arc<dyn LLMProvider>>,

    /// Sampling temperature for the analysis call. Default: 0.1.
    pub temperature: f32,

    /// Maximum tokens the model may generate per page. Default: 4096.
    pub max_tokens: usize,

    /// Custom instruction set. If None, uses [`crate::prompts::LAYOUT_ANALYSIS_PROMPT`].
    pub system_prompt: Option<String>,

    /// Longest edge, in pixels, of the page image sent to the model. Default: 2000.
    ///
    /// The crop source keeps the full 300 DPI raster; only the copy that goes
    /// over the wire is downscaled. Boxes are normalised, so this does not
    /// affect crop geometry.
    pub oracle_max_pixels: u32,

    /// Per-call timeout for the vision model in seconds. Default: 120.
    pub api_timeout_secs: u64,

    /// Throttle and backoff applied around every analysis call.
    pub retry: RetryPolicy,

    /// What to do when one page cannot be reconstructed. Default: abort.
    pub on_page_failure: PageFailurePolicy,

    /// Page selection. Default: All pages.
    pub pages: PageSelection,

    /// PDF user password for encrypted documents.
    pub password: Option<String>,

    /// Download timeout for URL inputs in seconds. Default: 120.
    pub download_timeout_secs: u64,

    /// Receives per-page events (never page content).
    pub progress_callback: Option<ProgressCallback>,

    /// Once raised, the pending backoff pause or model call is abandoned and
    /// no further model calls are made.
    pub cancel: Option<CancelFlag>,
}

impl Default for ConversionConfig {
    fn default() -> Self {
        Self {
            model: None,
            provider_name: None,
            provider: None,
            temperature: 0.1,
            max_tokens: 4096,
            system_prompt: None,
            oracle_max_pixels: 2000,
            api_timeout_secs: 120,
            retry: RetryPolicy::default(),
            on_page_failure: PageFailurePolicy::default(),
            pages: PageSelection::default(),
            password: None,
            download_timeout_secs: 120,
            progress_callback: None,
            cancel: None,
        }
    }
}

impl fmt::Debug for ConversionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConversionConfig")
            .field("model", &self.model)
            .field("provider_name", &self.provider_name)
            .field("provider", &self.provider.as_ref().map(|_| "<dyn LLMProvider>"))
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("oracle_max_pixels", &self.oracle_max_pixels)
            .field("api_timeout_secs", &self.api_timeout_secs)
            .field("retry", &self.retry)
            .field("on_page_failure", &self.on_page_failure)
            .field("pages", &self.pages)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .finish_non_exhaustive()
    }
}

impl ConversionConfig {
    /// Create a new builder for `ConversionConfig`.
    pub fn builder() -> ConversionConfigBuilder {
        ConversionConfigBuilder {
            config: Self::default(),
        }
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(CancelFlag::is_cancelled)
    }
}

/// Builder for [`ConversionConfig`].
#[derive(Debug)]
pub struct ConversionConfigBuilder {
    config: ConversionConfig,
}

impl ConversionConfigBuilder {
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = Some(model.into());
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = Some(name.into());
        self
    }

    pub fn provider(mut self, provider: Arc<dyn LLMProvider>) -> Self {
        self.config.provider = Some(provider);
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = n;
        self
    }

    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.system_prompt = Some(prompt.into());
        self
    }

    pub fn oracle_max_pixels(mut self, px: u32) -> Self {
        self.config.oracle_max_pixels = px.max(256);
        self
    }

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.api_timeout_secs = secs;
        self
    }

    pub fn retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.config.retry = policy;
        self
    }

    pub fn on_page_failure(mut self, policy: PageFailurePolicy) -> Self {
        self.config.on_page_failure = policy;
        self
    }

    pub fn pages(mut self, selection: PageSelection) -> Self {
        self.config.pages = selection;
        self
    }

    pub fn password(mut self, pwd: impl Into<String>) -> Self {
        self.config.password = Some(pwd.into());
        self
    }

    pub fn download_timeout_secs(mut self, secs: u64) -> Self {
        self.config.download_timeout_secs = secs;
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    pub fn cancel_flag(mut self, flag: CancelFlag) -> Self {
        self.config.cancel = Some(flag);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ConversionConfig, Pdf2PptxError> {
        let c = &self.config;
        if c.api_timeout_secs == 0 {
            return Err(Pdf2PptxError::InvalidConfig(
                "API timeout must be ≥ 1s".into(),
            ));
        }
        c.retry.validate()?;
        Ok(self.config)
    }
}

// ── Retry policy ─────────────────────────────────────────────────────────

/// Throttle and additive backoff applied around each page's analysis.
///
/// The analyzer waits `initial_delay` before the first call of every page.
/// Each rate-limit signal adds `increment` to the wait (clamped to
/// `max_delay`) and retries the same page. The delay never shrinks within a
/// page and starts over at `initial_delay` on the next one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub initial_delay: Duration,
    pub increment: Duration,
    /// Upper bound for the wait; `None` lets it grow without limit.
    pub max_delay: Option<Duration>,
    /// Maximum model calls per page; `None` retries until the service relents.
    pub max_attempts: Option<u32>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(5),
            increment: Duration::from_secs(5),
            max_delay: Some(Duration::from_secs(60)),
            max_attempts: Some(8),
        }
    }
}

impl RetryPolicy {
    /// No throttle and a single attempt. Useful for tests and local models.
    pub fn immediate() -> Self {
        Self {
            initial_delay: Duration::ZERO,
            increment: Duration::ZERO,
            max_delay: None,
            max_attempts: Some(1),
        }
    }

    pub fn validate(&self) -> Result<(), Pdf2PptxError> {
        if self.max_attempts == Some(0) {
            return Err(Pdf2PptxError::InvalidConfig(
                "max_attempts must be ≥ 1 when set".into(),
            ));
        }
        if let Some(max) = self.max_delay {
            if max < self.initial_delay {
                return Err(Pdf2PptxError::InvalidConfig(format!(
                    "max_delay ({max:?}) is shorter than initial_delay ({:?})",
                    self.initial_delay
                )));
            }
        }
        Ok(())
    }
}

// ── Enums ────────────────────────────────────────────────────────────────

/// How a page that cannot be reconstructed affects the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PageFailurePolicy {
    /// Abort the whole request; no deck is produced. (default)
    #[default]
    Abort,
    /// Emit a clearly-marked stand-in slide for the failed page and continue.
    Placeholder,
}

/// Specifies which pages of the PDF to convert.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum PageSelection {
    /// Convert all pages (default).
    #[default]
    All,
    /// Convert a single page (1-indexed).
    Single(usize),
    /// Convert a contiguous range of pages (1-indexed, inclusive).
    Range(usize, usize),
    /// Convert specific pages (1-indexed, deduplicated).
    Set(Vec<usize>),
}

impl PageSelection {
    /// Expand the selection into a sorted, deduplicated list of 0-indexed page numbers.
    pub fn to_indices(&self, total_pages: usize) -> Vec<usize> {
        let mut indices: Vec<usize> = match self {
            PageSelection::All => (0..total_pages).collect(),
            PageSelection::Single(p) => {
                if *p >= 1 && *p <= total_pages {
                    vec![p - 1]
                } else {
                    vec![]
                }
            }
            PageSelection::Range(start, end) => {
                let s = (*start).max(1) - 1;
                let e = (*end).min(total_pages);
                (s..e).collect()
            }
            PageSelection::Set(pages) => pages
                .iter()
                .filter(|&&p| p >= 1 && p <= total_pages)
                .map(|p| p - 1)
                .collect(),
        };
        indices.sort_unstable();
        indices.dedup();
        indices
    }

    /// First page the selection asks for, for error reporting.
    pub(crate) fn first_requested(&self) -> usize {
        match self {
            PageSelection::All => 1,
            PageSelection::Single(p) => *p,
            PageSelection::Range(start, _) => *start,
            PageSelection::Set(pages) => pages.iter().copied().min().unwrap_or(0),
        }
    }
}

/// Cooperative cancellation shared between the caller and the pipeline.
///
/// The pipeline checks it before each page and races every backoff pause
/// and model call against it. A page interrupted this way is dropped whole;
/// it never becomes a slide or a placeholder.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<CancelState>);

#[derive(Debug, Default)]
struct CancelState {
    raised: AtomicBool,
    notify: Notify,
}

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.raised.store(true, Ordering::SeqCst);
        self.0.notify.notify_waiters();
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.raised.load(Ordering::SeqCst)
    }

    /// Resolves once [`cancel`](Self::cancel) has been called, immediately if
    /// it already was.
    pub async fn cancelled(&self) {
        loop {
            // Register before checking so a concurrent `cancel` is not missed.
            let notified = self.0.notify.notified();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }
}
