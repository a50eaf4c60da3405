//! Cross-page control loop and the eager (whole-deck) entry points.
//!
//! Pages are processed strictly one after another:
//!
//! ```text
//! for page in rasterizer:            (lazy, one raster in flight)
//!     analysis = analyze_with_retry   (throttle, oracle, backoff)
//!     crops    = extract_figures      (raster dropped after this)
//!     slide    = synthesize
//!     deck.append(slide)              (crop bytes released here)
//! ```
//!
//! The deck being assembled is the only state that outlives a page. Use
//! [`crate::stream`] instead when you want slides one at a time.

use crate::config::{ConversionConfig, PageFailurePolicy};
use crate::error::{PageError, Pdf2PptxError};
use crate::model::Slide;
use crate::output::{ConversionOutput, ConversionStats, PageReport};
use crate::pipeline::crop::extract_figures;
use crate::pipeline::deck::DeckAssembler;
use crate::pipeline::input;
use crate::pipeline::layout::{self, synthesize};
use crate::pipeline::oracle::{LayoutOracle, VisionOracle};
use crate::pipeline::render::{PageImage, PageRasterizer, PageSource};
use crate::pipeline::retry::{analyze_with_retry, Throttle, TokioThrottle};
use edgequake_llm::{LLMProvider, ProviderFactory};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Convert a PDF file or URL into a rebuilt `.pptx` deck.
///
/// # Errors
/// Any page failure aborts the request under the default
/// [`PageFailurePolicy::Abort`]; no partial deck is returned. Input,
/// document, and provider errors are always fatal.
pub async fn convert(
    input_str: impl AsRef<str>,
    config: &ConversionConfig,
) -> Result<ConversionOutput, Pdf2PptxError> {
    let input_str = input_str.as_ref();
    info!("Starting conversion: {}", input_str);

    let bytes = input::resolve_input(input_str, config.download_timeout_secs).await?;
    convert_from_bytes(&bytes, config).await
}

/// Convert PDF bytes held in memory.
///
/// # Example
/// ```rust,no_run
/// use edgequake_pdf2pptx::{convert_from_bytes, ConversionConfig};
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let bytes: Vec<u8> = std::fs::read("slides.pdf")?;
/// let output = convert_from_bytes(&bytes, &ConversionConfig::default()).await?;
/// std::fs::write("rebuilt_slides.pptx", &output.deck)?;
/// # Ok(())
/// # }
/// ```
pub async fn convert_from_bytes(
    bytes: &[u8],
    config: &ConversionConfig,
) -> Result<ConversionOutput, Pdf2PptxError> {
    let mut source =
        PageRasterizer::open(bytes.to_vec(), config.password.clone(), config.pages.clone()).await?;
    let provider = resolve_provider(config)?;
    let oracle = VisionOracle::new(provider, config);

    run_pipeline(&mut source, &oracle, &TokioThrottle, config).await
}

/// Convert a PDF and write the deck straight to `output_path`.
pub async fn convert_to_file(
    input_str: impl AsRef<str>,
    output_path: impl AsRef<Path>,
    config: &ConversionConfig,
) -> Result<ConversionStats, Pdf2PptxError> {
    let output = convert(input_str, config).await?;
    write_deck(output_path.as_ref(), &output.deck).await?;
    Ok(output.stats)
}

/// Write a deck atomically: a temp sibling is written, then renamed over
/// `path`, so readers never see a half-written file.
pub async fn write_deck(path: &Path, deck: &[u8]) -> Result<(), Pdf2PptxError> {
    let failed = |source: std::io::Error| Pdf2PptxError::OutputWriteFailed {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await.map_err(failed)?;
    }

    let tmp_path = path.with_extension("pptx.tmp");
    tokio::fs::write(&tmp_path, deck).await.map_err(failed)?;
    if let Err(e) = tokio::fs::rename(&tmp_path, path).await {
        let _ = tokio::fs::remove_file(&tmp_path).await;
        return Err(failed(e));
    }
    debug!(bytes = deck.len(), "Deck written");
    Ok(())
}

/// Synchronous wrapper around [`convert`].
///
/// Creates a temporary tokio runtime internally.
pub fn convert_sync(
    input_str: impl AsRef<str>,
    config: &ConversionConfig,
) -> Result<ConversionOutput, Pdf2PptxError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| Pdf2PptxError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(convert(input_str, config))
}

/// Drive every page of `source` through the pipeline and assemble the deck.
///
/// This is the whole control loop with its three collaborators injected:
/// the page source, the oracle, and the throttle that spaces oracle calls.
/// Cancellation is checked before each page is pulled and raced against
/// every pause and model call inside a page.
pub async fn run_pipeline(
    source: &mut dyn PageSource,
    oracle: &dyn LayoutOracle,
    throttle: &dyn Throttle,
    config: &ConversionConfig,
) -> Result<ConversionOutput, Pdf2PptxError> {
    let started = Instant::now();
    let total = source.total();
    if let Some(ref cb) = config.progress_callback {
        cb.on_conversion_start(total);
    }

    let mut deck = DeckAssembler::new();
    let mut reports = Vec::with_capacity(total);

    loop {
        if config.is_cancelled() {
            info!(completed = reports.len(), "Conversion cancelled");
            return Err(Pdf2PptxError::Cancelled {
                completed: reports.len(),
            });
        }
        let Some(page) = source.next_page().await else {
            break;
        };
        let (slide, report) = settle_page(oracle, throttle, page?, total, reports.len(), config).await?;
        deck.append(slide)?;
        reports.push(report);
    }

    let deck = deck.finish()?;
    let stats =
        ConversionStats::from_reports(&reports, deck.len(), started.elapsed().as_millis() as u64);

    info!(
        "Conversion complete: {}/{} slides reconstructed, {} placeholders, {}ms total",
        stats.reconstructed, stats.total_pages, stats.placeholders, stats.total_duration_ms
    );
    if let Some(ref cb) = config.progress_callback {
        cb.on_conversion_complete(total, stats.reconstructed);
    }

    Ok(ConversionOutput {
        deck,
        pages: reports,
        stats,
    })
}

/// Turn one page into its slide, applying the page-failure policy.
///
/// Under `Abort` a page failure becomes [`Pdf2PptxError::PageFailed`].
/// Under `Placeholder` it becomes a stand-in slide whose report carries the
/// failure. Cancellation is [`Pdf2PptxError::Cancelled`] under either policy;
/// `completed` is the number of slides settled before this page.
pub(crate) async fn settle_page(
    oracle: &dyn LayoutOracle,
    throttle: &dyn Throttle,
    page: PageImage,
    total: usize,
    completed: usize,
    config: &ConversionConfig,
) -> Result<(Slide, PageReport), Pdf2PptxError> {
    let page_num = page.page_num;
    let started = Instant::now();
    if let Some(ref cb) = config.progress_callback {
        cb.on_page_start(page_num, total);
    }

    match reconstruct_page(oracle, throttle, page, config).await {
        Ok((slide, mut report)) => {
            report.duration_ms = started.elapsed().as_millis() as u64;
            debug!(
                page = page_num,
                layout = %slide.layout,
                shapes = report.shapes,
                figures = report.figures,
                "Slide reconstructed"
            );
            if let Some(ref cb) = config.progress_callback {
                cb.on_page_complete(page_num, total, report.shapes);
            }
            Ok((slide, report))
        }
        Err(PageError::Cancelled { .. }) => {
            info!(page = page_num, completed, "Conversion cancelled mid-page");
            Err(Pdf2PptxError::Cancelled { completed })
        }
        Err(err) => {
            warn!(page = page_num, kind = err.kind(), "Page failed");
            if let Some(ref cb) = config.progress_callback {
                cb.on_page_error(page_num, total, &err.to_string());
            }
            match config.on_page_failure {
                PageFailurePolicy::Abort => Err(Pdf2PptxError::PageFailed {
                    page: page_num,
                    source: err,
                }),
                PageFailurePolicy::Placeholder => {
                    let slide = layout::placeholder(page_num, &err);
                    let report = PageReport {
                        page_num,
                        layout: None,
                        shapes: slide.shapes.len(),
                        figures: 0,
                        rate_limited: match err {
                            PageError::RetryExhausted { attempts, .. } => attempts,
                            _ => 0,
                        },
                        duration_ms: started.elapsed().as_millis() as u64,
                        failure: Some(err),
                    };
                    Ok((slide, report))
                }
            }
        }
    }
}

/// Analyse, crop, and synthesise one page. The raster is consumed.
async fn reconstruct_page(
    oracle: &dyn LayoutOracle,
    throttle: &dyn Throttle,
    page: PageImage,
    config: &ConversionConfig,
) -> Result<(Slide, PageReport), PageError> {
    let page_num = page.page_num;
    let analyzed = analyze_with_retry(
        oracle,
        throttle,
        &page,
        &config.retry,
        config.progress_callback.as_ref(),
        config.cancel.as_ref(),
    )
    .await?;

    let figures = extract_figures(&page.image, &analyzed.analysis.figures).map_err(|e| {
        PageError::FigureExtractionFailed {
            page: page_num,
            detail: e.to_string(),
        }
    })?;
    drop(page);

    let layout = analyzed.analysis.layout;
    let figure_count = figures.len();
    let slide = synthesize(analyzed.analysis, figures);
    let report = PageReport {
        page_num,
        layout: Some(layout),
        shapes: slide.shapes.len(),
        figures: figure_count,
        rate_limited: analyzed.rate_limited,
        duration_ms: 0,
        failure: None,
    };
    Ok((slide, report))
}

// ── Provider resolution ──────────────────────────────────────────────────

/// Default model when only a provider name is known.
fn default_model(provider_name: &str) -> &'static str {
    match provider_name {
        "gemini" | "google" => "gemini-2.0-flash",
        "anthropic" => "claude-sonnet-4-20250514",
        _ => "gpt-4.1-nano",
    }
}

fn create_vision_provider(
    provider_name: &str,
    model: &str,
) -> Result<Arc<dyn LLMProvider>, Pdf2PptxError> {
    ProviderFactory::create_llm_provider(provider_name, model).map_err(|e| {
        Pdf2PptxError::ProviderNotConfigured {
            provider: provider_name.to_string(),
            hint: format!("{e}"),
        }
    })
}

fn env_set(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

/// Resolve the vision provider, from most-specific to least-specific:
///
/// 1. **Pre-built provider** (`config.provider`), used as-is.
/// 2. **Named provider** (`config.provider_name`) with `config.model` or
///    that provider's default model.
/// 3. **Environment pair** `EDGEQUAKE_LLM_PROVIDER` + `EDGEQUAKE_MODEL`.
/// 4. **`GEMINI_API_KEY`**, then **`OPENAI_API_KEY`**.
/// 5. **Full auto-detection** via [`ProviderFactory::from_env`].
pub(crate) fn resolve_provider(
    config: &ConversionConfig,
) -> Result<Arc<dyn LLMProvider>, Pdf2PptxError> {
    if let Some(ref provider) = config.provider {
        return Ok(Arc::clone(provider));
    }

    if let Some(ref name) = config.provider_name {
        let model = config.model.as_deref().unwrap_or(default_model(name));
        return create_vision_provider(name, model);
    }

    if let (Some(prov), Some(model)) = (
        env_set("EDGEQUAKE_LLM_PROVIDER"),
        env_set("EDGEQUAKE_MODEL"),
    ) {
        return create_vision_provider(&prov, &model);
    }

    for (name, key) in [("gemini", "GEMINI_API_KEY"), ("openai", "OPENAI_API_KEY")] {
        if env_set(key).is_some() {
            let model = config.model.as_deref().unwrap_or(default_model(name));
            return create_vision_provider(name, model);
        }
    }

    let (llm_provider, _embedding) =
        ProviderFactory::from_env().map_err(|e| Pdf2PptxError::ProviderNotConfigured {
            provider: "auto".to_string(),
            hint: format!(
                "No vision provider could be auto-detected from environment.\n\
                Set GEMINI_API_KEY or OPENAI_API_KEY, or pass --provider.\n\
                Error: {}",
                e
            ),
        })?;

    Ok(llm_provider)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_models_per_provider() {
        assert_eq!(default_model("gemini"), "gemini-2.0-flash");
        assert_eq!(default_model("openai"), "gpt-4.1-nano");
        assert_eq!(default_model("anthropic"), "claude-sonnet-4-20250514");
    }

    #[tokio::test]
    async fn write_deck_replaces_atomically() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out").join("deck.pptx");
        write_deck(&path, b"first").await.unwrap();
        write_deck(&path, b"second").await.unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"second");
        assert!(!path.with_extension("pptx.tmp").exists());
    }

    #[tokio::test]
    async fn bytes_without_pdf_header_fail_before_provider_lookup() {
        let err = convert_from_bytes(b"not a pdf", &ConversionConfig::default())
            .await
            .unwrap_err();
        assert!(matches!(err, Pdf2PptxError::MalformedDocument { .. }));
    }
}
