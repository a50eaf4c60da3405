//! Streaming conversion API: emit slides one page at a time.
//!
//! The eager [`crate::convert::convert`] keeps the deck inside the
//! library. A stream hands each [`Slide`] to the caller instead, who can
//! feed their own [`crate::pipeline::deck::DeckAssembler`], preview slides,
//! or stop early. Nothing is rendered or analysed until the stream is
//! polled, and dropping the stream releases the rasteriser.
//!
//! Slides arrive in page order. The first fatal error (including a page
//! failure under [`crate::config::PageFailurePolicy::Abort`]) is yielded as
//! the last item.

use crate::config::ConversionConfig;
use crate::convert::{resolve_provider, settle_page};
use crate::error::Pdf2PptxError;
use crate::model::Slide;
use crate::output::PageReport;
use crate::pipeline::input;
use crate::pipeline::oracle::{LayoutOracle, VisionOracle};
use crate::pipeline::render::{PageRasterizer, PageSource};
use crate::pipeline::retry::{Throttle, TokioThrottle};
use futures::stream;
use std::pin::Pin;
use tokio_stream::Stream;
use tracing::info;

/// One reconstructed page.
#[derive(Debug, Clone)]
pub struct StreamedSlide {
    pub slide: Slide,
    pub report: PageReport,
}

/// A boxed stream of slides in page order.
pub type SlideStream = Pin<Box<dyn Stream<Item = Result<StreamedSlide, Pdf2PptxError>> + Send>>;

/// Convert a PDF file or URL, streaming slides as they are rebuilt.
pub async fn convert_stream(
    input_str: impl AsRef<str>,
    config: &ConversionConfig,
) -> Result<SlideStream, Pdf2PptxError> {
    let input_str = input_str.as_ref();
    info!("Starting streaming conversion: {}", input_str);

    let bytes = input::resolve_input(input_str, config.download_timeout_secs).await?;
    convert_stream_from_bytes(&bytes, config).await
}

/// Convert PDF bytes in memory, streaming slides as they are rebuilt.
///
/// # Returns
/// - `Ok(SlideStream)` once the document has opened and a provider resolved
/// - `Err(Pdf2PptxError)` for a malformed document, bad password, empty
///   page selection, or missing provider
///
/// # Example
/// ```rust,no_run
/// use edgequake_pdf2pptx::{convert_stream_from_bytes, ConversionConfig, DeckAssembler};
/// use futures::StreamExt;
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let bytes: Vec<u8> = std::fs::read("slides.pdf")?;
/// let mut stream = convert_stream_from_bytes(&bytes, &ConversionConfig::default()).await?;
/// let mut deck = DeckAssembler::new();
/// while let Some(item) = stream.next().await {
///     let page = item?;
///     println!("Page {}: {} shapes", page.report.page_num, page.report.shapes);
///     deck.append(page.slide)?;
/// }
/// std::fs::write("rebuilt.pptx", deck.finish()?)?;
/// # Ok(())
/// # }
/// ```
pub async fn convert_stream_from_bytes(
    bytes: &[u8],
    config: &ConversionConfig,
) -> Result<SlideStream, Pdf2PptxError> {
    let source =
        PageRasterizer::open(bytes.to_vec(), config.password.clone(), config.pages.clone()).await?;
    let provider = resolve_provider(config)?;
    let oracle = VisionOracle::new(provider, config);

    Ok(slide_stream(source, oracle, TokioThrottle, config.clone()))
}

struct StreamState<S, O, T> {
    source: S,
    oracle: O,
    throttle: T,
    config: ConversionConfig,
    completed: usize,
    done: bool,
}

/// Build a slide stream over any page source, oracle, and throttle.
pub fn slide_stream<S, O, T>(source: S, oracle: O, throttle: T, config: ConversionConfig) -> SlideStream
where
    S: PageSource + 'static,
    O: LayoutOracle + 'static,
    T: Throttle + 'static,
{
    let state = StreamState {
        source,
        oracle,
        throttle,
        config,
        completed: 0,
        done: false,
    };

    Box::pin(stream::unfold(state, |mut st| async move {
        if st.done {
            return None;
        }
        if st.config.is_cancelled() {
            st.done = true;
            let err = Pdf2PptxError::Cancelled {
                completed: st.completed,
            };
            return Some((Err(err), st));
        }

        let page = match st.source.next_page().await? {
            Ok(page) => page,
            Err(e) => {
                st.done = true;
                return Some((Err(e), st));
            }
        };

        let total = st.source.total();
        let item = settle_page(&st.oracle, &st.throttle, page, total, st.completed, &st.config)
            .await
            .map(|(slide, report)| StreamedSlide { slide, report });
        match item {
            Ok(_) => st.completed += 1,
            Err(_) => st.done = true,
        }
        Some((item, st))
    }))
}
