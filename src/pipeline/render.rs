//! PDF rasterisation: a lazy, ordered sequence of page images.
//!
//! pdfium is not async-safe, so the document lives on one
//! `spawn_blocking` thread for its whole lifetime. The async side pulls
//! pages through a request channel: the worker renders page `n + 1` only
//! after the consumer has asked for it, which caps resident rasters at the
//! one being processed plus at most one in the hand-off slot.
//!
//! ```text
//!  next_page() ──req──▶ worker: render ──page──▶ next_page() returns
//! ```
//!
//! Dropping the [`PageRasterizer`] closes the request channel and the worker
//! exits without rendering anything further.

use crate::config::PageSelection;
use crate::error::Pdf2PptxError;
use crate::pipeline::input::ensure_pdf_magic;
use async_trait::async_trait;
use image::DynamicImage;
use pdfium_render::prelude::*;
use std::fmt;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info};

/// Fixed raster resolution. High enough that figure crops stay sharp when
/// placed at full slide width.
pub const PAGE_DPI: f32 = 300.0;

/// Longest edge of any raster, whatever the physical page size.
pub const MAX_RASTER_EDGE: i32 = 6000;

/// One rasterised page, owned by the stage currently processing it.
pub struct PageImage {
    /// 1-indexed page number in the source document.
    pub page_num: usize,
    pub image: DynamicImage,
}

impl fmt::Debug for PageImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PageImage")
            .field("page_num", &self.page_num)
            .field("width", &self.image.width())
            .field("height", &self.image.height())
            .finish()
    }
}

/// A finite, non-restartable sequence of pages in document order.
#[async_trait]
pub trait PageSource: Send {
    /// Number of pages the sequence will yield.
    fn total(&self) -> usize;

    /// The next page, or `None` once the sequence is exhausted.
    async fn next_page(&mut self) -> Option<Result<PageImage, Pdf2PptxError>>;
}

type PageResult = Result<PageImage, Pdf2PptxError>;

/// [`PageSource`] that rasterises a PDF held in memory.
pub struct PageRasterizer {
    total: usize,
    req_tx: mpsc::Sender<()>,
    page_rx: mpsc::Receiver<PageResult>,
}

impl PageRasterizer {
    /// Open a document and resolve the page selection.
    ///
    /// Fails before yielding any page if the bytes are not a loadable PDF,
    /// the password is missing or wrong, or the selection matches no page.
    pub async fn open(
        bytes: Vec<u8>,
        password: Option<String>,
        selection: PageSelection,
    ) -> Result<Self, Pdf2PptxError> {
        ensure_pdf_magic(&bytes)?;

        let (ready_tx, ready_rx) = oneshot::channel();
        let (req_tx, req_rx) = mpsc::channel::<()>(1);
        let (page_tx, page_rx) = mpsc::channel::<PageResult>(1);

        let worker = tokio::task::spawn_blocking(move || {
            render_worker(bytes, password, selection, ready_tx, req_rx, page_tx)
        });

        let total = match ready_rx.await {
            Ok(result) => result?,
            Err(_) => {
                let detail = match worker.await {
                    Err(e) => format!("Render task panicked: {e}"),
                    Ok(()) => "Render task exited before opening the document".to_string(),
                };
                return Err(Pdf2PptxError::Internal(detail));
            }
        };

        Ok(Self {
            total,
            req_tx,
            page_rx,
        })
    }
}

#[async_trait]
impl PageSource for PageRasterizer {
    fn total(&self) -> usize {
        self.total
    }

    async fn next_page(&mut self) -> Option<PageResult> {
        self.req_tx.send(()).await.ok()?;
        self.page_rx.recv().await
    }
}

/// Bind pdfium from `PDFIUM_LIB_PATH`, the working directory, or the system
/// library path, in that order.
fn bind_pdfium() -> Result<Pdfium, Pdf2PptxError> {
    let bindings = match std::env::var("PDFIUM_LIB_PATH") {
        Ok(dir) => Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path(&dir))
            .or_else(|_| Pdfium::bind_to_library(&dir)),
        Err(_) => Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path("./"))
            .or_else(|_| Pdfium::bind_to_system_library()),
    }
    .map_err(|e| Pdf2PptxError::PdfiumBindingFailed(e.to_string()))?;
    Ok(Pdfium::new(bindings))
}

fn map_load_error(err: PdfiumError, password_given: bool) -> Pdf2PptxError {
    let err_str = format!("{:?}", err);
    if err_str.contains("Password") || err_str.contains("password") {
        if password_given {
            Pdf2PptxError::WrongPassword
        } else {
            Pdf2PptxError::PasswordRequired
        }
    } else {
        Pdf2PptxError::MalformedDocument { detail: err_str }
    }
}

/// Blocking side of the rasteriser. Owns pdfium and the document.
fn render_worker(
    bytes: Vec<u8>,
    password: Option<String>,
    selection: PageSelection,
    ready_tx: oneshot::Sender<Result<usize, Pdf2PptxError>>,
    mut req_rx: mpsc::Receiver<()>,
    page_tx: mpsc::Sender<PageResult>,
) {
    let pdfium = match bind_pdfium() {
        Ok(p) => p,
        Err(e) => {
            let _ = ready_tx.send(Err(e));
            return;
        }
    };

    let document = match pdfium.load_pdf_from_byte_vec(bytes, password.as_deref()) {
        Ok(doc) => doc,
        Err(e) => {
            let _ = ready_tx.send(Err(map_load_error(e, password.is_some())));
            return;
        }
    };

    let pages = document.pages();
    let total_pages = pages.len() as usize;
    let indices = selection.to_indices(total_pages);
    info!(total_pages, selected = indices.len(), "PDF loaded");

    if indices.is_empty() && selection != PageSelection::All {
        let _ = ready_tx.send(Err(Pdf2PptxError::PageOutOfRange {
            page: selection.first_requested(),
            total: total_pages,
        }));
        return;
    }
    if ready_tx.send(Ok(indices.len())).is_err() {
        return;
    }

    let render_config = PdfRenderConfig::new()
        .scale_page_by_factor(PAGE_DPI / 72.0)
        .set_maximum_width(MAX_RASTER_EDGE)
        .set_maximum_height(MAX_RASTER_EDGE);

    for idx in indices {
        // Consumer gone: stop without rendering further pages.
        if req_rx.blocking_recv().is_none() {
            debug!(page = idx + 1, "Rasteriser released early");
            return;
        }

        let page_num = idx + 1;
        let result = render_page(pages, idx, &render_config);

        if let Ok(page) = &result {
            debug!(
                page = page_num,
                width = page.image.width(),
                height = page.image.height(),
                "Rendered page"
            );
        }
        if page_tx.blocking_send(result).is_err() {
            return;
        }
    }
}

fn render_page(
    pages: &PdfPages,
    idx: usize,
    config: &PdfRenderConfig,
) -> Result<PageImage, Pdf2PptxError> {
    let page_num = idx + 1;
    let failed = |e: PdfiumError| Pdf2PptxError::RasterisationFailed {
        page: page_num,
        detail: format!("{:?}", e),
    };

    let page = pages.get(idx as u16).map_err(failed)?;
    let bitmap = page.render_with_config(config).map_err(failed)?;
    Ok(PageImage {
        page_num,
        image: bitmap.as_image(),
    })
}
