//! Figure extraction: cut each figure region out of the page raster.
//!
//! Boxes arrive on the 0–1000 grid in `(y_min, x_min, y_max, x_max)` order
//! and are scaled independently per axis:
//!
//! ```text
//! px = normalized * extent / 1000     (integer floor)
//! ```
//!
//! Regions are clamped to the raster. A region left with no pixels after
//! clamping is skipped without failing the page.

use crate::model::{CroppedFigure, FigureRegion, NormalizedBox};
use crate::pipeline::encode::encode_png;
use image::DynamicImage;
use tracing::debug;

/// Pixel rectangle inside a raster, `right`/`bottom` exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelRegion {
    pub left: u32,
    pub top: u32,
    pub right: u32,
    pub bottom: u32,
}

impl PixelRegion {
    pub fn width(&self) -> u32 {
        self.right - self.left
    }

    pub fn height(&self) -> u32 {
        self.bottom - self.top
    }
}

/// Map a normalised box onto a `width × height` raster.
///
/// Returns `None` when the clamped region has no area.
pub fn to_pixel_region(bbox: &NormalizedBox, width: u32, height: u32) -> Option<PixelRegion> {
    let (w, h) = (width as u64, height as u64);
    let clamp = |v: u64, max: u64| v.min(max) as u32;

    let region = PixelRegion {
        left: clamp(NormalizedBox::scale(bbox.x_min, w), w),
        top: clamp(NormalizedBox::scale(bbox.y_min, h), h),
        right: clamp(NormalizedBox::scale(bbox.x_max, w), w),
        bottom: clamp(NormalizedBox::scale(bbox.y_max, h), h),
    };

    (region.left < region.right && region.top < region.bottom).then_some(region)
}

/// Crop every figure region out of `page` and PNG-encode the result.
///
/// Output order matches the input order, minus skipped regions.
pub fn extract_figures(
    page: &DynamicImage,
    figures: &[FigureRegion],
) -> Result<Vec<CroppedFigure>, image::ImageError> {
    let (width, height) = (page.width(), page.height());
    let mut out = Vec::with_capacity(figures.len());

    for (i, figure) in figures.iter().enumerate() {
        let Some(region) = to_pixel_region(&figure.bbox, width, height) else {
            debug!(figure = i, "Skipping figure with no pixels inside the page");
            continue;
        };

        let crop = page.crop_imm(region.left, region.top, region.width(), region.height());
        let image_bytes = encode_png(&crop)?;

        out.push(CroppedFigure {
            description: figure.description.clone(),
            image_bytes,
            pixel_width: region.width(),
            pixel_height: region.height(),
            normalized_box: figure.bbox,
        });
    }

    Ok(out)
}
