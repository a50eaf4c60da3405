//! Image encoding: page raster → base64 PNG wrapped in `ImageData`.
//!
//! The analysis copy is downscaled to `oracle_max_pixels` on its longest
//! edge. The full-resolution raster is kept for cropping; since the model
//! answers on a normalised 0–1000 grid, the two never need to agree on size.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use edgequake_llm::ImageData;
use image::imageops::FilterType;
use image::DynamicImage;
use std::io::Cursor;
use tracing::debug;

/// PNG-encode an image into memory.
pub fn encode_png(img: &DynamicImage) -> Result<Vec<u8>, image::ImageError> {
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)?;
    Ok(buf)
}

/// Encode a rasterised page for the VLM API, downscaling if its longest
/// edge exceeds `max_pixels`.
///
/// `detail: "high"` keeps small labels legible to tile-based models.
pub fn encode_page(img: &DynamicImage, max_pixels: u32) -> Result<ImageData, image::ImageError> {
    let longest = img.width().max(img.height());
    let png = if longest > max_pixels {
        let scaled = img.resize(max_pixels, max_pixels, FilterType::Triangle);
        encode_png(&scaled)?
    } else {
        encode_png(img)?
    };

    let b64 = STANDARD.encode(&png);
    debug!(
        src_width = img.width(),
        src_height = img.height(),
        b64_len = b64.len(),
        "Encoded page for analysis"
    );

    Ok(ImageData::new(b64, "image/png").with_detail("high"))
}
