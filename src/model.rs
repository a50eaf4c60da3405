//! Data model shared by the pipeline stages.
//!
//! Everything here is transient: a value is created for one page, handed to
//! the next stage by move, and dropped once that page's slide has been
//! appended to the deck.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Side of the normalised coordinate grid used by the vision model.
pub const NORMALIZED_GRID: u32 = 1000;

/// Inferred layout intent of one page. Closed set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LayoutCategory {
    TitleOnly,
    TitleAndContent,
    TwoColumn,
    ImageLeftTextRight,
    ImageRightTextLeft,
    FullImage,
    DiagramHeavy,
    MixedFreeform,
}

impl LayoutCategory {
    /// Every category, in schema order.
    pub const ALL: [LayoutCategory; 8] = [
        LayoutCategory::TitleOnly,
        LayoutCategory::TitleAndContent,
        LayoutCategory::TwoColumn,
        LayoutCategory::ImageLeftTextRight,
        LayoutCategory::ImageRightTextLeft,
        LayoutCategory::FullImage,
        LayoutCategory::DiagramHeavy,
        LayoutCategory::MixedFreeform,
    ];

    /// Wire name used in the oracle schema.
    pub fn as_str(self) -> &'static str {
        match self {
            LayoutCategory::TitleOnly => "title_only",
            LayoutCategory::TitleAndContent => "title_and_content",
            LayoutCategory::TwoColumn => "two_column",
            LayoutCategory::ImageLeftTextRight => "image_left_text_right",
            LayoutCategory::ImageRightTextLeft => "image_right_text_left",
            LayoutCategory::FullImage => "full_image",
            LayoutCategory::DiagramHeavy => "diagram_heavy",
            LayoutCategory::MixedFreeform => "mixed_freeform",
        }
    }
}

impl fmt::Display for LayoutCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when a string names no [`LayoutCategory`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownLayout;

impl FromStr for LayoutCategory {
    type Err = UnknownLayout;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        LayoutCategory::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or(UnknownLayout)
    }
}

/// A box on the 0–1000 grid, in the model's `(y_min, x_min, y_max, x_max)` order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NormalizedBox {
    pub y_min: u32,
    pub x_min: u32,
    pub y_max: u32,
    pub x_max: u32,
}

impl NormalizedBox {
    pub fn new(y_min: u32, x_min: u32, y_max: u32, x_max: u32) -> Self {
        Self {
            y_min,
            x_min,
            y_max,
            x_max,
        }
    }

    /// Area on the normalised grid; zero for inverted boxes.
    pub fn area(&self) -> u64 {
        let h = self.y_max.saturating_sub(self.y_min) as u64;
        let w = self.x_max.saturating_sub(self.x_min) as u64;
        h * w
    }

    /// `true` when both axes have positive extent.
    pub fn is_ordered(&self) -> bool {
        self.y_min < self.y_max && self.x_min < self.x_max
    }

    /// Scale one normalised coordinate onto an axis of `extent` units.
    ///
    /// `normalized / 1000 * extent`, computed in integers so the result is
    /// exact whenever the division is.
    pub fn scale(normalized: u32, extent: u64) -> u64 {
        normalized as u64 * extent / NORMALIZED_GRID as u64
    }
}

/// A non-text visual element (chart, diagram, photo) located by the oracle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FigureRegion {
    pub description: String,
    pub bbox: NormalizedBox,
}

/// Validated structured description of one page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageAnalysis {
    pub layout: LayoutCategory,
    pub title: String,
    pub body_lines: Vec<String>,
    pub speaker_notes: String,
    pub figures: Vec<FigureRegion>,
}

/// A figure cut out of the page raster, PNG-encoded in memory.
#[derive(Clone, PartialEq, Eq)]
pub struct CroppedFigure {
    pub description: String,
    pub image_bytes: Vec<u8>,
    /// Pixel size of the crop, used to preserve aspect ratio on the slide.
    pub pixel_width: u32,
    pub pixel_height: u32,
    pub normalized_box: NormalizedBox,
}

impl fmt::Debug for CroppedFigure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CroppedFigure")
            .field("image_bytes", &format_args!("<{} bytes>", self.image_bytes.len()))
            .field("pixel_width", &self.pixel_width)
            .field("pixel_height", &self.pixel_height)
            .field("normalized_box", &self.normalized_box)
            .finish_non_exhaustive()
    }
}

/// Rectangle in slide coordinates (EMU, 914 400 per inch).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rect {
    pub x: i64,
    pub y: i64,
    pub width: i64,
    pub height: i64,
}

impl Rect {
    pub const fn new(x: i64, y: i64, width: i64, height: i64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn right(&self) -> i64 {
        self.x + self.width
    }

    pub fn bottom(&self) -> i64 {
        self.y + self.height
    }

    /// `true` if the two rectangles share any interior area.
    pub fn overlaps(&self, other: &Rect) -> bool {
        self.x < other.right()
            && other.x < self.right()
            && self.y < other.bottom()
            && other.y < self.bottom()
    }
}

/// How a text frame is rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TextStyle {
    /// Slide title anchored at the top.
    Title,
    /// Title centred both ways (`title_only` slides).
    CenteredTitle,
    /// One bullet per line.
    Bullets,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextShape {
    /// One paragraph per entry.
    pub paragraphs: Vec<String>,
    pub style: TextStyle,
    pub geometry: Rect,
}

#[derive(Clone, PartialEq, Eq)]
pub struct ImageShape {
    pub image_bytes: Vec<u8>,
    /// Alt text for the picture.
    pub description: String,
    pub geometry: Rect,
}

impl fmt::Debug for ImageShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImageShape")
            .field("image_bytes", &format_args!("<{} bytes>", self.image_bytes.len()))
            .field("geometry", &self.geometry)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PositionedShape {
    Text(TextShape),
    Image(ImageShape),
}

impl PositionedShape {
    pub fn geometry(&self) -> Rect {
        match self {
            PositionedShape::Text(t) => t.geometry,
            PositionedShape::Image(i) => i.geometry,
        }
    }
}

/// One reconstructed slide, ready to append to the deck.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Slide {
    pub layout: LayoutCategory,
    pub shapes: Vec<PositionedShape>,
    pub speaker_notes: String,
}

impl Slide {
    pub fn image_count(&self) -> usize {
        self.shapes
            .iter()
            .filter(|s| matches!(s, PositionedShape::Image(_)))
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_round_trips_through_wire_names() {
        for category in LayoutCategory::ALL {
            assert_eq!(category.as_str().parse::<LayoutCategory>(), Ok(category));
        }
        assert_eq!("three_column".parse::<LayoutCategory>(), Err(UnknownLayout));
        assert_eq!("Title_Only".parse::<LayoutCategory>(), Err(UnknownLayout));
    }

    #[test]
    fn layout_serde_uses_snake_case() {
        let json = serde_json::to_string(&LayoutCategory::ImageLeftTextRight).unwrap();
        assert_eq!(json, "\"image_left_text_right\"");
    }

    #[test]
    fn normalized_scale_is_exact_on_even_divisions() {
        assert_eq!(NormalizedBox::scale(500, 2000), 1000);
        assert_eq!(NormalizedBox::scale(1000, 1000), 1000);
        assert_eq!(NormalizedBox::scale(250, 9_144_000), 2_286_000);
    }

    #[test]
    fn area_of_inverted_box_is_zero() {
        assert_eq!(NormalizedBox::new(500, 0, 100, 1000).area(), 0);
        assert_eq!(NormalizedBox::new(0, 0, 100, 200).area(), 20_000);
    }

    #[test]
    fn rect_overlap() {
        let a = Rect::new(0, 0, 10, 10);
        assert!(a.overlaps(&Rect::new(5, 5, 10, 10)));
        assert!(!a.overlaps(&Rect::new(10, 0, 10, 10)));
    }

    #[test]
    fn debug_output_hides_image_bytes() {
        let shape = ImageShape {
            image_bytes: vec![1, 2, 3],
            description: "chart".into(),
            geometry: Rect::new(0, 0, 1, 1),
        };
        let dbg = format!("{shape:?}");
        assert!(dbg.contains("<3 bytes>"));
        assert!(!dbg.contains("chart"));
    }
}
