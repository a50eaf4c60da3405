//! Layout synthesis: map a page analysis and its cropped figures onto slide
//! geometry.
//!
//! Each [`LayoutCategory`] selects a fixed template on a 10 × 7.5 in slide.
//! Templated images keep the crop's aspect ratio and are centred in their
//! frame. Figures a template has no slot for are placed afterwards at their
//! own box, scaled from the 0–1000 grid to the slide, so every crop lands in
//! exactly one shape.
//!
//! ```text
//! ┌──────────────────────────────┐
//! │ title                        │  MARGIN + TITLE_HEIGHT
//! ├──────────────┬───────────────┤  GAP
//! │   left half  │  right half   │  content area
//! └──────────────┴───────────────┘  MARGIN
//! ```
//!
//! [`synthesize`] is pure: the same input always yields the same slide.

use crate::error::PageError;
use crate::model::{
    CroppedFigure, ImageShape, LayoutCategory, NormalizedBox, PageAnalysis, PositionedShape, Rect,
    Slide, TextShape, TextStyle,
};
use std::cmp::Reverse;

/// Slide width in EMU (10 in).
pub const SLIDE_WIDTH: i64 = 9_144_000;
/// Slide height in EMU (7.5 in).
pub const SLIDE_HEIGHT: i64 = 6_858_000;

const MARGIN: i64 = 457_200;
const TITLE_HEIGHT: i64 = 1_143_000;
const GAP: i64 = 228_600;
/// Height of the text strip kept under figure grids.
const CAPTION_STRIP: i64 = 1_371_600;
/// Smallest text frame worth placing under freeform figures.
const MIN_TEXT_HEIGHT: i64 = 914_400;

const CONTENT_WIDTH: i64 = SLIDE_WIDTH - 2 * MARGIN;
const CONTENT_TOP: i64 = MARGIN + TITLE_HEIGHT + GAP;
const CONTENT_HEIGHT: i64 = SLIDE_HEIGHT - CONTENT_TOP - MARGIN;
const HALF_WIDTH: i64 = (CONTENT_WIDTH - GAP) / 2;

const TITLE_RECT: Rect = Rect::new(MARGIN, MARGIN, CONTENT_WIDTH, TITLE_HEIGHT);
const CONTENT_RECT: Rect = Rect::new(MARGIN, CONTENT_TOP, CONTENT_WIDTH, CONTENT_HEIGHT);
const LEFT_HALF: Rect = Rect::new(MARGIN, CONTENT_TOP, HALF_WIDTH, CONTENT_HEIGHT);
const RIGHT_HALF: Rect = Rect::new(
    SLIDE_WIDTH - MARGIN - HALF_WIDTH,
    CONTENT_TOP,
    HALF_WIDTH,
    CONTENT_HEIGHT,
);

/// Body text used on stand-in slides.
pub const PLACEHOLDER_BODY: &str = "Could not analyze this slide.";

/// Build the slide for one analysed page.
pub fn synthesize(analysis: PageAnalysis, figures: Vec<CroppedFigure>) -> Slide {
    let PageAnalysis {
        layout,
        title,
        body_lines,
        speaker_notes,
        ..
    } = analysis;

    let mut shapes = Vec::with_capacity(figures.len() + 3);
    let mut figures = figures.into_iter();

    match layout {
        LayoutCategory::TitleOnly => {
            let top = (SLIDE_HEIGHT - TITLE_HEIGHT) / 2;
            push_text(
                &mut shapes,
                vec![title],
                TextStyle::CenteredTitle,
                Rect::new(MARGIN, top, CONTENT_WIDTH, TITLE_HEIGHT),
            );
        }
        LayoutCategory::TitleAndContent => {
            push_title(&mut shapes, title);
            push_text(&mut shapes, body_lines, TextStyle::Bullets, CONTENT_RECT);
        }
        LayoutCategory::TwoColumn => {
            push_title(&mut shapes, title);
            let mut left = body_lines;
            let right = left.split_off(left.len().div_ceil(2));
            push_text(&mut shapes, left, TextStyle::Bullets, LEFT_HALF);
            push_text(&mut shapes, right, TextStyle::Bullets, RIGHT_HALF);
        }
        LayoutCategory::ImageLeftTextRight | LayoutCategory::ImageRightTextLeft => {
            push_title(&mut shapes, title);
            let (image_side, text_side) = if layout == LayoutCategory::ImageLeftTextRight {
                (LEFT_HALF, RIGHT_HALF)
            } else {
                (RIGHT_HALF, LEFT_HALF)
            };
            match figures.next() {
                Some(first) => {
                    let frame = fit_within(image_side, first.pixel_width, first.pixel_height);
                    push_image(&mut shapes, first, frame);
                    push_text(&mut shapes, body_lines, TextStyle::Bullets, text_side);
                }
                None => push_text(&mut shapes, body_lines, TextStyle::Bullets, CONTENT_RECT),
            }
        }
        LayoutCategory::FullImage | LayoutCategory::DiagramHeavy => {
            push_title(&mut shapes, title);
            let mut area = CONTENT_RECT;
            if !body_lines.is_empty() {
                area.height -= CAPTION_STRIP + GAP;
                let strip = Rect::new(MARGIN, area.bottom() + GAP, CONTENT_WIDTH, CAPTION_STRIP);
                push_text(&mut shapes, body_lines, TextStyle::Bullets, strip);
            }
            let mut ranked: Vec<CroppedFigure> = figures.by_ref().collect();
            ranked.sort_by_key(|f| Reverse(f.normalized_box.area()));
            let cells = grid_cells(area, ranked.len());
            for (figure, cell) in ranked.into_iter().zip(cells) {
                let frame = fit_within(cell, figure.pixel_width, figure.pixel_height);
                push_image(&mut shapes, figure, frame);
            }
        }
        LayoutCategory::MixedFreeform => {
            push_title(&mut shapes, title);
            let placed: Vec<CroppedFigure> = figures.by_ref().collect();
            let lowest = placed
                .iter()
                .map(|f| freeform_rect(&f.normalized_box).bottom())
                .max()
                .unwrap_or(0);
            let top = CONTENT_TOP.max(lowest + GAP);
            let below = SLIDE_HEIGHT - MARGIN - top;
            let text_area = if below >= MIN_TEXT_HEIGHT {
                Rect::new(MARGIN, top, CONTENT_WIDTH, below)
            } else {
                CONTENT_RECT
            };
            push_text(&mut shapes, body_lines, TextStyle::Bullets, text_area);
            for figure in placed {
                let frame = freeform_rect(&figure.normalized_box);
                push_image(&mut shapes, figure, frame);
            }
        }
    }

    // Figures without a template slot keep their own position.
    for figure in figures {
        let frame = freeform_rect(&figure.normalized_box);
        push_image(&mut shapes, figure, frame);
    }

    Slide {
        layout,
        shapes,
        speaker_notes,
    }
}

/// Stand-in slide for a page that could not be reconstructed.
///
/// Carries only the page number and the failure kind, never page content.
pub fn placeholder(page_num: usize, error: &PageError) -> Slide {
    let analysis = PageAnalysis {
        layout: LayoutCategory::TitleAndContent,
        title: format!("Slide {page_num} could not be reconstructed"),
        body_lines: vec![PLACEHOLDER_BODY.to_string()],
        speaker_notes: format!("Reconstruction failed: {}.", error.kind()),
        figures: Vec::new(),
    };
    synthesize(analysis, Vec::new())
}

/// Scale a normalised box onto the slide.
pub fn freeform_rect(bbox: &NormalizedBox) -> Rect {
    let (w, h) = (SLIDE_WIDTH as u64, SLIDE_HEIGHT as u64);
    let x = NormalizedBox::scale(bbox.x_min, w) as i64;
    let y = NormalizedBox::scale(bbox.y_min, h) as i64;
    let right = NormalizedBox::scale(bbox.x_max, w) as i64;
    let bottom = NormalizedBox::scale(bbox.y_max, h) as i64;
    Rect::new(x, y, right - x, bottom - y)
}

/// Largest rectangle with the image's aspect ratio that fits in `bounds`,
/// centred.
fn fit_within(bounds: Rect, pixel_width: u32, pixel_height: u32) -> Rect {
    let (pw, ph) = (pixel_width.max(1) as i64, pixel_height.max(1) as i64);
    let (width, height) = if pw * bounds.height <= ph * bounds.width {
        (pw * bounds.height / ph, bounds.height)
    } else {
        (bounds.width, ph * bounds.width / pw)
    };
    let (width, height) = (width.max(1), height.max(1));
    Rect::new(
        bounds.x + (bounds.width - width) / 2,
        bounds.y + (bounds.height - height) / 2,
        width,
        height,
    )
}

/// Near-square grid of `count` cells over `area`, row-major.
///
/// The gutter shrinks with the grid, never taking more than an eighth of a
/// cell's pitch, so cells stay positive however many figures there are.
fn grid_cells(area: Rect, count: usize) -> Vec<Rect> {
    if count == 0 {
        return Vec::new();
    }
    let mut cols = 1;
    while cols * cols < count {
        cols += 1;
    }
    let rows = count.div_ceil(cols);
    let (cols, rows) = (cols as i64, rows as i64);
    let gap = GAP.min(area.width / (cols * 8)).min(area.height / (rows * 8));
    let cell_w = ((area.width - gap * (cols - 1)) / cols).max(1);
    let cell_h = ((area.height - gap * (rows - 1)) / rows).max(1);

    (0..count as i64)
        .map(|i| {
            let (r, c) = (i / cols, i % cols);
            Rect::new(
                area.x + c * (cell_w + gap),
                area.y + r * (cell_h + gap),
                cell_w,
                cell_h,
            )
        })
        .collect()
}

fn push_title(shapes: &mut Vec<PositionedShape>, title: String) {
    push_text(shapes, vec![title], TextStyle::Title, TITLE_RECT);
}

fn push_text(shapes: &mut Vec<PositionedShape>, paragraphs: Vec<String>, style: TextStyle, geometry: Rect) {
    if paragraphs.iter().all(|p| p.trim().is_empty()) {
        return;
    }
    shapes.push(PositionedShape::Text(TextShape {
        paragraphs,
        style,
        geometry,
    }));
}

fn push_image(shapes: &mut Vec<PositionedShape>, figure: CroppedFigure, geometry: Rect) {
    shapes.push(PositionedShape::Image(ImageShape {
        image_bytes: figure.image_bytes,
        description: figure.description,
        geometry,
    }));
}

#[cfg(test)]
mod tests {
    use super::*;

    fn analysis(layout: LayoutCategory, body: &[&str]) -> PageAnalysis {
        PageAnalysis {
            layout,
            title: "Title".into(),
            body_lines: body.iter().map(|s| s.to_string()).collect(),
            speaker_notes: "notes".into(),
            figures: Vec::new(),
        }
    }

    fn crop(tag: u8, bbox: NormalizedBox, w: u32, h: u32) -> CroppedFigure {
        CroppedFigure {
            description: format!("fig {tag}"),
            image_bytes: vec![tag],
            pixel_width: w,
            pixel_height: h,
            normalized_box: bbox,
        }
    }

    fn texts(slide: &Slide) -> Vec<&TextShape> {
        slide
            .shapes
            .iter()
            .filter_map(|s| match s {
                PositionedShape::Text(t) => Some(t),
                _ => None,
            })
            .collect()
    }

    fn images(slide: &Slide) -> Vec<&ImageShape> {
        slide
            .shapes
            .iter()
            .filter_map(|s| match s {
                PositionedShape::Image(i) => Some(i),
                _ => None,
            })
            .collect()
    }

    fn inside_slide(r: &Rect) -> bool {
        r.x >= 0 && r.y >= 0 && r.right() <= SLIDE_WIDTH && r.bottom() <= SLIDE_HEIGHT
    }

    #[test]
    fn title_only_is_centred_and_drops_body() {
        let slide = synthesize(analysis(LayoutCategory::TitleOnly, &["ignored"]), vec![]);
        let t = texts(&slide);
        assert_eq!(t.len(), 1);
        assert_eq!(t[0].style, TextStyle::CenteredTitle);
        let centre = t[0].geometry.y + t[0].geometry.height / 2;
        assert_eq!(centre, SLIDE_HEIGHT / 2);
        assert_eq!(slide.speaker_notes, "notes");
    }

    #[test]
    fn two_column_splits_positionally() {
        let slide = synthesize(
            analysis(LayoutCategory::TwoColumn, &["a", "b", "c", "d", "e"]),
            vec![],
        );
        let t = texts(&slide);
        assert_eq!(t.len(), 3);
        assert_eq!(t[1].paragraphs, vec!["a", "b", "c"]);
        assert_eq!(t[2].paragraphs, vec!["d", "e"]);
        assert!(t[1].geometry.right() <= t[2].geometry.x);
    }

    #[test]
    fn image_left_puts_figure_in_left_half() {
        let slide = synthesize(
            analysis(LayoutCategory::ImageLeftTextRight, &["point"]),
            vec![crop(1, NormalizedBox::new(100, 100, 900, 500), 400, 300)],
        );
        let img = images(&slide)[0];
        let body = texts(&slide)[1];
        assert!(img.geometry.right() <= body.geometry.x);
        assert!(!img.geometry.overlaps(&body.geometry));
        // 4:3 crop keeps its aspect ratio.
        assert_eq!(img.geometry.width * 3, img.geometry.height * 4);
    }

    #[test]
    fn image_right_mirrors_image_left() {
        let slide = synthesize(
            analysis(LayoutCategory::ImageRightTextLeft, &["point"]),
            vec![crop(1, NormalizedBox::new(0, 0, 1000, 1000), 100, 100)],
        );
        let img = images(&slide)[0];
        let body = texts(&slide)[1];
        assert!(body.geometry.right() <= img.geometry.x);
    }

    #[test]
    fn image_layout_without_figures_uses_full_content_area() {
        let slide = synthesize(analysis(LayoutCategory::ImageLeftTextRight, &["a"]), vec![]);
        assert_eq!(texts(&slide)[1].geometry, CONTENT_RECT);
    }

    #[test]
    fn full_image_orders_largest_first() {
        let small = crop(1, NormalizedBox::new(0, 0, 100, 100), 10, 10);
        let large = crop(2, NormalizedBox::new(0, 0, 900, 900), 10, 10);
        let slide = synthesize(analysis(LayoutCategory::FullImage, &[]), vec![small, large]);
        let imgs = images(&slide);
        assert_eq!(imgs.len(), 2);
        assert_eq!(imgs[0].image_bytes, vec![2]);
        assert_eq!(imgs[1].image_bytes, vec![1]);
        assert!(!imgs[0].geometry.overlaps(&imgs[1].geometry));
    }

    #[test]
    fn diagram_heavy_reserves_strip_for_text() {
        let figs = (0..3)
            .map(|i| crop(i, NormalizedBox::new(0, 0, 500, 500), 50, 50))
            .collect();
        let slide = synthesize(analysis(LayoutCategory::DiagramHeavy, &["caption"]), figs);
        let strip = texts(&slide)[1].geometry;
        for img in images(&slide) {
            assert!(!img.geometry.overlaps(&strip));
            assert!(inside_slide(&img.geometry));
        }
    }

    #[test]
    fn crowded_grid_keeps_every_figure_visible() {
        let figs = (0..400)
            .map(|i| crop((i % 256) as u8, NormalizedBox::new(0, 0, 500, 500), 640, 480))
            .collect();
        let slide = synthesize(analysis(LayoutCategory::DiagramHeavy, &["caption"]), figs);
        let imgs = images(&slide);
        assert_eq!(imgs.len(), 400);
        for img in imgs {
            assert!(img.geometry.width > 0 && img.geometry.height > 0, "{:?}", img.geometry);
            assert!(inside_slide(&img.geometry));
        }
    }

    #[test]
    fn extreme_aspect_ratio_still_has_extent() {
        let sliver = crop(1, NormalizedBox::new(0, 0, 1000, 10), 1, 6000);
        let slide = synthesize(analysis(LayoutCategory::FullImage, &[]), vec![sliver]);
        let g = images(&slide)[0].geometry;
        assert!(g.width > 0 && g.height > 0);
    }

    #[test]
    fn freeform_scales_boxes_to_slide() {
        let rect = freeform_rect(&NormalizedBox::new(0, 0, 500, 500));
        assert_eq!(rect, Rect::new(0, 0, 4_572_000, 3_429_000));
    }

    #[test]
    fn mixed_freeform_places_body_below_figures() {
        let slide = synthesize(
            analysis(LayoutCategory::MixedFreeform, &["below"]),
            vec![crop(1, NormalizedBox::new(200, 100, 500, 900), 10, 10)],
        );
        let body = texts(&slide)[1].geometry;
        let img = images(&slide)[0].geometry;
        assert!(body.y >= img.bottom());
    }

    #[test]
    fn surplus_figures_are_still_placed() {
        let figs = vec![
            crop(1, NormalizedBox::new(0, 0, 100, 100), 10, 10),
            crop(2, NormalizedBox::new(500, 500, 700, 900), 10, 10),
        ];
        for layout in [
            LayoutCategory::TitleOnly,
            LayoutCategory::TitleAndContent,
            LayoutCategory::TwoColumn,
            LayoutCategory::ImageLeftTextRight,
        ] {
            let slide = synthesize(analysis(layout, &["x"]), figs.clone());
            let mut tags: Vec<u8> = images(&slide).iter().map(|i| i.image_bytes[0]).collect();
            tags.sort_unstable();
            assert_eq!(tags, vec![1, 2], "layout {layout}");
        }
    }

    #[test]
    fn every_layout_is_deterministic_and_on_slide() {
        let figs = vec![
            crop(1, NormalizedBox::new(100, 100, 400, 600), 300, 200),
            crop(2, NormalizedBox::new(500, 100, 900, 900), 800, 400),
        ];
        for layout in LayoutCategory::ALL {
            let a = synthesize(analysis(layout, &["one", "two"]), figs.clone());
            let b = synthesize(analysis(layout, &["one", "two"]), figs.clone());
            assert_eq!(a, b);
            assert_eq!(a.image_count(), 2, "layout {layout}");
            for shape in &a.shapes {
                assert!(inside_slide(&shape.geometry()), "layout {layout}");
            }
        }
    }

    #[test]
    fn empty_body_produces_no_text_frame() {
        let slide = synthesize(analysis(LayoutCategory::TitleAndContent, &[]), vec![]);
        assert_eq!(texts(&slide).len(), 1);
    }

    #[test]
    fn placeholder_names_page_and_kind_only() {
        let err = PageError::InvalidAnalysis {
            page: 4,
            reason: "'title' is empty".into(),
        };
        let slide = placeholder(4, &err);
        let t = texts(&slide);
        assert_eq!(t[0].paragraphs, vec!["Slide 4 could not be reconstructed"]);
        assert_eq!(t[1].paragraphs, vec![PLACEHOLDER_BODY]);
        assert!(slide.speaker_notes.contains("invalid analysis"));
        assert!(!slide.speaker_notes.contains("title"));
    }
}
