//! Deck assembly: fold slides into a PPTX package, one at a time.
//!
//! A PPTX file is a zip of XML parts. [`DeckAssembler::append`] writes each
//! slide's own parts (slide XML, its pictures, its notes) straight into an
//! in-memory zip, so a slide's image bytes are released as soon as it is
//! appended. Parts that list every slide (`presentation.xml`, content
//! types) are written by [`DeckAssembler::finish`].

mod parts;

use crate::error::Pdf2PptxError;
use crate::model::{ImageShape, PositionedShape, Rect, Slide, TextShape, TextStyle};
use quick_xml::escape::escape;
use std::fmt::Write as _;
use std::io::{Cursor, Write};
use tracing::debug;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use parts::{NS_A, NS_P, NS_R};

/// Font sizes in hundredths of a point.
const TITLE_SIZE: u32 = 3200;
const CENTERED_TITLE_SIZE: u32 = 4000;
const BODY_SIZE: u32 = 1800;
const NOTES_SIZE: u32 = 1200;

/// Append-only PPTX writer.
pub struct DeckAssembler {
    zip: ZipWriter<Cursor<Vec<u8>>>,
    slide_count: usize,
    media_count: usize,
    /// 1-based numbers of slides that carry speaker notes, ascending.
    notes: Vec<usize>,
}

impl Default for DeckAssembler {
    fn default() -> Self {
        Self::new()
    }
}

impl DeckAssembler {
    pub fn new() -> Self {
        Self {
            zip: ZipWriter::new(Cursor::new(Vec::new())),
            slide_count: 0,
            media_count: 0,
            notes: Vec::new(),
        }
    }

    /// Slides appended so far.
    pub fn slide_count(&self) -> usize {
        self.slide_count
    }

    /// Append one slide after all previously appended slides.
    pub fn append(&mut self, slide: Slide) -> Result<(), Pdf2PptxError> {
        let number = self.slide_count + 1;
        let has_notes = !slide.speaker_notes.trim().is_empty();

        let mut media = Vec::with_capacity(slide.image_count());
        let mut xml = String::with_capacity(4096);
        write_slide_open(&mut xml)?;
        for (i, shape) in slide.shapes.iter().enumerate() {
            let shape_id = i as u32 + 2;
            match shape {
                PositionedShape::Text(text) => write_text_shape(&mut xml, shape_id, text)?,
                PositionedShape::Image(image) => {
                    self.media_count += 1;
                    let name = format!("image{}.png", self.media_count);
                    let rel_id = parts::image_rel_id(media.len());
                    write_picture(&mut xml, shape_id, &rel_id, image)?;
                    self.write_part(&format!("ppt/media/{name}"), &image.image_bytes, true)?;
                    media.push(name);
                }
            }
        }
        xml.push_str("</p:spTree></p:cSld><p:clrMapOvr><a:masterClrMapping/></p:clrMapOvr></p:sld>");

        self.write_part(&format!("ppt/slides/slide{number}.xml"), xml.as_bytes(), false)?;
        let rels = parts::slide_relationships(&media, has_notes.then_some(number));
        self.write_part(
            &format!("ppt/slides/_rels/slide{number}.xml.rels"),
            rels.to_xml()?.as_bytes(),
            false,
        )?;

        if has_notes {
            let notes = notes_xml(&slide.speaker_notes)?;
            self.write_part(&format!("ppt/notesSlides/notesSlide{number}.xml"), notes.as_bytes(), false)?;
            self.write_part(
                &format!("ppt/notesSlides/_rels/notesSlide{number}.xml.rels"),
                parts::notes_relationships(number).to_xml()?.as_bytes(),
                false,
            )?;
            self.notes.push(number);
        }

        self.slide_count = number;
        debug!(
            slide = number,
            layout = %slide.layout,
            shapes = slide.shapes.len(),
            images = media.len(),
            "Appended slide"
        );
        Ok(())
    }

    /// Write the package-level parts and return the finished `.pptx` bytes.
    pub fn finish(mut self) -> Result<Vec<u8>, Pdf2PptxError> {
        let with_notes = !self.notes.is_empty();
        let (presentation, rels) = parts::presentation(self.slide_count, with_notes)?;

        self.write_part("ppt/presentation.xml", presentation.as_bytes(), false)?;
        self.write_part("ppt/_rels/presentation.xml.rels", rels.to_xml()?.as_bytes(), false)?;
        self.write_part("ppt/slideMasters/slideMaster1.xml", parts::slide_master().as_bytes(), false)?;
        self.write_part(
            "ppt/slideMasters/_rels/slideMaster1.xml.rels",
            parts::master_relationships().to_xml()?.as_bytes(),
            false,
        )?;
        self.write_part("ppt/slideLayouts/slideLayout1.xml", parts::blank_layout().as_bytes(), false)?;
        self.write_part(
            "ppt/slideLayouts/_rels/slideLayout1.xml.rels",
            parts::layout_relationships().to_xml()?.as_bytes(),
            false,
        )?;
        let theme = parts::theme();
        self.write_part("ppt/theme/theme1.xml", theme.as_bytes(), false)?;
        if with_notes {
            self.write_part("ppt/theme/theme2.xml", theme.as_bytes(), false)?;
            self.write_part("ppt/notesMasters/notesMaster1.xml", parts::notes_master().as_bytes(), false)?;
            self.write_part(
                "ppt/notesMasters/_rels/notesMaster1.xml.rels",
                parts::notes_master_relationships().to_xml()?.as_bytes(),
                false,
            )?;
        }
        self.write_part(
            "[Content_Types].xml",
            parts::content_types(self.slide_count, &self.notes)?.as_bytes(),
            false,
        )?;
        self.write_part("_rels/.rels", parts::root_relationships().to_xml()?.as_bytes(), false)?;

        let bytes = self.zip.finish()?.into_inner();
        debug!(slides = self.slide_count, bytes = bytes.len(), "Deck finished");
        Ok(bytes)
    }

    fn write_part(&mut self, name: &str, data: &[u8], stored: bool) -> Result<(), Pdf2PptxError> {
        let method = if stored {
            CompressionMethod::Stored
        } else {
            CompressionMethod::Deflated
        };
        self.zip
            .start_file(name, SimpleFileOptions::default().compression_method(method))?;
        self.zip.write_all(data)?;
        Ok(())
    }
}

/// Assemble a whole deck from an ordered sequence of slides.
pub fn assemble(slides: impl IntoIterator<Item = Slide>) -> Result<Vec<u8>, Pdf2PptxError> {
    let mut deck = DeckAssembler::new();
    for slide in slides {
        deck.append(slide)?;
    }
    deck.finish()
}

// ── Shape XML ────────────────────────────────────────────────────────────

/// Escape text for XML, dropping characters XML 1.0 cannot carry.
fn xml_text(s: &str) -> String {
    let clean: String = s
        .chars()
        .filter(|&c| matches!(c, '\t' | '\n' | '\r' | '\u{20}'..='\u{D7FF}' | '\u{E000}'..='\u{FFFD}' | '\u{10000}'..='\u{10FFFF}'))
        .collect();
    escape(clean.as_str()).into_owned()
}

fn write_slide_open(xml: &mut String) -> std::fmt::Result {
    write!(
        xml,
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><p:sld xmlns:a="{NS_A}" xmlns:r="{NS_R}" xmlns:p="{NS_P}"><p:cSld><p:spTree>{}"#,
        parts::GROUP_PROPERTIES
    )
}

fn write_xfrm(xml: &mut String, g: Rect) -> std::fmt::Result {
    write!(
        xml,
        r#"<a:xfrm><a:off x="{}" y="{}"/><a:ext cx="{}" cy="{}"/></a:xfrm>"#,
        g.x,
        g.y,
        g.width.max(0),
        g.height.max(0)
    )
}

fn write_text_shape(xml: &mut String, id: u32, text: &TextShape) -> std::fmt::Result {
    let (name, anchor) = match text.style {
        TextStyle::Title => ("Title", "b"),
        TextStyle::CenteredTitle => ("Title", "ctr"),
        TextStyle::Bullets => ("Text", "t"),
    };
    write!(
        xml,
        r#"<p:sp><p:nvSpPr><p:cNvPr id="{id}" name="{name} {id}"/><p:cNvSpPr txBox="1"/><p:nvPr/></p:nvSpPr><p:spPr>"#
    )?;
    write_xfrm(xml, text.geometry)?;
    xml.push_str(r#"<a:prstGeom prst="rect"><a:avLst/></a:prstGeom><a:noFill/></p:spPr>"#);
    write!(
        xml,
        r#"<p:txBody><a:bodyPr wrap="square" rtlCol="0" anchor="{anchor}"><a:normAutofit/></a:bodyPr><a:lstStyle/>"#
    )?;

    for paragraph in &text.paragraphs {
        match text.style {
            TextStyle::Title => xml.push_str("<a:p>"),
            TextStyle::CenteredTitle => xml.push_str(r#"<a:p><a:pPr algn="ctr"/>"#),
            TextStyle::Bullets => xml.push_str(
                r#"<a:p><a:pPr marL="285750" indent="-285750"><a:buFont typeface="Arial"/><a:buChar char="•"/></a:pPr>"#,
            ),
        }
        let (size, bold) = match text.style {
            TextStyle::Title => (TITLE_SIZE, r#" b="1""#),
            TextStyle::CenteredTitle => (CENTERED_TITLE_SIZE, r#" b="1""#),
            TextStyle::Bullets => (BODY_SIZE, ""),
        };
        write!(
            xml,
            r#"<a:r><a:rPr lang="en-US" sz="{size}"{bold} dirty="0"/><a:t>{}</a:t></a:r></a:p>"#,
            xml_text(paragraph)
        )?;
    }
    xml.push_str("</p:txBody></p:sp>");
    Ok(())
}

fn write_picture(xml: &mut String, id: u32, rel_id: &str, image: &ImageShape) -> std::fmt::Result {
    write!(
        xml,
        r#"<p:pic><p:nvPicPr><p:cNvPr id="{id}" name="Picture {id}" descr="{}"/><p:cNvPicPr><a:picLocks noChangeAspect="1"/></p:cNvPicPr><p:nvPr/></p:nvPicPr>"#,
        xml_text(&image.description)
    )?;
    write!(
        xml,
        r#"<p:blipFill><a:blip r:embed="{rel_id}"/><a:stretch><a:fillRect/></a:stretch></p:blipFill><p:spPr>"#
    )?;
    write_xfrm(xml, image.geometry)?;
    xml.push_str(r#"<a:prstGeom prst="rect"><a:avLst/></a:prstGeom></p:spPr></p:pic>"#);
    Ok(())
}

fn notes_xml(notes: &str) -> Result<String, std::fmt::Error> {
    let mut xml = String::with_capacity(1024 + notes.len());
    write!(
        xml,
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><p:notes xmlns:a="{NS_A}" xmlns:r="{NS_R}" xmlns:p="{NS_P}"><p:cSld><p:spTree>{}"#,
        parts::GROUP_PROPERTIES
    )?;
    xml.push_str(r#"<p:sp><p:nvSpPr><p:cNvPr id="2" name="Notes Placeholder 1"/><p:cNvSpPr><a:spLocks noGrp="1"/></p:cNvSpPr><p:nvPr><p:ph type="body" idx="1"/></p:nvPr></p:nvSpPr>"#);
    xml.push_str(r#"<p:spPr><a:xfrm><a:off x="685800" y="4343400"/><a:ext cx="5486400" cy="4114800"/></a:xfrm></p:spPr>"#);
    xml.push_str("<p:txBody><a:bodyPr/><a:lstStyle/>");
    for line in notes.lines() {
        write!(
            xml,
            r#"<a:p><a:r><a:rPr lang="en-US" sz="{NOTES_SIZE}" dirty="0"/><a:t>{}</a:t></a:r></a:p>"#,
            xml_text(line)
        )?;
    }
    xml.push_str("</p:txBody></p:sp></p:spTree></p:cSld><p:clrMapOvr><a:masterClrMapping/></p:clrMapOvr></p:notes>");
    Ok(xml)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::LayoutCategory;
    use std::io::Read;
    use zip::ZipArchive;

    fn text_slide(title: &str, notes: &str) -> Slide {
        Slide {
            layout: LayoutCategory::TitleAndContent,
            shapes: vec![PositionedShape::Text(TextShape {
                paragraphs: vec![title.to_string()],
                style: TextStyle::Title,
                geometry: Rect::new(457_200, 457_200, 8_229_600, 1_143_000),
            })],
            speaker_notes: notes.to_string(),
        }
    }

    fn read(bytes: &[u8], name: &str) -> String {
        let mut archive = ZipArchive::new(Cursor::new(bytes)).unwrap();
        let mut out = String::new();
        archive.by_name(name).unwrap().read_to_string(&mut out).unwrap();
        out
    }

    fn names(bytes: &[u8]) -> Vec<String> {
        let archive = ZipArchive::new(Cursor::new(bytes)).unwrap();
        archive.file_names().map(str::to_string).collect()
    }

    #[test]
    fn empty_deck_is_a_valid_package() {
        let bytes = DeckAssembler::new().finish().unwrap();
        let parts = names(&bytes);
        assert!(parts.contains(&"[Content_Types].xml".to_string()));
        assert!(parts.contains(&"ppt/presentation.xml".to_string()));
        assert!(!parts.iter().any(|p| p.starts_with("ppt/slides/")));
    }

    #[test]
    fn slides_keep_append_order() {
        let bytes = assemble(vec![text_slide("First", ""), text_slide("Second", "")]).unwrap();
        assert!(read(&bytes, "ppt/slides/slide1.xml").contains("First"));
        assert!(read(&bytes, "ppt/slides/slide2.xml").contains("Second"));
        let pres = read(&bytes, "ppt/presentation.xml");
        assert!(pres.contains(r#"<p:sldId id="256""#));
        assert!(pres.contains(r#"<p:sldId id="257""#));
    }

    #[test]
    fn text_is_escaped_and_control_chars_dropped() {
        let bytes = assemble(vec![text_slide("R&D <2024>\u{7}", "")]).unwrap();
        let xml = read(&bytes, "ppt/slides/slide1.xml");
        assert!(xml.contains("R&amp;D &lt;2024&gt;</a:t>"));
    }

    #[test]
    fn pictures_are_embedded_with_relationships() {
        let slide = Slide {
            layout: LayoutCategory::FullImage,
            shapes: vec![PositionedShape::Image(ImageShape {
                image_bytes: vec![0x89, b'P', b'N', b'G'],
                description: "chart".into(),
                geometry: Rect::new(0, 0, 100, 100),
            })],
            speaker_notes: String::new(),
        };
        let bytes = assemble(vec![slide]).unwrap();

        let mut archive = ZipArchive::new(Cursor::new(&bytes[..])).unwrap();
        let mut media = Vec::new();
        archive
            .by_name("ppt/media/image1.png")
            .unwrap()
            .read_to_end(&mut media)
            .unwrap();
        assert_eq!(media, vec![0x89, b'P', b'N', b'G']);

        let xml = read(&bytes, "ppt/slides/slide1.xml");
        assert!(xml.contains(r#"<a:blip r:embed="rId2"/>"#));
        let rels = read(&bytes, "ppt/slides/_rels/slide1.xml.rels");
        assert!(rels.contains(r#"Id="rId2""#) && rels.contains("../media/image1.png"));
    }

    #[test]
    fn notes_become_notes_slides() {
        let bytes = assemble(vec![text_slide("A", ""), text_slide("B", "Say hello")]).unwrap();
        let parts = names(&bytes);
        assert!(!parts.contains(&"ppt/notesSlides/notesSlide1.xml".to_string()));
        assert!(read(&bytes, "ppt/notesSlides/notesSlide2.xml").contains("Say hello"));
        assert!(read(&bytes, "ppt/presentation.xml").contains("notesMasterIdLst"));
        assert!(read(&bytes, "[Content_Types].xml").contains("/ppt/notesSlides/notesSlide2.xml"));
    }

    #[test]
    fn bullets_and_centered_titles_are_styled() {
        let slide = Slide {
            layout: LayoutCategory::TitleOnly,
            shapes: vec![
                PositionedShape::Text(TextShape {
                    paragraphs: vec!["Welcome".into()],
                    style: TextStyle::CenteredTitle,
                    geometry: Rect::new(0, 0, 10, 10),
                }),
                PositionedShape::Text(TextShape {
                    paragraphs: vec!["one".into(), "two".into()],
                    style: TextStyle::Bullets,
                    geometry: Rect::new(0, 20, 10, 10),
                }),
            ],
            speaker_notes: String::new(),
        };
        let xml = read(&assemble(vec![slide]).unwrap(), "ppt/slides/slide1.xml");
        assert!(xml.contains(r#"<a:pPr algn="ctr"/>"#));
        assert_eq!(xml.matches("<a:buChar").count(), 2);
        assert!(xml.contains(r#"<p:cNvPr id="3" name="Text 3"/>"#));
    }
}
