//! Fixed and generated package parts of a PresentationML document.
//!
//! The deck uses one master, one blank layout and one theme. Every shape
//! carries explicit geometry, so nothing is inherited from placeholders.

use crate::pipeline::layout::{SLIDE_HEIGHT, SLIDE_WIDTH};
use std::fmt::Write as _;

pub(super) const NS_P: &str = "http://schemas.openxmlformats.org/presentationml/2006/main";
pub(super) const NS_A: &str = "http://schemas.openxmlformats.org/drawingml/2006/main";
pub(super) const NS_R: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships";

const XML_DECL: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#;
const NS_RELS: &str = "http://schemas.openxmlformats.org/package/2006/relationships";

mod rel_type {
    const BASE: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships/";
    pub const OFFICE_DOCUMENT: &str = "officeDocument";
    pub const SLIDE_MASTER: &str = "slideMaster";
    pub const SLIDE_LAYOUT: &str = "slideLayout";
    pub const SLIDE: &str = "slide";
    pub const THEME: &str = "theme";
    pub const IMAGE: &str = "image";
    pub const NOTES_SLIDE: &str = "notesSlide";
    pub const NOTES_MASTER: &str = "notesMaster";

    pub fn uri(kind: &str) -> String {
        format!("{BASE}{kind}")
    }
}

mod content_type {
    const BASE: &str = "application/vnd.openxmlformats-officedocument.";
    pub const PRESENTATION: &str = "presentationml.presentation.main+xml";
    pub const SLIDE_MASTER: &str = "presentationml.slideMaster+xml";
    pub const SLIDE_LAYOUT: &str = "presentationml.slideLayout+xml";
    pub const SLIDE: &str = "presentationml.slide+xml";
    pub const NOTES_SLIDE: &str = "presentationml.notesSlide+xml";
    pub const NOTES_MASTER: &str = "presentationml.notesMaster+xml";
    pub const THEME: &str = "theme+xml";

    pub fn full(kind: &str) -> String {
        format!("{BASE}{kind}")
    }
}

/// `(id, type, target)` triples for one `.rels` part.
pub(super) struct Relationships {
    entries: Vec<(String, String, String)>,
}

impl Relationships {
    pub fn new() -> Self {
        Self { entries: Vec::new() }
    }

    /// Add a relationship and return its id.
    pub fn add(&mut self, kind: &str, target: impl Into<String>) -> String {
        let id = format!("rId{}", self.entries.len() + 1);
        self.entries
            .push((id.clone(), rel_type::uri(kind), target.into()));
        id
    }

    pub fn to_xml(&self) -> Result<String, std::fmt::Error> {
        let mut xml = String::with_capacity(256 + self.entries.len() * 160);
        xml.push_str(XML_DECL);
        write!(xml, r#"<Relationships xmlns="{NS_RELS}">"#)?;
        for (id, kind, target) in &self.entries {
            write!(
                xml,
                r#"<Relationship Id="{id}" Type="{kind}" Target="{target}"/>"#
            )?;
        }
        xml.push_str("</Relationships>");
        Ok(xml)
    }
}

pub(super) fn slide_relationships(images: &[String], notes: Option<usize>) -> Relationships {
    let mut rels = Relationships::new();
    rels.add(rel_type::SLIDE_LAYOUT, "../slideLayouts/slideLayout1.xml");
    for media in images {
        rels.add(rel_type::IMAGE, format!("../media/{media}"));
    }
    if let Some(n) = notes {
        rels.add(rel_type::NOTES_SLIDE, format!("../notesSlides/notesSlide{n}.xml"));
    }
    rels
}

/// Relationship id of the `k`-th image (0-based) in [`slide_relationships`].
pub(super) fn image_rel_id(k: usize) -> String {
    format!("rId{}", k + 2)
}

pub(super) fn notes_relationships(slide: usize) -> Relationships {
    let mut rels = Relationships::new();
    rels.add(rel_type::NOTES_MASTER, "../notesMasters/notesMaster1.xml");
    rels.add(rel_type::SLIDE, format!("../slides/slide{slide}.xml"));
    rels
}

pub(super) fn root_relationships() -> Relationships {
    let mut rels = Relationships::new();
    rels.add(rel_type::OFFICE_DOCUMENT, "ppt/presentation.xml");
    rels
}

pub(super) fn master_relationships() -> Relationships {
    let mut rels = Relationships::new();
    rels.add(rel_type::SLIDE_LAYOUT, "../slideLayouts/slideLayout1.xml");
    rels.add(rel_type::THEME, "../theme/theme1.xml");
    rels
}

pub(super) fn layout_relationships() -> Relationships {
    let mut rels = Relationships::new();
    rels.add(rel_type::SLIDE_MASTER, "../slideMasters/slideMaster1.xml");
    rels
}

pub(super) fn notes_master_relationships() -> Relationships {
    let mut rels = Relationships::new();
    rels.add(rel_type::THEME, "../theme/theme2.xml");
    rels
}

/// `presentation.xml` and its relationships.
pub(super) fn presentation(
    slide_count: usize,
    with_notes: bool,
) -> Result<(String, Relationships), std::fmt::Error> {
    let mut rels = Relationships::new();
    let master = rels.add(rel_type::SLIDE_MASTER, "slideMasters/slideMaster1.xml");
    rels.add(rel_type::THEME, "theme/theme1.xml");
    let slide_ids: Vec<String> = (1..=slide_count)
        .map(|n| rels.add(rel_type::SLIDE, format!("slides/slide{n}.xml")))
        .collect();
    let notes_master = with_notes.then(|| rels.add(rel_type::NOTES_MASTER, "notesMasters/notesMaster1.xml"));

    let mut xml = String::with_capacity(1024 + slide_count * 48);
    xml.push_str(XML_DECL);
    write!(
        xml,
        r#"<p:presentation xmlns:a="{NS_A}" xmlns:r="{NS_R}" xmlns:p="{NS_P}" saveSubsetFonts="1">"#
    )?;
    write!(
        xml,
        r#"<p:sldMasterIdLst><p:sldMasterId id="2147483648" r:id="{master}"/></p:sldMasterIdLst>"#
    )?;
    if let Some(id) = notes_master {
        write!(
            xml,
            r#"<p:notesMasterIdLst><p:notesMasterId r:id="{id}"/></p:notesMasterIdLst>"#
        )?;
    }
    if !slide_ids.is_empty() {
        xml.push_str("<p:sldIdLst>");
        for (i, rid) in slide_ids.iter().enumerate() {
            write!(xml, r#"<p:sldId id="{}" r:id="{rid}"/>"#, 256 + i)?;
        }
        xml.push_str("</p:sldIdLst>");
    }
    write!(
        xml,
        r#"<p:sldSz cx="{SLIDE_WIDTH}" cy="{SLIDE_HEIGHT}" type="screen4x3"/><p:notesSz cx="{SLIDE_HEIGHT}" cy="{SLIDE_WIDTH}"/>"#
    )?;
    xml.push_str("</p:presentation>");
    Ok((xml, rels))
}

pub(super) fn content_types(slide_count: usize, notes: &[usize]) -> Result<String, std::fmt::Error> {
    let mut xml = String::with_capacity(1536 + slide_count * 256);
    xml.push_str(XML_DECL);
    xml.push_str(r#"<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types">"#);
    xml.push_str(r#"<Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/>"#);
    xml.push_str(r#"<Default Extension="xml" ContentType="application/xml"/>"#);
    xml.push_str(r#"<Default Extension="png" ContentType="image/png"/>"#);

    let mut part = |name: &str, kind: &str| {
        write!(
            xml,
            r#"<Override PartName="{name}" ContentType="{}"/>"#,
            content_type::full(kind)
        )
    };
    part("/ppt/presentation.xml", content_type::PRESENTATION)?;
    part("/ppt/slideMasters/slideMaster1.xml", content_type::SLIDE_MASTER)?;
    part("/ppt/slideLayouts/slideLayout1.xml", content_type::SLIDE_LAYOUT)?;
    part("/ppt/theme/theme1.xml", content_type::THEME)?;
    if !notes.is_empty() {
        part("/ppt/notesMasters/notesMaster1.xml", content_type::NOTES_MASTER)?;
        part("/ppt/theme/theme2.xml", content_type::THEME)?;
    }
    for n in 1..=slide_count {
        part(&format!("/ppt/slides/slide{n}.xml"), content_type::SLIDE)?;
    }
    for n in notes {
        part(&format!("/ppt/notesSlides/notesSlide{n}.xml"), content_type::NOTES_SLIDE)?;
    }

    xml.push_str("</Types>");
    Ok(xml)
}

/// Empty shape tree header shared by every slide-like part.
pub(super) const GROUP_PROPERTIES: &str = concat!(
    r#"<p:nvGrpSpPr><p:cNvPr id="1" name=""/><p:cNvGrpSpPr/><p:nvPr/></p:nvGrpSpPr>"#,
    r#"<p:grpSpPr><a:xfrm><a:off x="0" y="0"/><a:ext cx="0" cy="0"/>"#,
    r#"<a:chOff x="0" y="0"/><a:chExt cx="0" cy="0"/></a:xfrm></p:grpSpPr>"#,
);

const CLR_MAP: &str = r#"<p:clrMap bg1="lt1" tx1="dk1" bg2="lt2" tx2="dk2" accent1="accent1" accent2="accent2" accent3="accent3" accent4="accent4" accent5="accent5" accent6="accent6" hlink="hlink" folHlink="folHlink"/>"#;

pub(super) fn slide_master() -> String {
    format!(
        concat!(
            r#"{decl}<p:sldMaster xmlns:a="{a}" xmlns:r="{r}" xmlns:p="{p}">"#,
            r#"<p:cSld><p:bg><p:bgRef idx="1001"><a:schemeClr val="bg1"/></p:bgRef></p:bg>"#,
            r#"<p:spTree>{group}</p:spTree></p:cSld>{clr}"#,
            r#"<p:sldLayoutIdLst><p:sldLayoutId id="2147483649" r:id="rId1"/></p:sldLayoutIdLst>"#,
            r#"</p:sldMaster>"#
        ),
        decl = XML_DECL,
        a = NS_A,
        r = NS_R,
        p = NS_P,
        group = GROUP_PROPERTIES,
        clr = CLR_MAP,
    )
}

pub(super) fn blank_layout() -> String {
    format!(
        concat!(
            r#"{decl}<p:sldLayout xmlns:a="{a}" xmlns:r="{r}" xmlns:p="{p}" type="blank" preserve="1">"#,
            r#"<p:cSld name="Blank"><p:spTree>{group}</p:spTree></p:cSld>"#,
            r#"<p:clrMapOvr><a:masterClrMapping/></p:clrMapOvr></p:sldLayout>"#
        ),
        decl = XML_DECL,
        a = NS_A,
        r = NS_R,
        p = NS_P,
        group = GROUP_PROPERTIES,
    )
}

pub(super) fn notes_master() -> String {
    format!(
        concat!(
            r#"{decl}<p:notesMaster xmlns:a="{a}" xmlns:r="{r}" xmlns:p="{p}">"#,
            r#"<p:cSld><p:bg><p:bgRef idx="1001"><a:schemeClr val="bg1"/></p:bgRef></p:bg>"#,
            r#"<p:spTree>{group}</p:spTree></p:cSld>{clr}</p:notesMaster>"#
        ),
        decl = XML_DECL,
        a = NS_A,
        r = NS_R,
        p = NS_P,
        group = GROUP_PROPERTIES,
        clr = CLR_MAP,
    )
}

pub(super) fn theme() -> String {
    let mut xml = String::with_capacity(3072);
    xml.push_str(XML_DECL);
    xml.push_str(r#"<a:theme xmlns:a=""#);
    xml.push_str(NS_A);
    xml.push_str(r#"" name="Office Theme"><a:themeElements>"#);

    xml.push_str(r#"<a:clrScheme name="Office">"#);
    xml.push_str(r#"<a:dk1><a:sysClr val="windowText" lastClr="000000"/></a:dk1>"#);
    xml.push_str(r#"<a:lt1><a:sysClr val="window" lastClr="FFFFFF"/></a:lt1>"#);
    for (slot, rgb) in [
        ("dk2", "1F497D"),
        ("lt2", "EEECE1"),
        ("accent1", "4F81BD"),
        ("accent2", "C0504D"),
        ("accent3", "9BBB59"),
        ("accent4", "8064A2"),
        ("accent5", "4BACC6"),
        ("accent6", "F79646"),
        ("hlink", "0000FF"),
        ("folHlink", "800080"),
    ] {
        xml.push_str(&format!(r#"<a:{slot}><a:srgbClr val="{rgb}"/></a:{slot}>"#));
    }
    xml.push_str("</a:clrScheme>");

    xml.push_str(r#"<a:fontScheme name="Office">"#);
    for role in ["majorFont", "minorFont"] {
        xml.push_str(&format!(
            r#"<a:{role}><a:latin typeface="Calibri"/><a:ea typeface=""/><a:cs typeface=""/></a:{role}>"#
        ));
    }
    xml.push_str("</a:fontScheme>");

    let solid = r#"<a:solidFill><a:schemeClr val="phClr"/></a:solidFill>"#;
    xml.push_str(r#"<a:fmtScheme name="Office"><a:fillStyleLst>"#);
    for _ in 0..3 {
        xml.push_str(solid);
    }
    xml.push_str("</a:fillStyleLst><a:lnStyleLst>");
    for w in [9525, 25400, 38100] {
        xml.push_str(&format!(r#"<a:ln w="{w}">{solid}</a:ln>"#));
    }
    xml.push_str("</a:lnStyleLst><a:effectStyleLst>");
    for _ in 0..3 {
        xml.push_str("<a:effectStyle><a:effectLst/></a:effectStyle>");
    }
    xml.push_str("</a:effectStyleLst><a:bgFillStyleLst>");
    for _ in 0..3 {
        xml.push_str(solid);
    }
    xml.push_str("</a:bgFillStyleLst></a:fmtScheme>");

    xml.push_str("</a:themeElements></a:theme>");
    xml
}
