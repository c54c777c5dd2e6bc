//! WordprocessingML fragments used when appending course sections.

use std::ops::Range;

use quick_xml::events::BytesStart;

pub(crate) const EMU_PER_POINT: f64 = 12_700.0;
pub(crate) const TWIPS_PER_POINT: f64 = 20.0;

const IMAGE_RELATIONSHIP_TYPE: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/image";

pub fn escape_text(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

/// Byte range of the markup event that ends at `end`, as reported by
/// `Reader::buffer_position` right after the event was read.
pub(crate) fn markup_range(xml: &str, end: usize) -> Range<usize> {
    let start = xml[..end].rfind('<').unwrap_or(0);
    start..end
}

/// Raw value of attribute `key` on `element`.
pub(crate) fn attribute(element: &BytesStart<'_>, key: &[u8]) -> Option<String> {
    element
        .attributes()
        .flatten()
        .find(|attr| attr.key.as_ref() == key)
        .map(|attr| String::from_utf8_lossy(&attr.value).into_owned())
}

/// Empty paragraph carrying section properties: closes the section before it.
pub(crate) fn section_break_paragraph(sect_pr: &str) -> String {
    format!("<w:p><w:pPr>{sect_pr}</w:pPr></w:p>")
}

pub(crate) fn heading_paragraph(text: &str, font: &str, size_pt: u32) -> String {
    let font = escape_text(font);
    // w:sz is in half-points
    let half_points = size_pt * 2;
    format!(
        concat!(
            r#"<w:p><w:pPr><w:jc w:val="center"/></w:pPr><w:r><w:rPr>"#,
            r#"<w:rFonts w:ascii="{font}" w:hAnsi="{font}" w:cs="{font}"/>"#,
            r#"<w:sz w:val="{sz}"/><w:szCs w:val="{sz}"/></w:rPr>"#,
            r#"<w:t xml:space="preserve">{text}</w:t></w:r></w:p>"#
        ),
        font = font,
        sz = half_points,
        text = escape_text(text),
    )
}

/// Centered paragraph with a single inline picture of `cx` x `cy` EMUs.
pub(crate) fn image_paragraph(rel_id: &str, drawing_id: u32, name: &str, cx: u64, cy: u64) -> String {
    let name = escape_text(name);
    format!(
        concat!(
            r#"<w:p><w:pPr><w:jc w:val="center"/></w:pPr><w:r><w:drawing>"#,
            r#"<wp:inline distT="0" distB="0" distL="0" distR="0" "#,
            r#"xmlns:wp="http://schemas.openxmlformats.org/drawingml/2006/wordprocessingDrawing">"#,
            r#"<wp:extent cx="{cx}" cy="{cy}"/>"#,
            r#"<wp:docPr id="{id}" name="{name}"/>"#,
            r#"<wp:cNvGraphicFramePr><a:graphicFrameLocks "#,
            r#"xmlns:a="http://schemas.openxmlformats.org/drawingml/2006/main" noChangeAspect="1"/>"#,
            r#"</wp:cNvGraphicFramePr>"#,
            r#"<a:graphic xmlns:a="http://schemas.openxmlformats.org/drawingml/2006/main">"#,
            r#"<a:graphicData uri="http://schemas.openxmlformats.org/drawingml/2006/picture">"#,
            r#"<pic:pic xmlns:pic="http://schemas.openxmlformats.org/drawingml/2006/picture">"#,
            r#"<pic:nvPicPr><pic:cNvPr id="{id}" name="{name}"/><pic:cNvPicPr/></pic:nvPicPr>"#,
            r#"<pic:blipFill><a:blip r:embed="{rel_id}" "#,
            r#"xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships"/>"#,
            r#"<a:stretch><a:fillRect/></a:stretch></pic:blipFill>"#,
            r#"<pic:spPr><a:xfrm><a:off x="0" y="0"/><a:ext cx="{cx}" cy="{cy}"/></a:xfrm>"#,
            r#"<a:prstGeom prst="rect"><a:avLst/></a:prstGeom></pic:spPr>"#,
            r#"</pic:pic></a:graphicData></a:graphic></wp:inline></w:drawing></w:r></w:p>"#
        ),
        cx = cx,
        cy = cy,
        id = drawing_id,
        name = name,
        rel_id = rel_id,
    )
}

pub(crate) fn image_relationship(rel_id: &str, target: &str) -> String {
    format!(r#"<Relationship Id="{rel_id}" Type="{IMAGE_RELATIONSHIP_TYPE}" Target="{target}"/>"#)
}

pub(crate) fn empty_relationships() -> String {
    r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"></Relationships>"#
        .to_string()
}

pub(crate) fn content_type_default(extension: &str, mime: &str) -> String {
    format!(r#"<Default Extension="{extension}" ContentType="{mime}"/>"#)
}
