use std::{
    fs::File,
    io::{BufWriter, Cursor, Read, Seek, Write},
    ops::Range,
    path::{Path, PathBuf},
    sync::LazyLock,
};

use anyhow::Context;
use image::{ImageFormat, ImageReader};
use quick_xml::{
    events::{BytesStart, Event},
    Reader,
};
use regex::Regex;
use zip::{write::SimpleFileOptions, CompressionMethod, ZipArchive, ZipWriter};

use crate::placeholder::Placeholders;

pub mod xml;

const DOCUMENT_PART: &str = "word/document.xml";
const DOCUMENT_RELS_PART: &str = "word/_rels/document.xml.rels";
const CONTENT_TYPES_PART: &str = "[Content_Types].xml";
const MEDIA_PREFIX: &str = "coursedoc_image";
const REL_ID_PREFIX: &str = "rIdCourseDoc";

// A4 with one inch margins, in twips
const DEFAULT_SECT_PR: &str = r#"<w:sectPr><w:pgSz w:w="11906" w:h="16838"/><w:pgMar w:top="1440" w:right="1440" w:bottom="1440" w:left="1440" w:header="708" w:footer="708" w:gutter="0"/></w:sectPr>"#;

static TEXT_PART_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^word/(document|header\d*|footer\d*|footnotes|endnotes)\.xml$")
        .expect("valid text part pattern")
});

fn twips(element: &BytesStart<'_>, key: &[u8]) -> Option<i64> {
    xml::attribute(element, key).and_then(|v| v.parse::<i64>().ok())
}

/// Printable area of the template's last section, in twips.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageLayout {
    pub page_width: i64,
    pub page_height: i64,
    pub margin_left: i64,
    pub margin_right: i64,
    pub margin_top: i64,
    pub margin_bottom: i64,
}

impl Default for PageLayout {
    fn default() -> Self {
        Self {
            page_width: 11906,
            page_height: 16838,
            margin_left: 1440,
            margin_right: 1440,
            margin_top: 1440,
            margin_bottom: 1440,
        }
    }
}

impl PageLayout {
    fn from_sect_pr(sect_pr: &str) -> Self {
        let mut layout = Self::default();
        let mut reader = Reader::from_str(sect_pr);
        loop {
            match reader.read_event() {
                Ok(Event::Start(e) | Event::Empty(e)) => match e.name().as_ref() {
                    b"w:pgSz" => {
                        layout.page_width = twips(&e, b"w:w").unwrap_or(layout.page_width);
                        layout.page_height = twips(&e, b"w:h").unwrap_or(layout.page_height);
                    }
                    b"w:pgMar" => {
                        layout.margin_left = twips(&e, b"w:left").unwrap_or(layout.margin_left);
                        layout.margin_right = twips(&e, b"w:right").unwrap_or(layout.margin_right);
                        // negative top/bottom margins only mean "don't move text for header"
                        layout.margin_top = twips(&e, b"w:top").map_or(layout.margin_top, i64::abs);
                        layout.margin_bottom =
                            twips(&e, b"w:bottom").map_or(layout.margin_bottom, i64::abs);
                    }
                    _ => {}
                },
                Ok(Event::Eof) | Err(_) => break,
                _ => {}
            }
        }
        layout
    }

    /// Page width minus left and right margins, in points.
    pub fn client_width_pt(&self) -> f64 {
        (self.page_width - self.margin_left - self.margin_right).max(0) as f64
            / xml::TWIPS_PER_POINT
    }

    pub fn client_height_pt(&self) -> f64 {
        (self.page_height - self.margin_top - self.margin_bottom).max(0) as f64
            / xml::TWIPS_PER_POINT
    }

    /// Display size in EMUs of a `width_px` x `height_px` picture: as wide as the
    /// client area minus `margin_pt`, aspect ratio kept, height clamped the same way.
    pub fn fit_image(&self, width_px: u32, height_px: u32, margin_pt: f64) -> (u64, u64) {
        let max_w = (self.client_width_pt() - margin_pt).max(1.0);
        let max_h = (self.client_height_pt() - margin_pt).max(1.0);
        let ratio = height_px.max(1) as f64 / width_px.max(1) as f64;

        let (mut w, mut h) = (max_w, max_w * ratio);
        if h > max_h {
            h = max_h;
            w = h / ratio;
        }
        (
            (w * xml::EMU_PER_POINT).round() as u64,
            (h * xml::EMU_PER_POINT).round() as u64,
        )
    }
}

/// Heading and image presentation of the generated sections.
#[derive(Debug, Clone)]
pub struct ReportStyle {
    pub heading_font: String,
    pub heading_size_pt: u32,
    pub image_margin_pt: f64,
}

impl Default for ReportStyle {
    fn default() -> Self {
        Self {
            heading_font: "Century Gothic".to_owned(),
            heading_size_pt: 20,
            image_margin_pt: 60.0,
        }
    }
}

#[derive(Debug, Clone)]
struct Part {
    name: String,
    data: Vec<u8>,
}

/// Base `.docx` template. Loaded once and never mutated; every course works on a
/// [`ReportDocument`] copy.
#[derive(Debug, Clone)]
pub struct Template {
    parts: Vec<Part>,
    body_sect_pr: Option<String>,
    layout: PageLayout,
    max_drawing_id: u32,
}

impl Template {
    #[tracing::instrument]
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let bytes = std::fs::read(path)
            .with_context(|| format!("can't read template {}", path.display()))?;
        Self::from_bytes(&bytes).with_context(|| format!("invalid template {}", path.display()))
    }

    pub fn from_bytes(bytes: &[u8]) -> anyhow::Result<Self> {
        let mut archive = ZipArchive::new(Cursor::new(bytes)).context("template is not a zip")?;
        let mut parts = Vec::with_capacity(archive.len());
        for i in 0..archive.len() {
            let mut file = archive.by_index(i)?;
            if file.is_dir() {
                continue;
            }
            let mut data = Vec::with_capacity(file.size() as usize);
            file.read_to_end(&mut data)
                .with_context(|| format!("can't read template part {}", file.name()))?;
            parts.push(Part {
                name: file.name().to_owned(),
                data,
            });
        }

        let document = parts
            .iter()
            .find(|p| p.name == DOCUMENT_PART)
            .with_context(|| format!("template has no {DOCUMENT_PART}"))?;
        let document_xml =
            std::str::from_utf8(&document.data).context("document part is not utf-8")?;
        if !document_xml.contains("</w:body>") {
            anyhow::bail!("document part has no body");
        }

        let body_sect_pr = find_body_sect_pr(document_xml)?
            .map(|range| document_xml[range].to_owned());
        let layout = body_sect_pr
            .as_deref()
            .map(PageLayout::from_sect_pr)
            .unwrap_or_default();
        let max_drawing_id = parts
            .iter()
            .filter(|p| TEXT_PART_REGEX.is_match(&p.name))
            .filter_map(|p| std::str::from_utf8(&p.data).ok())
            .map(max_drawing_id)
            .max()
            .unwrap_or(0);

        tracing::debug!(
            "Loaded template with {} parts, client width {:.1}pt",
            parts.len(),
            layout.client_width_pt()
        );
        Ok(Self {
            parts,
            body_sect_pr,
            layout,
            max_drawing_id,
        })
    }

    /// Fresh working copy for one course.
    pub fn new_document(&self, style: ReportStyle) -> ReportDocument {
        ReportDocument {
            parts: self.parts.clone(),
            body_sect_pr: self.body_sect_pr.clone(),
            layout: self.layout,
            style,
            sections: Vec::new(),
            first_drawing_id: self.max_drawing_id + 1,
        }
    }
}

/// Byte range of the section properties that are the last child of `<w:body>`.
fn find_body_sect_pr(document_xml: &str) -> anyhow::Result<Option<Range<usize>>> {
    let mut reader = Reader::from_str(document_xml);
    // open elements, and the count at which direct children of the body start
    let mut depth = 0usize;
    let mut body_depth = None;
    let mut open_sect_pr = None;
    let mut found = None;
    loop {
        let event = reader.read_event().context("malformed document part")?;
        let end = reader.buffer_position() as usize;
        let body_child = body_depth == Some(depth);
        match event {
            Event::Start(e) => {
                if e.name().as_ref() == b"w:body" {
                    body_depth = Some(depth + 1);
                } else if body_child {
                    found = None;
                    if e.name().as_ref() == b"w:sectPr" {
                        open_sect_pr = Some(xml::markup_range(document_xml, end).start);
                    }
                }
                depth += 1;
            }
            Event::Empty(e) if body_child => {
                found = (e.name().as_ref() == b"w:sectPr")
                    .then(|| xml::markup_range(document_xml, end));
            }
            Event::End(e) => {
                depth = depth.saturating_sub(1);
                if e.name().as_ref() == b"w:body" {
                    break;
                }
                if body_depth == Some(depth) && e.name().as_ref() == b"w:sectPr" {
                    found = open_sect_pr.take().map(|start| start..end);
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }
    Ok(found)
}

/// Highest `wp:docPr` id in a part, so appended drawings don't collide.
fn max_drawing_id(part_xml: &str) -> u32 {
    let mut reader = Reader::from_str(part_xml);
    let mut max = 0;
    loop {
        match reader.read_event() {
            Ok(Event::Start(e) | Event::Empty(e)) if e.name().as_ref() == b"wp:docPr" => {
                if let Some(id) = xml::attribute(&e, b"id").and_then(|v| v.parse::<u32>().ok()) {
                    max = max.max(id);
                }
            }
            Ok(Event::Eof) | Err(_) => break,
            _ => {}
        }
    }
    max
}

/// A picture to embed, already read into memory.
#[derive(Debug, Clone)]
pub struct EmbeddedImage {
    pub source: PathBuf,
    pub format: ImageFormat,
    pub width_px: u32,
    pub height_px: u32,
    data: Vec<u8>,
}

impl EmbeddedImage {
    pub fn from_path(path: &Path) -> anyhow::Result<Self> {
        let data =
            std::fs::read(path).with_context(|| format!("can't read image {}", path.display()))?;
        let reader = ImageReader::new(Cursor::new(&data))
            .with_guessed_format()
            .with_context(|| format!("can't probe image {}", path.display()))?;
        let format = reader
            .format()
            .with_context(|| format!("unknown image format {}", path.display()))?;
        let (width_px, height_px) = reader
            .into_dimensions()
            .with_context(|| format!("can't decode image header {}", path.display()))?;
        Ok(Self {
            source: path.to_owned(),
            format,
            width_px,
            height_px,
            data,
        })
    }

    fn extension(&self) -> &'static str {
        self.format.extensions_str().first().copied().unwrap_or("bin")
    }

    fn display_name(&self) -> String {
        self.source
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

/// One course part: heading plus its pictures, in order.
#[derive(Debug, Clone)]
pub struct Section {
    pub heading: String,
    pub images: Vec<EmbeddedImage>,
}

impl Section {
    pub fn add_image(&mut self, image: EmbeddedImage) {
        self.images.push(image);
    }
}

/// Working copy of the template for a single course.
#[derive(Debug, Clone)]
pub struct ReportDocument {
    parts: Vec<Part>,
    body_sect_pr: Option<String>,
    layout: PageLayout,
    style: ReportStyle,
    sections: Vec<Section>,
    first_drawing_id: u32,
}

impl ReportDocument {
    /// Starts a new section headed by `heading`.
    pub fn add_section(&mut self, heading: impl Into<String>) -> &mut Section {
        self.sections.push(Section {
            heading: heading.into(),
            images: Vec::new(),
        });
        let last = self.sections.len() - 1;
        &mut self.sections[last]
    }

    pub fn sections(&self) -> &[Section] {
        &self.sections
    }

    /// Replaces tokens in every text-bearing template part and in section headings.
    #[tracing::instrument(skip_all)]
    pub fn apply_placeholders(&mut self, placeholders: &Placeholders) -> anyhow::Result<()> {
        for part in self
            .parts
            .iter_mut()
            .filter(|p| TEXT_PART_REGEX.is_match(&p.name))
        {
            let xml = std::str::from_utf8(&part.data)
                .with_context(|| format!("part {} is not utf-8", part.name))?;
            let replaced = placeholders
                .substitute_xml(xml)
                .with_context(|| format!("can't substitute placeholders in {}", part.name))?;
            if replaced != xml {
                tracing::debug!("Substituted placeholders in {}", part.name);
                part.data = replaced.into_bytes();
            }
        }
        for section in self.sections.iter_mut() {
            section.heading = placeholders.substitute(&section.heading);
        }
        Ok(())
    }

    fn sections_xml(&self) -> (String, Vec<(String, String, &EmbeddedImage)>) {
        let sect_pr = self.body_sect_pr.as_deref().unwrap_or(DEFAULT_SECT_PR);
        let mut body = String::new();
        let mut media = Vec::new();
        let mut drawing_id = self.first_drawing_id;

        for section in &self.sections {
            body.push_str(&xml::section_break_paragraph(sect_pr));
            body.push_str(&xml::heading_paragraph(
                &section.heading,
                &self.style.heading_font,
                self.style.heading_size_pt,
            ));
            for image in &section.images {
                let n = media.len() + 1;
                let rel_id = format!("{REL_ID_PREFIX}{n}");
                let target = format!("media/{MEDIA_PREFIX}{n}.{}", image.extension());
                let (cx, cy) = self.layout.fit_image(
                    image.width_px,
                    image.height_px,
                    self.style.image_margin_pt,
                );
                body.push_str(&xml::image_paragraph(
                    &rel_id,
                    drawing_id,
                    &image.display_name(),
                    cx,
                    cy,
                ));
                drawing_id += 1;
                media.push((rel_id, target, image));
            }
        }
        (body, media)
    }

    /// Serializes the document as a `.docx` package.
    pub fn write_to<W: Write + Seek>(&self, writer: W) -> anyhow::Result<W> {
        let (body, media) = self.sections_xml();
        let mut zip = ZipWriter::new(writer);
        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

        let mut has_rels = false;
        for part in &self.parts {
            let data = match part.name.as_str() {
                DOCUMENT_PART => insert_sections(as_str(part)?, &body)?.into_bytes(),
                DOCUMENT_RELS_PART => {
                    has_rels = true;
                    insert_relationships(as_str(part)?, &media)?.into_bytes()
                }
                CONTENT_TYPES_PART => insert_content_types(as_str(part)?, &media)?.into_bytes(),
                _ => part.data.clone(),
            };
            zip.start_file(part.name.as_str(), options)
                .with_context(|| format!("Failed to create {}", part.name))?;
            zip.write_all(&data)
                .with_context(|| format!("Failed to write {}", part.name))?;
        }

        if !has_rels && !media.is_empty() {
            let rels = insert_relationships(&xml::empty_relationships(), &media)?;
            zip.start_file(DOCUMENT_RELS_PART, options)
                .with_context(|| format!("Failed to create {DOCUMENT_RELS_PART}"))?;
            zip.write_all(rels.as_bytes())
                .with_context(|| format!("Failed to write {DOCUMENT_RELS_PART}"))?;
        }

        for (_, target, image) in &media {
            let name = format!("word/{target}");
            zip.start_file(name.as_str(), options)
                .with_context(|| format!("Failed to create {name}"))?;
            zip.write_all(&image.data)
                .with_context(|| format!("Failed to write {name}"))?;
        }

        zip.finish().context("Failed to finalize docx zip")
    }

    /// Writes the package to `path`, replacing any existing file.
    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        let file =
            File::create(path).with_context(|| format!("can't create {}", path.display()))?;
        let mut writer = self.write_to(BufWriter::new(file))?;
        writer.flush()?;
        Ok(())
    }
}

fn as_str(part: &Part) -> anyhow::Result<&str> {
    std::str::from_utf8(&part.data).with_context(|| format!("part {} is not utf-8", part.name))
}

fn insert_before(xml: &str, at: usize, fragment: &str) -> String {
    let mut out = String::with_capacity(xml.len() + fragment.len());
    out.push_str(&xml[..at]);
    out.push_str(fragment);
    out.push_str(&xml[at..]);
    out
}

fn insert_sections(document_xml: &str, body: &str) -> anyhow::Result<String> {
    if body.is_empty() {
        return Ok(document_xml.to_owned());
    }
    let at = match find_body_sect_pr(document_xml)? {
        Some(range) => range.start,
        None => document_xml
            .rfind("</w:body>")
            .context("document part has no body")?,
    };
    Ok(insert_before(document_xml, at, body))
}

fn insert_relationships(
    rels_xml: &str,
    media: &[(String, String, &EmbeddedImage)],
) -> anyhow::Result<String> {
    if media.is_empty() {
        return Ok(rels_xml.to_owned());
    }
    let at = rels_xml
        .rfind("</Relationships>")
        .context("malformed document relationships")?;
    let rels: String = media
        .iter()
        .map(|(rel_id, target, _)| xml::image_relationship(rel_id, target))
        .collect();
    Ok(insert_before(rels_xml, at, &rels))
}

fn insert_content_types(
    types_xml: &str,
    media: &[(String, String, &EmbeddedImage)],
) -> anyhow::Result<String> {
    let mut defaults = String::new();
    let lowered = types_xml.to_ascii_lowercase();
    for (_, _, image) in media {
        let ext = image.extension();
        let declared = format!(r#"extension="{ext}""#);
        if lowered.contains(&declared) || defaults.contains(&format!(r#"Extension="{ext}""#)) {
            continue;
        }
        defaults.push_str(&xml::content_type_default(ext, image.format.to_mime_type()));
    }
    if defaults.is_empty() {
        return Ok(types_xml.to_owned());
    }
    let at = types_xml
        .rfind("</Types>")
        .context("malformed content types")?;
    Ok(insert_before(types_xml, at, &defaults))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use image::{ImageBuffer, Rgb};

    pub(crate) const TEMPLATE_BODY: &str = concat!(
        r#"<w:p><w:r><w:t>Report of {Name} for {CourseASU_Name}</w:t></w:r></w:p>"#,
        r#"<w:p><w:r><w:t>{Unknown}</w:t></w:r></w:p>"#
    );

    /// Minimal Word package around `body`, with an A4 body section.
    pub(crate) fn template_bytes(body: &str) -> Vec<u8> {
        let document = format!(
            concat!(
                r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#,
                r#"<w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main" "#,
                r#"xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships">"#,
                r#"<w:body>{body}<w:sectPr w:rsidR="00AA"><w:pgSz w:w="12240" w:h="15840"/>"#,
                r#"<w:pgMar w:top="1440" w:right="1800" w:bottom="1440" w:left="1800" w:header="720" w:footer="720" w:gutter="0"/>"#,
                r#"</w:sectPr></w:body></w:document>"#
            ),
            body = body
        );
        let header = r#"<w:hdr xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main"><w:p><w:r><w:t>{SubmissionDate}</w:t></w:r></w:p></w:hdr>"#;
        let content_types = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/><Default Extension="xml" ContentType="application/xml"/><Default Extension="PNG" ContentType="image/png"/><Override PartName="/word/document.xml" ContentType="application/vnd.openxmlformats-officedocument.wordprocessingml.document.main+xml"/></Types>"#;
        let root_rels = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="word/document.xml"/></Relationships>"#;
        let doc_rels = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/header" Target="header1.xml"/></Relationships>"#;

        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
        let options = SimpleFileOptions::default();
        for (name, content) in [
            (CONTENT_TYPES_PART, content_types),
            ("_rels/.rels", root_rels),
            (DOCUMENT_PART, document.as_str()),
            (DOCUMENT_RELS_PART, doc_rels),
            ("word/header1.xml", header),
        ] {
            zip.start_file(name, options).unwrap();
            zip.write_all(content.as_bytes()).unwrap();
        }
        zip.finish().unwrap().into_inner()
    }

    pub(crate) fn read_part(package: &[u8], name: &str) -> Option<Vec<u8>> {
        let mut archive = ZipArchive::new(Cursor::new(package)).unwrap();
        let mut file = archive.by_name(name).ok()?;
        let mut data = Vec::new();
        file.read_to_end(&mut data).unwrap();
        Some(data)
    }

    fn write_png(path: &Path, w: u32, h: u32) {
        ImageBuffer::from_pixel(w, h, Rgb([200u8, 10, 10]))
            .save(path)
            .unwrap();
    }

    #[test]
    fn test_template_layout_from_sect_pr() -> anyhow::Result<()> {
        let template = Template::from_bytes(&template_bytes(TEMPLATE_BODY))?;
        let layout = template.layout;
        assert_eq!(layout.page_width, 12240);
        assert_eq!(layout.margin_left, 1800);
        // (12240 - 3600) / 20
        assert_eq!(layout.client_width_pt(), 432.0);
        assert_eq!(layout.client_height_pt(), 648.0);
        Ok(())
    }

    #[test]
    fn test_template_rejects_non_docx() {
        assert!(Template::from_bytes(b"not a zip").is_err());
    }

    #[test]
    fn test_fit_image_keeps_aspect_and_clamps_height() {
        let layout = PageLayout::default();
        let client_w = layout.client_width_pt();
        let (cx, cy) = layout.fit_image(200, 100, 60.0);
        assert_eq!(cx, ((client_w - 60.0) * xml::EMU_PER_POINT).round() as u64);
        assert!((cy as i64 - (cx / 2) as i64).abs() <= 1);

        let (cx, cy) = layout.fit_image(100, 10_000, 60.0);
        let max_h = ((layout.client_height_pt() - 60.0) * xml::EMU_PER_POINT).round() as u64;
        assert_eq!(cy, max_h);
        assert!(cx < cy);
    }

    #[test]
    fn test_working_copies_are_independent() -> anyhow::Result<()> {
        let template = Template::from_bytes(&template_bytes(TEMPLATE_BODY))?;
        let mut first = template.new_document(ReportStyle::default());
        first.add_section("1- Labs");
        let second = template.new_document(ReportStyle::default());
        assert_eq!(first.sections().len(), 1);
        assert!(second.sections().is_empty());
        Ok(())
    }

    #[test]
    fn test_write_package_with_sections() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let png = dir.path().join("scan.png");
        write_png(&png, 40, 20);

        let template = Template::from_bytes(&template_bytes(TEMPLATE_BODY))?;
        let mut doc = template.new_document(ReportStyle::default());
        doc.add_section("1- Labs")
            .add_image(EmbeddedImage::from_path(&png)?);
        doc.add_section("2- Quizzes");

        let package = doc.write_to(Cursor::new(Vec::new()))?.into_inner();
        let document = String::from_utf8(read_part(&package, DOCUMENT_PART).unwrap())?;

        // two section breaks, each carrying a copy of the body section properties
        assert_eq!(document.matches(r#"<w:sectPr w:rsidR="00AA">"#).count(), 3);
        let labs = document.find(">1- Labs</w:t>").unwrap();
        let quizzes = document.find(">2- Quizzes</w:t>").unwrap();
        let picture = document.find(r#"r:embed="rIdCourseDoc1""#).unwrap();
        assert!(labs < picture && picture < quizzes);
        assert!(document.trim_end().ends_with("</w:sectPr></w:body></w:document>"));

        let rels = String::from_utf8(read_part(&package, DOCUMENT_RELS_PART).unwrap())?;
        assert!(rels.contains(r#"Id="rIdCourseDoc1""#));
        assert!(rels.contains(r#"Target="media/coursedoc_image1.png""#));
        assert!(rels.contains(r#"Target="header1.xml""#));

        let types = String::from_utf8(read_part(&package, CONTENT_TYPES_PART).unwrap())?;
        // already declared as "PNG" by the template
        assert!(!types.contains(r#"Extension="png""#));

        let media = read_part(&package, "word/media/coursedoc_image1.png").unwrap();
        assert_eq!(media, std::fs::read(&png)?);
        Ok(())
    }

    #[test]
    fn test_jpeg_content_type_is_declared() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let jpg = dir.path().join("page0.jpg");
        ImageBuffer::from_pixel(10, 10, Rgb([0u8, 0, 0])).save(&jpg)?;

        let template = Template::from_bytes(&template_bytes(TEMPLATE_BODY))?;
        let mut doc = template.new_document(ReportStyle::default());
        doc.add_section("1- Notes")
            .add_image(EmbeddedImage::from_path(&jpg)?);
        let package = doc.write_to(Cursor::new(Vec::new()))?.into_inner();
        let types = String::from_utf8(read_part(&package, CONTENT_TYPES_PART).unwrap())?;
        assert!(types.contains(r#"<Default Extension="jpg" ContentType="image/jpeg"/>"#));
        assert!(read_part(&package, "word/media/coursedoc_image1.jpg").is_some());
        Ok(())
    }

    #[test]
    fn test_apply_placeholders_covers_headers_and_headings() -> anyhow::Result<()> {
        let template = Template::from_bytes(&template_bytes(TEMPLATE_BODY))?;
        let mut doc = template.new_document(ReportStyle::default());
        doc.add_section("1- {Name}'s labs");

        let mut placeholders = Placeholders::new();
        placeholders
            .insert("Name", "Alice")
            .insert("CourseASU_Name", "Maths")
            .insert("SubmissionDate", "12/01/2024");
        doc.apply_placeholders(&placeholders)?;
        assert_eq!(doc.sections()[0].heading, "1- Alice's labs");

        let package = doc.write_to(Cursor::new(Vec::new()))?.into_inner();
        let document = String::from_utf8(read_part(&package, DOCUMENT_PART).unwrap())?;
        assert!(document.contains("Report of Alice for Maths"));
        assert!(document.contains("{Unknown}"));
        let header = String::from_utf8(read_part(&package, "word/header1.xml").unwrap())?;
        assert!(header.contains("12/01/2024"));
        Ok(())
    }

    #[test]
    fn test_body_sect_pr_is_last_body_child() -> anyhow::Result<()> {
        let xml = concat!(
            r#"<w:document><w:body><w:p><w:pPr><w:sectPr><w:pgSz w:w="1"/></w:sectPr></w:pPr></w:p>"#,
            r#"<w:sectPr w:rsidR="01"><w:pgSz w:w="12240" w:h="15840"/></w:sectPr></w:body></w:document>"#
        );
        let range = find_body_sect_pr(xml)?.unwrap();
        assert_eq!(
            &xml[range],
            r#"<w:sectPr w:rsidR="01"><w:pgSz w:w="12240" w:h="15840"/></w:sectPr>"#
        );

        // section properties of a paragraph don't count
        let xml = r#"<w:document><w:body><w:p><w:pPr><w:sectPr/></w:pPr></w:p></w:body></w:document>"#;
        assert!(find_body_sect_pr(xml)?.is_none());

        let xml = r#"<w:document><w:body><w:p/><w:sectPr/></w:body></w:document>"#;
        assert_eq!(&xml[find_body_sect_pr(xml)?.unwrap()], "<w:sectPr/>");
        Ok(())
    }

    #[test]
    fn test_page_layout_reads_negative_margins() {
        let layout = PageLayout::from_sect_pr(
            r#"<w:sectPr><w:pgSz w:w="12000" w:h="16000"/><w:pgMar w:top="-1000" w:left="500"/></w:sectPr>"#,
        );
        assert_eq!(layout.page_width, 12000);
        assert_eq!(layout.margin_top, 1000);
        assert_eq!(layout.margin_left, 500);
        assert_eq!(layout.margin_right, 1440);
    }

    #[test]
    fn test_new_drawings_start_after_template_ids() -> anyhow::Result<()> {
        let body = r#"<w:p><w:r><w:drawing><wp:inline><wp:docPr id="41" name="logo"/></wp:inline></w:drawing></w:r></w:p>"#;
        let template = Template::from_bytes(&template_bytes(body))?;
        assert_eq!(template.max_drawing_id, 41);
        assert_eq!(max_drawing_id("<w:p/>"), 0);
        Ok(())
    }

    #[test]
    fn test_missing_body_sect_pr_uses_default_layout() -> anyhow::Result<()> {
        let xml = r#"<w:document><w:body><w:p/></w:body></w:document>"#;
        assert!(find_body_sect_pr(xml)?.is_none());
        let inserted = insert_sections(xml, "<w:p>X</w:p>")?;
        assert_eq!(
            inserted,
            r#"<w:document><w:body><w:p/><w:p>X</w:p></w:body></w:document>"#
        );
        Ok(())
    }
}
