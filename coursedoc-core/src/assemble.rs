use std::{
    collections::HashSet,
    path::{Path, PathBuf},
};

use anyhow::Context;
use image::ImageFormat;
use itertools::Itertools;

use crate::{
    docx::{EmbeddedImage, ReportDocument},
    rasterize::Rasterizer,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    Pdf,
    Image,
    Unsupported,
}

impl FileKind {
    pub fn of(path: &Path) -> Self {
        let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
            return Self::Unsupported;
        };
        if ext.eq_ignore_ascii_case("pdf") {
            return Self::Pdf;
        }
        match ImageFormat::from_extension(ext) {
            // formats Word renders inline
            Some(
                ImageFormat::Png
                | ImageFormat::Jpeg
                | ImageFormat::Gif
                | ImageFormat::Bmp
                | ImageFormat::Tiff,
            ) => Self::Image,
            _ => Self::Unsupported,
        }
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn is_hidden(path: &Path) -> bool {
    file_name(path).starts_with('.')
}

/// Entries of `dir` that are directories (or files), sorted by name. Hidden files are
/// left out; every subdirectory is kept.
fn sorted_entries(dir: &Path, directories: bool) -> anyhow::Result<Vec<PathBuf>> {
    let mut entries = Vec::new();
    for entry in std::fs::read_dir(dir).with_context(|| format!("can't list {}", dir.display()))? {
        let entry = entry?;
        let path = entry.path();
        if path.is_dir() == directories && (directories || !is_hidden(&path)) {
            entries.push(path);
        }
    }
    Ok(entries
        .into_iter()
        .sorted_by(|a, b| a.file_name().cmp(&b.file_name()))
        .collect())
}

pub fn subdirectories(dir: &Path) -> anyhow::Result<Vec<PathBuf>> {
    sorted_entries(dir, true)
}

/// `{stem}{n}.jpg` sitting next to `{stem}.pdf` was written by an earlier rasterization.
fn is_raster_artifact(path: &Path, pdf_stems: &HashSet<String>) -> bool {
    let is_jpg = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("jpg"));
    let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
        return false;
    };
    is_jpg
        && pdf_stems.iter().any(|pdf_stem| {
            stem.strip_prefix(pdf_stem.as_str())
                .is_some_and(|n| !n.is_empty() && n.bytes().all(|b| b.is_ascii_digit()))
        })
}

/// Appends one section per course part directory, in name order.
///
/// Each section opens with a `{k}- {part name}` heading followed by one picture per
/// image file and one per rasterized PDF page. Files Word can't render are skipped.
#[tracing::instrument(skip(document, rasterizer))]
pub fn assemble_course<R: Rasterizer>(
    document: &mut ReportDocument,
    course_dir: &Path,
    rasterizer: &R,
) -> anyhow::Result<()> {
    for (index, part_dir) in subdirectories(course_dir)?.iter().enumerate() {
        let part_name = file_name(part_dir);
        let section = document.add_section(format!("{}- {}", index + 1, part_name));

        let files = sorted_entries(part_dir, false)?;
        let pdf_stems: HashSet<String> = files
            .iter()
            .filter(|f| FileKind::of(f) == FileKind::Pdf)
            .filter_map(|f| f.file_stem().map(|s| s.to_string_lossy().into_owned()))
            .collect();

        for file in &files {
            match FileKind::of(file) {
                FileKind::Pdf => {
                    for page in rasterizer.rasterize(file)? {
                        section.add_image(EmbeddedImage::from_path(&page)?);
                    }
                }
                FileKind::Image if is_raster_artifact(file, &pdf_stems) => {
                    tracing::debug!("Skipping rasterized page {}", file.display());
                }
                FileKind::Image => section.add_image(EmbeddedImage::from_path(file)?),
                FileKind::Unsupported => {
                    tracing::warn!("Skipping unsupported file {}", file.display());
                }
            }
        }
        tracing::info!(
            "Course part '{}' has {} picture(s)",
            part_name,
            section.images.len()
        );
    }
    Ok(())
}
