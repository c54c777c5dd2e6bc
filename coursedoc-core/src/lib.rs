use anyhow::Context;
use std::path::{Path, PathBuf};

use docx::ReportDocument;

pub mod assemble;
pub mod config;
pub mod docx;
pub mod generate;
pub mod placeholder;
pub mod rasterize;

pub use generate::{CourseOutcome, ReportGenerator};

const DOCUMENT_EXTENSION: &str = "docx";

/// Keeps a derived name inside the output directory.
fn sanitize_doc_name(doc_name: &str) -> String {
    doc_name
        .chars()
        .map(|c| if c == '/' || c == '\\' { '-' } else { c })
        .collect::<String>()
}

pub fn output_path(output_dir: &Path, doc_name: &str) -> anyhow::Result<PathBuf> {
    let sanitized = sanitize_doc_name(doc_name);
    if sanitized.trim().is_empty() {
        anyhow::bail!("output file name is empty, check the Format key of the configuration");
    }
    Ok(output_dir.join(format!("{sanitized}.{DOCUMENT_EXTENSION}")))
}

/// Writes `doc` to `path`, creating the output directory if needed. An existing
/// file with the same name is replaced.
pub fn save_report_document(doc: &ReportDocument, path: &Path) -> anyhow::Result<()> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("can't create output directory {}", dir.display()))?;
    }
    doc.save(path)
        .with_context(|| format!("can't save report {}", path.display()))?;
    tracing::info!("Saved report {}", path.display());
    Ok(())
}
