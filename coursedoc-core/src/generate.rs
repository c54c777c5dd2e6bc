use std::{
    collections::HashSet,
    path::{Path, PathBuf},
    time::Instant,
};

use anyhow::Context;

use crate::{
    assemble::{assemble_course, subdirectories},
    config::{Course, StudentInfo},
    docx::{ReportStyle, Template},
    output_path,
    placeholder::Placeholders,
    rasterize::Rasterizer,
    save_report_document,
};

/// What happened to one course folder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CourseOutcome {
    Written { course: String, path: PathBuf },
    /// No `Courses[].Name` matches the folder name.
    Unmatched { course: String },
    /// Another course of this run already derived the same output name.
    NameConflict { course: String, path: PathBuf },
}

impl CourseOutcome {
    pub fn course(&self) -> &str {
        match self {
            Self::Written { course, .. }
            | Self::Unmatched { course }
            | Self::NameConflict { course, .. } => course,
        }
    }
}

/// Output file name for `course`, derived from the `Format` key.
pub fn derive_output_name(info: &StudentInfo, course: &Course) -> String {
    Placeholders::for_filename(info, course).substitute(&info.format)
}

/// Generates one report per course folder from a single template.
pub struct ReportGenerator<R> {
    info: StudentInfo,
    template: Template,
    rasterizer: R,
    output_dir: PathBuf,
    image_margin_pt: f64,
    written: HashSet<PathBuf>,
}

impl<R: Rasterizer> ReportGenerator<R> {
    pub fn new(info: StudentInfo, template: Template, rasterizer: R, output_dir: PathBuf) -> Self {
        Self {
            info,
            template,
            rasterizer,
            output_dir,
            image_margin_pt: ReportStyle::default().image_margin_pt,
            written: HashSet::new(),
        }
    }

    pub fn with_image_margin(mut self, margin_pt: f64) -> Self {
        self.image_margin_pt = margin_pt;
        self
    }

    pub fn student(&self) -> &StudentInfo {
        &self.info
    }

    fn style(&self) -> ReportStyle {
        ReportStyle {
            heading_font: self.info.heading_font.clone(),
            heading_size_pt: self.info.heading_size,
            image_margin_pt: self.image_margin_pt,
        }
    }

    /// Course folders under `courses_dir`, in name order.
    pub fn course_dirs(&self, courses_dir: &Path) -> anyhow::Result<Vec<PathBuf>> {
        subdirectories(courses_dir)
            .with_context(|| format!("can't read courses directory {}", courses_dir.display()))
    }

    #[tracing::instrument(skip(self))]
    pub fn generate_course(&mut self, course_dir: &Path) -> anyhow::Result<CourseOutcome> {
        let start_time = Instant::now();
        let folder = course_dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        let Some(course) = self.info.find_course(&folder) else {
            tracing::debug!("No configuration entry for course folder {folder}");
            return Ok(CourseOutcome::Unmatched { course: folder });
        };

        let path = output_path(&self.output_dir, &derive_output_name(&self.info, course))?;
        if self.written.contains(&path) {
            return Ok(CourseOutcome::NameConflict {
                course: folder,
                path,
            });
        }

        let mut document = self.template.new_document(self.style());
        assemble_course(&mut document, course_dir, &self.rasterizer)?;
        document.apply_placeholders(&Placeholders::for_document(&self.info, course))?;
        save_report_document(&document, &path)?;

        tracing::debug!(
            "Generated {} sections for {} in {}ms",
            document.sections().len(),
            folder,
            start_time.elapsed().as_millis()
        );
        self.written.insert(path.clone());
        Ok(CourseOutcome::Written {
            course: folder,
            path,
        })
    }

    /// Processes every course folder, stopping at the first fatal error.
    pub fn run(&mut self, courses_dir: &Path) -> anyhow::Result<Vec<CourseOutcome>> {
        self.course_dirs(courses_dir)?
            .iter()
            .map(|dir| self.generate_course(dir))
            .collect()
    }
}
