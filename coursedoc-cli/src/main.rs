use clap::Parser;
use colored::*;

use coursedoc_core::{
    config::StudentInfo,
    docx::Template,
    rasterize::{PdfRasterizer, RasterConfig},
    CourseOutcome, ReportGenerator,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser, Debug)]
#[command(
    version,
    about = "coursedoc - Generate per-course Word reports",
    long_about = "coursedoc walks a folder of course artifacts (PDFs and images), embeds every page into a copy of a Word template and fills the template placeholders from a YAML configuration. One report is written per course folder."
)]
struct Args {
    /// Path to the student configuration
    #[arg(long, env = "COURSEDOC_CONFIG", default_value = "config.yml")]
    config: PathBuf,

    /// Word template containing the placeholder tokens
    #[arg(long, env = "COURSEDOC_TEMPLATE", default_value = "Template.docx")]
    template: PathBuf,

    /// Directory holding one sub-folder per course
    #[arg(long, env = "COURSEDOC_COURSES_DIR", default_value = "Courses")]
    courses_dir: PathBuf,

    /// Specifies the target directory where reports will be saved
    #[arg(
        long,
        env = "COURSEDOC_OUTPUT_DIR",
        default_value = "GeneratedCourses",
        help = "Specify the directory to store generated reports"
    )]
    output_dir: PathBuf,

    #[arg(
        long,
        default_value_t = 300,
        help = "Resolution used when rasterizing PDF pages"
    )]
    dpi: u32,

    #[arg(
        long,
        default_value_t = 90,
        value_parser = clap::value_parser!(u8).range(1..=100),
        help = "JPEG quality of rasterized PDF pages"
    )]
    jpeg_quality: u8,

    /// Space left beside each picture, in points
    #[arg(long, default_value_t = 60.0)]
    image_margin: f64,

    /// Directory containing the pdfium shared library. If not specified, the system library is used.
    #[arg(
        long,
        env = "PDFIUM_DYNAMIC_LIB_PATH",
        help = "Specify the directory of the pdfium library"
    )]
    pdfium_lib_path: Option<PathBuf>,

    /// Enable debug mode to output additional information
    #[arg(
        long,
        default_value_t = false,
        env = "COURSEDOC_DEBUG",
        help = "Activate debug mode for detailed processing information"
    )]
    debug: bool,
}

fn init_tracing(debug: bool) {
    let env_filter = EnvFilter::try_from_env("LOG_LEVEL").unwrap_or_else(|_| {
        EnvFilter::new(if debug {
            "coursedoc=debug,coursedoc_core=debug"
        } else {
            "warn"
        })
    });
    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(debug)
        .with_line_number(debug);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();
}

fn setup_progress_bar(length: usize) -> ProgressBar {
    let pb = ProgressBar::new(length as u64);
    pb.set_style(
        ProgressStyle::with_template(
            "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("#>-"),
    );
    pb
}

fn report_outcome(pb: &ProgressBar, outcome: &CourseOutcome, config_path: &Path) {
    let course = outcome.course().yellow();
    match outcome {
        CourseOutcome::Written { path, .. } => pb.println(format!(
            "{} Results saved in: {} ({})",
            "✓".green().bold(),
            path.display().to_string().cyan().underline(),
            course
        )),
        CourseOutcome::Unmatched { .. } => pb.println(format!(
            "{} Error: Couldn't find course {} in {}",
            "✗".red().bold(),
            course,
            config_path.display()
        )),
        CourseOutcome::NameConflict { path, .. } => pb.println(format!(
            "{} Error: course {} would overwrite {} written earlier in this run, skipped",
            "✗".red().bold(),
            course,
            path.display()
        )),
    }
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(args.debug);

    let info = StudentInfo::load(&args.config)?;
    let template = Template::load(&args.template)?;
    let rasterizer = PdfRasterizer::new(
        args.pdfium_lib_path.clone(),
        RasterConfig {
            dpi: args.dpi,
            jpeg_quality: args.jpeg_quality,
        },
    );

    let mut generator = ReportGenerator::new(info, template, rasterizer, args.output_dir.clone())
        .with_image_margin(args.image_margin);
    let course_dirs = generator.course_dirs(&args.courses_dir)?;

    let pb = setup_progress_bar(course_dirs.len());
    let mut written = 0;
    for course_dir in &course_dirs {
        let name = course_dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        pb.set_message(name);
        let outcome = generator.generate_course(course_dir)?;
        if matches!(outcome, CourseOutcome::Written { .. }) {
            written += 1;
        }
        report_outcome(&pb, &outcome, &args.config);
        pb.inc(1);
    }
    pb.finish_with_message(format!(
        "Generated {written}/{} report(s) for {}",
        course_dirs.len(),
        generator.student().name
    ));
    Ok(())
}
