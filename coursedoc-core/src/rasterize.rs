use std::{
    cell::OnceCell,
    fs::File,
    io::{BufWriter, Write},
    path::{Path, PathBuf},
    time::Instant,
};

use anyhow::Context;
use image::{codecs::jpeg::JpegEncoder, DynamicImage};
use memmap2::Mmap;
use pdfium_render::prelude::{PdfRenderConfig, Pdfium};

/// PDF user space unit is 1/72 inch
const PDF_POINTS_PER_INCH: f32 = 72.0;

/// Turns a PDF into one image file per page.
pub trait Rasterizer {
    /// Returns the generated image paths in page order.
    fn rasterize(&self, pdf_path: &Path) -> anyhow::Result<Vec<PathBuf>>;
}

#[derive(Debug, Clone, Copy)]
pub struct RasterConfig {
    pub dpi: u32,
    pub jpeg_quality: u8,
}

impl Default for RasterConfig {
    fn default() -> Self {
        Self {
            dpi: 300,
            jpeg_quality: 90,
        }
    }
}

impl RasterConfig {
    fn scale_factor(&self) -> f32 {
        self.dpi.max(1) as f32 / PDF_POINTS_PER_INCH
    }
}

/// Binds pdfium from `lib_dir` when given, falling back to the system library.
fn bind_pdfium(lib_dir: Option<&Path>) -> anyhow::Result<Pdfium> {
    let bindings = match lib_dir {
        Some(dir) => Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path(dir))
            .or_else(|e| {
                tracing::warn!(
                    "can't load pdfium from {}: {e:?}, trying system library",
                    dir.display()
                );
                Pdfium::bind_to_system_library()
            }),
        None => Pdfium::bind_to_system_library(),
    }
    .context("can't load pdfium bindings")?;
    Ok(Pdfium::new(bindings))
}

/// `{dir}/{stem}{page_index}.jpg` next to the source PDF.
pub fn page_image_path(pdf_path: &Path, page_index: usize) -> PathBuf {
    let stem = pdf_path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let file_name = format!("{stem}{page_index}.jpg");
    match pdf_path.parent() {
        Some(dir) => dir.join(file_name),
        None => PathBuf::from(file_name),
    }
}

pub fn write_jpeg(image: &DynamicImage, path: &Path, quality: u8) -> anyhow::Result<()> {
    let file = File::create(path).with_context(|| format!("can't create {}", path.display()))?;
    let mut writer = BufWriter::new(file);
    {
        let mut encoder = JpegEncoder::new_with_quality(&mut writer, quality);
        // jpeg has no alpha channel
        encoder
            .encode_image(&image.to_rgb8())
            .with_context(|| format!("can't encode {}", path.display()))?;
    }
    writer.flush()?;
    Ok(())
}

/// Renders PDFs with pdfium. The library is bound on the first PDF, so courses made
/// only of images never need it.
pub struct PdfRasterizer {
    lib_dir: Option<PathBuf>,
    pdfium: OnceCell<Pdfium>,
    config: RasterConfig,
}

impl PdfRasterizer {
    pub fn new(lib_dir: Option<PathBuf>, config: RasterConfig) -> Self {
        Self {
            lib_dir,
            pdfium: OnceCell::new(),
            config,
        }
    }

    fn pdfium(&self) -> anyhow::Result<&Pdfium> {
        if let Some(pdfium) = self.pdfium.get() {
            return Ok(pdfium);
        }
        let pdfium = bind_pdfium(self.lib_dir.as_deref())?;
        Ok(self.pdfium.get_or_init(|| pdfium))
    }
}

impl Rasterizer for PdfRasterizer {
    #[tracing::instrument(skip(self))]
    fn rasterize(&self, pdf_path: &Path) -> anyhow::Result<Vec<PathBuf>> {
        let start_time = Instant::now();
        let file =
            File::open(pdf_path).with_context(|| format!("can't open {}", pdf_path.display()))?;
        let mmap = unsafe { Mmap::map(&file) }
            .with_context(|| format!("can't map {}", pdf_path.display()))?;
        let document = self
            .pdfium()?
            .load_pdf_from_byte_slice(&mmap, None)
            .with_context(|| format!("can't load pdf {}", pdf_path.display()))?;

        let render_config = PdfRenderConfig::default().scale_page_by_factor(self.config.scale_factor());
        let mut images = Vec::with_capacity(document.pages().len() as usize);
        for (page_index, page) in document.pages().iter().enumerate() {
            let image = page
                .render_with_config(&render_config)
                .map(|bitmap| bitmap.as_image())
                .with_context(|| {
                    format!("can't render page {page_index} of {}", pdf_path.display())
                })?;
            let image_path = page_image_path(pdf_path, page_index);
            write_jpeg(&image, &image_path, self.config.jpeg_quality)?;
            images.push(image_path);
        }

        tracing::debug!(
            "Rasterizing {} pages of {} took {}ms",
            images.len(),
            pdf_path.display(),
            start_time.elapsed().as_millis()
        );
        Ok(images)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageBuffer, ImageFormat, Rgba};
    use pdfium_render::prelude::PdfPagePaperSize;

    #[test]
    fn test_page_image_path() {
        let pdf = Path::new("Courses/Math/Labs/lab 1.pdf");
        assert_eq!(
            page_image_path(pdf, 0),
            PathBuf::from("Courses/Math/Labs/lab 10.jpg")
        );
        assert_eq!(
            page_image_path(pdf, 12),
            PathBuf::from("Courses/Math/Labs/lab 112.jpg")
        );
    }

    #[test]
    fn test_scale_factor_from_dpi() {
        let config = RasterConfig {
            dpi: 144,
            jpeg_quality: 90,
        };
        assert_eq!(config.scale_factor(), 2.0);
    }

    #[test]
    fn test_write_jpeg_drops_alpha() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("page0.jpg");
        let image = DynamicImage::ImageRgba8(ImageBuffer::from_pixel(
            16,
            8,
            Rgba([10u8, 20, 30, 128]),
        ));
        write_jpeg(&image, &path, 90)?;

        let decoded = image::open(&path)?;
        assert_eq!((decoded.width(), decoded.height()), (16, 8));
        assert_eq!(ImageFormat::from_path(&path)?, ImageFormat::Jpeg);
        Ok(())
    }

    fn pdfium_rasterizer(dpi: u32) -> PdfRasterizer {
        PdfRasterizer::new(
            std::env::var_os("PDFIUM_DYNAMIC_LIB_PATH").map(PathBuf::from),
            RasterConfig {
                dpi,
                jpeg_quality: 90,
            },
        )
    }

    #[test]
    fn test_unbound_until_first_pdf() {
        let rasterizer = PdfRasterizer::new(
            Some(PathBuf::from("/nonexistent/pdfium")),
            RasterConfig::default(),
        );
        assert!(rasterizer.pdfium.get().is_none());
    }

    #[test]
    #[ignore = "needs the pdfium library"]
    fn test_rasterize_writes_one_jpeg_per_page() -> anyhow::Result<()> {
        let rasterizer = pdfium_rasterizer(36);
        let dir = tempfile::tempdir()?;
        let pdf_path = dir.path().join("notes.pdf");
        {
            let mut document = rasterizer.pdfium()?.create_new_pdf()?;
            for _ in 0..3 {
                document
                    .pages_mut()
                    .create_page_at_end(PdfPagePaperSize::a4())?;
            }
            document.save_to_file(&pdf_path)?;
        }

        let pages = rasterizer.rasterize(&pdf_path)?;
        let expected: Vec<_> = (0..3).map(|i| dir.path().join(format!("notes{i}.jpg"))).collect();
        assert_eq!(pages, expected);
        for page in &pages {
            assert!(page.exists());
        }
        Ok(())
    }

    #[test]
    #[ignore = "needs the pdfium library"]
    fn test_rasterize_corrupt_pdf_fails() -> anyhow::Result<()> {
        let rasterizer = pdfium_rasterizer(300);
        rasterizer.pdfium()?;
        let dir = tempfile::tempdir()?;
        let pdf_path = dir.path().join("broken.pdf");
        std::fs::write(&pdf_path, b"%PDF-1.7 nope")?;
        assert!(rasterizer.rasterize(&pdf_path).is_err());
        Ok(())
    }
}
