//! PDF rasterisation: render every page to a JPEG file next to the document.
//!
//! Pages of `<dir>/<stem>.pdf` land in `<dir>/<stem>/image-{n}.jpg`, `n`
//! starting at 1, in page order. The returned paths are the analysis input.
//!
//! pdfium keeps thread-local state and is CPU-bound, so the whole render runs
//! inside `tokio::task::spawn_blocking`.

use crate::error::DocBatchError;
use futures::future::BoxFuture;
use image::ImageFormat;
use pdfium_render::prelude::*;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Environment variable naming an existing libpdfium (file or directory).
pub const PDFIUM_LIB_PATH_ENV: &str = "PDFIUM_LIB_PATH";

/// Produces the ordered page images for a document.
pub trait Renderer: Send + Sync {
    fn render<'a>(&'a self, pdf_path: &'a Path) -> BoxFuture<'a, Result<Vec<PathBuf>, DocBatchError>>;
}

/// pdfium-backed renderer writing JPEG page images.
#[derive(Debug, Clone, Copy)]
pub struct PdfiumRenderer {
    pub dpi: u32,
}

impl PdfiumRenderer {
    pub fn new(dpi: u32) -> Self {
        Self { dpi }
    }
}

impl Renderer for PdfiumRenderer {
    fn render<'a>(&'a self, pdf_path: &'a Path) -> BoxFuture<'a, Result<Vec<PathBuf>, DocBatchError>> {
        let path = pdf_path.to_path_buf();
        let dpi = self.dpi;
        Box::pin(async move {
            tokio::task::spawn_blocking(move || render_blocking(&path, dpi))
                .await
                .map_err(|e| DocBatchError::Internal(format!("Render task panicked: {e}")))?
        })
    }
}

/// Directory receiving the page images of `pdf_path`.
pub fn image_dir_for(pdf_path: &Path) -> PathBuf {
    let stem = pdf_path
        .file_stem()
        .map(|s| s.to_os_string())
        .unwrap_or_else(|| "document".into());
    pdf_path
        .parent()
        .unwrap_or_else(|| Path::new("."))
        .join(stem)
}

/// File name of page `page_number` (1-based).
pub fn image_file_name(page_number: usize) -> String {
    format!("image-{page_number}.jpg")
}

/// Bind pdfium: `PDFIUM_LIB_PATH`, then the working directory, then the system library.
pub fn bind_pdfium() -> Result<Pdfium, DocBatchError> {
    if let Some(configured) = std::env::var_os(PDFIUM_LIB_PATH_ENV) {
        let configured = PathBuf::from(configured);
        let library = if configured.is_dir() {
            Pdfium::pdfium_platform_library_name_at_path(&configured)
        } else {
            configured
        };
        return Pdfium::bind_to_library(&library)
            .map(Pdfium::new)
            .map_err(|e| {
                DocBatchError::PdfiumBindingFailed(format!("{}: {e:?}", library.display()))
            });
    }

    Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path("./"))
        .or_else(|_| Pdfium::bind_to_system_library())
        .map(Pdfium::new)
        .map_err(|e| DocBatchError::PdfiumBindingFailed(format!("{e:?}")))
}

fn render_blocking(pdf_path: &Path, dpi: u32) -> Result<Vec<PathBuf>, DocBatchError> {
    let pdfium = bind_pdfium()?;

    let document = pdfium
        .load_pdf_from_file(pdf_path, None)
        .map_err(|e| DocBatchError::CorruptPdf {
            path: pdf_path.to_path_buf(),
            detail: format!("{e:?}"),
        })?;

    let out_dir = image_dir_for(pdf_path);
    std::fs::create_dir_all(&out_dir).map_err(|e| {
        DocBatchError::Internal(format!("Cannot create {}: {e}", out_dir.display()))
    })?;

    let pages = document.pages();
    info!("PDF loaded: {} pages", pages.len());

    let render_config = PdfRenderConfig::new().scale_page_by_factor(dpi as f32 / 72.0);

    let mut images = Vec::with_capacity(pages.len() as usize);
    for (idx, page) in pages.iter().enumerate() {
        let page_number = idx + 1;
        let failed = |detail: String| DocBatchError::RasterisationFailed {
            page: page_number,
            detail,
        };

        let bitmap = page
            .render_with_config(&render_config)
            .map_err(|e| failed(format!("{e:?}")))?;
        let image = bitmap.as_image();

        let target = out_dir.join(image_file_name(page_number));
        image
            .into_rgb8()
            .save_with_format(&target, ImageFormat::Jpeg)
            .map_err(|e| failed(format!("{}: {e}", target.display())))?;

        debug!("Rendered page {} → {}", page_number, target.display());
        images.push(target);
    }

    Ok(images)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn image_dir_sits_next_to_the_document() {
        assert_eq!(
            image_dir_for(Path::new("/data/reports/q3.pdf")),
            PathBuf::from("/data/reports/q3")
        );
        assert_eq!(
            image_dir_for(Path::new("/data/archive.v2.PDF")),
            PathBuf::from("/data/archive.v2")
        );
    }

    #[test]
    fn image_file_names_are_one_based() {
        assert_eq!(image_file_name(1), "image-1.jpg");
        assert_eq!(image_file_name(12), "image-12.jpg");
    }
}
