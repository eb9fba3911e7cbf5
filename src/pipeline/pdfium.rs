//! Library-invoked rasterizer backed by pdfium (feature `pdfium`).
//!
//! Used where poppler-utils is unavailable, most notably Windows. Output
//! semantics are identical to the subprocess path: 1-indexed
//! `{baseName}-{n}.jpg` files in the work directory, ordered page 1 first.
//!
//! ## Why spawn_blocking?
//!
//! pdfium wraps a C++ library with thread-local state that must not run on
//! async worker threads. `tokio::task::spawn_blocking` moves the rendering
//! onto the blocking pool, so CPU-heavy pages never stall event dispatch.
//! Because pdfium writes each page synchronously before returning, no
//! output-count stability poll is needed here.

use crate::outcome::RasterOutcome;
use crate::pipeline::raster::{base_name_of, check_source, Rasterizer};
use async_trait::async_trait;
use pdfium_render::prelude::*;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Rasterizer using the pdfium library in-process.
#[derive(Debug, Clone, Default)]
pub struct PdfiumRasterizer;

impl PdfiumRasterizer {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Rasterizer for PdfiumRasterizer {
    async fn rasterize(&self, pdf_path: &Path, dpi: u32, work_dir: &Path) -> RasterOutcome {
        if let Some(failure) = check_source(pdf_path).await {
            return failure;
        }

        let pdf = pdf_path.to_path_buf();
        let dir = work_dir.to_path_buf();
        match tokio::task::spawn_blocking(move || rasterize_blocking(&pdf, dpi, &dir)).await {
            Ok(outcome) => outcome,
            Err(e) => RasterOutcome::failure(format!("Rasterization task panicked: {e}")),
        }
    }
}

fn rasterize_blocking(pdf_path: &Path, dpi: u32, work_dir: &Path) -> RasterOutcome {
    let base_name = match base_name_of(pdf_path) {
        Some(b) => b,
        None => {
            return RasterOutcome::failure(format!(
                "Cannot derive a base name from '{}'",
                pdf_path.display()
            ))
        }
    };

    if let Err(e) = std::fs::create_dir_all(work_dir) {
        return RasterOutcome::failure(format!(
            "Failed to create work directory '{}': {e}",
            work_dir.display()
        ));
    }

    let pdfium = Pdfium::default();
    let document = match pdfium.load_pdf_from_file(pdf_path, None) {
        Ok(d) => d,
        Err(e) => {
            return RasterOutcome::failure(format!(
                "pdfium failed to open '{}': {e:?}",
                pdf_path.display()
            ))
        }
    };

    let pages = document.pages();
    if pages.len() == 0 {
        return RasterOutcome::failure(format!("no images generated for '{}'", pdf_path.display()));
    }

    let mut image_paths: Vec<PathBuf> = Vec::with_capacity(pages.len() as usize);
    for (idx, page) in pages.iter().enumerate() {
        // Page size is in points (1/72 inch); scale to the requested DPI.
        let target_width = (page.width().value / 72.0 * dpi as f32).round() as i32;
        let render_config = PdfRenderConfig::new().set_target_width(target_width.max(1));

        let bitmap = match page.render_with_config(&render_config) {
            Ok(b) => b,
            Err(e) => {
                return RasterOutcome::failure(format!(
                    "Rasterization failed for page {}: {e:?}",
                    idx + 1
                ))
            }
        };

        let out_path = work_dir.join(format!("{base_name}-{}.jpg", idx + 1));
        // JPEG has no alpha channel; flatten before saving.
        let image = bitmap.as_image().to_rgb8();
        if let Err(e) = image.save_with_format(&out_path, image::ImageFormat::Jpeg) {
            return RasterOutcome::failure(format!(
                "Failed to write raster page {}: {e}",
                idx + 1
            ));
        }
        debug!(page = idx + 1, path = %out_path.display(), "rasterized via pdfium");
        image_paths.push(out_path);
    }

    RasterOutcome::pages(image_paths)
}
