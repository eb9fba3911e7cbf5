//! Page normalization: resize, rotate, and pad each raster page onto an
//! exact target canvas, encoded as baseline JPEG.
//!
//! The geometry is split out as a pure function ([`compute_layout`]) so the
//! rounding rules are testable without touching pixels:
//!
//! 1. landscape iff `width > height` (strictly; squares are portrait)
//! 2. uniform scale so the page fits *inside* the canvas with no cropping,
//!    with the axes swapped for landscape sources since they will be rotated
//! 3. resized dimensions rounded per axis; upscaling is permitted
//! 4. landscape pages rotate 90° so the long edge becomes vertical
//! 5. white padding centers the page on the canvas, floor/ceil split so odd
//!    differences still total exactly; clamped to ≥ 0 because a rounded
//!    resize may overshoot by a pixel
//!
//! Decoding and encoding run under `spawn_blocking` — imaging is CPU-bound
//! and must not stall the watcher's event dispatch.

use crate::error::PageError;
use crate::outcome::{Dimensions, PageResult};
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{Rgb, RgbImage};
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Target canvas and encoding parameters for normalization.
#[derive(Debug, Clone, Copy)]
pub struct NormalizeSpec {
    pub target_width: u32,
    pub target_height: u32,
    pub jpeg_quality: u8,
}

impl NormalizeSpec {
    pub fn target(&self) -> Dimensions {
        Dimensions::new(self.target_width, self.target_height)
    }
}

/// White padding around a centered page, in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Padding {
    pub top: u32,
    pub bottom: u32,
    pub left: u32,
    pub right: u32,
}

impl Padding {
    pub fn is_zero(&self) -> bool {
        self.top == 0 && self.bottom == 0 && self.left == 0 && self.right == 0
    }
}

/// The full set of transforms for one page.
#[derive(Debug, Clone, Copy)]
pub struct PageLayout {
    /// Dimensions to resize the source to, before any rotation.
    pub resize_to: Dimensions,
    /// Rotate 90° after resizing (landscape sources only).
    pub rotate: bool,
    /// Padding applied after rotation to reach the exact canvas.
    pub padding: Padding,
}

/// Compute the resize/rotate/pad plan for a source image.
pub fn compute_layout(source: Dimensions, target: Dimensions) -> PageLayout {
    let (sw, sh) = (source.width as f64, source.height as f64);
    let (tw, th) = (target.width as f64, target.height as f64);

    let rotate = source.is_landscape();
    let scale = if rotate {
        // The source's long edge ends up vertical after rotation, so its
        // width is bounded by the canvas height and vice versa.
        (th / sw).min(tw / sh)
    } else {
        (tw / sw).min(th / sh)
    };

    let resize_to = Dimensions::new(
        (sw * scale).round().max(1.0) as u32,
        (sh * scale).round().max(1.0) as u32,
    );

    let (cur_w, cur_h) = if rotate {
        (resize_to.height, resize_to.width)
    } else {
        (resize_to.width, resize_to.height)
    };

    let pad_w = target.width.saturating_sub(cur_w);
    let pad_h = target.height.saturating_sub(cur_h);
    let padding = Padding {
        top: pad_h / 2,
        bottom: pad_h - pad_h / 2,
        left: pad_w / 2,
        right: pad_w - pad_w / 2,
    };

    PageLayout {
        resize_to,
        rotate,
        padding,
    }
}

/// Normalize one raster page onto the target canvas.
///
/// Always returns a [`PageResult`] — a corrupt image or I/O error fails this
/// page only, never its siblings.
pub async fn normalize_page(
    input: &Path,
    output: &Path,
    page: usize,
    spec: &NormalizeSpec,
) -> PageResult {
    let input = input.to_path_buf();
    let output = output.to_path_buf();
    let spec = *spec;
    let task_output = output.clone();
    match tokio::task::spawn_blocking(move || normalize_blocking(&input, &task_output, page, &spec))
        .await
    {
        Ok(result) => result,
        Err(e) => PageResult::failed(
            page,
            output,
            PageError::Decode {
                page,
                detail: format!("normalization task panicked: {e}"),
            },
        ),
    }
}

fn normalize_blocking(
    input: &Path,
    output: &Path,
    page: usize,
    spec: &NormalizeSpec,
) -> PageResult {
    let img = match image::open(input) {
        Ok(i) => i,
        Err(e) => {
            return PageResult::failed(
                page,
                output.to_path_buf(),
                PageError::Decode {
                    page,
                    detail: format!("{e} ('{}')", input.display()),
                },
            )
        }
    };

    let source = Dimensions::new(img.width(), img.height());
    let target = spec.target();
    let layout = compute_layout(source, target);

    let resized = img.resize_exact(
        layout.resize_to.width,
        layout.resize_to.height,
        FilterType::Lanczos3,
    );
    let page_img = if layout.rotate {
        resized.rotate90().to_rgb8()
    } else {
        resized.to_rgb8()
    };

    let canvas = if layout.padding.is_zero() {
        page_img
    } else {
        let mut canvas = RgbImage::from_pixel(target.width, target.height, Rgb([255, 255, 255]));
        image::imageops::overlay(
            &mut canvas,
            &page_img,
            layout.padding.left as i64,
            layout.padding.top as i64,
        );
        canvas
    };

    let file = match std::fs::File::create(output) {
        Ok(f) => f,
        Err(e) => {
            return PageResult::failed(
                page,
                output.to_path_buf(),
                PageError::Write {
                    page,
                    detail: format!("{e} ('{}')", output.display()),
                },
            )
        }
    };

    let mut writer = BufWriter::new(file);
    // JpegEncoder emits baseline (non-progressive) JPEG.
    let encoder = JpegEncoder::new_with_quality(&mut writer, spec.jpeg_quality);
    if let Err(e) = canvas.write_with_encoder(encoder) {
        return PageResult::failed(
            page,
            output.to_path_buf(),
            PageError::Encode {
                page,
                detail: e.to_string(),
            },
        );
    }

    debug!(
        page,
        from = %format!("{}x{}", source.width, source.height),
        rotated = layout.rotate,
        out = %output.display(),
        "normalized page"
    );

    PageResult {
        page,
        output_path: output.to_path_buf(),
        original_size: source,
        final_size: target,
        was_rotated: layout.rotate,
        error: None,
    }
}

/// Normalize a PDF's raster pages in page order.
///
/// Output names are `{baseName}_{n}.jpg`, 1-indexed. One [`PageResult`] is
/// returned per input regardless of individual failures. Input raster files
/// are never deleted here — cleanup is the orchestrator's decision, gated on
/// full-batch success.
pub async fn normalize_pages(
    inputs: &[PathBuf],
    base_name: &str,
    output_dir: &Path,
    spec: &NormalizeSpec,
) -> Vec<PageResult> {
    let mut results = Vec::with_capacity(inputs.len());
    for (i, input) in inputs.iter().enumerate() {
        let page = i + 1;
        let output = output_dir.join(format!("{base_name}_{page}.jpg"));
        results.push(normalize_page(input, &output, page, spec).await);
    }
    results
}

#[cfg(test)]
mod tests {
    use super::*;

    const A4: Dimensions = Dimensions {
        width: 2480,
        height: 3508,
    };

    fn spec(w: u32, h: u32, q: u8) -> NormalizeSpec {
        NormalizeSpec {
            target_width: w,
            target_height: h,
            jpeg_quality: q,
        }
    }

    #[test]
    fn portrait_page_is_not_rotated() {
        let layout = compute_layout(Dimensions::new(1000, 1400), A4);
        assert!(!layout.rotate);
        // scale = min(2480/1000, 3508/1400) = 2.48
        assert_eq!(layout.resize_to, Dimensions::new(2480, 3472));
        assert_eq!(
            layout.padding,
            Padding {
                top: 18,
                bottom: 18,
                left: 0,
                right: 0
            }
        );
    }

    #[test]
    fn landscape_page_rotates_and_swaps_axes() {
        let layout = compute_layout(Dimensions::new(1400, 1000), A4);
        assert!(layout.rotate);
        // scale = min(3508/1400, 2480/1000) = 2.48
        assert_eq!(layout.resize_to, Dimensions::new(3472, 2480));
        // After rotation: 2480 x 3472 on a 2480 x 3508 canvas.
        assert_eq!(
            layout.padding,
            Padding {
                top: 18,
                bottom: 18,
                left: 0,
                right: 0
            }
        );
    }

    #[test]
    fn square_counts_as_portrait() {
        let layout = compute_layout(Dimensions::new(500, 500), A4);
        assert!(!layout.rotate);
        assert_eq!(layout.resize_to, Dimensions::new(2480, 2480));
        assert_eq!(layout.padding.top, 514);
        assert_eq!(layout.padding.bottom, 514);
        assert_eq!(layout.padding.left, 0);
    }

    #[test]
    fn odd_padding_splits_floor_then_ceil() {
        // 33x100 portrait source on a 100x100 canvas: 67 px to distribute
        // horizontally (scale = min(100/33, 100/100) = 1).
        let layout = compute_layout(
            Dimensions::new(33, 100),
            Dimensions::new(100, 100),
        );
        assert_eq!(layout.resize_to, Dimensions::new(33, 100));
        assert_eq!(layout.padding.left, 33);
        assert_eq!(layout.padding.right, 34);
        assert_eq!(layout.padding.top, 0);
        assert_eq!(layout.padding.bottom, 0);
    }

    #[test]
    fn small_sources_are_upscaled() {
        let layout = compute_layout(Dimensions::new(10, 14), A4);
        assert!(layout.resize_to.width > 10);
        assert!(layout.resize_to.height > 14);
    }

    #[test]
    fn exact_fit_needs_no_padding() {
        let layout = compute_layout(
            Dimensions::new(1240, 1754),
            Dimensions::new(2480, 3508),
        );
        assert!(layout.padding.is_zero());
        assert_eq!(layout.resize_to, Dimensions::new(2480, 3508));
    }

    #[tokio::test]
    async fn normalized_output_has_exact_canvas_dimensions() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("page.png");
        // Landscape 100x50 gray source.
        RgbImage::from_pixel(100, 50, Rgb([128, 128, 128]))
            .save(&input)
            .unwrap();

        let output = dir.path().join("page_1.jpg");
        let result = normalize_page(&input, &output, 1, &spec(200, 300, 85)).await;

        assert!(result.is_success(), "error: {:?}", result.error);
        assert!(result.was_rotated);
        assert_eq!(result.original_size, Dimensions::new(100, 50));
        assert_eq!(result.final_size, Dimensions::new(200, 300));

        let written = image::open(&output).unwrap();
        assert_eq!((written.width(), written.height()), (200, 300));
    }

    #[tokio::test]
    async fn corrupt_page_fails_alone_and_inputs_survive() {
        let dir = tempfile::tempdir().unwrap();
        let good = dir.path().join("doc-1.png");
        RgbImage::from_pixel(40, 60, Rgb([0, 0, 0]))
            .save(&good)
            .unwrap();
        let bad = dir.path().join("doc-2.png");
        std::fs::write(&bad, b"this is not an image").unwrap();

        let out_dir = dir.path().join("out");
        std::fs::create_dir_all(&out_dir).unwrap();

        let results = normalize_pages(
            &[good.clone(), bad.clone()],
            "doc",
            &out_dir,
            &spec(100, 150, 90),
        )
        .await;

        assert_eq!(results.len(), 2);
        assert!(results[0].is_success());
        assert!(!results[1].is_success());
        assert!(out_dir.join("doc_1.jpg").exists());
        assert!(!out_dir.join("doc_2.jpg").exists());
        // Inputs are the orchestrator's to delete, not ours.
        assert!(good.exists());
        assert!(bad.exists());
    }
}
