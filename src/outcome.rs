//! Result types produced by the conversion pipeline.
//!
//! Every pipeline stage reports through structured outcomes instead of
//! `Result`: a failed rasterization or a failed page is an ordinary, expected
//! event the watcher must log and possibly retry, not an exceptional one.
//! Only [`crate::error::Pdf2A4Error`] ever crosses a `?`.

use crate::error::PageError;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Pixel dimensions of an image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

impl Dimensions {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Landscape iff strictly wider than tall; squares count as portrait.
    pub fn is_landscape(&self) -> bool {
        self.width > self.height
    }
}

/// Result of rasterizing one PDF into temporary page images.
///
/// `image_paths` is ordered page 1 first. The paths are owned by the
/// orchestrator from the moment this struct is returned: it either deletes
/// them (full success) or abandons them in place for manual recovery.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RasterOutcome {
    pub success: bool,
    pub image_paths: Vec<PathBuf>,
    pub page_count: usize,
    /// Diagnostic message when `success` is false.
    pub error: Option<String>,
}

impl RasterOutcome {
    pub fn pages(image_paths: Vec<PathBuf>) -> Self {
        let page_count = image_paths.len();
        Self {
            success: true,
            image_paths,
            page_count,
            error: None,
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            image_paths: Vec::new(),
            page_count: 0,
            error: Some(error.into()),
        }
    }
}

/// Result of normalizing one raster page to the target canvas.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageResult {
    /// 1-indexed page number within the source PDF.
    pub page: usize,
    /// Destination of the normalized JPEG (written only on success).
    pub output_path: PathBuf,
    /// Source raster dimensions before any transform.
    pub original_size: Dimensions,
    /// Final canvas dimensions (always the configured target on success).
    pub final_size: Dimensions,
    /// True when the source was landscape and was rotated 90° to portrait.
    pub was_rotated: bool,
    /// Set iff this page failed; siblings are unaffected.
    pub error: Option<PageError>,
}

impl PageResult {
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    /// A failed page: sizes are zeroed since they may never have been read.
    pub fn failed(page: usize, output_path: PathBuf, error: PageError) -> Self {
        Self {
            page,
            output_path,
            original_size: Dimensions::new(0, 0),
            final_size: Dimensions::new(0, 0),
            was_rotated: false,
            error: Some(error),
        }
    }
}

/// Terminal artifact of one orchestration run over a single PDF.
///
/// Not persisted anywhere: only its side effects (output files, log lines)
/// outlive the run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessingOutcome {
    /// True iff rasterization succeeded and every page normalized cleanly.
    pub success: bool,
    pub total_pages: usize,
    pub processed_pages: usize,
    pub failed_pages: usize,
    pub results: Vec<PageResult>,
    /// Whole-file diagnostic (rasterization failure); `None` when per-page
    /// results tell the story.
    pub error: Option<String>,
}

impl ProcessingOutcome {
    /// Aggregate per-page results into a file-level outcome.
    pub fn from_pages(total_pages: usize, results: Vec<PageResult>) -> Self {
        let processed_pages = results.iter().filter(|r| r.is_success()).count();
        let failed_pages = results.len() - processed_pages;
        Self {
            success: failed_pages == 0,
            total_pages,
            processed_pages,
            failed_pages,
            results,
            error: None,
        }
    }

    /// A whole-file failure before any page was normalized.
    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            total_pages: 0,
            processed_pages: 0,
            failed_pages: 0,
            results: Vec::new(),
            error: Some(error.into()),
        }
    }

    /// First available diagnostic, for log lines.
    pub fn first_error(&self) -> Option<String> {
        if let Some(ref e) = self.error {
            return Some(e.clone());
        }
        self.results
            .iter()
            .find_map(|r| r.error.as_ref())
            .map(|e| e.to_string())
    }
}
