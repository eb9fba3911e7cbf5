//! PDF rasterization: one temporary raster image per page, via an external
//! capability.
//!
//! ## Why a trait?
//!
//! The orchestrator only needs "rasterize(pdf, dpi) → ordered image paths".
//! On Linux and macOS that is poppler's `pdftoppm` as a subprocess; on
//! platforms without poppler the `pdfium` cargo feature provides a
//! library-invoked implementation with identical output semantics. Selecting
//! the implementation at startup keeps platform conditionals out of the
//! pipeline.
//!
//! ## Why wait on exit *and* poll the output directory?
//!
//! `pdftoppm` exits 0 with partial output on some damaged PDFs, and on slow
//! filesystems the last page file can appear after the process has exited.
//! So the subprocess implementation awaits exit first, then polls until the
//! count of matching output files is unchanged for a few consecutive cycles,
//! bounded by an overall timeout. On timeout whatever is present is treated
//! as final; zero files is a failure.

use crate::outcome::RasterOutcome;
use async_trait::async_trait;
use regex::Regex;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, warn};

/// Poll interval while waiting for the rasterizer's output to settle.
const OUTPUT_POLL_INTERVAL: Duration = Duration::from_millis(200);
/// Consecutive unchanged polls required before the output counts as final.
const OUTPUT_STABLE_CYCLES: u32 = 3;
/// Upper bound on the whole settle wait.
const OUTPUT_POLL_TIMEOUT: Duration = Duration::from_secs(10);

/// External PDF-rasterization capability.
///
/// Implementations write one numbered raster file per page into `work_dir`,
/// named `{baseName}-{pageNumber}.{ext}` (1-indexed), and return the ordered
/// list. Failures are reported through [`RasterOutcome`], never panics.
#[async_trait]
pub trait Rasterizer: Send + Sync {
    async fn rasterize(&self, pdf_path: &Path, dpi: u32, work_dir: &Path) -> RasterOutcome;
}

/// Subprocess rasterizer shelling out to poppler's `pdftoppm`.
#[derive(Debug, Clone)]
pub struct PdftoppmRasterizer {
    binary: PathBuf,
}

impl PdftoppmRasterizer {
    pub fn new() -> Self {
        Self {
            binary: PathBuf::from("pdftoppm"),
        }
    }

    /// Use an explicit binary location instead of resolving via `PATH`.
    pub fn with_binary(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
        }
    }
}

impl Default for PdftoppmRasterizer {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Rasterizer for PdftoppmRasterizer {
    async fn rasterize(&self, pdf_path: &Path, dpi: u32, work_dir: &Path) -> RasterOutcome {
        if let Some(failure) = check_source(pdf_path).await {
            return failure;
        }

        let base_name = match base_name_of(pdf_path) {
            Some(b) => b,
            None => {
                return RasterOutcome::failure(format!(
                    "Cannot derive a base name from '{}'",
                    pdf_path.display()
                ))
            }
        };

        if let Err(e) = tokio::fs::create_dir_all(work_dir).await {
            return RasterOutcome::failure(format!(
                "Failed to create work directory '{}': {e}",
                work_dir.display()
            ));
        }

        let prefix = work_dir.join(&base_name);
        let output = Command::new(&self.binary)
            .arg("-jpeg")
            .arg("-r")
            .arg(dpi.to_string())
            .arg(pdf_path)
            .arg(&prefix)
            .output()
            .await;

        let output = match output {
            Ok(o) => o,
            Err(e) => {
                return RasterOutcome::failure(format!(
                    "Failed to run {}: {e}. Make sure poppler-utils is installed.",
                    self.binary.display()
                ))
            }
        };

        if !output.status.success() {
            return RasterOutcome::failure(format!(
                "pdftoppm exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            ));
        }

        // Exit status alone is not trusted; let the output settle.
        wait_for_stable_count(work_dir, &base_name).await;

        match collect_page_images(work_dir, &base_name) {
            Ok(paths) if paths.is_empty() => RasterOutcome::failure(format!(
                "no images generated for '{}'",
                pdf_path.display()
            )),
            Ok(paths) => {
                debug!(pages = paths.len(), base = %base_name, "rasterized");
                RasterOutcome::pages(paths)
            }
            Err(e) => RasterOutcome::failure(format!(
                "Failed to enumerate raster output in '{}': {e}",
                work_dir.display()
            )),
        }
    }
}

/// Fail fast on a missing or zero-byte source without invoking the tool.
pub(crate) async fn check_source(pdf_path: &Path) -> Option<RasterOutcome> {
    match tokio::fs::metadata(pdf_path).await {
        Ok(meta) if meta.len() == 0 => Some(RasterOutcome::failure(format!(
            "PDF file not accessible or empty: '{}' (0 bytes)",
            pdf_path.display()
        ))),
        Ok(_) => None,
        Err(e) => Some(RasterOutcome::failure(format!(
            "PDF file not accessible or empty: '{}' ({e})",
            pdf_path.display()
        ))),
    }
}

/// Filename without directory or extension.
pub fn base_name_of(path: &Path) -> Option<String> {
    path.file_stem().map(|s| s.to_string_lossy().into_owned())
}

/// Poll `work_dir` until the number of `{base}-{n}.{ext}` files is unchanged
/// for [`OUTPUT_STABLE_CYCLES`] consecutive polls, bounded by
/// [`OUTPUT_POLL_TIMEOUT`]. Timeout is not an error: whatever exists is
/// treated as final.
async fn wait_for_stable_count(work_dir: &Path, base_name: &str) {
    let deadline = tokio::time::Instant::now() + OUTPUT_POLL_TIMEOUT;
    let mut last_count = usize::MAX;
    let mut stable_for = 0u32;

    loop {
        let count = collect_page_images(work_dir, base_name)
            .map(|v| v.len())
            .unwrap_or(0);

        if count == last_count {
            stable_for += 1;
            if stable_for >= OUTPUT_STABLE_CYCLES {
                return;
            }
        } else {
            last_count = count;
            stable_for = 0;
        }

        if tokio::time::Instant::now() >= deadline {
            warn!(
                dir = %work_dir.display(),
                count, "raster output never settled; taking what is available"
            );
            return;
        }
        tokio::time::sleep(OUTPUT_POLL_INTERVAL).await;
    }
}

/// Enumerate `{base}-{n}.{ext}` files in `dir`, ordered by page number.
///
/// The base name is escaped so filenames containing regex-special characters
/// (`report (v1.2)+.pdf`) match literally.
pub fn collect_page_images(dir: &Path, base_name: &str) -> std::io::Result<Vec<PathBuf>> {
    let pattern = Regex::new(&format!(
        r"^{}-(\d+)\.(?:jpe?g|png|ppm)$",
        regex::escape(base_name)
    ))
    .expect("escaped base name always forms a valid pattern");

    let mut pages: Vec<(usize, PathBuf)> = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if let Some(caps) = pattern.captures(&name) {
            if let Ok(n) = caps[1].parse::<usize>() {
                pages.push((n, entry.path()));
            }
        }
    }
    pages.sort_by_key(|(n, _)| *n);
    Ok(pages.into_iter().map(|(_, p)| p).collect())
}
