//! Conversion orchestration: rasterize a PDF, normalize every page, decide
//! the fate of the temporaries.
//!
//! ## Cleanup policy
//!
//! Temporary raster files are deleted if and only if *every* page normalized
//! successfully. On any page failure the whole batch of temporaries is left
//! in place so an operator can inspect or re-run the failing pages by hand;
//! this retention is not itself a failure. Deletion errors are cosmetic and
//! are swallowed after a debug log line.

use crate::config::WatchConfig;
use crate::outcome::ProcessingOutcome;
use crate::pipeline::normalize::{self, NormalizeSpec};
use crate::pipeline::raster::{base_name_of, Rasterizer};
use regex::Regex;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Run the full two-stage conversion for one PDF.
///
/// Rasterization failure short-circuits with a whole-file failure and no
/// normalization attempt. Otherwise every produced page is normalized in
/// page order; success requires zero page failures. Never returns `Err` —
/// all failures are structured into the [`ProcessingOutcome`].
pub async fn process_pdf(
    pdf_path: &Path,
    output_dir: &Path,
    config: &WatchConfig,
    rasterizer: &dyn Rasterizer,
) -> ProcessingOutcome {
    let base_name = match base_name_of(pdf_path) {
        Some(b) => b,
        None => {
            return ProcessingOutcome::failure(format!(
                "Cannot derive a base name from '{}'",
                pdf_path.display()
            ))
        }
    };

    // A unique work dir per attempt: concurrent conversions of distinct
    // files share the temp root but never a directory. Plain directory, not
    // a TempDir — failed attempts must leave their files behind.
    let work_dir = config.temp_root().join(format!(
        "pdf2a4-{}-{}",
        base_name,
        uuid::Uuid::new_v4().simple()
    ));

    let raster = rasterizer
        .rasterize(pdf_path, config.dpi, &work_dir)
        .await;
    if !raster.success {
        let detail = raster
            .error
            .unwrap_or_else(|| "rasterization failed".to_string());
        warn!(pdf = %pdf_path.display(), error = %detail, "rasterization failed");
        return ProcessingOutcome::failure(detail);
    }

    if let Err(e) = tokio::fs::create_dir_all(output_dir).await {
        return ProcessingOutcome::failure(format!(
            "Failed to create output folder '{}': {e}",
            output_dir.display()
        ));
    }

    let spec = NormalizeSpec {
        target_width: config.page_width,
        target_height: config.page_height,
        jpeg_quality: config.jpeg_quality,
    };
    let results =
        normalize::normalize_pages(&raster.image_paths, &base_name, output_dir, &spec).await;
    let outcome = ProcessingOutcome::from_pages(raster.page_count, results);

    if outcome.success {
        cleanup_temporaries(&raster.image_paths, &work_dir).await;
        info!(
            pdf = %pdf_path.display(),
            pages = outcome.processed_pages,
            "conversion complete"
        );
    } else {
        info!(
            pdf = %pdf_path.display(),
            failed = outcome.failed_pages,
            dir = %work_dir.display(),
            "page failures; temporaries retained for inspection"
        );
    }

    outcome
}

/// Delete the raster temporaries and their work directory, best effort.
async fn cleanup_temporaries(image_paths: &[PathBuf], work_dir: &Path) {
    for path in image_paths {
        if let Err(e) = tokio::fs::remove_file(path).await {
            debug!(path = %path.display(), error = %e, "failed to delete temporary");
        }
    }
    // Only removable when empty; anything else stays put.
    if let Err(e) = tokio::fs::remove_dir(work_dir).await {
        debug!(dir = %work_dir.display(), error = %e, "work dir not removed");
    }
}

/// Pattern matching this base name's output files, `{base}_{n}.jpg`.
fn output_pattern(base_name: &str) -> Regex {
    Regex::new(&format!(r"^{}_(\d+)\.jpg$", regex::escape(base_name)))
        .expect("escaped base name always forms a valid pattern")
}

/// Existing normalized outputs for a base name, in page order.
pub fn existing_outputs(output_dir: &Path, base_name: &str) -> Vec<PathBuf> {
    let pattern = output_pattern(base_name);
    let entries = match std::fs::read_dir(output_dir) {
        Ok(e) => e,
        Err(_) => return Vec::new(),
    };

    let mut pages: Vec<(usize, PathBuf)> = entries
        .flatten()
        .filter_map(|entry| {
            let name = entry.file_name();
            let name = name.to_string_lossy();
            let caps = pattern.captures(&name)?;
            let n: usize = caps[1].parse().ok()?;
            Some((n, entry.path()))
        })
        .collect();
    pages.sort_by_key(|(n, _)| *n);
    pages.into_iter().map(|(_, p)| p).collect()
}

/// Delete every existing output page for a base name.
///
/// Used when a watched PDF changes: a shorter replacement must not leave
/// stale trailing pages from the previous, longer version.
pub fn clear_outputs(output_dir: &Path, base_name: &str) -> usize {
    let mut removed = 0;
    for path in existing_outputs(output_dir, base_name) {
        match std::fs::remove_file(&path) {
            Ok(()) => removed += 1,
            Err(e) => debug!(path = %path.display(), error = %e, "failed to delete stale output"),
        }
    }
    removed
}
