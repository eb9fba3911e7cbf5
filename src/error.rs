//! Error types for the pdf2a4 library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`Pdf2A4Error`] — **Fatal**: the watcher cannot start or continue at all
//!   (missing watch folder, observer registration failure, bad configuration).
//!   Returned as `Err(Pdf2A4Error)` from startup-path functions.
//!
//! * [`PageError`] — **Non-fatal**: a single page failed (corrupt raster,
//!   encode glitch, I/O error) but all sibling pages are fine. Stored inside
//!   [`crate::outcome::PageResult`] so callers can inspect partial success
//!   rather than losing the whole document to one bad page.
//!
//! Rasterization failures sit in neither enum: the external tool fails the
//! *whole file*, and [`crate::outcome::RasterOutcome`] carries its diagnostic
//! as a plain message so the watcher's retry policy can treat every whole-file
//! failure uniformly.

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the pdf2a4 library.
///
/// Page-level failures use [`PageError`] and are stored in
/// [`crate::outcome::PageResult`] rather than propagated here.
#[derive(Debug, Error)]
pub enum Pdf2A4Error {
    // ── Startup errors ────────────────────────────────────────────────────
    /// The configured watch folder does not exist or is not a directory.
    #[error("Watch folder not found: '{path}'\nCheck WATCH_FOLDER points at an existing directory.")]
    WatchFolderMissing { path: PathBuf },

    /// The output folder could not be created.
    #[error("Failed to create output folder '{path}': {source}")]
    OutputFolderCreate {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Watch errors ──────────────────────────────────────────────────────
    /// The filesystem observer could not be registered.
    #[error("Failed to start filesystem observer: {0}")]
    WatchInit(String),

    /// The observer's event channel closed unexpectedly while watching.
    #[error("Filesystem event channel closed unexpectedly")]
    EventChannelClosed,
}

/// A non-fatal error for a single page.
///
/// Stored inside [`crate::outcome::PageResult`] when normalization of one
/// raster page fails. Sibling pages continue; whole-file success requires
/// zero page failures.
#[derive(Debug, Clone, Error, serde::Serialize, serde::Deserialize)]
pub enum PageError {
    /// The raster image could not be read or decoded.
    #[error("Page {page}: failed to decode raster image: {detail}")]
    Decode { page: usize, detail: String },

    /// The normalized page could not be encoded as JPEG.
    #[error("Page {page}: failed to encode JPEG: {detail}")]
    Encode { page: usize, detail: String },

    /// The output file could not be written.
    #[error("Page {page}: failed to write output: {detail}")]
    Write { page: usize, detail: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn watch_folder_missing_display() {
        let e = Pdf2A4Error::WatchFolderMissing {
            path: PathBuf::from("/no/such/dir"),
        };
        let msg = e.to_string();
        assert!(msg.contains("/no/such/dir"), "got: {msg}");
        assert!(msg.contains("WATCH_FOLDER"));
    }

    #[test]
    fn page_error_display_carries_page_number() {
        let e = PageError::Decode {
            page: 3,
            detail: "truncated JPEG".into(),
        };
        assert!(e.to_string().contains("Page 3"));
        assert!(e.to_string().contains("truncated JPEG"));
    }

    #[test]
    fn page_error_round_trips_through_json() {
        let e = PageError::Write {
            page: 1,
            detail: "disk full".into(),
        };
        let json = serde_json::to_string(&e).unwrap();
        let back: PageError = serde_json::from_str(&json).unwrap();
        assert!(back.to_string().contains("disk full"));
    }
}
