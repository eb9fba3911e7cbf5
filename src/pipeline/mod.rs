//! Pipeline stages for PDF-to-A4-JPEG conversion.
//!
//! Each submodule implements exactly one transformation step. Keeping the
//! stages separate makes each independently testable and lets the rasterizer
//! backend be swapped (subprocess vs. library) without touching normalization.
//!
//! ## Data Flow
//!
//! ```text
//! arrival ──▶ raster ──▶ normalize ──▶ output folder
//! (watcher)  (pdftoppm/  (resize, rotate,  ({base}_{n}.jpg)
//!             pdfium)     pad, JPEG)
//! ```
//!
//! 1. [`raster`] — rasterise every page into numbered temporary images;
//!    the subprocess path waits on exit plus an output-count stability poll
//! 2. [`normalize`] — per-page resize/rotate/pad onto the exact target
//!    canvas, baseline JPEG output; runs in `spawn_blocking` because imaging
//!    is CPU-bound

pub mod normalize;
pub mod raster;

#[cfg(feature = "pdfium")]
pub mod pdfium;
