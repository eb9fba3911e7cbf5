//! # pdf2a4
//!
//! Watch a folder for arriving PDF documents and convert every page into a
//! normalised A4-portrait JPEG.
//!
//! ## Why this crate?
//!
//! Downstream imaging systems (print queues, archival scanners, OCR feeds)
//! often require every page to be exactly one portrait A4 canvas. Real-world
//! PDFs are anything but: mixed page sizes, landscape pages, odd aspect
//! ratios. This crate rasterises each page, rotates landscape pages upright,
//! scales to fit, and pads with white so each output is a pixel-exact
//! portrait canvas (2480 x 3508 at 300 DPI by default).
//!
//! ## Pipeline Overview
//!
//! ```text
//! watch folder
//!  │
//!  ├─ 1. Watch      filesystem events via notify (inotify or polling)
//!  ├─ 2. Dedup      in-memory registry with post-completion cool-down
//!  ├─ 3. Stabilise  wait until two size probes 1s apart agree, non-zero
//!  ├─ 4. Raster     pdftoppm subprocess → one JPEG per page in a temp dir
//!  ├─ 5. Normalise  rotate landscape 90°, scale to fit, pad white, re-encode
//!  └─ 6. Output     {baseName}_{n}.jpg in the output folder, 1-based
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use pdf2a4::{FolderWatcher, PdftoppmRasterizer, ProcessingRegistry, WatchConfig};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = WatchConfig::builder("./inbox", "./pages").build()?;
//!     let watcher = FolderWatcher::new(
//!         config,
//!         ProcessingRegistry::new(),
//!         Arc::new(PdftoppmRasterizer::new()),
//!     );
//!     watcher.run().await?;
//!     Ok(())
//! }
//! ```
//!
//! One-shot conversion without the watcher is available too:
//!
//! ```rust,no_run
//! use pdf2a4::{process_pdf, PdftoppmRasterizer, WatchConfig};
//! use std::path::Path;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = WatchConfig::builder("./inbox", "./pages").build()?;
//!     let rasterizer = PdftoppmRasterizer::new();
//!     let outcome = process_pdf(
//!         Path::new("./inbox/report.pdf"),
//!         Path::new("./pages"),
//!         &config,
//!         &rasterizer,
//!     )
//!     .await;
//!     println!("{}/{} pages ok", outcome.processed_pages, outcome.total_pages);
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature  | Default | Description |
//! |----------|---------|-------------|
//! | `cli`    | on      | Enables the `pdf2a4` binary (clap + anyhow + tracing-subscriber) |
//! | `pdfium` | off     | In-process rasterizer via pdfium-render instead of the `pdftoppm` subprocess |
//!
//! Disable `cli` when using only the library to avoid pulling in CLI-only deps:
//! ```toml
//! pdf2a4 = { version = "0.3", default-features = false }
//! ```
//!
//! ## Requirements
//!
//! The default rasterizer shells out to `pdftoppm` from poppler-utils, which
//! must be on `PATH` (or pointed at via [`WatchConfig`]). The `pdfium`
//! feature removes that requirement at the cost of bundling a pdfium binary.

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod convert;
pub mod error;
pub mod outcome;
pub mod pipeline;
pub mod preflight;
pub mod registry;
pub mod watcher;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{WatchConfig, WatchConfigBuilder, A4_HEIGHT_300DPI, A4_WIDTH_300DPI};
pub use convert::{clear_outputs, existing_outputs, process_pdf};
pub use error::{PageError, Pdf2A4Error};
pub use outcome::{Dimensions, PageResult, ProcessingOutcome, RasterOutcome};
pub use pipeline::raster::{PdftoppmRasterizer, Rasterizer};
pub use preflight::{run_preflight, CheckResult, CheckStatus, PreflightReport};
pub use registry::ProcessingRegistry;
pub use watcher::{FolderWatcher, WatchEvent, WatchEventKind};

#[cfg(feature = "pdfium")]
pub use pipeline::pdfium::PdfiumRasterizer;
