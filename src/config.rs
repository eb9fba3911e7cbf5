//! Configuration for the watch-and-convert daemon.
//!
//! All behaviour is controlled through [`WatchConfig`], built via its
//! [`WatchConfigBuilder`]. Keeping every knob in one cloneable struct makes it
//! trivial to hand a config to each spawned per-file task, serialise it for
//! logging, and diff two runs to understand why their outputs differ.
//!
//! # Design choice: builder over constructor
//! A ten-field constructor is unreadable and breaks on every new field. The
//! builder lets callers set only what they care about and rely on
//! well-documented defaults for the rest; only the two folder paths are
//! required.

use crate::error::Pdf2A4Error;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// A4 portrait at 300 DPI: 210 mm / 25.4 × 300 = 2480 px.
pub const A4_WIDTH_300DPI: u32 = 2480;
/// A4 portrait at 300 DPI: 297 mm / 25.4 × 300 = 3508 px.
pub const A4_HEIGHT_300DPI: u32 = 3508;

/// Configuration for a folder-watching conversion daemon.
///
/// Built via [`WatchConfig::builder()`].
///
/// # Example
/// ```rust
/// use pdf2a4::WatchConfig;
///
/// let config = WatchConfig::builder("/srv/inbox", "/srv/pages")
///     .dpi(300)
///     .jpeg_quality(90)
///     .max_retries(3)
///     .build()
///     .unwrap();
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchConfig {
    /// Folder observed for arriving PDF files.
    pub watch_folder: PathBuf,

    /// Folder receiving the normalized `{baseName}_{n}.jpg` pages.
    pub output_folder: PathBuf,

    /// Rasterization DPI. Range: 72–600. Default: 300.
    ///
    /// 300 DPI matches the A4 canvas defaults exactly, so a true A4 page
    /// rasterizes to the target size and needs no resampling at all. Lower
    /// values trade sharpness for speed on very large drawings.
    pub dpi: u32,

    /// JPEG quality for the normalized pages (1–100). Default: 90.
    pub jpeg_quality: u8,

    /// Target canvas width in pixels. Default: 2480 (A4 portrait @ 300 DPI).
    pub page_width: u32,

    /// Target canvas height in pixels. Default: 3508 (A4 portrait @ 300 DPI).
    pub page_height: u32,

    /// Pause between retry attempts in milliseconds. Default: 5000.
    pub retry_interval_ms: u64,

    /// Maximum retry attempts after a failed conversion. Default: 3.
    ///
    /// Retries apply uniformly to every whole-file failure. Even input errors
    /// are retried: a file held locked by another writer often becomes
    /// readable a few seconds later.
    pub max_retries: u32,

    /// Observe the watch folder by periodic polling instead of native
    /// filesystem notifications. Default: false.
    ///
    /// Native notification APIs are unreliable on network shares (SMB, NFS);
    /// polling trades latency for correctness there.
    pub use_polling: bool,

    /// Directory for temporary raster pages. Default: the OS temp directory.
    ///
    /// Temporaries from a failed conversion are deliberately left here for
    /// manual inspection, so this must not be an auto-deleting location.
    pub temp_folder: Option<PathBuf>,

    /// Explicit path to the `pdftoppm` binary. Default: resolve via `PATH`.
    pub pdftoppm_path: Option<PathBuf>,
}

impl WatchConfig {
    /// Create a builder with the two required folder paths.
    pub fn builder(
        watch_folder: impl Into<PathBuf>,
        output_folder: impl Into<PathBuf>,
    ) -> WatchConfigBuilder {
        WatchConfigBuilder {
            config: WatchConfig {
                watch_folder: watch_folder.into(),
                output_folder: output_folder.into(),
                dpi: 300,
                jpeg_quality: 90,
                page_width: A4_WIDTH_300DPI,
                page_height: A4_HEIGHT_300DPI,
                retry_interval_ms: 5000,
                max_retries: 3,
                use_polling: false,
                temp_folder: None,
                pdftoppm_path: None,
            },
        }
    }

    /// Directory where temporary raster pages are written.
    pub fn temp_root(&self) -> PathBuf {
        self.temp_folder
            .clone()
            .unwrap_or_else(std::env::temp_dir)
    }

    /// Rasterizer binary to invoke, falling back to `pdftoppm` on `PATH`.
    pub fn pdftoppm_binary(&self) -> &Path {
        self.pdftoppm_path
            .as_deref()
            .unwrap_or_else(|| Path::new("pdftoppm"))
    }
}

/// Builder for [`WatchConfig`].
#[derive(Debug)]
pub struct WatchConfigBuilder {
    config: WatchConfig,
}

impl WatchConfigBuilder {
    pub fn dpi(mut self, dpi: u32) -> Self {
        self.config.dpi = dpi.clamp(72, 600);
        self
    }

    pub fn jpeg_quality(mut self, quality: u8) -> Self {
        self.config.jpeg_quality = quality.clamp(1, 100);
        self
    }

    pub fn page_size(mut self, width: u32, height: u32) -> Self {
        self.config.page_width = width;
        self.config.page_height = height;
        self
    }

    pub fn retry_interval_ms(mut self, ms: u64) -> Self {
        self.config.retry_interval_ms = ms;
        self
    }

    pub fn max_retries(mut self, n: u32) -> Self {
        self.config.max_retries = n;
        self
    }

    pub fn use_polling(mut self, v: bool) -> Self {
        self.config.use_polling = v;
        self
    }

    pub fn temp_folder(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.temp_folder = Some(path.into());
        self
    }

    pub fn pdftoppm_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.pdftoppm_path = Some(path.into());
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<WatchConfig, Pdf2A4Error> {
        let c = &self.config;
        if c.watch_folder.as_os_str().is_empty() {
            return Err(Pdf2A4Error::InvalidConfig(
                "watch_folder must not be empty".into(),
            ));
        }
        if c.output_folder.as_os_str().is_empty() {
            return Err(Pdf2A4Error::InvalidConfig(
                "output_folder must not be empty".into(),
            ));
        }
        if c.watch_folder == c.output_folder {
            return Err(Pdf2A4Error::InvalidConfig(
                "watch_folder and output_folder must differ".into(),
            ));
        }
        if c.page_width == 0 || c.page_height == 0 {
            return Err(Pdf2A4Error::InvalidConfig(format!(
                "Page canvas must be non-zero, got {}x{}",
                c.page_width, c.page_height
            )));
        }
        Ok(self.config)
    }
}
