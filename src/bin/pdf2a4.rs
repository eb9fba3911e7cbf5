//! CLI binary for pdf2a4.
//!
//! A thin shim over the library crate that maps CLI flags and environment
//! variables to `WatchConfig`, runs the preflight checks, and keeps the
//! watcher alive until Ctrl-C.

use anyhow::{Context, Result};
use clap::Parser;
use pdf2a4::{
    run_preflight, CheckStatus, FolderWatcher, PdftoppmRasterizer, ProcessingRegistry, WatchConfig,
    A4_HEIGHT_300DPI, A4_WIDTH_300DPI,
};
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn yellow(s: &str) -> String {
    format!("\x1b[33m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}

const AFTER_HELP: &str = "\
Examples:
  pdf2a4 --watch-folder ./inbox --output-folder ./pages
  pdf2a4 -w /srv/scans -o /srv/pages --dpi 150 --jpeg-quality 85
  WATCH_FOLDER=./inbox OUTPUT_FOLDER=./pages pdf2a4

Each page of an arriving PDF becomes {baseName}_{n}.jpg in the output
folder: portrait A4 canvas, landscape pages rotated 90 degrees clockwise,
white padding, baseline JPEG. Requires pdftoppm (poppler-utils) on PATH.";

#[derive(Parser, Debug)]
#[command(
    name = "pdf2a4",
    version,
    about = "Watch a folder and convert arriving PDFs to A4-portrait JPEG pages",
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Folder to watch for arriving PDF files.
    #[arg(short = 'w', long, env = "WATCH_FOLDER")]
    watch_folder: PathBuf,

    /// Folder where the per-page JPEGs are written.
    #[arg(short = 'o', long, env = "OUTPUT_FOLDER")]
    output_folder: PathBuf,

    /// Rasterisation DPI (72-600).
    #[arg(long, env = "DPI", default_value_t = 300,
          value_parser = clap::value_parser!(u32).range(72..=600))]
    dpi: u32,

    /// JPEG quality (1-100).
    #[arg(long, env = "JPEG_QUALITY", default_value_t = 90,
          value_parser = clap::value_parser!(u8).range(1..=100))]
    jpeg_quality: u8,

    /// Output canvas width in pixels.
    #[arg(long, env = "PAGE_WIDTH", default_value_t = A4_WIDTH_300DPI)]
    page_width: u32,

    /// Output canvas height in pixels.
    #[arg(long, env = "PAGE_HEIGHT", default_value_t = A4_HEIGHT_300DPI)]
    page_height: u32,

    /// Delay between retries of a failed conversion, in milliseconds.
    #[arg(long, env = "RETRY_INTERVAL", default_value_t = 5000)]
    retry_interval: u64,

    /// Retries after the initial attempt before giving up on a file.
    #[arg(long, env = "MAX_RETRIES", default_value_t = 3)]
    max_retries: u32,

    /// Use polling instead of native filesystem events (network shares).
    #[arg(long, env = "USE_POLLING")]
    use_polling: bool,

    /// Directory for temporary raster pages (default: OS temp dir).
    #[arg(long, env = "TEMP_FOLDER")]
    temp_folder: Option<PathBuf>,

    /// Explicit path to the pdftoppm binary.
    #[arg(long, env = "PDFTOPPM_PATH")]
    pdftoppm_path: Option<PathBuf>,

    /// Also write daily-rolling log files into this folder.
    #[arg(long, env = "LOG_FOLDER")]
    log_folder: Option<PathBuf>,

    /// Log level: error, warn, info, debug, trace.
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // Human-readable logs on stderr; optionally a daily-rolling file too.
    // The appender guard must outlive main or buffered lines are lost.
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(cli.log_level.clone()));
    let stderr_layer = tracing_subscriber::fmt::layer().with_writer(io::stderr);

    let _appender_guard = if let Some(log_folder) = &cli.log_folder {
        std::fs::create_dir_all(log_folder)
            .with_context(|| format!("failed to create log folder {}", log_folder.display()))?;
        let appender = tracing_appender::rolling::daily(log_folder, "pdf2a4.log");
        let (writer, guard) = tracing_appender::non_blocking(appender);
        let file_layer = tracing_subscriber::fmt::layer()
            .with_ansi(false)
            .with_writer(writer);
        tracing_subscriber::registry()
            .with(filter)
            .with(stderr_layer)
            .with(file_layer)
            .init();
        Some(guard)
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(stderr_layer)
            .init();
        None
    };

    let mut builder = WatchConfig::builder(&cli.watch_folder, &cli.output_folder)
        .dpi(cli.dpi)
        .jpeg_quality(cli.jpeg_quality)
        .page_size(cli.page_width, cli.page_height)
        .retry_interval_ms(cli.retry_interval)
        .max_retries(cli.max_retries)
        .use_polling(cli.use_polling);
    if let Some(temp) = &cli.temp_folder {
        builder = builder.temp_folder(temp);
    }
    if let Some(path) = &cli.pdftoppm_path {
        builder = builder.pdftoppm_path(path);
    }
    let config = builder.build().context("invalid configuration")?;

    print_banner(&config);

    // ── Preflight ────────────────────────────────────────────────────────
    let report = run_preflight(&config).await;
    for check in &report.checks {
        let mark = match check.status {
            CheckStatus::Ok => green("✓"),
            CheckStatus::Warning => yellow("!"),
            CheckStatus::Error => red("✗"),
        };
        eprintln!("  {mark} {:<16} {}", check.name, dim(&check.detail));
    }
    eprintln!();
    if report.has_errors() {
        anyhow::bail!("preflight checks failed, not starting the watcher");
    }

    let rasterizer = match &config.pdftoppm_path {
        Some(path) => PdftoppmRasterizer::with_binary(path),
        None => PdftoppmRasterizer::new(),
    };
    let watcher = FolderWatcher::new(config, ProcessingRegistry::new(), Arc::new(rasterizer));

    // Ctrl-C drops the watcher future, which stops the filesystem observer.
    // In-flight conversions are abandoned; their temp dirs survive on disk.
    tokio::select! {
        result = watcher.run() => {
            result.context("watcher stopped unexpectedly")?;
        }
        _ = tokio::signal::ctrl_c() => {
            eprintln!();
            tracing::info!("shutdown requested, stopping watcher");
        }
    }

    Ok(())
}

fn print_banner(config: &WatchConfig) {
    eprintln!();
    eprintln!("  {}", bold(&format!("pdf2a4 v{}", env!("CARGO_PKG_VERSION"))));
    eprintln!("  {:<16} {}", "watch", config.watch_folder.display());
    eprintln!("  {:<16} {}", "output", config.output_folder.display());
    eprintln!(
        "  {:<16} {}x{} px @ {} DPI, quality {}",
        "canvas", config.page_width, config.page_height, config.dpi, config.jpeg_quality
    );
    eprintln!();
}
