//! End-to-end integration tests for the folder watcher.
//!
//! Most tests drive the real watcher with a stub rasterizer, so they need
//! nothing beyond a working filesystem-event backend. The tests that shell
//! out to the real `pdftoppm` are gated behind the `E2E_ENABLED` environment
//! variable so they do not run in CI unless explicitly requested.
//!
//! Run with:
//!   cargo test --test watcher_e2e -- --nocapture
//!
//! Including the poppler-backed tests:
//!   E2E_ENABLED=1 cargo test --test watcher_e2e -- --nocapture

use async_trait::async_trait;
use image::{GenericImageView, Rgb, RgbImage};
use pdf2a4::{
    FolderWatcher, PdftoppmRasterizer, ProcessingRegistry, RasterOutcome, Rasterizer, WatchConfig,
};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

// ── Test helpers ─────────────────────────────────────────────────────────────

/// Rasterizer stub producing one fixed-size page per call.
struct StubRasterizer {
    calls: AtomicUsize,
    page_size: (u32, u32),
}

impl StubRasterizer {
    fn new(width: u32, height: u32) -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            page_size: (width, height),
        })
    }
}

#[async_trait]
impl Rasterizer for StubRasterizer {
    async fn rasterize(&self, pdf_path: &Path, _dpi: u32, work_dir: &Path) -> RasterOutcome {
        self.calls.fetch_add(1, Ordering::SeqCst);
        std::fs::create_dir_all(work_dir).unwrap();
        let base = pdf_path.file_stem().unwrap().to_string_lossy().into_owned();
        let page = work_dir.join(format!("{base}-1.png"));
        let (w, h) = self.page_size;
        RgbImage::from_pixel(w, h, Rgb([10, 20, 30]))
            .save(&page)
            .unwrap();
        RasterOutcome::pages(vec![page])
    }
}

struct Harness {
    _dir: tempfile::TempDir,
    watch: PathBuf,
    output: PathBuf,
    rasterizer: Arc<StubRasterizer>,
    watcher_task: tokio::task::JoinHandle<()>,
}

impl Harness {
    /// Start a real watcher over fresh temp folders with the stub rasterizer.
    fn start() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let watch = dir.path().join("inbox");
        let output = dir.path().join("pages");
        std::fs::create_dir_all(&watch).unwrap();

        let config = WatchConfig::builder(&watch, &output)
            .page_size(50, 70)
            .retry_interval_ms(100)
            .temp_folder(dir.path().join("tmp"))
            .build()
            .unwrap();
        let rasterizer = StubRasterizer::new(20, 30);
        let watcher = FolderWatcher::new(
            config,
            ProcessingRegistry::new(),
            Arc::clone(&rasterizer) as Arc<dyn Rasterizer>,
        );
        let watcher_task = tokio::spawn(async move {
            let _ = watcher.run().await;
        });

        Self {
            _dir: dir,
            watch,
            output,
            rasterizer,
            watcher_task,
        }
    }
}

impl Drop for Harness {
    fn drop(&mut self) {
        self.watcher_task.abort();
    }
}

/// Poll until `path` exists, up to `secs` seconds.
async fn wait_for(path: &Path, secs: u64) -> bool {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(secs);
    while tokio::time::Instant::now() < deadline {
        if path.exists() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(200)).await;
    }
    false
}

/// Skip the test unless E2E_ENABLED is set *and* pdftoppm is runnable.
macro_rules! e2e_skip_unless_ready {
    () => {{
        if std::env::var("E2E_ENABLED").is_err() {
            println!("SKIP — set E2E_ENABLED=1 to run poppler-backed e2e tests");
            return;
        }
        let probe = std::process::Command::new("pdftoppm").arg("-v").output();
        if !probe.map(|o| o.status.success()).unwrap_or(false) {
            println!("SKIP — pdftoppm not found; install poppler-utils");
            return;
        }
    }};
}

/// A minimal but well-formed single-page PDF (A5 landscape, one text op).
/// Poppler accepts it without repair.
fn write_minimal_pdf(path: &Path) {
    let objects: [&[u8]; 5] = [
        b"<< /Type /Catalog /Pages 2 0 R >>",
        b"<< /Type /Pages /Kids [3 0 R] /Count 1 >>",
        b"<< /Type /Page /Parent 2 0 R /MediaBox [0 0 595 420] /Contents 4 0 R /Resources << /Font << /F1 5 0 R >> >> >>",
        b"<< /Length 42 >>\nstream\nBT /F1 24 Tf 72 320 Td (pdf2a4 test) Tj ET\nendstream",
        b"<< /Type /Font /Subtype /Type1 /BaseFont /Helvetica >>",
    ];

    let mut buf: Vec<u8> = Vec::new();
    buf.extend_from_slice(b"%PDF-1.4\n");
    let mut offsets = Vec::new();
    for (i, body) in objects.iter().enumerate() {
        offsets.push(buf.len());
        buf.extend_from_slice(format!("{} 0 obj\n", i + 1).as_bytes());
        buf.extend_from_slice(body);
        buf.extend_from_slice(b"\nendobj\n");
    }
    let xref_at = buf.len();
    buf.extend_from_slice(format!("xref\n0 {}\n", objects.len() + 1).as_bytes());
    buf.extend_from_slice(b"0000000000 65535 f \n");
    for off in offsets {
        buf.extend_from_slice(format!("{off:010} 00000 n \n").as_bytes());
    }
    buf.extend_from_slice(
        format!(
            "trailer\n<< /Size {} /Root 1 0 R >>\nstartxref\n{}\n%%EOF\n",
            objects.len() + 1,
            xref_at
        )
        .as_bytes(),
    );
    std::fs::write(path, buf).unwrap();
}

// ── Stub-backed watcher tests ────────────────────────────────────────────────

#[tokio::test(flavor = "multi_thread")]
async fn new_pdf_is_converted_to_canvas_pages() {
    let h = Harness::start();
    tokio::time::sleep(Duration::from_millis(300)).await;

    std::fs::write(h.watch.join("invoice.pdf"), b"%PDF-1.4 payload").unwrap();

    let out = h.output.join("invoice_1.jpg");
    assert!(wait_for(&out, 15).await, "expected {} to appear", out.display());

    let img = image::open(&out).unwrap();
    assert_eq!(img.dimensions(), (50, 70), "page must match the canvas size");
    assert_eq!(h.rasterizer.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn create_plus_modify_burst_converts_once() {
    let h = Harness::start();
    tokio::time::sleep(Duration::from_millis(300)).await;

    // A copy lands as Create followed by Modify events; the watcher must
    // coalesce the burst into a single conversion attempt.
    let pdf = h.watch.join("doc.pdf");
    std::fs::write(&pdf, b"%PDF-1.4 first half").unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;
    {
        use std::io::Write;
        let mut f = std::fs::OpenOptions::new().append(true).open(&pdf).unwrap();
        f.write_all(b" second half").unwrap();
    }

    assert!(wait_for(&h.output.join("doc_1.jpg"), 15).await);
    // Leave room for an erroneous second attempt before counting.
    tokio::time::sleep(Duration::from_secs(3)).await;
    assert_eq!(
        h.rasterizer.calls.load(Ordering::SeqCst),
        1,
        "one arrival must mean one conversion"
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn backlog_is_processed_on_startup() {
    let dir = tempfile::tempdir().unwrap();
    let watch = dir.path().join("inbox");
    std::fs::create_dir_all(&watch).unwrap();
    std::fs::write(watch.join("old.pdf"), b"%PDF-1.4 payload").unwrap();

    let output = dir.path().join("pages");
    let config = WatchConfig::builder(&watch, &output)
        .page_size(50, 70)
        .temp_folder(dir.path().join("tmp"))
        .build()
        .unwrap();
    let rasterizer = StubRasterizer::new(20, 30);
    let watcher = FolderWatcher::new(
        config,
        ProcessingRegistry::new(),
        Arc::clone(&rasterizer) as Arc<dyn Rasterizer>,
    );
    let task = tokio::spawn(async move {
        let _ = watcher.run().await;
    });

    assert!(wait_for(&output.join("old_1.jpg"), 15).await);
    task.abort();
}

#[tokio::test(flavor = "multi_thread")]
async fn restart_skips_files_with_existing_outputs() {
    let dir = tempfile::tempdir().unwrap();
    let watch = dir.path().join("inbox");
    let output = dir.path().join("pages");
    std::fs::create_dir_all(&watch).unwrap();
    std::fs::create_dir_all(&output).unwrap();
    std::fs::write(watch.join("done.pdf"), b"%PDF-1.4 payload").unwrap();
    std::fs::write(output.join("done_1.jpg"), b"previous run").unwrap();

    let config = WatchConfig::builder(&watch, &output)
        .page_size(50, 70)
        .temp_folder(dir.path().join("tmp"))
        .build()
        .unwrap();
    let rasterizer = StubRasterizer::new(20, 30);
    let watcher = FolderWatcher::new(
        config,
        ProcessingRegistry::new(),
        Arc::clone(&rasterizer) as Arc<dyn Rasterizer>,
    );
    let task = tokio::spawn(async move {
        let _ = watcher.run().await;
    });

    // Long enough for the scan plus any stability wait to have happened.
    tokio::time::sleep(Duration::from_secs(3)).await;
    assert_eq!(
        rasterizer.calls.load(Ordering::SeqCst),
        0,
        "already-converted file must not be reprocessed"
    );
    let data = std::fs::read(output.join("done_1.jpg")).unwrap();
    assert_eq!(data, b"previous run", "existing output must be untouched");
    task.abort();
}

#[tokio::test(flavor = "multi_thread")]
async fn hidden_and_non_pdf_files_are_ignored() {
    let h = Harness::start();
    tokio::time::sleep(Duration::from_millis(300)).await;

    std::fs::write(h.watch.join(".draft.pdf"), b"%PDF-1.4 payload").unwrap();
    std::fs::write(h.watch.join("notes.txt"), b"plain text").unwrap();

    tokio::time::sleep(Duration::from_secs(3)).await;
    assert_eq!(h.rasterizer.calls.load(Ordering::SeqCst), 0);
    assert!(!h.output.exists() || std::fs::read_dir(&h.output).unwrap().next().is_none());
}

// ── Poppler-backed tests (E2E_ENABLED) ───────────────────────────────────────

#[tokio::test(flavor = "multi_thread")]
async fn real_pdftoppm_produces_portrait_canvas() {
    e2e_skip_unless_ready!();

    let dir = tempfile::tempdir().unwrap();
    let pdf = dir.path().join("landscape.pdf");
    write_minimal_pdf(&pdf);

    let output = dir.path().join("pages");
    let config = WatchConfig::builder(dir.path().join("inbox"), &output)
        .dpi(72)
        .page_size(200, 283)
        .temp_folder(dir.path().join("tmp"))
        .build()
        .unwrap();

    let rasterizer = PdftoppmRasterizer::new();
    let outcome = pdf2a4::process_pdf(&pdf, &output, &config, &rasterizer).await;

    assert!(outcome.success, "error: {:?}", outcome.first_error());
    assert_eq!(outcome.total_pages, 1);

    let img = image::open(output.join("landscape_1.jpg")).unwrap();
    // The source page is landscape, so it was rotated into the portrait canvas.
    assert_eq!(img.dimensions(), (200, 283));
}

#[tokio::test(flavor = "multi_thread")]
async fn real_watcher_end_to_end() {
    e2e_skip_unless_ready!();

    let dir = tempfile::tempdir().unwrap();
    let watch = dir.path().join("inbox");
    let output = dir.path().join("pages");
    std::fs::create_dir_all(&watch).unwrap();

    let config = WatchConfig::builder(&watch, &output)
        .dpi(72)
        .page_size(200, 283)
        .temp_folder(dir.path().join("tmp"))
        .build()
        .unwrap();
    let watcher = FolderWatcher::new(
        config,
        ProcessingRegistry::new(),
        Arc::new(PdftoppmRasterizer::new()),
    );
    let task = tokio::spawn(async move {
        let _ = watcher.run().await;
    });
    tokio::time::sleep(Duration::from_millis(300)).await;

    write_minimal_pdf(&watch.join("report.pdf"));

    assert!(wait_for(&output.join("report_1.jpg"), 30).await);
    task.abort();
}
