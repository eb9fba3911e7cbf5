//! Arrival watcher: observe the input folder and drive each PDF through the
//! conversion orchestrator.
//!
//! ## Lifecycle
//!
//! The watcher runs through two phases. During `InitialScan` it enumerates
//! the files already present when the process started: a PDF whose
//! `{baseName}_{n}.jpg` outputs already exist is skipped entirely, making
//! restarts idempotent. Afterwards it settles into `SteadyState` and reacts
//! to filesystem events until shutdown. The filesystem observer is
//! registered *before* the scan so nothing arriving mid-scan is lost —
//! those events queue in the channel and are handled once the scan is done.
//!
//! Raw observer events arrive in bursts: a single copied file produces a
//! Create plus a Modify per write. The event loop coalesces raw events per
//! path and dispatches only after the burst has settled, so one arrival is
//! one dispatch.
//!
//! ## Per-file protocol
//!
//! claim dedup registry → wait for the file size to stabilise → (changed
//! files: delete stale outputs) → orchestrate → bounded retry loop →
//! release the claim after a cool-down. Each accepted event spawns an
//! independent task; files never block each other, while the registry keeps
//! two attempts off the same path.

use crate::config::WatchConfig;
use crate::convert::{self, existing_outputs};
use crate::error::Pdf2A4Error;
use crate::pipeline::raster::Rasterizer;
use crate::registry::ProcessingRegistry;
use notify::event::{EventKind, ModifyKind, RenameMode};
use notify::{PollWatcher, RecommendedWatcher, RecursiveMode, Watcher};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::sync::mpsc;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, error, info, warn};

/// How long a completed attempt's dedup claim lingers, absorbing the tail of
/// a duplicate-event burst.
const DEDUP_COOLDOWN: Duration = Duration::from_secs(5);
/// Interval between the two size probes of the stability wait.
const STABILITY_PROBE: Duration = Duration::from_secs(1);
/// Re-probe delay when the file is not yet statable.
const STABILITY_RETRY: Duration = Duration::from_millis(500);
/// Upper bound on the whole stability wait.
const STABILITY_MAX_WAIT: Duration = Duration::from_secs(30);
/// Poll interval for the polling-mode observer (network shares).
const POLL_INTERVAL: Duration = Duration::from_secs(2);
/// Quiet period per path before a burst of raw events becomes one dispatch.
const EVENT_SETTLE: Duration = Duration::from_millis(500);

/// A classified filesystem observation, consumed once.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchEvent {
    pub path: PathBuf,
    pub kind: WatchEventKind,
    /// When this watcher first saw the event.
    pub observed_at: SystemTime,
}

impl WatchEvent {
    pub fn now(path: PathBuf, kind: WatchEventKind) -> Self {
        Self {
            path,
            kind,
            observed_at: SystemTime::now(),
        }
    }
}

/// What happened to the path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WatchEventKind {
    /// A file appeared (create, or rename into place).
    Added,
    /// An existing file's contents changed.
    Changed,
}

/// Watcher phase: pre-existing enumeration vs. live events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    InitialScan,
    SteadyState,
}

/// A burst of raw events being coalesced for one path.
#[derive(Debug, Clone, Copy)]
struct PendingEvent {
    /// First-observed kind: a Create followed by Modifys is one arrival.
    kind: WatchEventKind,
    /// Dispatch once no further raw event has arrived by this instant.
    settle_at: Instant,
}

/// Watches one folder and converts arriving PDFs.
pub struct FolderWatcher {
    config: Arc<WatchConfig>,
    registry: ProcessingRegistry,
    rasterizer: Arc<dyn Rasterizer>,
}

impl FolderWatcher {
    /// The registry is injected so the caller owns dedup state explicitly
    /// (and tests can observe it).
    pub fn new(
        config: WatchConfig,
        registry: ProcessingRegistry,
        rasterizer: Arc<dyn Rasterizer>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            registry,
            rasterizer,
        }
    }

    /// Run the watcher until the event channel closes.
    ///
    /// Intended to be raced against a shutdown signal (`tokio::select!`):
    /// dropping the returned future drops the observer, which stops event
    /// delivery immediately. In-flight conversion tasks are abandoned, not
    /// awaited — their temporaries are recoverable and non-authoritative.
    pub async fn run(&self) -> Result<(), Pdf2A4Error> {
        let watch_folder = self.config.watch_folder.clone();
        if !watch_folder.is_dir() {
            return Err(Pdf2A4Error::WatchFolderMissing { path: watch_folder });
        }
        tokio::fs::create_dir_all(&self.config.output_folder)
            .await
            .map_err(|e| Pdf2A4Error::OutputFolderCreate {
                path: self.config.output_folder.clone(),
                source: e,
            })?;

        let (tx, mut rx) = mpsc::channel::<Result<notify::Event, notify::Error>>(256);

        // Register the observer before scanning: arrivals during the scan
        // queue up in the channel instead of being missed.
        let mut observer = build_observer(tx, self.config.use_polling)?;
        observer
            .watch(&watch_folder, RecursiveMode::Recursive)
            .map_err(|e| Pdf2A4Error::WatchInit(e.to_string()))?;

        info!(
            watch = %watch_folder.display(),
            output = %self.config.output_folder.display(),
            polling = self.config.use_polling,
            "watching for PDF files"
        );

        self.initial_scan(&watch_folder).await;
        info!("initial scan complete; watching for new PDF files");

        // One filesystem arrival fans out into a burst of raw events (a
        // Create plus one Modify per write syscall). Events are coalesced
        // per path until the burst has been quiet for EVENT_SETTLE, then
        // dispatched exactly once.
        let mut pending: HashMap<PathBuf, PendingEvent> = HashMap::new();
        loop {
            let next_settle = pending.values().map(|p| p.settle_at).min();
            tokio::select! {
                received = rx.recv() => {
                    match received {
                        Some(Ok(event)) => {
                            if let Some(kind) = classify(&event.kind) {
                                let settle_at = Instant::now() + EVENT_SETTLE;
                                for path in event.paths {
                                    pending
                                        .entry(path)
                                        .and_modify(|p| p.settle_at = settle_at)
                                        .or_insert(PendingEvent { kind, settle_at });
                                }
                            }
                        }
                        Some(Err(e)) => error!(error = %e, "filesystem observer error"),
                        // The observer is still alive here, so a closed
                        // channel is abnormal.
                        None => return Err(Pdf2A4Error::EventChannelClosed),
                    }
                }
                _ = sleep_until(next_settle.unwrap_or_else(Instant::now)), if next_settle.is_some() => {
                    let now = Instant::now();
                    let settled: Vec<PathBuf> = pending
                        .iter()
                        .filter(|(_, p)| p.settle_at <= now)
                        .map(|(path, _)| path.clone())
                        .collect();
                    for path in settled {
                        if let Some(p) = pending.remove(&path) {
                            self.dispatch(WatchEvent::now(path, p.kind), Phase::SteadyState);
                        }
                    }
                }
            }
        }
    }

    /// Enumerate pre-existing PDFs and process those without outputs.
    async fn initial_scan(&self, root: &Path) {
        let mut found = Vec::new();
        collect_pdfs(root, root, &mut found);
        found.sort();
        debug!(count = found.len(), "pre-existing PDF files");

        for path in found {
            self.dispatch(
                WatchEvent::now(path, WatchEventKind::Added),
                Phase::InitialScan,
            );
        }
    }

    /// Apply the phase rules to one event and spawn the per-file task.
    fn dispatch(&self, event: WatchEvent, phase: Phase) {
        if !accept_path(&self.config.watch_folder, &event.path) {
            return;
        }
        let file_name = display_name(&event.path);

        let clear_old = match event.kind {
            WatchEventKind::Added => {
                if phase == Phase::InitialScan {
                    let base = match event.path.file_stem() {
                        Some(s) => s.to_string_lossy().into_owned(),
                        None => return,
                    };
                    if !existing_outputs(&self.config.output_folder, &base).is_empty() {
                        info!(file = %file_name, "outputs already present, skipping");
                        return;
                    }
                }
                info!(file = %file_name, "new PDF detected");
                false
            }
            WatchEventKind::Changed => {
                info!(file = %file_name, "PDF changed, reprocessing");
                // A changed file is not a duplicate of its own *finished*
                // attempt: clear a cooling-down leftover. A claim still in
                // flight stays, and this event is suppressed downstream.
                self.registry.release_stale(&event.path);
                true
            }
        };

        let config = Arc::clone(&self.config);
        let registry = self.registry.clone();
        let rasterizer = Arc::clone(&self.rasterizer);
        tokio::spawn(async move {
            process_file(config, registry, rasterizer, event.path, clear_old).await;
        });
    }
}

/// One file's full attempt cycle: dedup, stability wait, convert, retry.
async fn process_file(
    config: Arc<WatchConfig>,
    registry: ProcessingRegistry,
    rasterizer: Arc<dyn Rasterizer>,
    path: PathBuf,
    clear_old: bool,
) {
    let file_name = display_name(&path);

    if !registry.try_claim(&path) {
        debug!(file = %file_name, "already processing, skipped");
        return;
    }

    if !wait_for_file_ready(&path, STABILITY_MAX_WAIT).await {
        warn!(file = %file_name, "timeout waiting for file to become ready");
        registry.release_after(path, DEDUP_COOLDOWN);
        return;
    }

    if clear_old {
        let base = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let removed = convert::clear_outputs(&config.output_folder, &base);
        if removed > 0 {
            info!(file = %file_name, removed, "deleted stale output pages");
        }
    }

    let mut attempt: u32 = 0;
    loop {
        info!(file = %file_name, attempt, "processing PDF");
        let outcome =
            convert::process_pdf(&path, &config.output_folder, &config, rasterizer.as_ref()).await;

        if outcome.success {
            info!(
                file = %file_name,
                pages = format_args!("{}/{}", outcome.processed_pages, outcome.total_pages),
                "PDF processed successfully"
            );
            break;
        }

        let detail = outcome
            .first_error()
            .unwrap_or_else(|| "unknown error".to_string());
        error!(file = %file_name, error = %detail, "failed to process PDF");

        if attempt >= config.max_retries {
            error!(
                file = %file_name,
                attempts = attempt + 1,
                "giving up; file and temporaries left for manual handling"
            );
            break;
        }

        attempt += 1;
        info!(
            file = %file_name,
            retry = format_args!("{}/{}", attempt, config.max_retries),
            "retrying"
        );
        // Release during the back-off so a genuine change event can take
        // over; re-claim before the next attempt.
        registry.release(&path);
        tokio::time::sleep(Duration::from_millis(config.retry_interval_ms)).await;
        if !registry.try_claim(&path) {
            debug!(file = %file_name, "path reclaimed by a newer event, abandoning retry");
            return;
        }
    }

    registry.release_after(path, DEDUP_COOLDOWN);
}

/// Wait until two size probes one second apart agree on a non-zero size.
///
/// Gives up after `max_wait`; a timeout is a non-fatal skip, not a failure —
/// the file stays on disk and a later change event can pick it up.
pub(crate) async fn wait_for_file_ready(path: &Path, max_wait: Duration) -> bool {
    let start = tokio::time::Instant::now();

    while start.elapsed() < max_wait {
        match tokio::fs::metadata(path).await {
            Ok(before) => {
                tokio::time::sleep(STABILITY_PROBE).await;
                match tokio::fs::metadata(path).await {
                    Ok(after) if before.len() == after.len() && before.len() > 0 => {
                        return true;
                    }
                    _ => {}
                }
            }
            Err(_) => {
                // Not there yet (or transiently unreadable).
                tokio::time::sleep(STABILITY_RETRY).await;
            }
        }
    }
    false
}

/// Accept only non-hidden `.pdf` files inside the watched tree.
pub(crate) fn accept_path(root: &Path, path: &Path) -> bool {
    let is_pdf = path
        .extension()
        .map(|e| e.eq_ignore_ascii_case("pdf"))
        .unwrap_or(false);
    if !is_pdf {
        return false;
    }

    // Hidden files and directories never surface, at any depth below root.
    let relative = path.strip_prefix(root).unwrap_or(path);
    !relative.components().any(|c| {
        c.as_os_str()
            .to_string_lossy()
            .starts_with('.')
    })
}

/// Map a raw notify event kind onto the watcher's vocabulary.
///
/// Renames into place count as `Added` — that is how atomic writers land
/// files. Metadata-only changes and removals are not actionable.
pub(crate) fn classify(kind: &EventKind) -> Option<WatchEventKind> {
    match kind {
        EventKind::Create(_) => Some(WatchEventKind::Added),
        EventKind::Modify(ModifyKind::Name(RenameMode::To)) => Some(WatchEventKind::Added),
        EventKind::Modify(ModifyKind::Data(_)) | EventKind::Modify(ModifyKind::Any) => {
            Some(WatchEventKind::Changed)
        }
        _ => None,
    }
}

/// Recursively collect `.pdf` files, skipping hidden path segments.
fn collect_pdfs(root: &Path, dir: &Path, out: &mut Vec<PathBuf>) {
    let entries = match std::fs::read_dir(dir) {
        Ok(e) => e,
        Err(e) => {
            warn!(dir = %dir.display(), error = %e, "cannot enumerate directory");
            return;
        }
    };
    for entry in entries.flatten() {
        let path = entry.path();
        let hidden = entry.file_name().to_string_lossy().starts_with('.');
        if hidden {
            continue;
        }
        if path.is_dir() {
            collect_pdfs(root, &path, out);
        } else if accept_path(root, &path) {
            out.push(path);
        }
    }
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

fn build_observer(
    tx: mpsc::Sender<Result<notify::Event, notify::Error>>,
    use_polling: bool,
) -> Result<Box<dyn Watcher + Send>, Pdf2A4Error> {
    if use_polling {
        let watcher = PollWatcher::new(
            move |res| {
                let _ = tx.blocking_send(res);
            },
            notify::Config::default().with_poll_interval(POLL_INTERVAL),
        )
        .map_err(|e| Pdf2A4Error::WatchInit(e.to_string()))?;
        Ok(Box::new(watcher))
    } else {
        let watcher = RecommendedWatcher::new(
            move |res| {
                let _ = tx.blocking_send(res);
            },
            notify::Config::default(),
        )
        .map_err(|e| Pdf2A4Error::WatchInit(e.to_string()))?;
        Ok(Box::new(watcher))
    }
}
