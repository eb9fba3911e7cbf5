//! In-flight deduplication registry.
//!
//! At most one conversion attempt may run per path. Filesystem observers
//! deliver bursts of near-duplicate events for a single arrival (editors
//! doing atomic writes, copy tools touching the file repeatedly), so the
//! watcher claims a path here before working and releases it only after a
//! cool-down following completion — the cool-down absorbs the tail of the
//! burst.
//!
//! A claim is either *in flight* (the attempt is still running) or *cooling
//! down* (the attempt finished, the entry lingers to suppress duplicates).
//! Change events may clear a cooling-down leftover so reprocessing can
//! start, but never an in-flight claim.
//!
//! This is a best-effort check-then-set, not a lock: events for one path are
//! delivered from a single serialized event stream, so the race window a real
//! lock would close does not arise.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ClaimState {
    InFlight,
    CoolingDown,
}

#[derive(Debug, Clone, Copy)]
struct Claim {
    state: ClaimState,
    /// Distinguishes this claim from any later claim on the same path, so a
    /// cool-down timer never removes a claim it did not arm.
    epoch: u64,
}

#[derive(Debug, Default)]
struct Inner {
    claims: HashMap<PathBuf, Claim>,
    next_epoch: u64,
}

/// Shared registry of paths currently being processed.
///
/// Cheap to clone; clones share the same underlying map. Constructed by the
/// caller and handed to the watcher, so ownership is explicit rather than
/// process-global.
#[derive(Debug, Clone, Default)]
pub struct ProcessingRegistry {
    inner: Arc<Mutex<Inner>>,
}

impl ProcessingRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim a path for processing. Returns `false` when the path is already
    /// claimed, in flight or cooling down (the caller should skip).
    pub fn try_claim(&self, path: &Path) -> bool {
        let mut inner = self.inner.lock().expect("registry mutex poisoned");
        if inner.claims.contains_key(path) {
            return false;
        }
        let epoch = inner.next_epoch;
        inner.next_epoch += 1;
        inner.claims.insert(
            path.to_path_buf(),
            Claim {
                state: ClaimState::InFlight,
                epoch,
            },
        );
        true
    }

    /// Whether the path is currently claimed.
    pub fn contains(&self, path: &Path) -> bool {
        self.inner
            .lock()
            .expect("registry mutex poisoned")
            .claims
            .contains_key(path)
    }

    /// Release a path unconditionally. For a task dropping its *own* claim,
    /// as before a retry back-off sleep.
    pub fn release(&self, path: &Path) {
        self.inner
            .lock()
            .expect("registry mutex poisoned")
            .claims
            .remove(path);
    }

    /// Release a path only if its claim is a cooling-down leftover.
    ///
    /// Change events use this: a finished attempt's lingering entry must not
    /// block reprocessing, but an attempt still running keeps its claim and
    /// the event is suppressed as a duplicate.
    pub fn release_stale(&self, path: &Path) -> bool {
        let mut inner = self.inner.lock().expect("registry mutex poisoned");
        match inner.claims.get(path) {
            Some(claim) if claim.state == ClaimState::CoolingDown => {
                inner.claims.remove(path);
                true
            }
            _ => false,
        }
    }

    /// Mark a completed attempt's claim as cooling down and remove it after
    /// the delay. Duplicate events arriving within the cool-down still see
    /// the claim and are suppressed. If the path is re-claimed before the
    /// timer fires, the newer claim survives.
    pub fn release_after(&self, path: PathBuf, cooldown: Duration) {
        let epoch = {
            let mut inner = self.inner.lock().expect("registry mutex poisoned");
            match inner.claims.get_mut(&path) {
                Some(claim) => {
                    claim.state = ClaimState::CoolingDown;
                    claim.epoch
                }
                None => return,
            }
        };
        let registry = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(cooldown).await;
            let mut inner = registry.inner.lock().expect("registry mutex poisoned");
            if inner.claims.get(&path).is_some_and(|c| c.epoch == epoch) {
                debug!(path = %path.display(), "dedup cool-down elapsed");
                inner.claims.remove(&path);
            }
        });
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.inner
            .lock()
            .expect("registry mutex poisoned")
            .claims
            .len()
    }
}
