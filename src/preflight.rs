//! Startup environment checks.
//!
//! Run once before watching begins so a missing rasterizer binary or a bad
//! folder configuration is reported up front instead of surfacing as a
//! per-file failure hours later.

use crate::config::WatchConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tokio::process::Command;
use tracing::debug;

/// Severity of a single preflight check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckStatus {
    Ok,
    Warning,
    Error,
}

/// Outcome of one environment check.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckResult {
    pub name: String,
    pub status: CheckStatus,
    pub detail: String,
}

impl CheckResult {
    fn new(name: &str, status: CheckStatus, detail: impl Into<String>) -> Self {
        Self {
            name: name.to_string(),
            status,
            detail: detail.into(),
        }
    }
}

/// All preflight checks, in the order they were run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreflightReport {
    pub checks: Vec<CheckResult>,
}

impl PreflightReport {
    pub fn has_errors(&self) -> bool {
        self.checks.iter().any(|c| c.status == CheckStatus::Error)
    }

    pub fn has_warnings(&self) -> bool {
        self.checks.iter().any(|c| c.status == CheckStatus::Warning)
    }
}

/// Probe the environment the watcher is about to run in.
pub async fn run_preflight(config: &WatchConfig) -> PreflightReport {
    let mut checks = Vec::new();

    checks.push(check_pdftoppm(config.pdftoppm_binary()).await);
    checks.push(check_watch_folder(&config.watch_folder));
    checks.push(check_output_folder(&config.output_folder).await);

    PreflightReport { checks }
}

/// `pdftoppm -v` prints its version banner on stderr and exits 0.
async fn check_pdftoppm(binary: &Path) -> CheckResult {
    let name = "pdftoppm";
    match Command::new(binary).arg("-v").output().await {
        Ok(output) if output.status.success() => {
            let banner = String::from_utf8_lossy(&output.stderr);
            let version = banner
                .lines()
                .next()
                .unwrap_or("unknown version")
                .trim()
                .to_string();
            debug!(%version, "rasterizer binary found");
            CheckResult::new(name, CheckStatus::Ok, version)
        }
        Ok(output) => CheckResult::new(
            name,
            CheckStatus::Error,
            format!(
                "{} exited with {} when probed; install poppler-utils",
                binary.display(),
                output.status
            ),
        ),
        Err(e) => CheckResult::new(
            name,
            CheckStatus::Error,
            format!(
                "{} not runnable ({}); install poppler-utils or set --pdftoppm-path",
                binary.display(),
                e
            ),
        ),
    }
}

fn check_watch_folder(path: &Path) -> CheckResult {
    let name = "watch folder";
    if path.is_dir() {
        CheckResult::new(name, CheckStatus::Ok, path.display().to_string())
    } else {
        CheckResult::new(
            name,
            CheckStatus::Error,
            format!("{} does not exist or is not a directory", path.display()),
        )
    }
}

/// The output folder is created on demand; only a failed create is fatal.
async fn check_output_folder(path: &Path) -> CheckResult {
    let name = "output folder";
    if path.is_dir() {
        return CheckResult::new(name, CheckStatus::Ok, path.display().to_string());
    }
    match tokio::fs::create_dir_all(path).await {
        Ok(()) => CheckResult::new(
            name,
            CheckStatus::Warning,
            format!("{} did not exist, created it", path.display()),
        ),
        Err(e) => CheckResult::new(
            name,
            CheckStatus::Error,
            format!("cannot create {}: {}", path.display(), e),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn report_severity_helpers() {
        let report = PreflightReport {
            checks: vec![
                CheckResult::new("a", CheckStatus::Ok, "fine"),
                CheckResult::new("b", CheckStatus::Warning, "created"),
            ],
        };
        assert!(!report.has_errors());
        assert!(report.has_warnings());

        let report = PreflightReport {
            checks: vec![CheckResult::new("a", CheckStatus::Error, "missing")],
        };
        assert!(report.has_errors());
    }

    #[test]
    fn missing_watch_folder_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let present = check_watch_folder(dir.path());
        assert_eq!(present.status, CheckStatus::Ok);

        let absent = check_watch_folder(&dir.path().join("nope"));
        assert_eq!(absent.status, CheckStatus::Error);
    }

    #[tokio::test]
    async fn output_folder_is_created_with_a_warning() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("out");

        let first = check_output_folder(&target).await;
        assert_eq!(first.status, CheckStatus::Warning);
        assert!(target.is_dir());

        let second = check_output_folder(&target).await;
        assert_eq!(second.status, CheckStatus::Ok);
    }

    #[tokio::test]
    async fn unrunnable_rasterizer_binary_is_an_error() {
        let result = check_pdftoppm(Path::new("/does/not/exist/pdftoppm")).await;
        assert_eq!(result.status, CheckStatus::Error);
        assert!(result.detail.contains("poppler-utils"));
    }

    #[test]
    fn status_serializes_lowercase() {
        let json = serde_json::to_string(&CheckStatus::Warning).unwrap();
        assert_eq!(json, "\"warning\"");
    }
}
