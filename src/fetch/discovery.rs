//! Locating a usable fetch executable
//!
//! A candidate is usable when `<candidate> --version` succeeds and prints the
//! required version string. Stock wget builds lack the Lua hooks and the
//! archive options the fetch relies on, so anything else is rejected.

use crate::config::FetchConfig;
use crate::error::{DownloadError, Result};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, info, warn};

/// Binary name looked up on PATH
const PATH_BINARY_NAME: &str = "wget-lua";

/// Find the first candidate reporting the required version
///
/// An explicitly configured executable is the only candidate when set.
/// Otherwise the configured search paths are tried in order, then PATH.
pub async fn find_executable(config: &FetchConfig) -> Result<PathBuf> {
    for candidate in candidates(config) {
        if reports_version(&candidate, &config.required_version, config.version_timeout).await {
            info!(path = %candidate.display(), "using fetch executable");
            return Ok(candidate);
        }
    }

    Err(DownloadError::ExecutableNotFound {
        required_version: config.required_version.clone(),
    }
    .into())
}

fn candidates(config: &FetchConfig) -> Vec<PathBuf> {
    if let Some(explicit) = &config.executable {
        return vec![explicit.clone()];
    }

    let mut candidates = config.search_paths.clone();
    if config.search_path
        && let Ok(found) = which::which(PATH_BINARY_NAME)
    {
        candidates.push(found);
    }
    candidates
}

async fn reports_version(candidate: &Path, required_version: &str, limit: Duration) -> bool {
    let run = Command::new(candidate)
        .arg("--version")
        .kill_on_drop(true)
        .output();
    let output = match tokio::time::timeout(limit, run).await {
        Ok(Ok(output)) => output,
        Ok(Err(e)) => {
            debug!(path = %candidate.display(), error = %e, "candidate not runnable");
            return false;
        }
        Err(_) => {
            warn!(path = %candidate.display(), ?limit, "candidate hung on --version; skipping");
            return false;
        }
    };

    let stdout = String::from_utf8_lossy(&output.stdout);
    let matches = output.status.success() && stdout.contains(required_version);
    if !matches {
        debug!(
            path = %candidate.display(),
            status = ?output.status.code(),
            "candidate does not report required version"
        );
    }
    matches
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::error::Error;
    use std::os::unix::fs::PermissionsExt;
    use tempfile::TempDir;

    fn fake_binary(dir: &Path, name: &str, version_line: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, format!("#!/bin/sh\necho '{version_line}'\n")).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    fn config(search_paths: Vec<PathBuf>) -> FetchConfig {
        FetchConfig {
            search_paths,
            search_path: false,
            ..FetchConfig::default()
        }
    }

    #[tokio::test]
    async fn test_skips_candidates_with_wrong_version() {
        let dir = TempDir::new().unwrap();
        let stock = fake_binary(dir.path(), "wget", "GNU Wget 1.21.4 built on linux-gnu.");
        let lua = fake_binary(dir.path(), "wget-lua", "GNU Wget 1.14.lua.20130523-9a5c");
        let missing = dir.path().join("absent");

        let found = find_executable(&config(vec![missing, stock, lua.clone()]))
            .await
            .unwrap();
        assert_eq!(found, lua);
    }

    #[tokio::test]
    async fn test_explicit_executable_is_the_only_candidate() {
        let dir = TempDir::new().unwrap();
        let lua = fake_binary(dir.path(), "wget-lua", "GNU Wget 1.14.lua.20130523-9a5c");
        let stock = fake_binary(dir.path(), "wget", "GNU Wget 1.21.4");

        let mut cfg = config(vec![lua]);
        cfg.executable = Some(stock);

        assert!(matches!(
            find_executable(&cfg).await,
            Err(Error::Download(DownloadError::ExecutableNotFound { .. }))
        ));
    }

    #[tokio::test]
    async fn test_hung_candidate_is_skipped_after_timeout() {
        let dir = TempDir::new().unwrap();
        let hung = dir.path().join("wget-hung");
        std::fs::write(&hung, "#!/bin/sh
sleep 30
").unwrap();
        std::fs::set_permissions(&hung, std::fs::Permissions::from_mode(0o755)).unwrap();
        let lua = fake_binary(dir.path(), "wget-lua", "GNU Wget 1.14.lua.20130523-9a5c");
        let mut cfg = config(vec![hung, lua.clone()]);
        cfg.version_timeout = Duration::from_millis(200);

        let started = std::time::Instant::now();
        let found = find_executable(&cfg).await.unwrap();

        assert_eq!(found, lua);
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[tokio::test]
    async fn test_nothing_usable_is_executable_not_found() {
        let dir = TempDir::new().unwrap();

        match find_executable(&config(vec![dir.path().join("nope")])).await {
            Err(Error::Download(DownloadError::ExecutableNotFound { required_version })) => {
                assert_eq!(required_version, "GNU Wget 1.14.lua.20130523-9a5c")
            }
            other => panic!("expected ExecutableNotFound, got {other:?}"),
        }
    }
}
