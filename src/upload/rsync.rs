//! rsync-based transfer runner

use super::{TransferRequest, TransferRunner};
use crate::error::{Error, Result, UploadError};
use async_trait::async_trait;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Transfer runner executing the external `rsync` binary
///
/// File names are fed to rsync on stdin (`--files-from=-`), relative to the
/// request's source directory. Resumption of interrupted transfers comes from
/// the request's extra arguments (`--partial --partial-dir`).
#[derive(Debug, Clone)]
pub struct RsyncTransfer {
    binary_path: PathBuf,
}

impl RsyncTransfer {
    /// Create a runner with an explicit binary path
    pub fn new(binary_path: PathBuf) -> Self {
        Self { binary_path }
    }

    /// Attempt to find rsync in PATH
    pub fn from_path() -> Option<Self> {
        which::which("rsync").ok().map(Self::new)
    }

    /// Command-line arguments for a request
    pub fn command_args(request: &TransferRequest) -> Vec<String> {
        let mut args: Vec<String> = ["-av", "--timeout=300", "--contimeout=300", "--files-from=-"]
            .into_iter()
            .map(String::from)
            .collect();
        args.extend(request.extra_args.iter().cloned());

        let mut source = request.source_dir.display().to_string();
        if !source.ends_with('/') {
            source.push('/');
        }
        args.push(source);
        args.push(request.target.clone());
        args
    }

    fn file_list(request: &TransferRequest) -> String {
        request
            .files
            .iter()
            .map(|f| format!("{}\n", f.display()))
            .collect()
    }
}

#[async_trait]
impl TransferRunner for RsyncTransfer {
    async fn transfer(&self, request: &TransferRequest, cancel: &CancellationToken) -> Result<()> {
        let mut child = Command::new(&self.binary_path)
            .args(Self::command_args(request))
            .stdin(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| UploadError::Spawn {
                path: self.binary_path.clone(),
                reason: e.to_string(),
            })?;

        if let Some(mut stdin) = child.stdin.take() {
            let list = Self::file_list(request);
            // rsync may exit before reading its file list
            if let Err(e) = stdin.write_all(list.as_bytes()).await {
                debug!(error = %e, "rsync closed stdin early");
            }
        }

        let status = tokio::select! {
            status = child.wait() => status?,
            _ = cancel.cancelled() => {
                if let Err(e) = child.kill().await {
                    warn!(error = %e, "failed to kill rsync");
                }
                return Err(Error::Cancelled);
            }
        };

        if status.success() {
            Ok(())
        } else {
            Err(UploadError::TransferFailed {
                code: status.code(),
            }
            .into())
        }
    }

    fn name(&self) -> &'static str {
        "rsync"
    }
}
