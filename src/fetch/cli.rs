//! Fetch runner spawning the external process

use super::traits::{ExitOutcome, FetchInvocation, FetchRunner};
use crate::error::{DownloadError, Error, Result};
use async_trait::async_trait;
use std::process::Stdio;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Runs fetch invocations as child processes
///
/// The child is killed when the cancellation token fires or when the runner's
/// future is dropped.
#[derive(Debug, Default, Clone, Copy)]
pub struct CliFetchRunner;

impl CliFetchRunner {
    /// Create a new process runner
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl FetchRunner for CliFetchRunner {
    async fn run(
        &self,
        invocation: &FetchInvocation,
        cancel: &CancellationToken,
    ) -> Result<ExitOutcome> {
        let mut command = Command::new(&invocation.program);
        command
            .args(&invocation.args)
            .envs(invocation.env.iter().map(|(k, v)| (k, v)))
            .stdin(Stdio::null())
            .kill_on_drop(true);
        if let Some(dir) = &invocation.working_dir {
            command.current_dir(dir);
        }

        let mut child = command.spawn().map_err(|e| DownloadError::Spawn {
            path: invocation.program.clone(),
            reason: e.to_string(),
        })?;
        debug!(
            program = %invocation.program.display(),
            pid = ?child.id(),
            "fetch process started"
        );

        tokio::select! {
            status = child.wait() => {
                let status = status?;
                Ok(ExitOutcome { code: status.code() })
            }
            _ = cancel.cancelled() => {
                warn!(program = %invocation.program.display(), "cancelling fetch process");
                if let Err(e) = child.kill().await {
                    warn!(error = %e, "failed to kill fetch process");
                }
                Err(Error::Cancelled)
            }
        }
    }

    fn name(&self) -> &'static str {
        "cli-fetch"
    }
}
