//! Fetch process invocation
//!
//! The [`DownloadInvoker`] turns a work item into a wget-lua invocation, runs
//! it through a [`FetchRunner`], and classifies the exit code. Transient
//! network failures are retried inside the fetch process itself (`--tries
//! inf`); the invoker's own attempt budget only covers runs that end with an
//! exit code outside the accepted set.
//!
//! ## Architecture
//!
//! - [`FetchRunner`]: trait seam for starting the process
//! - [`CliFetchRunner`]: spawns the real executable
//! - [`find_executable`]: locates a wget-lua build with the required version
//! - [`build_invocation`]: the command-line and environment contract

mod args;
mod cli;
mod discovery;
mod traits;

pub use args::{Provenance, build_invocation};
pub use cli::CliFetchRunner;
pub use discovery::find_executable;
pub use traits::{ExitOutcome, FetchInvocation, FetchRunner};

use crate::config::FetchConfig;
use crate::error::{DownloadError, Error, Result};
use crate::types::WorkItem;
use crate::workspace::Workspace;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Result of a fetch that ended with an accepted exit code
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DownloadReport {
    /// Accepted exit code
    pub code: i32,
    /// Attempts used, starting at 1
    pub attempts: u32,
}

/// Runs the fetch process for an item within its attempt budget
pub struct DownloadInvoker {
    config: FetchConfig,
    provenance: Provenance,
    executable: PathBuf,
    runner: Arc<dyn FetchRunner>,
}

impl DownloadInvoker {
    /// Create an invoker for a discovered executable
    pub fn new(
        config: FetchConfig,
        provenance: Provenance,
        executable: PathBuf,
        runner: Arc<dyn FetchRunner>,
    ) -> Self {
        Self {
            config,
            provenance,
            executable,
            runner,
        }
    }

    /// Executable this invoker runs
    pub fn executable(&self) -> &PathBuf {
        &self.executable
    }

    /// Whether an exit code counts as success
    pub fn is_accepted(&self, code: Option<i32>) -> bool {
        code.is_some_and(|c| self.config.accept_exit_codes.contains(&c))
    }

    /// Fetch every URL of `item` into its workspace
    ///
    /// Makes up to `max_tries` attempts, waiting `attempt_delay` between them.
    /// Cancellation stops the running process and any pending wait.
    pub async fn download(
        &self,
        item: &WorkItem,
        workspace: &Workspace,
        cancel: &CancellationToken,
    ) -> Result<DownloadReport> {
        let max_tries = self.config.max_tries.max(1);
        let mut last_code = None;

        for attempt in 1..=max_tries {
            let invocation = {
                let mut rng = rand::thread_rng();
                build_invocation(
                    &self.config,
                    &self.provenance,
                    &self.executable,
                    item,
                    workspace,
                    &mut rng,
                )
            };

            info!(
                item = %item.name,
                attempt,
                max_tries,
                runner = self.runner.name(),
                "starting fetch"
            );
            let outcome = self.runner.run(&invocation, cancel).await?;

            if let Some(code) = outcome.code
                && self.is_accepted(outcome.code)
            {
                info!(item = %item.name, code, attempt, "fetch finished");
                return Ok(DownloadReport {
                    code,
                    attempts: attempt,
                });
            }

            last_code = outcome.code;
            warn!(
                item = %item.name,
                code = ?outcome.code,
                attempt,
                max_tries,
                "fetch exited with unaccepted code"
            );

            if attempt < max_tries {
                tokio::select! {
                    _ = tokio::time::sleep(self.config.attempt_delay) => {}
                    _ = cancel.cancelled() => return Err(Error::Cancelled),
                }
            }
        }

        Err(DownloadError::ExitCode {
            code: last_code,
            attempts: max_tries,
        }
        .into())
    }
}
