//! Bounded-concurrency uploads
//!
//! One [`UploadCoordinator`] is shared by every item pipeline in the process.
//! Its permit pool caps the number of transfers in flight; waiting for a
//! permit blocks without a timeout and only ends early on cancellation. The
//! permit is scoped to the upload call, so it is released on success, failure
//! and cancellation alike.

mod rsync;

pub use rsync::RsyncTransfer;

use crate::assemble::AssembledArtifacts;
use crate::config::UploadConfig;
use crate::error::{Error, Result};
use crate::retry::with_retry;
use crate::types::RunStats;
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// One transfer of files from a local directory to a remote target
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferRequest {
    /// File names relative to `source_dir`
    pub files: Vec<PathBuf>,
    /// Local directory holding the files
    pub source_dir: PathBuf,
    /// Remote destination advertised by the tracker
    pub target: String,
    /// Extra tool arguments (partial-transfer resume)
    pub extra_args: Vec<String>,
}

/// Performs a single transfer attempt
///
/// Implementations must stop the transfer and return
/// [`Error::Cancelled`] once `cancel` fires.
#[async_trait]
pub trait TransferRunner: Send + Sync {
    /// Transfer the files
    async fn transfer(&self, request: &TransferRequest, cancel: &CancellationToken) -> Result<()>;

    /// Name of this runner for logging
    fn name(&self) -> &'static str;
}

/// Uploads assembled artifacts under a process-wide concurrency cap
pub struct UploadCoordinator {
    permits: Arc<Semaphore>,
    capacity: usize,
    config: UploadConfig,
    runner: Arc<dyn TransferRunner>,
}

impl UploadCoordinator {
    /// Create a coordinator with `config.max_concurrent` permits
    pub fn new(config: UploadConfig, runner: Arc<dyn TransferRunner>) -> Self {
        let capacity = config.max_concurrent.max(1);
        Self {
            permits: Arc::new(Semaphore::new(capacity)),
            capacity,
            config,
            runner,
        }
    }

    /// Size of the permit pool
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Permits not currently held by an upload
    pub fn available_permits(&self) -> usize {
        self.permits.available_permits()
    }

    /// Transfer both artifacts to `target`
    ///
    /// Returns the item's stats unchanged once the transfer succeeded.
    /// Artifacts stay in the data directory whatever the outcome.
    pub async fn upload(
        &self,
        item: &str,
        artifacts: &AssembledArtifacts,
        target: &str,
        stats: RunStats,
        cancel: &CancellationToken,
    ) -> Result<RunStats> {
        let _permit = tokio::select! {
            permit = self.permits.acquire() => permit.map_err(|_| Error::Cancelled)?,
            _ = cancel.cancelled() => return Err(Error::Cancelled),
        };
        debug!(
            item,
            available = self.permits.available_permits(),
            "upload permit acquired"
        );

        let request = self.request_for(artifacts, target);
        let transfer = with_retry(&self.config.retry, || {
            self.runner.transfer(&request, cancel)
        });

        tokio::select! {
            result = transfer => result?,
            _ = cancel.cancelled() => return Err(Error::Cancelled),
        }

        info!(item, target, runner = self.runner.name(), "upload complete");
        Ok(stats)
    }

    fn request_for(&self, artifacts: &AssembledArtifacts, target: &str) -> TransferRequest {
        let source_dir = artifacts
            .warc
            .parent()
            .map(PathBuf::from)
            .unwrap_or_default();
        let files = artifacts
            .files()
            .iter()
            .filter_map(|p| p.file_name().map(PathBuf::from))
            .collect();

        TransferRequest {
            files,
            source_dir,
            target: target.to_string(),
            extra_args: self.config.extra_args.clone(),
        }
    }
}
