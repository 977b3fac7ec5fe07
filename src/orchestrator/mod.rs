//! Item lifecycle orchestration split into focused submodules.
//!
//! The [`Orchestrator`] owns one instance of every pipeline component and is
//! the only place where a failure is classified as fatal to the item or to the
//! whole run:
//! - [`pipeline`] - the per-item stage sequence
//! - [`run_loop`] - claiming items, pipeline concurrency, run limits

mod pipeline;
mod run_loop;

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
pub(crate) mod test_helpers;

pub use pipeline::ItemReport;
pub use run_loop::{RunSummary, StopReason};

use crate::assemble::OutputAssembler;
use crate::config::Config;
use crate::error::{
    AssemblyError, DownloadError, Error, GuardError, ItemError, Result, UploadError,
};
use crate::fetch::{CliFetchRunner, DownloadInvoker, FetchRunner, Provenance, find_executable};
use crate::guard::{EnvironmentGuard, Resolver, SystemResolver};
use crate::stats::StatsPackager;
use crate::tracker::TrackerClient;
use crate::types::{Disposition, Event};
use crate::upload::{RsyncTransfer, TransferRunner, UploadCoordinator};
use crate::workspace::WorkspacePreparer;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{Mutex, broadcast};
use tokio_util::sync::CancellationToken;

/// Capacity of the event broadcast channel
const EVENT_CHANNEL_CAPACITY: usize = 1000;

/// Externally provided collaborators
///
/// [`Orchestrator::new`] discovers the real ones; tests substitute fakes via
/// [`Orchestrator::with_components`].
#[derive(Clone)]
pub struct Components {
    /// Fetch executable passed to every invocation
    pub executable: PathBuf,
    /// Starts fetch processes
    pub fetch_runner: Arc<dyn FetchRunner>,
    /// Performs uploads
    pub transfer_runner: Arc<dyn TransferRunner>,
    /// Resolves hostnames for the proxy check
    pub resolver: Arc<dyn Resolver>,
}

/// Drives items from claim to completion report (cloneable - all fields are Arc-wrapped)
#[derive(Clone)]
pub struct Orchestrator {
    pub(crate) config: Arc<Config>,
    pub(crate) tracker: Arc<TrackerClient>,
    pub(crate) guard: Arc<EnvironmentGuard>,
    pub(crate) workspaces: Arc<WorkspacePreparer>,
    pub(crate) invoker: Arc<DownloadInvoker>,
    pub(crate) assembler: Arc<OutputAssembler>,
    pub(crate) stats: Arc<StatsPackager>,
    pub(crate) uploads: Arc<UploadCoordinator>,
    /// Items currently in a pipeline, with their cancellation tokens
    pub(crate) active_items: Arc<Mutex<HashMap<String, CancellationToken>>>,
    /// Run-level cancellation; every item token is a child of it
    pub(crate) cancel: CancellationToken,
    pub(crate) event_tx: broadcast::Sender<Event>,
}

impl Orchestrator {
    /// Create an orchestrator with the real fetch executable, rsync and resolver
    ///
    /// Fails when no fetch executable reports the required version or rsync
    /// cannot be found; both are fatal before any item is claimed.
    pub async fn new(config: Config) -> Result<Self> {
        config.validate()?;

        let executable = find_executable(&config.fetch).await?;

        let rsync = match &config.upload.rsync_path {
            Some(path) => RsyncTransfer::new(path.clone()),
            None => RsyncTransfer::from_path().ok_or_else(|| UploadError::ToolNotFound {
                name: "rsync".to_string(),
            })?,
        };

        let components = Components {
            executable,
            fetch_runner: Arc::new(CliFetchRunner::new()),
            transfer_runner: Arc::new(rsync),
            resolver: Arc::new(SystemResolver),
        };
        Self::with_components(config, components).await
    }

    /// Create an orchestrator around the given collaborators
    pub async fn with_components(config: Config, components: Components) -> Result<Self> {
        config.validate()?;

        tokio::fs::create_dir_all(config.data_dir())
            .await
            .map_err(|e| {
                Error::Io(std::io::Error::new(
                    e.kind(),
                    format!(
                        "Failed to create data directory '{}': {}",
                        config.data_dir().display(),
                        e
                    ),
                ))
            })?;

        let tracker = TrackerClient::new(
            config.tracker.clone(),
            config.worker.downloader.clone(),
            config.worker.project_version.clone(),
        )?;
        let guard = EnvironmentGuard::with_resolver(config.guard.clone(), components.resolver)?;
        let workspaces = WorkspacePreparer::new(
            config.worker.warc_prefix.clone(),
            config.assemble.scrape_prefix.clone(),
        );
        let provenance = Provenance {
            downloader: config.worker.downloader.clone(),
            version: config.worker.project_version.clone(),
            header_prefix: config.worker.warc_prefix.clone(),
        };
        let invoker = DownloadInvoker::new(
            config.fetch.clone(),
            provenance,
            components.executable,
            components.fetch_runner,
        );
        let assembler = OutputAssembler::new(config.assemble.clone());
        let stats = StatsPackager::new(
            config.worker.downloader.clone(),
            config.worker.project_version.clone(),
            &config.stats.fingerprint_files,
        )
        .await?;
        let uploads = UploadCoordinator::new(config.upload.clone(), components.transfer_runner);

        let (event_tx, _rx) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        tracing::info!(
            downloader = %config.worker.downloader,
            data_dir = %config.data_dir().display(),
            concurrent_items = config.worker.concurrent_items,
            upload_slots = uploads.capacity(),
            executable = %invoker.executable().display(),
            "orchestrator initialized"
        );

        Ok(Self {
            config: Arc::new(config),
            tracker: Arc::new(tracker),
            guard: Arc::new(guard),
            workspaces: Arc::new(workspaces),
            invoker: Arc::new(invoker),
            assembler: Arc::new(assembler),
            stats: Arc::new(stats),
            uploads: Arc::new(uploads),
            active_items: Arc::new(Mutex::new(HashMap::new())),
            cancel: CancellationToken::new(),
            event_tx,
        })
    }

    /// Subscribe to lifecycle events
    ///
    /// Each subscriber receives every event; a subscriber more than 1000
    /// events behind gets `RecvError::Lagged`.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.event_tx.subscribe()
    }

    /// Run-level cancellation token
    ///
    /// Cancelling it stops claiming, kills running fetch and transfer
    /// processes and abandons in-flight items without reporting them.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Stop the run
    pub fn shutdown(&self) {
        tracing::info!("shutdown requested");
        self.cancel.cancel();
    }

    /// Shared configuration
    pub fn config(&self) -> Arc<Config> {
        Arc::clone(&self.config)
    }

    /// Names of items currently in a pipeline
    pub async fn active_items(&self) -> Vec<String> {
        self.active_items.lock().await.keys().cloned().collect()
    }

    /// Register an item for processing; a second registration of the same name is rejected
    pub(crate) async fn register_item(&self, name: &str) -> Result<CancellationToken> {
        let mut active = self.active_items.lock().await;
        if active.contains_key(name) {
            return Err(ItemError::AlreadyActive {
                name: name.to_string(),
            }
            .into());
        }
        let token = self.cancel.child_token();
        active.insert(name.to_string(), token.clone());
        Ok(token)
    }

    pub(crate) async fn unregister_item(&self, name: &str) {
        self.active_items.lock().await.remove(name);
    }

    pub(crate) fn emit_event(&self, event: Event) {
        // no receivers is fine
        self.event_tx.send(event).ok();
    }
}

/// Whether an error ends the item or the whole run
pub fn disposition(error: &Error) -> Disposition {
    match error {
        Error::Cancelled => Disposition::Cancelled,
        Error::Guard(GuardError::Banned { .. } | GuardError::ProxyDetected { .. })
        | Error::Assembly(AssemblyError::MissingCompressionSupport { .. })
        | Error::Tracker(_)
        | Error::Download(DownloadError::ExecutableNotFound { .. })
        | Error::Upload(UploadError::ToolNotFound { .. })
        | Error::WorkerPanicked { .. }
        | Error::Config { .. } => Disposition::RunFatal,
        Error::Guard(_)
        | Error::Item(_)
        | Error::Download(_)
        | Error::Assembly(_)
        | Error::Upload(_)
        | Error::Io(_)
        | Error::Network(_)
        | Error::Serialization(_)
        | Error::InsufficientSpace { .. }
        | Error::DiskSpaceCheckFailed(_) => Disposition::ItemFatal,
    }
}
