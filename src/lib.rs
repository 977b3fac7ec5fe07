//! # warc-worker
//!
//! Worker library for distributed web-archiving projects.
//!
//! A worker claims items (ranges of identifiers) from a coordinating tracker,
//! drives an external `wget-lua` process to capture the corresponding pages
//! into WARC files, and uploads the results through a bounded pool of
//! `rsync` transfers before reporting completion.
//!
//! ## Pipeline
//!
//! Every claimed item runs through the same stages, strictly in order:
//! claim, environment check, workspace preparation, download, assembly,
//! stats, upload and report. A failure is either fatal to the item (the run
//! moves on) or fatal to the run (the worker stops claiming).
//!
//! ## Quick Start
//!
//! ```no_run
//! use warc_worker::{Config, Orchestrator, run_with_shutdown};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut config = Config::default();
//!     config.worker.downloader = "operator-nick".to_string();
//!
//!     let orchestrator = Orchestrator::new(config).await?;
//!
//!     // Subscribe to events
//!     let mut events = orchestrator.subscribe();
//!     tokio::spawn(async move {
//!         while let Ok(event) = events.recv().await {
//!             println!("Event: {:?}", event);
//!         }
//!     });
//!
//!     let summary = run_with_shutdown(orchestrator).await?;
//!     println!("completed {} items", summary.completed);
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Output assembly (compressed archive + scrape file moved to the data dir)
pub mod assemble;
/// Base-36 identifier codec and item-name generation
pub mod codec;
/// Configuration types
pub mod config;
/// Error types
pub mod error;
/// Fetch process invocation
pub mod fetch;
/// Environment checks (ban probe, DNS proxy detection)
pub mod guard;
/// Item lifecycle orchestration (decomposed into focused submodules)
pub mod orchestrator;
/// Retry logic with exponential backoff
pub mod retry;
/// Per-item statistics for completion reports
pub mod stats;
/// Tracker HTTP client
pub mod tracker;
/// Core types and events
pub mod types;
/// Bounded-concurrency uploads
pub mod upload;
/// Utility functions
pub mod utils;
/// Per-item working directories
pub mod workspace;

// Re-export commonly used types
pub use config::Config;
pub use error::{
    AssemblyError, DownloadError, Error, GuardError, ItemError, Result, TrackerError, UploadError,
};
pub use fetch::{ExitOutcome, FetchInvocation, FetchRunner};
pub use guard::Resolver;
pub use orchestrator::{Components, ItemReport, Orchestrator, RunSummary, StopReason, disposition};
pub use types::{Disposition, Event, ItemState, ItemType, RunStats, Stage, WorkItem};
pub use upload::{TransferRequest, TransferRunner};

/// Helper function to run the orchestrator with graceful signal handling.
///
/// Runs [`Orchestrator::run`] until it finishes on its own or a termination
/// signal arrives; a signal cancels the run, in-flight items are abandoned
/// and the summary of the stopped run is returned.
///
/// - **Unix:** listens for SIGTERM and SIGINT, with fallbacks if signal registration fails.
/// - **Windows/other:** listens for Ctrl+C via `tokio::signal::ctrl_c()`.
///
/// # Example
///
/// ```no_run
/// use warc_worker::{Config, Orchestrator, run_with_shutdown};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let config = Config::default();
///     let orchestrator = Orchestrator::new(config).await?;
///
///     // Run with automatic signal handling
///     run_with_shutdown(orchestrator).await?;
///
///     Ok(())
/// }
/// ```
pub async fn run_with_shutdown(orchestrator: Orchestrator) -> Result<RunSummary> {
    let signalled = orchestrator.clone();
    let watcher = tokio::spawn(async move {
        wait_for_signal().await;
        signalled.shutdown();
    });

    let result = orchestrator.run().await;
    watcher.abort();
    result
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    // Set up signal handlers - these may fail in restricted environments (containers, tests)
    let sigterm_result = signal(SignalKind::terminate());
    let sigint_result = signal(SignalKind::interrupt());

    match (sigterm_result, sigint_result) {
        (Ok(mut sigterm), Ok(mut sigint)) => {
            tokio::select! {
                _ = sigterm.recv() => {
                    tracing::info!("Received SIGTERM signal");
                }
                _ = sigint.recv() => {
                    tracing::info!("Received SIGINT signal (Ctrl+C)");
                }
            }
        }
        (Err(e), _) => {
            tracing::warn!(error = %e, "Could not register SIGTERM handler, waiting for SIGINT only");
            if let Ok(mut sigint) = signal(SignalKind::interrupt()) {
                sigint.recv().await;
                tracing::info!("Received SIGINT signal (Ctrl+C)");
            } else {
                tracing::error!("Could not register any signal handlers, using ctrl_c fallback");
                tokio::signal::ctrl_c().await.ok();
            }
        }
        (_, Err(e)) => {
            tracing::warn!(error = %e, "Could not register SIGINT handler, waiting for SIGTERM only");
            if let Ok(mut sigterm) = signal(SignalKind::terminate()) {
                sigterm.recv().await;
                tracing::info!("Received SIGTERM signal");
            } else {
                tracing::error!("Could not register any signal handlers, using ctrl_c fallback");
                tokio::signal::ctrl_c().await.ok();
            }
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            tracing::info!("Received Ctrl+C signal");
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C signal");
        }
    }
}
