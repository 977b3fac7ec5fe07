//! Claim loop - keeps `concurrent_items` pipelines busy until the run ends.

use super::{Orchestrator, disposition};
use crate::error::{Error, Result};
use crate::tracker::ClaimOutcome;
use crate::types::{Disposition, Event, Stage};
use futures::FutureExt;
use serde::Serialize;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

/// Why the run stopped claiming items
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// `max_items` items were claimed and finished
    MaxItems,
    /// The run was cancelled (signal or shutdown call)
    Cancelled,
    /// `run_timeout` elapsed
    TimedOut,
    /// A run-fatal error occurred
    Fatal,
}

/// Totals for a finished run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    /// Items handed out by the tracker
    pub claimed: u64,
    /// Items uploaded and reported
    pub completed: u64,
    /// Items abandoned after an item-fatal error
    pub failed: u64,
    /// Why the run ended
    pub stop_reason: StopReason,
}

/// Counters shared by the pipeline workers of one run
#[derive(Default)]
struct RunState {
    /// Claims in progress or made; bounded by `max_items`
    reserved: AtomicU64,
    claimed: AtomicU64,
    completed: AtomicU64,
    failed: AtomicU64,
    fatal: Mutex<Option<Error>>,
}

impl RunState {
    /// Reserve one claim against the item limit
    fn reserve(&self, max_items: Option<u64>) -> bool {
        match max_items {
            None => {
                self.reserved.fetch_add(1, Ordering::SeqCst);
                true
            }
            Some(max) => self
                .reserved
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| (n < max).then_some(n + 1))
                .is_ok(),
        }
    }

    fn release(&self) {
        self.reserved.fetch_sub(1, Ordering::SeqCst);
    }

    async fn record_fatal(&self, e: Error) {
        let mut fatal = self.fatal.lock().await;
        if fatal.is_none() {
            *fatal = Some(e);
        }
    }
}

impl Orchestrator {
    /// Claim and process items until a limit is reached, the run is
    /// cancelled, or a run-fatal error occurs
    ///
    /// Returns the first run-fatal error, if any; item-fatal errors are
    /// counted in the summary and the run continues.
    pub async fn run(&self) -> Result<RunSummary> {
        let state = Arc::new(RunState::default());
        let workers = self.config.worker.concurrent_items.max(1);

        info!(
            workers,
            max_items = ?self.config.worker.max_items,
            run_timeout = ?self.config.worker.run_timeout,
            "run started"
        );

        let timer = self.config.worker.run_timeout.map(|timeout| {
            let cancel = self.cancel.clone();
            tokio::spawn(async move {
                tokio::select! {
                    _ = tokio::time::sleep(timeout) => {
                        warn!(?timeout, "run timeout elapsed; cancelling");
                        cancel.cancel();
                        true
                    }
                    _ = cancel.cancelled() => false,
                }
            })
        });

        let handles: Vec<_> = (0..workers)
            .map(|worker| {
                let orchestrator = self.clone();
                let state = state.clone();
                tokio::spawn(async move {
                    let outcome = AssertUnwindSafe(orchestrator.worker_loop(worker, state.clone()))
                        .catch_unwind()
                        .await;
                    if let Err(payload) = outcome {
                        let reason = panic_reason(payload.as_ref());
                        error!(worker, %reason, "pipeline worker panicked; stopping run");
                        state.record_fatal(Error::WorkerPanicked { reason }).await;
                        orchestrator.cancel.cancel();
                    }
                })
            })
            .collect();

        for result in futures::future::join_all(handles).await {
            if let Err(e) = result {
                error!(error = %e, "pipeline worker task failed; stopping run");
                state
                    .record_fatal(Error::WorkerPanicked {
                        reason: e.to_string(),
                    })
                    .await;
                self.cancel.cancel();
            }
        }

        let timed_out = match timer {
            Some(handle) => {
                if !handle.is_finished() {
                    handle.abort();
                }
                handle.await.unwrap_or(false)
            }
            None => false,
        };

        let fatal = state.fatal.lock().await.take();
        let stop_reason = if fatal.is_some() {
            StopReason::Fatal
        } else if timed_out {
            StopReason::TimedOut
        } else if self.cancel.is_cancelled() {
            StopReason::Cancelled
        } else {
            StopReason::MaxItems
        };

        let summary = RunSummary {
            claimed: state.claimed.load(Ordering::SeqCst),
            completed: state.completed.load(Ordering::SeqCst),
            failed: state.failed.load(Ordering::SeqCst),
            stop_reason,
        };
        self.emit_event(Event::RunStopped {
            reason: match &fatal {
                Some(e) => e.to_string(),
                None => format!("{stop_reason:?}"),
            },
        });
        info!(
            claimed = summary.claimed,
            completed = summary.completed,
            failed = summary.failed,
            ?stop_reason,
            "run stopped"
        );

        match fatal {
            Some(e) => Err(e),
            None => Ok(summary),
        }
    }

    async fn worker_loop(&self, worker: usize, state: Arc<RunState>) {
        let max_items = self.config.worker.max_items;

        loop {
            if self.cancel.is_cancelled() {
                break;
            }
            if !state.reserve(max_items) {
                debug!(worker, "item limit reached");
                break;
            }

            let claim = tokio::select! {
                _ = self.cancel.cancelled() => {
                    state.release();
                    break;
                }
                claim = self.tracker.claim() => claim,
            };

            let name = match claim {
                Ok(ClaimOutcome::Item(name)) => name,
                Ok(idle @ (ClaimOutcome::NoItems | ClaimOutcome::RateLimited)) => {
                    state.release();
                    let reason = match idle {
                        ClaimOutcome::RateLimited => "rate limited",
                        _ => "no items available",
                    };
                    debug!(worker, reason, "tracker idle");
                    self.emit_event(Event::Idle {
                        reason: reason.to_string(),
                    });
                    tokio::select! {
                        _ = self.cancel.cancelled() => break,
                        _ = tokio::time::sleep(self.config.worker.idle_delay) => {}
                    }
                    continue;
                }
                Err(e) => {
                    state.release();
                    let e = self.stage_failed("", Stage::Claim, e);
                    if disposition(&e) == Disposition::RunFatal {
                        state.record_fatal(e).await;
                        self.cancel.cancel();
                    }
                    break;
                }
            };

            state.claimed.fetch_add(1, Ordering::SeqCst);
            match self.process_item(&name).await {
                Ok(_) => {
                    state.completed.fetch_add(1, Ordering::SeqCst);
                }
                Err(e) => match disposition(&e) {
                    Disposition::ItemFatal => {
                        state.failed.fetch_add(1, Ordering::SeqCst);
                    }
                    Disposition::RunFatal => {
                        state.record_fatal(e).await;
                        self.cancel.cancel();
                        break;
                    }
                    Disposition::Cancelled => break,
                },
            }
        }
    }
}

/// Message carried by a panic payload
fn panic_reason(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
