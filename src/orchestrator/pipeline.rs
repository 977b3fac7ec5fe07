//! Per-item stage sequence
//!
//! Stages run strictly in order; a stage starts only after its predecessor
//! succeeded. Every failure is logged with the item name, stage and error code
//! before it is returned to the run loop.

use super::{Orchestrator, disposition};
use crate::error::{Error, Result};
use crate::types::{Disposition, Event, ItemState, Stage, WorkItem};
use crate::utils::ensure_free_space;
use std::future::Future;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Outcome of an item that was uploaded and reported
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemReport {
    /// Item name
    pub item: String,
    /// Bytes uploaded
    pub bytes: u64,
}

impl Orchestrator {
    /// Run one claimed item through every stage
    ///
    /// The item is registered as active for the duration of the call; a name
    /// that is already active is rejected without touching its workspace.
    pub async fn process_item(&self, name: &str) -> Result<ItemReport> {
        let cancel = match self.register_item(name).await {
            Ok(token) => token,
            Err(e) => return Err(self.stage_failed(name, Stage::Claim, e)),
        };

        let result = self.run_stages(name, &cancel).await;
        self.unregister_item(name).await;
        result
    }

    async fn run_stages(&self, name: &str, cancel: &CancellationToken) -> Result<ItemReport> {
        let item = self
            .run_stage(name, Stage::Claim, cancel, async {
                WorkItem::with_max_range_len(
                    name,
                    self.config.data_dir().clone(),
                    self.config.fetch.max_range_len,
                )
            })
            .await?;

        self.run_stage(name, Stage::EnvironmentCheck, cancel, self.guard.check())
            .await?;

        let workspace = self
            .run_stage(name, Stage::PrepareWorkspace, cancel, async {
                if self.config.disk_space.enabled {
                    ensure_free_space(
                        self.config.data_dir(),
                        self.config.disk_space.min_free_bytes,
                    )?;
                }
                self.workspaces.prepare(&item).await
            })
            .await?;

        self.run_stage(
            name,
            Stage::Download,
            cancel,
            self.invoker.download(&item, &workspace, cancel),
        )
        .await?;

        let artifacts = self
            .run_stage(
                name,
                Stage::Assemble,
                cancel,
                self.assembler.assemble(&item, &workspace),
            )
            .await?;

        let stats = self
            .run_stage(
                name,
                Stage::Stats,
                cancel,
                self.stats.package(&item, &artifacts),
            )
            .await?;

        let stats = self
            .run_stage(name, Stage::Upload, cancel, async {
                let target = self.tracker.upload_target(name).await?;
                self.uploads
                    .upload(name, &artifacts, &target, stats, cancel)
                    .await
            })
            .await?;

        let files: Vec<String> = artifacts
            .files()
            .iter()
            .filter_map(|p| p.file_name())
            .map(|f| f.to_string_lossy().into_owned())
            .collect();
        self.run_stage(
            name,
            Stage::Report,
            cancel,
            self.tracker.report_done(&stats, &files),
        )
        .await?;

        let bytes = stats.bytes.values().sum();
        info!(item = %name, bytes, "item complete");
        self.emit_event(Event::ItemCompleted {
            item: name.to_string(),
            bytes,
        });
        Ok(ItemReport {
            item: name.to_string(),
            bytes,
        })
    }

    /// Run one stage, racing it against cancellation
    async fn run_stage<T, F>(
        &self,
        item: &str,
        stage: Stage,
        cancel: &CancellationToken,
        work: F,
    ) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        if cancel.is_cancelled() {
            return Err(self.stage_failed(item, stage, Error::Cancelled));
        }
        debug!(item, %stage, "stage started");

        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(Error::Cancelled),
            result = work => result,
        };

        match result {
            Ok(value) => {
                self.emit_event(Event::StateChanged {
                    item: item.to_string(),
                    state: stage.completed_state(),
                });
                Ok(value)
            }
            Err(e) => Err(self.stage_failed(item, stage, e)),
        }
    }

    /// Log and broadcast a stage failure, handing the error back
    pub(crate) fn stage_failed(&self, item: &str, stage: Stage, e: Error) -> Error {
        let disposition = disposition(&e);
        let code = e.error_code();
        match disposition {
            Disposition::RunFatal => {
                error!(item, %stage, error = %e, code, "run-fatal failure; stopping run")
            }
            Disposition::ItemFatal => {
                warn!(item, %stage, error = %e, code, "item failed; abandoning it")
            }
            Disposition::Cancelled => info!(item, %stage, "item abandoned on cancellation"),
        }

        self.emit_event(Event::StateChanged {
            item: item.to_string(),
            state: ItemState::Failed {
                stage,
                reason: e.to_string(),
            },
        });
        self.emit_event(Event::ItemFailed {
            item: item.to_string(),
            stage,
            code: code.to_string(),
            error: e.to_string(),
            disposition,
        });
        e
    }
}
