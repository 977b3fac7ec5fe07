//! Run statistics attached to completion reports

use crate::assemble::AssembledArtifacts;
use crate::error::{Error, Result};
use crate::types::{RunFingerprint, RunStats, WorkItem};
use crate::utils::sha256_file;
use std::collections::BTreeMap;
use std::path::PathBuf;

/// File group name under which artifact bytes are reported
pub const DATA_FILE_GROUP: &str = "data";

/// Builds [`RunStats`] for completed items
///
/// Fingerprints are computed once at construction; the logic files do not
/// change during a run.
#[derive(Clone, Debug)]
pub struct StatsPackager {
    downloader: String,
    version: String,
    fingerprint: RunFingerprint,
}

impl StatsPackager {
    /// Hash the fingerprint files and capture the runtime description
    pub async fn new(
        downloader: impl Into<String>,
        version: impl Into<String>,
        fingerprint_files: &[PathBuf],
    ) -> Result<Self> {
        let mut hashes = BTreeMap::new();
        for path in fingerprint_files {
            let digest = sha256_file(path).await.map_err(|e| {
                Error::config(
                    "stats.fingerprint_files",
                    format!("cannot hash {}: {e}", path.display()),
                )
            })?;
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| path.display().to_string());
            hashes.insert(name, digest);
        }

        Ok(Self {
            downloader: downloader.into(),
            version: version.into(),
            fingerprint: RunFingerprint {
                hashes,
                runtime: runtime_description(),
            },
        })
    }

    /// Fingerprint reported with every item
    pub fn fingerprint(&self) -> &RunFingerprint {
        &self.fingerprint
    }

    /// Statistics for one item's published artifacts
    pub async fn package(
        &self,
        item: &WorkItem,
        artifacts: &AssembledArtifacts,
    ) -> Result<RunStats> {
        let bytes = BTreeMap::from([(DATA_FILE_GROUP.to_string(), artifacts.total_bytes().await?)]);

        Ok(RunStats {
            downloader: self.downloader.clone(),
            version: self.version.clone(),
            items: vec![item.name.clone()],
            bytes,
            id: self.fingerprint.clone(),
        })
    }
}

fn runtime_description() -> String {
    format!(
        "{} {} ({}/{})",
        env!("CARGO_PKG_NAME"),
        env!("CARGO_PKG_VERSION"),
        std::env::consts::OS,
        std::env::consts::ARCH
    )
}
