//! Verifying, compressing and publishing an item's artifacts
//!
//! After a successful fetch the item directory holds the compressed archive
//! and, optionally, the scrape text written by the fetch script. Assembly
//! turns that into exactly two files in the data directory and reclaims the
//! item directory.
//!
//! The move into the data directory is a rename and is atomic only when the
//! item directory and the data directory share a filesystem. Deployments that
//! split them must opt into [`AssembleConfig::allow_cross_device_copy`], which
//! copies, verifies the SHA-256 of the copy and then deletes the source.

use crate::config::AssembleConfig;
use crate::error::{AssemblyError, Error, Result};
use crate::types::WorkItem;
use crate::utils::{gzip_file, path_exists, sha256_file};
use crate::workspace::Workspace;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// The two files an item publishes into the data directory
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AssembledArtifacts {
    /// Compressed archive
    pub warc: PathBuf,
    /// Compressed scrape text (possibly an empty placeholder)
    pub scrape: PathBuf,
}

impl AssembledArtifacts {
    /// Both artifact paths, archive first
    pub fn files(&self) -> [&Path; 2] {
        [&self.warc, &self.scrape]
    }

    /// Combined size of both artifacts on disk
    pub async fn total_bytes(&self) -> Result<u64> {
        let mut total = 0;
        for path in self.files() {
            total += tokio::fs::metadata(path).await?.len();
        }
        Ok(total)
    }
}

/// Verifies fetch output and moves it into the data directory
#[derive(Clone, Debug)]
pub struct OutputAssembler {
    config: AssembleConfig,
}

impl OutputAssembler {
    /// Create an assembler
    pub fn new(config: AssembleConfig) -> Self {
        Self { config }
    }

    /// Verify, compress and move artifacts; remove the item directory on success
    ///
    /// On failure the item directory is left in place for inspection.
    pub async fn assemble(
        &self,
        item: &WorkItem,
        workspace: &Workspace,
    ) -> Result<AssembledArtifacts> {
        let uncompressed = workspace.uncompressed_warc_path();
        if path_exists(&uncompressed).await {
            return Err(AssemblyError::MissingCompressionSupport { path: uncompressed }.into());
        }

        let warc = workspace.warc_path();
        if !path_exists(&warc).await {
            return Err(AssemblyError::MissingArtifact { path: warc }.into());
        }

        self.compress_scrape(item, workspace).await?;

        let artifacts = AssembledArtifacts {
            warc: workspace.final_warc_path(),
            scrape: workspace.final_scrape_path(),
        };
        self.move_artifact(&warc, &artifacts.warc).await?;
        self.move_artifact(&workspace.scrape_gz_path(), &artifacts.scrape)
            .await?;

        tokio::fs::remove_dir_all(&workspace.item_dir).await?;
        info!(
            item = %item.name,
            warc = %artifacts.warc.display(),
            "artifacts published"
        );
        Ok(artifacts)
    }

    async fn compress_scrape(&self, item: &WorkItem, workspace: &Workspace) -> Result<()> {
        let text = workspace.scrape_text_path();
        let gz = workspace.scrape_gz_path();

        if path_exists(&text).await {
            let bytes = gzip_file(&text, &gz).await?;
            debug!(item = %item.name, bytes, "scrape file compressed");
        } else {
            // Upload expects the file unconditionally
            tokio::fs::File::create(&gz).await?;
            debug!(item = %item.name, "no scrape file; wrote empty placeholder");
        }
        Ok(())
    }

    async fn move_artifact(&self, source: &Path, dest: &Path) -> Result<()> {
        match tokio::fs::rename(source, dest).await {
            Ok(()) => Ok(()),
            Err(e)
                if e.kind() == std::io::ErrorKind::CrossesDevices
                    && self.config.allow_cross_device_copy =>
            {
                warn!(
                    source = %source.display(),
                    dest = %dest.display(),
                    "rename crosses filesystems; copying with verification"
                );
                copy_verified(source, dest).await
            }
            Err(e) => Err(AssemblyError::MoveFailed {
                source_path: source.to_path_buf(),
                dest_path: dest.to_path_buf(),
                reason: e.to_string(),
            }
            .into()),
        }
    }
}

/// Copy, compare SHA-256 of both sides, then delete the source
///
/// A mismatched copy is removed and the source kept.
async fn copy_verified(source: &Path, dest: &Path) -> Result<()> {
    tokio::fs::copy(source, dest)
        .await
        .map_err(|e| move_failed(source, dest, e))?;

    let (expected, actual) = (sha256_file(source).await?, sha256_file(dest).await?);
    if expected != actual {
        if let Err(e) = tokio::fs::remove_file(dest).await {
            warn!(path = %dest.display(), error = %e, "failed to remove mismatched copy");
        }
        return Err(AssemblyError::ChecksumMismatch {
            path: dest.to_path_buf(),
        }
        .into());
    }

    tokio::fs::remove_file(source).await?;
    Ok(())
}

fn move_failed(source: &Path, dest: &Path, e: std::io::Error) -> Error {
    AssemblyError::MoveFailed {
        source_path: source.to_path_buf(),
        dest_path: dest.to_path_buf(),
        reason: e.to_string(),
    }
    .into()
}
