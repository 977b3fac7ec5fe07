//! Per-item private workspace
//!
//! Every item gets `<data_dir>/<escaped_name>/` to itself. A directory left at
//! that path by a crashed earlier attempt is removed first; partial workspaces
//! are never resumed.

use crate::error::Result;
use crate::types::WorkItem;
use chrono::Local;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Timestamp format embedded in archive base names
const TIMESTAMP_FORMAT: &str = "%Y%m%d-%H%M%S";

/// Fetch process log file name inside the item directory
const FETCH_LOG_NAME: &str = "wget.log";

/// Fetch process output-document file name inside the item directory
const FETCH_TMP_NAME: &str = "wget.tmp";

/// A prepared item directory and every path derived from it
#[derive(Clone, Debug)]
pub struct Workspace {
    /// Private scratch directory
    pub item_dir: PathBuf,
    /// Shared output directory
    pub data_dir: PathBuf,
    /// `<prefix>-<escaped_name>-<timestamp>`
    pub warc_file_base: String,
    /// `<scrape_prefix>-<escaped_name>`
    pub scrape_file_base: String,
}

impl Workspace {
    /// Compressed archive written by the fetch process
    pub fn warc_path(&self) -> PathBuf {
        self.item_dir.join(format!("{}.warc.gz", self.warc_file_base))
    }

    /// Uncompressed archive; only present when the fetch tool lacks compression support
    pub fn uncompressed_warc_path(&self) -> PathBuf {
        self.item_dir.join(format!("{}.warc", self.warc_file_base))
    }

    /// Path passed to the fetch tool's archive option (it appends the extension)
    pub fn warc_stem_path(&self) -> PathBuf {
        self.item_dir.join(&self.warc_file_base)
    }

    /// Scrape text written by the fetch script
    pub fn scrape_text_path(&self) -> PathBuf {
        self.item_dir.join(format!("{}.txt", self.scrape_file_base))
    }

    /// Compressed scrape file inside the item directory
    pub fn scrape_gz_path(&self) -> PathBuf {
        self.item_dir.join(format!("{}.txt.gz", self.scrape_file_base))
    }

    /// Fetch process log
    pub fn fetch_log_path(&self) -> PathBuf {
        self.item_dir.join(FETCH_LOG_NAME)
    }

    /// Fetch process output document
    pub fn fetch_tmp_path(&self) -> PathBuf {
        self.item_dir.join(FETCH_TMP_NAME)
    }

    /// Final location of the archive in the data directory
    pub fn final_warc_path(&self) -> PathBuf {
        self.data_dir.join(format!("{}.warc.gz", self.warc_file_base))
    }

    /// Final location of the compressed scrape file in the data directory
    pub fn final_scrape_path(&self) -> PathBuf {
        self.data_dir.join(format!("{}.txt.gz", self.scrape_file_base))
    }
}

/// Creates clean per-item workspaces
#[derive(Clone, Debug)]
pub struct WorkspacePreparer {
    warc_prefix: String,
    scrape_prefix: String,
}

impl WorkspacePreparer {
    /// Create a preparer for the given archive and scrape file prefixes
    pub fn new(warc_prefix: impl Into<String>, scrape_prefix: impl Into<String>) -> Self {
        Self {
            warc_prefix: warc_prefix.into(),
            scrape_prefix: scrape_prefix.into(),
        }
    }

    /// Directory an item would use, without touching the filesystem
    pub fn item_dir(item: &WorkItem) -> PathBuf {
        item.data_dir.join(&item.escaped_name)
    }

    /// Remove any stale directory, create a fresh one and touch the archive placeholder
    pub async fn prepare(&self, item: &WorkItem) -> Result<Workspace> {
        let item_dir = Self::item_dir(item);

        if tokio::fs::metadata(&item_dir).await.is_ok() {
            info!(item = %item.name, path = %item_dir.display(), "removing stale item directory");
            tokio::fs::remove_dir_all(&item_dir).await?;
        }
        tokio::fs::create_dir_all(&item_dir).await?;

        let warc_file_base = format!(
            "{}-{}-{}",
            self.warc_prefix,
            item.escaped_name,
            Local::now().format(TIMESTAMP_FORMAT)
        );
        let workspace = Workspace {
            item_dir,
            data_dir: item.data_dir.clone(),
            warc_file_base,
            scrape_file_base: format!("{}-{}", self.scrape_prefix, item.escaped_name),
        };

        touch(&workspace.warc_path()).await?;

        debug!(
            item = %item.name,
            item_dir = %workspace.item_dir.display(),
            warc_file_base = %workspace.warc_file_base,
            "workspace ready"
        );
        Ok(workspace)
    }
}

async fn touch(path: &Path) -> Result<()> {
    tokio::fs::OpenOptions::new()
        .create(true)
        .truncate(true)
        .write(true)
        .open(path)
        .await?;
    Ok(())
}
