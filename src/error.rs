//! Error types for warc-worker
//!
//! This module provides the error taxonomy for the worker:
//! - Domain-specific error types (Guard, Item, Download, Assembly, Upload, Tracker)
//! - Stable machine-readable error codes used as structured log fields
//! - Context information (paths, exit codes, item names, etc.)
//!
//! Components only return typed errors. Whether an error ends the whole run or
//! just the current item is decided by the orchestrator (see
//! [`crate::orchestrator::disposition`]).

use std::net::IpAddr;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for warc-worker operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for warc-worker
///
/// This is the primary error type used throughout the library. Each variant includes
/// contextual information to help diagnose issues.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "upload.max_concurrent")
        key: Option<String>,
    },

    /// Environment check failed (ban, proxy, probe failure)
    #[error("environment check failed: {0}")]
    Guard(#[from] GuardError),

    /// Claimed item is malformed or unsupported
    #[error("invalid item: {0}")]
    Item(#[from] ItemError),

    /// External fetch process failed
    #[error("download error: {0}")]
    Download(#[from] DownloadError),

    /// Output verification or packaging failed
    #[error("assembly error: {0}")]
    Assembly(#[from] AssemblyError),

    /// Upload to remote storage failed
    #[error("upload error: {0}")]
    Upload(#[from] UploadError),

    /// Coordinator (tracker) communication failed
    #[error("tracker error: {0}")]
    Tracker(#[from] TrackerError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Network error
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Insufficient disk space in the data directory
    #[error("insufficient disk space: need {required} bytes, have {available} bytes")]
    InsufficientSpace {
        /// Number of bytes required before starting an item
        required: u64,
        /// Number of bytes currently available on disk
        available: u64,
    },

    /// Failed to check disk space
    #[error("failed to check disk space: {0}")]
    DiskSpaceCheckFailed(String),

    /// The run was cancelled (operator abort, run timeout, or a run-fatal error elsewhere)
    #[error("run cancelled")]
    Cancelled,

    /// A pipeline worker panicked; its item state can no longer be trusted
    #[error("pipeline worker panicked: {reason}")]
    WorkerPanicked {
        /// Panic payload, when it was a string
        reason: String,
    },
}

/// Environment check failures
#[derive(Debug, Error)]
pub enum GuardError {
    /// The target site refused access to this network identity
    #[error("banned by target site: {url} answered HTTP {status}")]
    Banned {
        /// The probe URL
        url: String,
        /// The access-denial status code returned
        status: u16,
    },

    /// DNS answers collapsed onto fewer addresses than expected hosts
    #[error(
        "behind a firewall or proxy: {distinct} distinct addresses for {expected} hosts ({addresses:?})"
    )]
    ProxyDetected {
        /// Number of distinct addresses observed
        distinct: usize,
        /// Number of hosts resolved (expected distinct addresses)
        expected: usize,
        /// The addresses that were observed
        addresses: Vec<IpAddr>,
    },

    /// The liveness probe could not be completed
    #[error("liveness probe to {url} failed: {reason}")]
    ProbeFailed {
        /// The probe URL
        url: String,
        /// Why the probe failed
        reason: String,
    },

    /// A check hostname could not be resolved
    #[error("failed to resolve {host}: {reason}")]
    ResolveFailed {
        /// The hostname being resolved
        host: String,
        /// Resolver error
        reason: String,
    },
}

/// Errors in the claimed item itself
#[derive(Debug, Error)]
pub enum ItemError {
    /// Identifier contains characters outside the base-36 alphabet (or overflows)
    #[error("malformed identifier {value:?}: {reason}")]
    MalformedIdentifier {
        /// The offending identifier string
        value: String,
        /// What is wrong with it
        reason: String,
    },

    /// Item type is not one of the supported fetch strategies
    #[error("unsupported item type {item_type:?}")]
    UnsupportedItemType {
        /// The type prefix found in the item name
        item_type: String,
    },

    /// Item name does not follow `<type>:<value>`
    #[error("malformed item name {name:?}: {reason}")]
    MalformedName {
        /// The raw item name
        name: String,
        /// What is wrong with it
        reason: String,
    },

    /// Identifier range is inverted
    #[error("invalid identifier range: start {start} is after end {end}")]
    InvalidRange {
        /// Decoded range start
        start: u64,
        /// Decoded range end
        end: u64,
    },

    /// Identifier range covers more identifiers than one item may fetch
    #[error("identifier range {start}..={end} exceeds the limit of {max_len} identifiers")]
    RangeTooLarge {
        /// Decoded range start
        start: u64,
        /// Decoded range end
        end: u64,
        /// Configured maximum number of identifiers
        max_len: u64,
    },

    /// Another pipeline is already working on this item
    #[error("item {name:?} is already being processed")]
    AlreadyActive {
        /// The item name
        name: String,
    },
}

/// Fetch process errors
#[derive(Debug, Error)]
pub enum DownloadError {
    /// Every attempt ended with an exit code outside the accepted set
    #[error("fetch exited with {code:?} after {attempts} attempt(s)")]
    ExitCode {
        /// Exit code of the last attempt (None when killed by a signal)
        code: Option<i32>,
        /// Number of attempts made
        attempts: u32,
    },

    /// The fetch process could not be started
    #[error("failed to start {path}: {reason}")]
    Spawn {
        /// Executable path
        path: PathBuf,
        /// OS error
        reason: String,
    },

    /// No candidate executable reported the required version
    #[error("no usable fetch executable found (required version {required_version:?})")]
    ExecutableNotFound {
        /// Version string that was searched for
        required_version: String,
    },
}

/// Output verification and packaging errors
#[derive(Debug, Error)]
pub enum AssemblyError {
    /// The fetch tool wrote an uncompressed archive (built without zlib)
    #[error("fetch tool wrote uncompressed archive {path}; it must be built with compression support")]
    MissingCompressionSupport {
        /// The uncompressed archive path
        path: PathBuf,
    },

    /// An expected artifact was not produced
    #[error("expected artifact {path} is missing")]
    MissingArtifact {
        /// The expected path
        path: PathBuf,
    },

    /// Moving an artifact into the data directory failed
    #[error("failed to move {source_path} to {dest_path}: {reason}")]
    MoveFailed {
        /// The source path of the file being moved
        source_path: PathBuf,
        /// The destination path where the file should be moved
        dest_path: PathBuf,
        /// The reason the move failed
        reason: String,
    },

    /// Copied artifact does not match its source
    #[error("checksum mismatch after copying {path}")]
    ChecksumMismatch {
        /// The destination path that failed verification
        path: PathBuf,
    },
}

/// Upload errors
#[derive(Debug, Error)]
pub enum UploadError {
    /// The transfer tool exited unsuccessfully
    #[error("transfer exited with {code:?}")]
    TransferFailed {
        /// Exit code (None when killed by a signal)
        code: Option<i32>,
    },

    /// The transfer tool could not be started
    #[error("failed to start transfer tool {path}: {reason}")]
    Spawn {
        /// Executable path
        path: PathBuf,
        /// OS error
        reason: String,
    },

    /// The tracker did not advertise an upload target
    #[error("tracker returned no upload target for {item}")]
    NoTarget {
        /// The item name
        item: String,
    },

    /// The transfer tool is not installed
    #[error("transfer tool {name:?} not found")]
    ToolNotFound {
        /// Binary name searched for
        name: String,
    },
}

/// Coordinator (tracker) errors
#[derive(Debug, Error)]
pub enum TrackerError {
    /// The tracker could not be reached
    #[error("tracker {url} unreachable: {reason}")]
    Unreachable {
        /// Request URL
        url: String,
        /// Transport error
        reason: String,
    },

    /// The tracker answered with an unexpected status
    #[error("tracker {url} rejected request with HTTP {status}")]
    Rejected {
        /// Request URL
        url: String,
        /// HTTP status code
        status: u16,
    },

    /// The tracker answered with a body we cannot interpret
    #[error("invalid response from tracker {url}: {reason}")]
    InvalidResponse {
        /// Request URL
        url: String,
        /// Parse error
        reason: String,
    },
}

impl Error {
    /// Machine-readable error code, used as the `code` field in logs and events
    pub fn error_code(&self) -> &'static str {
        match self {
            Error::Config { .. } => "config_error",
            Error::Guard(e) => match e {
                GuardError::Banned { .. } => "banned",
                GuardError::ProxyDetected { .. } => "proxy_detected",
                GuardError::ProbeFailed { .. } => "probe_failed",
                GuardError::ResolveFailed { .. } => "resolve_failed",
            },
            Error::Item(e) => match e {
                ItemError::MalformedIdentifier { .. } => "malformed_identifier",
                ItemError::UnsupportedItemType { .. } => "unsupported_item_type",
                ItemError::MalformedName { .. } => "malformed_item_name",
                ItemError::InvalidRange { .. } => "invalid_range",
                ItemError::RangeTooLarge { .. } => "range_too_large",
                ItemError::AlreadyActive { .. } => "already_active",
            },
            Error::Download(e) => match e {
                DownloadError::ExitCode { .. } => "download_failed",
                DownloadError::Spawn { .. } => "download_spawn_failed",
                DownloadError::ExecutableNotFound { .. } => "executable_not_found",
            },
            Error::Assembly(e) => match e {
                AssemblyError::MissingCompressionSupport { .. } => "missing_compression_support",
                AssemblyError::MissingArtifact { .. } => "missing_artifact",
                AssemblyError::MoveFailed { .. } => "move_failed",
                AssemblyError::ChecksumMismatch { .. } => "checksum_mismatch",
            },
            Error::Upload(e) => match e {
                UploadError::TransferFailed { .. } => "upload_failed",
                UploadError::Spawn { .. } => "upload_spawn_failed",
                UploadError::NoTarget { .. } => "no_upload_target",
                UploadError::ToolNotFound { .. } => "transfer_tool_not_found",
            },
            Error::Tracker(e) => match e {
                TrackerError::Unreachable { .. } => "tracker_unreachable",
                TrackerError::Rejected { .. } => "tracker_rejected",
                TrackerError::InvalidResponse { .. } => "tracker_invalid_response",
            },
            Error::Io(_) => "io_error",
            Error::Network(_) => "network_error",
            Error::Serialization(_) => "serialization_error",
            Error::InsufficientSpace { .. } => "insufficient_space",
            Error::DiskSpaceCheckFailed(_) => "disk_space_check_failed",
            Error::Cancelled => "cancelled",
            Error::WorkerPanicked { .. } => "worker_panicked",
        }
    }

    /// Shorthand for a configuration error tied to a key
    pub(crate) fn config(key: &str, message: impl Into<String>) -> Self {
        Error::Config {
            message: message.into(),
            key: Some(key.to_string()),
        }
    }
}
