//! Core types for warc-worker

use crate::codec;
use crate::error::{ItemError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

/// Supported fetch strategies
///
/// The type prefix of an item name. Adding a variant forces every match on
/// [`ItemKind`] to handle it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemType {
    /// A contiguous range of image identifiers
    Image,
}

impl ItemType {
    /// Prefix used in item names
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemType::Image => "image",
        }
    }
}

impl fmt::Display for ItemType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ItemType {
    type Err = crate::error::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "image" => Ok(ItemType::Image),
            other => Err(ItemError::UnsupportedItemType {
                item_type: other.to_string(),
            }
            .into()),
        }
    }
}

/// Most identifiers a single item may cover unless configured otherwise
pub const DEFAULT_MAX_RANGE_LEN: u64 = 100_000;

/// Closed integer interval `[start, end]` of identifiers
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentifierRange {
    /// First identifier (inclusive)
    pub start: u64,
    /// Last identifier (inclusive)
    pub end: u64,
}

impl IdentifierRange {
    /// Create a range, rejecting `start > end`
    pub fn new(start: u64, end: u64) -> Result<Self> {
        if start > end {
            return Err(ItemError::InvalidRange { start, end }.into());
        }
        Ok(Self { start, end })
    }

    /// Parse `<start>:<end>` with base-36 endpoints
    pub fn parse(value: &str) -> Result<Self> {
        let (start, end) = value
            .split_once(':')
            .ok_or_else(|| ItemError::MalformedName {
                name: value.to_string(),
                reason: "range must be <start>:<end>".to_string(),
            })?;
        Self::new(codec::decode(start)?, codec::decode(end)?)
    }

    /// Number of identifiers in the range, saturating at `u64::MAX`
    pub fn count(&self) -> u64 {
        self.end.saturating_sub(self.start).saturating_add(1)
    }

    /// Reject ranges holding more than `max_len` identifiers
    pub fn ensure_len_within(&self, max_len: u64) -> Result<()> {
        if self.count() > max_len {
            return Err(ItemError::RangeTooLarge {
                start: self.start,
                end: self.end,
                max_len,
            }
            .into());
        }
        Ok(())
    }

    /// Encoded identifiers in ascending numeric order
    pub fn identifiers(&self) -> impl Iterator<Item = String> + use<> {
        (self.start..=self.end).map(codec::encode)
    }
}

/// Parsed item value, one variant per [`ItemType`]
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ItemKind {
    /// Fetch every identifier in the range
    Image(IdentifierRange),
}

impl ItemKind {
    /// Parse an item name of the form `<type>:<value>`
    pub fn parse(name: &str) -> Result<Self> {
        let (item_type, value) = name
            .split_once(':')
            .ok_or_else(|| ItemError::MalformedName {
                name: name.to_string(),
                reason: "expected <type>:<value>".to_string(),
            })?;

        match item_type.parse::<ItemType>()? {
            ItemType::Image => Ok(ItemKind::Image(IdentifierRange::parse(value)?)),
        }
    }

    /// The type tag of this item
    pub fn item_type(&self) -> ItemType {
        match self {
            ItemKind::Image(_) => ItemType::Image,
        }
    }

    /// Reject items that would expand to more than `max_len` fetch targets
    pub fn ensure_len_within(&self, max_len: u64) -> Result<()> {
        match self {
            ItemKind::Image(range) => range.ensure_len_within(max_len),
        }
    }

    /// Fetch targets for this item, substituting each encoded identifier for
    /// `{id}` in the template
    pub fn fetch_urls(&self, url_template: &str) -> Vec<String> {
        match self {
            ItemKind::Image(range) => range
                .identifiers()
                .map(|id| url_template.replace("{id}", &id))
                .collect(),
        }
    }
}

/// Replace characters that are unsafe in paths
pub fn escape_item_name(name: &str) -> String {
    name.replace([':', '/'], "_")
}

/// One unit of work claimed from the tracker
#[derive(Clone, Debug)]
pub struct WorkItem {
    /// Name as handed out by the tracker, e.g. `image:0:2r`
    pub name: String,
    /// Parsed name
    pub kind: ItemKind,
    /// Path-safe form of `name`
    pub escaped_name: String,
    /// Text after the type prefix, e.g. `0:2r`
    pub value: String,
    /// Shared output directory
    pub data_dir: PathBuf,
}

impl WorkItem {
    /// Build an item from a claimed name, validating it against
    /// [`DEFAULT_MAX_RANGE_LEN`]
    pub fn new(name: impl Into<String>, data_dir: impl Into<PathBuf>) -> Result<Self> {
        Self::with_max_range_len(name, data_dir, DEFAULT_MAX_RANGE_LEN)
    }

    /// Build an item from a claimed name, rejecting ranges longer than `max_range_len`
    pub fn with_max_range_len(
        name: impl Into<String>,
        data_dir: impl Into<PathBuf>,
        max_range_len: u64,
    ) -> Result<Self> {
        let name = name.into();
        let kind = ItemKind::parse(&name)?;
        kind.ensure_len_within(max_range_len)?;
        let value = name
            .split_once(':')
            .map(|(_, value)| value.to_string())
            .unwrap_or_default();

        Ok(Self {
            escaped_name: escape_item_name(&name),
            kind,
            value,
            name,
            data_dir: data_dir.into(),
        })
    }

    /// Type tag of this item
    pub fn item_type(&self) -> ItemType {
        self.kind.item_type()
    }
}

/// Accountability fingerprint of the logic driving a run
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunFingerprint {
    /// SHA-256 of each fingerprinted file, keyed by file name
    pub hashes: BTreeMap<String, String>,
    /// Worker runtime description (crate version, OS, architecture)
    pub runtime: String,
}

/// Statistics attached to an item's completion report
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunStats {
    /// Downloader nickname
    pub downloader: String,
    /// Fetch logic version
    pub version: String,
    /// Items covered by this report
    pub items: Vec<String>,
    /// Bytes per file group (`data`)
    pub bytes: BTreeMap<String, u64>,
    /// Fingerprint of the logic driving the run
    pub id: RunFingerprint,
}

/// Pipeline stage, in execution order
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Claiming an item from the tracker
    Claim,
    /// Ban and proxy checks
    EnvironmentCheck,
    /// Disk check and private workspace creation
    PrepareWorkspace,
    /// Running the fetch process
    Download,
    /// Verifying, compressing and moving artifacts
    Assemble,
    /// Building run statistics
    Stats,
    /// Transferring artifacts to remote storage
    Upload,
    /// Reporting completion to the tracker
    Report,
}

impl Stage {
    /// State reached when this stage succeeds
    pub fn completed_state(self) -> ItemState {
        match self {
            Stage::Claim => ItemState::Claimed,
            Stage::EnvironmentCheck => ItemState::EnvironmentChecked,
            Stage::PrepareWorkspace => ItemState::WorkspaceReady,
            Stage::Download => ItemState::Downloaded,
            Stage::Assemble => ItemState::Assembled,
            Stage::Stats => ItemState::StatsAttached,
            Stage::Upload => ItemState::Uploaded,
            Stage::Report => ItemState::Reported,
        }
    }

    /// Lowercase name for logs
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Claim => "claim",
            Stage::EnvironmentCheck => "environment_check",
            Stage::PrepareWorkspace => "prepare_workspace",
            Stage::Download => "download",
            Stage::Assemble => "assemble",
            Stage::Stats => "stats",
            Stage::Upload => "upload",
            Stage::Report => "report",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle state of one item
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ItemState {
    /// Claimed from the tracker
    Claimed,
    /// Environment checks passed
    EnvironmentChecked,
    /// Private workspace created
    WorkspaceReady,
    /// Fetch process finished with an accepted exit code
    Downloaded,
    /// Artifacts verified and moved to the data directory
    Assembled,
    /// Run statistics built
    StatsAttached,
    /// Artifacts transferred
    Uploaded,
    /// Completion reported to the tracker
    Reported,
    /// A stage failed; the item is abandoned
    Failed {
        /// Stage that failed
        stage: Stage,
        /// Error message
        reason: String,
    },
}

/// Whether a failure ends the item or the whole run
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Disposition {
    /// Abandon the current item and claim the next one
    ItemFatal,
    /// Stop claiming items and exit with a failure status
    RunFatal,
    /// The run was cancelled while the item was in flight
    Cancelled,
}

/// Event emitted during an item's lifecycle
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// An item entered a new state
    StateChanged {
        /// Item name
        item: String,
        /// New state
        state: ItemState,
    },

    /// An item was abandoned
    ItemFailed {
        /// Item name
        item: String,
        /// Stage that failed
        stage: Stage,
        /// Machine-readable error code
        code: String,
        /// Error message
        error: String,
        /// Consequence of the failure
        disposition: Disposition,
    },

    /// An item was uploaded and reported
    ItemCompleted {
        /// Item name
        item: String,
        /// Bytes uploaded
        bytes: u64,
    },

    /// The tracker had no work or asked us to slow down
    Idle {
        /// Tracker's reason
        reason: String,
    },

    /// The run stopped claiming items
    RunStopped {
        /// Why the run stopped
        reason: String,
    },
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    #[test]
    fn test_parses_image_item() {
        let item = WorkItem::new("image:0:2r", "/data").unwrap();

        assert_eq!(item.item_type(), ItemType::Image);
        assert_eq!(item.value, "0:2r");
        assert_eq!(item.escaped_name, "image_0_2r");
        assert_eq!(
            item.kind,
            ItemKind::Image(IdentifierRange { start: 0, end: 99 })
        );
    }

    #[test]
    fn test_image_0_1r_expands_to_64_ascending_urls() {
        let kind = ItemKind::parse("image:0:1r").unwrap();
        let urls = kind.fetch_urls("http://twitpic.com/{id}");

        assert_eq!(urls.len(), 64);
        assert_eq!(urls[0], "http://twitpic.com/0");
        assert_eq!(urls[10], "http://twitpic.com/a");
        assert_eq!(urls[63], "http://twitpic.com/1r");

        let ids: Vec<u64> = urls
            .iter()
            .map(|u| codec::decode(u.rsplit('/').next().unwrap()).unwrap())
            .collect();
        assert!(ids.windows(2).all(|w| w[1] == w[0] + 1));
    }

    #[test]
    fn test_endpoints_are_base36() {
        // "63" is base-36 for 219, so this range holds 220 identifiers
        let kind = ItemKind::parse("image:0:63").unwrap();
        assert_eq!(kind.fetch_urls("{id}").len(), 220);
    }

    #[test]
    fn test_unknown_type_is_unsupported() {
        match ItemKind::parse("video:0:1") {
            Err(Error::Item(ItemError::UnsupportedItemType { item_type })) => {
                assert_eq!(item_type, "video")
            }
            other => panic!("expected UnsupportedItemType, got {other:?}"),
        }
    }

    #[test]
    fn test_malformed_names_are_rejected() {
        assert!(matches!(
            ItemKind::parse("image"),
            Err(Error::Item(ItemError::MalformedName { .. }))
        ));
        assert!(matches!(
            ItemKind::parse("image:12"),
            Err(Error::Item(ItemError::MalformedName { .. }))
        ));
        assert!(matches!(
            ItemKind::parse("image:0:ZZ"),
            Err(Error::Item(ItemError::MalformedIdentifier { .. }))
        ));
        assert!(matches!(
            ItemKind::parse("image:z:0"),
            Err(Error::Item(ItemError::InvalidRange { start: 35, end: 0 }))
        ));
    }

    #[test]
    fn test_full_identifier_range_count_saturates() {
        let range = IdentifierRange {
            start: 0,
            end: u64::MAX,
        };

        assert_eq!(range.count(), u64::MAX);
        assert_eq!(IdentifierRange { start: 7, end: 7 }.count(), 1);
    }

    #[test]
    fn test_oversized_range_is_rejected_before_expansion() {
        let err = WorkItem::new("image:0:zzzzzzzzzzzz", "/data").unwrap_err();
        assert!(matches!(
            err,
            Error::Item(ItemError::RangeTooLarge {
                start: 0,
                max_len: DEFAULT_MAX_RANGE_LEN,
                ..
            })
        ));

        let err = WorkItem::with_max_range_len("image:0:2r", "/data", 50).unwrap_err();
        assert!(matches!(
            err,
            Error::Item(ItemError::RangeTooLarge { end: 99, max_len: 50, .. })
        ));
        WorkItem::with_max_range_len("image:0:2r", "/data", 100).unwrap();
    }

    #[test]
    fn test_escaping_replaces_colons_and_slashes() {
        assert_eq!(escape_item_name("image:a/b:c"), "image_a_b_c");
    }

    #[test]
    fn test_every_stage_maps_to_its_successor_state() {
        assert_eq!(Stage::Claim.completed_state(), ItemState::Claimed);
        assert_eq!(Stage::Report.completed_state(), ItemState::Reported);
        assert_eq!(Stage::Upload.to_string(), "upload");
    }

    #[test]
    fn test_event_serializes_with_type_tag() {
        let event = Event::ItemFailed {
            item: "image:0:1".into(),
            stage: Stage::Download,
            code: "download_failed".into(),
            error: "exit 1".into(),
            disposition: Disposition::ItemFatal,
        };
        let json = serde_json::to_value(&event).unwrap();

        assert_eq!(json["type"], "item_failed");
        assert_eq!(json["stage"], "download");
        assert_eq!(json["disposition"], "item_fatal");
    }
}
