//! Configuration types for warc-worker

use crate::error::{Error, Result};
use crate::types::DEFAULT_MAX_RANGE_LEN;
use serde::{Deserialize, Serialize};
use std::{net::IpAddr, path::Path, path::PathBuf, time::Duration};

/// Valid range for [`UploadConfig::max_concurrent`]
pub const UPLOAD_CONCURRENCY_RANGE: std::ops::RangeInclusive<usize> = 1..=4;

/// Coordinator (tracker) connection settings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TrackerConfig {
    /// Tracker host, optionally with port (default: "tracker.archiveteam.org")
    #[serde(default = "default_tracker_host")]
    pub host: String,

    /// Project identifier on the tracker (default: "twitpic2")
    #[serde(default = "default_tracker_id")]
    pub tracker_id: String,

    /// Per-request timeout (default: 60 seconds)
    #[serde(default = "default_request_timeout", with = "duration_serde")]
    pub request_timeout: Duration,

    /// Retry policy for tracker calls; exhaustion aborts the run
    #[serde(default = "default_tracker_retry")]
    pub retry: RetryConfig,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            host: default_tracker_host(),
            tracker_id: default_tracker_id(),
            request_timeout: default_request_timeout(),
            retry: default_tracker_retry(),
        }
    }
}

impl TrackerConfig {
    /// Base URL of the project on the tracker, always ending in `/`
    pub fn base_url(&self) -> String {
        format!("http://{}/{}/", self.host, self.tracker_id)
    }
}

/// Worker identity, directories and run limits
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Nickname reported to the tracker and embedded in WARC headers
    #[serde(default)]
    pub downloader: String,

    /// Shared output directory (default: "./data")
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Number of item pipelines running concurrently (default: 1)
    #[serde(default = "default_concurrent_items")]
    pub concurrent_items: usize,

    /// Delay before asking the tracker again when no item was handed out (default: 30 seconds)
    #[serde(default = "default_idle_delay", with = "duration_serde")]
    pub idle_delay: Duration,

    /// Stop after this many items have been claimed (None = unlimited)
    #[serde(default)]
    pub max_items: Option<u64>,

    /// Cancel the run after this long (None = run until stopped)
    #[serde(default, with = "optional_duration_serde")]
    pub run_timeout: Option<Duration>,

    /// Prefix of WARC file names (default: "twitpic2")
    #[serde(default = "default_warc_prefix")]
    pub warc_prefix: String,

    /// Version of this worker's fetch logic, reported to the tracker and WARC headers
    #[serde(default = "default_project_version")]
    pub project_version: String,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            downloader: String::new(),
            data_dir: default_data_dir(),
            concurrent_items: default_concurrent_items(),
            idle_delay: default_idle_delay(),
            max_items: None,
            run_timeout: None,
            warc_prefix: default_warc_prefix(),
            project_version: default_project_version(),
        }
    }
}

/// External fetch process (wget-lua) settings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FetchConfig {
    /// Explicit path to the fetch executable (auto-detected if None)
    #[serde(default)]
    pub executable: Option<PathBuf>,

    /// Candidate locations probed when no explicit executable is set
    #[serde(default = "default_search_paths")]
    pub search_paths: Vec<PathBuf>,

    /// Whether to search PATH for `wget-lua` after the candidates (default: true)
    #[serde(default = "default_true")]
    pub search_path: bool,

    /// Substring the executable must print for `--version`
    #[serde(default = "default_required_version")]
    pub required_version: String,

    /// How long a candidate may take to answer `--version` (default: 10 seconds)
    #[serde(default = "default_version_timeout", with = "duration_serde")]
    pub version_timeout: Duration,

    /// Lua script handed to the fetch process (None = no script)
    #[serde(default = "default_script")]
    pub script: Option<PathBuf>,

    /// URL template; `{id}` is replaced with the encoded identifier
    #[serde(default = "default_url_template")]
    pub url_template: String,

    /// Domains the fetch may span to
    #[serde(default = "default_domains")]
    pub domains: Vec<String>,

    /// Per-request timeout passed to the fetch process (default: 30 seconds)
    #[serde(default = "default_fetch_timeout", with = "duration_serde")]
    pub timeout: Duration,

    /// Wait between the fetch process's own retries (default: 30 seconds)
    #[serde(default = "default_fetch_timeout", with = "duration_serde")]
    pub retry_wait: Duration,

    /// Number of times the whole fetch is attempted (default: 2)
    #[serde(default = "default_max_tries")]
    pub max_tries: u32,

    /// Delay between whole-fetch attempts (default: 30 seconds)
    #[serde(default = "default_attempt_delay", with = "duration_serde")]
    pub attempt_delay: Duration,

    /// Most identifiers one item may expand to (default: 100000)
    #[serde(default = "default_max_range_len")]
    pub max_range_len: u64,

    /// Exit codes treated as success (default: 0, 4, 7, 8)
    #[serde(default = "default_accept_exit_codes")]
    pub accept_exit_codes: Vec<i32>,

    /// User agents rotated per invocation
    #[serde(default = "default_user_agents")]
    pub user_agents: Vec<String>,

    /// Accept-Language header lines rotated per invocation
    #[serde(default = "default_accept_language_headers")]
    pub accept_language_headers: Vec<String>,

    /// Headers sent on every request
    #[serde(default = "default_extra_headers")]
    pub extra_headers: Vec<String>,

    /// Local address the fetch process binds to
    #[serde(default)]
    pub bind_address: Option<IpAddr>,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            executable: None,
            search_paths: default_search_paths(),
            search_path: true,
            required_version: default_required_version(),
            version_timeout: default_version_timeout(),
            script: default_script(),
            url_template: default_url_template(),
            domains: default_domains(),
            timeout: default_fetch_timeout(),
            retry_wait: default_fetch_timeout(),
            max_tries: default_max_tries(),
            attempt_delay: default_attempt_delay(),
            max_range_len: default_max_range_len(),
            accept_exit_codes: default_accept_exit_codes(),
            user_agents: default_user_agents(),
            accept_language_headers: default_accept_language_headers(),
            extra_headers: default_extra_headers(),
            bind_address: None,
        }
    }
}

/// Environment check settings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GuardConfig {
    /// Run environment checks before each item (default: true)
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// URL probed for an access-denial status
    #[serde(default = "default_ban_probe_url")]
    pub ban_probe_url: String,

    /// Independent hostnames that must resolve to distinct addresses
    #[serde(default = "default_dns_check_hosts")]
    pub dns_check_hosts: Vec<String>,

    /// Run the DNS check on every n-th call (default: 10)
    #[serde(default = "default_dns_check_interval")]
    pub dns_check_interval: u64,

    /// Timeout for the liveness probe (default: 30 seconds)
    #[serde(default = "default_fetch_timeout", with = "duration_serde")]
    pub probe_timeout: Duration,
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ban_probe_url: default_ban_probe_url(),
            dns_check_hosts: default_dns_check_hosts(),
            dns_check_interval: default_dns_check_interval(),
            probe_timeout: default_fetch_timeout(),
        }
    }
}

/// Output packaging settings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AssembleConfig {
    /// Prefix of the scrape text file written by the fetch script (default: "twitpic2-scrape")
    #[serde(default = "default_scrape_prefix")]
    pub scrape_prefix: String,

    /// Fall back to copy + verify + delete when rename crosses filesystems (default: false)
    ///
    /// Leaving this off keeps the move from item directory to data directory atomic,
    /// which requires both to live on the same filesystem.
    #[serde(default)]
    pub allow_cross_device_copy: bool,
}

impl Default for AssembleConfig {
    fn default() -> Self {
        Self {
            scrape_prefix: default_scrape_prefix(),
            allow_cross_device_copy: false,
        }
    }
}

/// Upload settings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct UploadConfig {
    /// Maximum concurrent uploads across all items, 1 to 4 (default: 1)
    #[serde(default = "default_upload_concurrency")]
    pub max_concurrent: usize,

    /// Path to rsync (auto-detected if None)
    #[serde(default)]
    pub rsync_path: Option<PathBuf>,

    /// Extra rsync arguments enabling partial-transfer resume
    #[serde(default = "default_rsync_extra_args")]
    pub extra_args: Vec<String>,

    /// Retry policy for transient transfer failures
    #[serde(default)]
    pub retry: RetryConfig,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            max_concurrent: default_upload_concurrency(),
            rsync_path: None,
            extra_args: default_rsync_extra_args(),
            retry: RetryConfig::default(),
        }
    }
}

/// Disk space checking configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DiskSpaceConfig {
    /// Enable disk space checking before each item (default: true)
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Minimum free space in the data directory (default: 1 GiB)
    #[serde(default = "default_min_free_bytes")]
    pub min_free_bytes: u64,
}

impl Default for DiskSpaceConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            min_free_bytes: default_min_free_bytes(),
        }
    }
}

/// Run statistics settings
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct StatsConfig {
    /// Files whose SHA-256 is reported with every completed item
    #[serde(default)]
    pub fingerprint_files: Vec<PathBuf>,
}

/// Retry configuration for transient failures
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of retry attempts (default: 5)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Initial delay before first retry (default: 1 second)
    #[serde(default = "default_initial_delay", with = "duration_serde")]
    pub initial_delay: Duration,

    /// Maximum delay between retries (default: 60 seconds)
    #[serde(default = "default_max_delay", with = "duration_serde")]
    pub max_delay: Duration,

    /// Multiplier for exponential backoff (default: 2.0)
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    /// Add random jitter to delays (default: true)
    #[serde(default = "default_true")]
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            backoff_multiplier: 2.0,
            jitter: true,
        }
    }
}

/// Main configuration for the worker
///
/// Built once at startup (TOML file plus CLI overrides) and handed to
/// [`Orchestrator::new`](crate::orchestrator::Orchestrator::new), which threads
/// the relevant sections to each component. Nothing reads configuration from
/// globals.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Config {
    /// Coordinator connection
    #[serde(default)]
    pub tracker: TrackerConfig,

    /// Identity, directories and run limits
    #[serde(default)]
    pub worker: WorkerConfig,

    /// Fetch process invocation
    #[serde(default)]
    pub fetch: FetchConfig,

    /// Environment checks
    #[serde(default)]
    pub guard: GuardConfig,

    /// Output packaging
    #[serde(default)]
    pub assemble: AssembleConfig,

    /// Uploads
    #[serde(default)]
    pub upload: UploadConfig,

    /// Disk space checks
    #[serde(default)]
    pub disk_space: DiskSpaceConfig,

    /// Run statistics
    #[serde(default)]
    pub stats: StatsConfig,
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_toml_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| Error::Config {
            message: format!("failed to read {}: {}", path.display(), e),
            key: None,
        })?;
        Self::from_toml_str(&text)
    }

    /// Parse configuration from TOML text
    pub fn from_toml_str(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| Error::Config {
            message: format!("invalid TOML: {e}"),
            key: None,
        })
    }

    /// Data directory shared by all items
    pub fn data_dir(&self) -> &PathBuf {
        &self.worker.data_dir
    }

    /// Reject values the worker cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.worker.downloader.trim().is_empty() {
            return Err(Error::config(
                "worker.downloader",
                "a downloader nickname is required",
            ));
        }
        if self.worker.concurrent_items == 0 {
            return Err(Error::config(
                "worker.concurrent_items",
                "at least one item pipeline is required",
            ));
        }
        if !UPLOAD_CONCURRENCY_RANGE.contains(&self.upload.max_concurrent) {
            return Err(Error::config(
                "upload.max_concurrent",
                format!(
                    "must be between {} and {}, got {}",
                    UPLOAD_CONCURRENCY_RANGE.start(),
                    UPLOAD_CONCURRENCY_RANGE.end(),
                    self.upload.max_concurrent
                ),
            ));
        }
        if self.fetch.max_tries == 0 {
            return Err(Error::config("fetch.max_tries", "must be at least 1"));
        }
        if self.fetch.max_range_len == 0 {
            return Err(Error::config("fetch.max_range_len", "must be at least 1"));
        }
        if self.fetch.domains.is_empty() {
            return Err(Error::config(
                "fetch.domains",
                "the domain allowlist must not be empty",
            ));
        }
        if !self.fetch.url_template.contains("{id}") {
            return Err(Error::config(
                "fetch.url_template",
                "template must contain the {id} placeholder",
            ));
        }
        if self.fetch.user_agents.is_empty() {
            return Err(Error::config(
                "fetch.user_agents",
                "at least one user agent is required",
            ));
        }
        if self.guard.dns_check_interval == 0 {
            return Err(Error::config(
                "guard.dns_check_interval",
                "must be at least 1",
            ));
        }
        Ok(())
    }
}

fn default_true() -> bool {
    true
}

fn default_tracker_host() -> String {
    "tracker.archiveteam.org".to_string()
}

fn default_tracker_id() -> String {
    "twitpic2".to_string()
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(60)
}

fn default_tracker_retry() -> RetryConfig {
    RetryConfig {
        max_attempts: 10,
        initial_delay: Duration::from_secs(5),
        max_delay: Duration::from_secs(300),
        ..RetryConfig::default()
    }
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./data")
}

fn default_concurrent_items() -> usize {
    1
}

fn default_idle_delay() -> Duration {
    Duration::from_secs(30)
}

fn default_warc_prefix() -> String {
    "twitpic2".to_string()
}

fn default_project_version() -> String {
    "20141026.03".to_string()
}

fn default_search_paths() -> Vec<PathBuf> {
    [
        "./wget-lua",
        "./wget-lua-warrior",
        "./wget-lua-local",
        "../wget-lua",
        "../../wget-lua",
        "/home/warrior/wget-lua",
        "/usr/bin/wget-lua",
    ]
    .into_iter()
    .map(PathBuf::from)
    .collect()
}

fn default_required_version() -> String {
    "GNU Wget 1.14.lua.20130523-9a5c".to_string()
}

fn default_script() -> Option<PathBuf> {
    Some(PathBuf::from("twitpic.lua"))
}

fn default_url_template() -> String {
    "http://twitpic.com/{id}".to_string()
}

fn default_domains() -> Vec<String> {
    ["twitpic.com", "cloudfront.net", "twimg.com", "amazonaws.com"]
        .into_iter()
        .map(String::from)
        .collect()
}

fn default_fetch_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_attempt_delay() -> Duration {
    Duration::from_secs(30)
}

fn default_version_timeout() -> Duration {
    Duration::from_secs(10)
}

fn default_max_range_len() -> u64 {
    DEFAULT_MAX_RANGE_LEN
}

fn default_max_tries() -> u32 {
    2
}

fn default_accept_exit_codes() -> Vec<i32> {
    vec![0, 4, 7, 8]
}

fn default_user_agents() -> Vec<String> {
    [
        "Mozilla/5.0 (compatible; MSIE 10.0; Windows NT 6.1; WOW64; Trident/6.0)",
        "Mozilla/5.0 (compatible; MSIE 9.0; Windows NT 6.1; Trident/5.0)",
        "Mozilla/5.0 (compatible; MSIE 9.0; Windows NT 6.1; WOW64; Trident/5.0)",
        "Mozilla/5.0 (Windows NT 6.3; WOW64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/36.0.1985.125 Safari/537.36",
        "Mozilla/5.0 (Windows NT 6.3; WOW64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/36.0.1985.143 Safari/537.36",
        "Mozilla/5.0 (Windows NT 6.3; WOW64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/37.0.2062.103 Safari/537.36",
        "Mozilla/5.0 (Windows NT 6.3; WOW64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/37.0.2062.94 Safari/537.36",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

fn default_accept_language_headers() -> Vec<String> {
    [
        "Accept-Language: en-CA,en;q=0.8,en-US;q=0.6,en-GB;q=0.4",
        "Accept-Language: en-US,en;q=0.8,en-CA;q=0.6,en-GB;q=0.4",
        "Accept-Language: en-GB,en;q=0.8,en-US;q=0.6,en-CA;q=0.4",
        "Accept-Language: en-US,en;q=0.8,en-GB;q=0.6,en-CA;q=0.4",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

fn default_extra_headers() -> Vec<String> {
    vec![
        "Accept: text/html,application/xhtml+xml,application/xml;q=0.9,image/webp,*/*;q=0.8"
            .to_string(),
        "DNT: 1".to_string(),
    ]
}

fn default_ban_probe_url() -> String {
    "http://twitpic.com/2".to_string()
}

fn default_dns_check_hosts() -> Vec<String> {
    [
        "twitter.com",
        "facebook.com",
        "youtube.com",
        "microsoft.com",
        "icanhas.cheezburger.com",
        "archiveteam.org",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

fn default_dns_check_interval() -> u64 {
    10
}

fn default_scrape_prefix() -> String {
    "twitpic2-scrape".to_string()
}

fn default_upload_concurrency() -> usize {
    1
}

fn default_rsync_extra_args() -> Vec<String> {
    ["--recursive", "--partial", "--partial-dir", ".rsync-tmp"]
        .into_iter()
        .map(String::from)
        .collect()
}

fn default_min_free_bytes() -> u64 {
    1024 * 1024 * 1024
}

fn default_max_attempts() -> u32 {
    5
}

fn default_initial_delay() -> Duration {
    Duration::from_secs(1)
}

fn default_max_delay() -> Duration {
    Duration::from_secs(60)
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

// Duration serialization helper
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

// Optional Duration serialization helper
mod optional_duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match duration {
            Some(d) => serializer.serialize_some(&d.as_secs()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = Option::<u64>::deserialize(deserializer)?;
        Ok(secs.map(Duration::from_secs))
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    fn valid_config() -> Config {
        let mut config = Config::default();
        config.worker.downloader = "tester".to_string();
        config
    }

    #[test]
    fn test_defaults_match_reference_deployment() {
        let config = Config::default();

        assert_eq!(config.upload.max_concurrent, 1);
        assert_eq!(config.fetch.max_tries, 2);
        assert_eq!(config.fetch.accept_exit_codes, vec![0, 4, 7, 8]);
        assert_eq!(config.fetch.timeout, Duration::from_secs(30));
        assert_eq!(config.fetch.retry_wait, Duration::from_secs(30));
        assert_eq!(config.fetch.version_timeout, Duration::from_secs(10));
        assert_eq!(config.fetch.max_range_len, 100_000);
        assert_eq!(config.guard.dns_check_hosts.len(), 6);
        assert_eq!(config.guard.dns_check_interval, 10);
        assert!(!config.assemble.allow_cross_device_copy);
    }

    #[test]
    fn test_tracker_base_url_has_trailing_slash() {
        let tracker = TrackerConfig {
            host: "127.0.0.1:8080".to_string(),
            tracker_id: "proj".to_string(),
            ..TrackerConfig::default()
        };

        assert_eq!(tracker.base_url(), "http://127.0.0.1:8080/proj/");
    }

    #[test]
    fn test_validate_accepts_defaults_with_downloader() {
        valid_config().validate().unwrap();
    }

    #[test]
    fn test_validate_requires_downloader() {
        let err = Config::default().validate().unwrap_err();
        match err {
            Error::Config { key, .. } => assert_eq!(key.as_deref(), Some("worker.downloader")),
            other => panic!("expected Config error, got {other:?}"),
        }
    }

    #[test]
    fn test_validate_rejects_upload_concurrency_out_of_range() {
        for bad in [0, 5, 16] {
            let mut config = valid_config();
            config.upload.max_concurrent = bad;

            let err = config.validate().unwrap_err();
            match err {
                Error::Config { key, .. } => {
                    assert_eq!(key.as_deref(), Some("upload.max_concurrent"))
                }
                other => panic!("expected Config error for {bad}, got {other:?}"),
            }
        }

        for good in 1..=4 {
            let mut config = valid_config();
            config.upload.max_concurrent = good;
            config.validate().unwrap();
        }
    }

    #[test]
    fn test_validate_rejects_template_without_placeholder() {
        let mut config = valid_config();
        config.fetch.url_template = "http://twitpic.com/".to_string();

        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_tries_and_empty_allowlist() {
        let mut config = valid_config();
        config.fetch.max_tries = 0;
        assert!(config.validate().is_err());

        let mut config = valid_config();
        config.fetch.domains.clear();
        assert!(config.validate().is_err());

        let mut config = valid_config();
        config.fetch.max_range_len = 0;
        match config.validate().unwrap_err() {
            Error::Config { key, .. } => assert_eq!(key.as_deref(), Some("fetch.max_range_len")),
            other => panic!("expected Config error, got {other:?}"),
        }
    }

    #[test]
    fn test_toml_overrides_only_named_fields() {
        let config = Config::from_toml_str(
            r#"
            [worker]
            downloader = "alice"
            data_dir = "/srv/data"
            run_timeout = 3600

            [upload]
            max_concurrent = 3

            [fetch]
            bind_address = "192.0.2.10"
            "#,
        )
        .unwrap();

        assert_eq!(config.worker.downloader, "alice");
        assert_eq!(config.worker.data_dir, PathBuf::from("/srv/data"));
        assert_eq!(config.worker.run_timeout, Some(Duration::from_secs(3600)));
        assert_eq!(config.upload.max_concurrent, 3);
        assert_eq!(
            config.fetch.bind_address,
            Some("192.0.2.10".parse().unwrap())
        );
        // untouched sections keep their defaults
        assert_eq!(config.fetch.max_tries, 2);
        assert_eq!(config.tracker.tracker_id, "twitpic2");
    }

    #[test]
    fn test_invalid_toml_is_a_config_error() {
        let err = Config::from_toml_str("[worker\n").unwrap_err();
        assert!(matches!(err, Error::Config { key: None, .. }));
    }

    #[test]
    fn test_duration_serde_rejects_negative_integer() {
        let json = r#"{"initial_delay": -1, "max_delay": 60}"#;
        let result = serde_json::from_str::<RetryConfig>(json);

        assert!(
            result.is_err(),
            "-1 for a Duration (u64) field must produce a serde error"
        );
    }

    #[test]
    fn test_retry_config_serializes_durations_as_seconds() {
        let config = RetryConfig {
            initial_delay: Duration::from_secs(5),
            max_delay: Duration::from_secs(120),
            ..RetryConfig::default()
        };

        let json = serde_json::to_value(&config).unwrap();

        assert_eq!(json["initial_delay"], 5);
        assert_eq!(json["max_delay"], 120);
    }
}
