//! Tracker HTTP client
//!
//! The tracker hands out item names and records completions. All endpoints
//! live under `http://<host>/<tracker_id>/` and exchange JSON:
//!
//! - `POST request` claims an item (`404` = nothing to do, `420`/`429` = slow down)
//! - `POST upload` returns the remote target for artifacts
//! - `POST done` reports an uploaded item with its statistics
//!
//! Transport failures and server errors are retried with backoff; once the
//! retry budget is spent the error is returned and the run cannot continue.

use crate::config::TrackerConfig;
use crate::error::{Error, Result, TrackerError};
use crate::retry::with_retry;
use crate::types::RunStats;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use url::Url;

/// Tracker API version spoken by this client
const API_VERSION: &str = "2";

/// Statuses the tracker uses to throttle workers
const RATE_LIMIT_STATUSES: [u16; 2] = [420, 429];

/// Result of asking the tracker for work
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClaimOutcome {
    /// An item was assigned
    Item(String),
    /// No items are currently available
    NoItems,
    /// The tracker asked this worker to slow down
    RateLimited,
}

#[derive(Serialize)]
struct ClaimRequest<'a> {
    downloader: &'a str,
    api_version: &'a str,
    version: &'a str,
}

#[derive(Deserialize)]
struct ClaimResponse {
    item_name: String,
}

#[derive(Serialize)]
struct UploadRequest<'a> {
    downloader: &'a str,
    version: &'a str,
    item: &'a str,
}

#[derive(Serialize)]
struct DoneRequest<'a> {
    item: &'a str,
    files: &'a [String],
    #[serde(flatten)]
    stats: &'a RunStats,
}

/// Client for one tracker project
#[derive(Clone, Debug)]
pub struct TrackerClient {
    config: TrackerConfig,
    base: Url,
    client: reqwest::Client,
    downloader: String,
    version: String,
}

impl TrackerClient {
    /// Create a client identifying as `downloader` running fetch logic `version`
    pub fn new(
        config: TrackerConfig,
        downloader: impl Into<String>,
        version: impl Into<String>,
    ) -> Result<Self> {
        let base = Url::parse(&config.base_url()).map_err(|e| {
            Error::config("tracker.host", format!("invalid tracker URL: {e}"))
        })?;
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;

        Ok(Self {
            config,
            base,
            client,
            downloader: downloader.into(),
            version: version.into(),
        })
    }

    /// Project base URL
    pub fn base_url(&self) -> &Url {
        &self.base
    }

    /// Ask for the next item
    pub async fn claim(&self) -> Result<ClaimOutcome> {
        let url = self.endpoint("request")?;
        let body = ClaimRequest {
            downloader: &self.downloader,
            api_version: API_VERSION,
            version: &self.version,
        };

        let (url, body) = (&url, &body);
        with_retry(&self.config.retry, || async move {
            let response = self.post(url, body).await?;
            let status = response.status().as_u16();

            match status {
                200..=299 => {
                    let claim: ClaimResponse = response
                        .json()
                        .await
                        .map_err(|e| invalid_response(url, e))?;
                    info!(item = %claim.item_name, "claimed item");
                    Ok(ClaimOutcome::Item(claim.item_name))
                }
                404 => Ok(ClaimOutcome::NoItems),
                s if RATE_LIMIT_STATUSES.contains(&s) => Ok(ClaimOutcome::RateLimited),
                _ => Err(rejected(url, status)),
            }
        })
        .await
    }

    /// Ask where to upload an item's artifacts
    pub async fn upload_target(&self, item: &str) -> Result<String> {
        let url = self.endpoint("upload")?;
        let body = UploadRequest {
            downloader: &self.downloader,
            version: &self.version,
            item,
        };

        let (url, body) = (&url, &body);
        let target = with_retry(&self.config.retry, || async move {
            let response = self.post(url, body).await?;
            let status = response.status().as_u16();
            if !response.status().is_success() {
                return Err(rejected(url, status));
            }
            let text = response
                .text()
                .await
                .map_err(|e| invalid_response(url, e))?;
            Ok(text.trim().to_string())
        })
        .await?;

        if target.is_empty() {
            return Err(crate::error::UploadError::NoTarget {
                item: item.to_string(),
            }
            .into());
        }
        debug!(item, target = %target, "upload target assigned");
        Ok(target)
    }

    /// Report an uploaded item
    pub async fn report_done(&self, stats: &RunStats, files: &[String]) -> Result<()> {
        let url = self.endpoint("done")?;
        let item = stats.items.first().map(String::as_str).unwrap_or_default();
        let body = DoneRequest { item, files, stats };

        let (url, body) = (&url, &body);
        with_retry(&self.config.retry, || async move {
            let response = self.post(url, body).await?;
            if response.status().is_success() {
                Ok(())
            } else {
                Err(rejected(url, response.status().as_u16()))
            }
        })
        .await?;

        info!(item, "completion reported");
        Ok(())
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        self.base
            .join(path)
            .map_err(|e| Error::config("tracker.tracker_id", format!("invalid endpoint: {e}")))
    }

    async fn post<T: Serialize + ?Sized>(&self, url: &Url, body: &T) -> Result<reqwest::Response> {
        self.client
            .post(url.clone())
            .json(body)
            .send()
            .await
            .map_err(|e| {
                TrackerError::Unreachable {
                    url: url.to_string(),
                    reason: e.to_string(),
                }
                .into()
            })
    }
}

fn rejected(url: &Url, status: u16) -> Error {
    TrackerError::Rejected {
        url: url.to_string(),
        status,
    }
    .into()
}

fn invalid_response(url: &Url, e: reqwest::Error) -> Error {
    TrackerError::InvalidResponse {
        url: url.to_string(),
        reason: e.to_string(),
    }
    .into()
}
