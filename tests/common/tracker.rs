//! Mock tracker and ban-probe endpoints, plus a matching worker config

use std::path::Path;
use std::time::Duration;
use warc_worker::Config;
use warc_worker::config::RetryConfig;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, Request, ResponseTemplate};

pub const TRACKER_ID: &str = "twitpic2";
pub const UPLOAD_TARGET: &str = "rsync://upload.example.org/twitpic2/";

/// Wiremock server standing in for the tracker and the ban-probe site
pub struct MockTracker {
    pub server: MockServer,
}

impl MockTracker {
    /// Tracker handing out `items` once each, then reporting no work
    pub async fn start(items: &[&str]) -> Self {
        Self::start_with_probe(items, 200).await
    }

    /// As [`MockTracker::start`], with the ban probe answering `probe_status`
    pub async fn start_with_probe(items: &[&str], probe_status: u16) -> Self {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/2"))
            .respond_with(ResponseTemplate::new(probe_status))
            .mount(&server)
            .await;

        for item in items {
            Mock::given(method("POST"))
                .and(path(format!("/{TRACKER_ID}/request")))
                .respond_with(
                    ResponseTemplate::new(200).set_body_json(serde_json::json!({ "item_name": item })),
                )
                .up_to_n_times(1)
                .mount(&server)
                .await;
        }
        Mock::given(method("POST"))
            .and(path(format!("/{TRACKER_ID}/request")))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path(format!("/{TRACKER_ID}/upload")))
            .respond_with(ResponseTemplate::new(200).set_body_string(format!("{UPLOAD_TARGET}\n")))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path(format!("/{TRACKER_ID}/done")))
            .respond_with(ResponseTemplate::new(200).set_body_string("OK"))
            .mount(&server)
            .await;

        Self { server }
    }

    /// Requests received on one tracker endpoint (`request`, `upload`, `done`)
    pub async fn requests_to(&self, endpoint: &str) -> Vec<Request> {
        let wanted = format!("/{TRACKER_ID}/{endpoint}");
        self.server
            .received_requests()
            .await
            .unwrap_or_default()
            .into_iter()
            .filter(|r| r.url.path() == wanted)
            .collect()
    }

    /// JSON bodies of every completion report
    pub async fn done_reports(&self) -> Vec<serde_json::Value> {
        self.requests_to("done")
            .await
            .iter()
            .map(|r| serde_json::from_slice(&r.body).unwrap())
            .collect()
    }

    /// Worker config pointed at this tracker, with fast retries and delays
    pub fn config(&self, data_dir: &Path) -> Config {
        let mut config = Config::default();
        config.worker.downloader = "integration".to_string();
        config.worker.data_dir = data_dir.to_path_buf();
        config.worker.idle_delay = Duration::from_millis(10);
        config.tracker.host = self.server.address().to_string();
        config.tracker.tracker_id = TRACKER_ID.to_string();
        config.tracker.retry = no_retry();
        config.guard.ban_probe_url = format!("{}/2", self.server.uri());
        config.fetch.attempt_delay = Duration::from_millis(1);
        config.upload.retry = no_retry();
        config.disk_space.min_free_bytes = 1;
        config
    }
}

fn no_retry() -> RetryConfig {
    RetryConfig {
        max_attempts: 0,
        initial_delay: Duration::from_millis(1),
        max_delay: Duration::from_millis(1),
        backoff_multiplier: 1.0,
        jitter: false,
    }
}
