//! Shared test helpers for building an Orchestrator around fake collaborators.

use super::{Components, Orchestrator};
use crate::config::{Config, RetryConfig};
use crate::error::{Error, Result};
use crate::fetch::{ExitOutcome, FetchInvocation, FetchRunner};
use crate::guard::Resolver;
use crate::types::Event;
use crate::upload::{TransferRequest, TransferRunner};
use async_trait::async_trait;
use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::{Notify, broadcast};
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// What the fake fetch process does
#[derive(Debug, Clone, Copy)]
pub(crate) enum FetchBehavior {
    /// Write a compressed archive and exit 0
    Succeed,
    /// Exit with the given code without writing anything
    Exit(i32),
    /// Write an uncompressed archive and exit 0
    WriteUncompressed,
    /// Block until cancelled
    Hang,
    /// Panic inside the fetch call
    Panic,
}

/// Fetch runner writing archive files the way wget-lua would
pub(crate) struct FakeFetchRunner {
    behavior: FetchBehavior,
    calls: AtomicUsize,
    started: Notify,
}

impl FakeFetchRunner {
    pub(crate) fn new(behavior: FetchBehavior) -> Self {
        Self {
            behavior,
            calls: AtomicUsize::new(0),
            started: Notify::new(),
        }
    }
}

#[async_trait]
impl FetchRunner for FakeFetchRunner {
    async fn run(
        &self,
        invocation: &FetchInvocation,
        cancel: &CancellationToken,
    ) -> Result<ExitOutcome> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.started.notify_one();

        let stem = invocation.flag_value("--warc-file").unwrap().to_string();
        match self.behavior {
            FetchBehavior::Succeed => {
                std::fs::write(format!("{stem}.warc.gz"), b"WARC/1.0 fake record").unwrap();
                Ok(ExitOutcome::code(0))
            }
            FetchBehavior::Exit(code) => Ok(ExitOutcome::code(code)),
            FetchBehavior::WriteUncompressed => {
                std::fs::write(format!("{stem}.warc"), b"WARC/1.0 plain").unwrap();
                Ok(ExitOutcome::code(0))
            }
            FetchBehavior::Hang => {
                cancel.cancelled().await;
                Err(Error::Cancelled)
            }
            FetchBehavior::Panic => panic!("fetch process crashed"),
        }
    }

    fn name(&self) -> &'static str {
        "fake-fetch"
    }
}

/// Transfer runner counting uploads
#[derive(Default)]
pub(crate) struct FakeTransfer {
    calls: AtomicUsize,
}

#[async_trait]
impl TransferRunner for FakeTransfer {
    async fn transfer(&self, request: &TransferRequest, _cancel: &CancellationToken) -> Result<()> {
        for file in &request.files {
            assert!(request.source_dir.join(file).exists(), "{file:?} missing");
        }
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn name(&self) -> &'static str {
        "fake-transfer"
    }
}

/// Resolver giving every distinct host its own address
#[derive(Default)]
pub(crate) struct DistinctResolver {
    assigned: Mutex<HashMap<String, IpAddr>>,
}

#[async_trait]
impl Resolver for DistinctResolver {
    async fn resolve(&self, host: &str) -> std::io::Result<Vec<IpAddr>> {
        let mut assigned = self.assigned.lock().unwrap();
        let next = assigned.len() as u8 + 1;
        let ip = *assigned
            .entry(host.to_string())
            .or_insert(IpAddr::V4(Ipv4Addr::new(192, 0, 2, next)));
        Ok(vec![ip])
    }
}

pub(crate) struct HarnessBuilder {
    behavior: FetchBehavior,
    probe_status: u16,
    items: Vec<String>,
    concurrent_items: usize,
    max_items: Option<u64>,
}

impl HarnessBuilder {
    pub(crate) fn behavior(mut self, behavior: FetchBehavior) -> Self {
        self.behavior = behavior;
        self
    }

    pub(crate) fn probe_status(mut self, status: u16) -> Self {
        self.probe_status = status;
        self
    }

    pub(crate) fn items(mut self, items: &[&str]) -> Self {
        self.items = items.iter().map(|s| s.to_string()).collect();
        self
    }

    pub(crate) fn concurrent_items(mut self, n: usize) -> Self {
        self.concurrent_items = n;
        self
    }

    pub(crate) fn max_items(mut self, n: u64) -> Self {
        self.max_items = Some(n);
        self
    }

    pub(crate) async fn start(self) -> Harness {
        let server = MockServer::start().await;
        let temp = TempDir::new().unwrap();

        Mock::given(method("GET"))
            .and(path("/2"))
            .respond_with(ResponseTemplate::new(self.probe_status))
            .mount(&server)
            .await;
        for item in &self.items {
            Mock::given(method("POST"))
                .and(path("/twitpic2/request"))
                .respond_with(
                    ResponseTemplate::new(200)
                        .set_body_json(serde_json::json!({ "item_name": item })),
                )
                .up_to_n_times(1)
                .mount(&server)
                .await;
        }
        Mock::given(method("POST"))
            .and(path("/twitpic2/request"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/twitpic2/upload"))
            .respond_with(ResponseTemplate::new(200).set_body_string("rsync://fake/twitpic2/"))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/twitpic2/done"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let mut config = Config::default();
        config.worker.downloader = "tester".to_string();
        config.worker.data_dir = temp.path().join("data");
        config.worker.concurrent_items = self.concurrent_items;
        config.worker.max_items = self.max_items;
        config.worker.idle_delay = Duration::from_millis(10);
        config.tracker.host = server.address().to_string();
        config.tracker.retry = no_retry();
        config.guard.ban_probe_url = format!("{}/2", server.uri());
        config.fetch.attempt_delay = Duration::from_millis(1);
        config.upload.retry = no_retry();
        config.disk_space.min_free_bytes = 1;

        let fetch = Arc::new(FakeFetchRunner::new(self.behavior));
        let transfer = Arc::new(FakeTransfer::default());
        let components = Components {
            executable: PathBuf::from("wget-lua"),
            fetch_runner: fetch.clone(),
            transfer_runner: transfer.clone(),
            resolver: Arc::new(DistinctResolver::default()),
        };
        let orchestrator = Orchestrator::with_components(config, components)
            .await
            .unwrap();

        Harness {
            orchestrator,
            server,
            fetch,
            transfer,
            _temp: temp,
        }
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

/// Orchestrator wired to fakes and a mock tracker
pub(crate) struct Harness {
    pub(crate) orchestrator: Orchestrator,
    pub(crate) server: MockServer,
    fetch: Arc<FakeFetchRunner>,
    transfer: Arc<FakeTransfer>,
    _temp: TempDir,
}

impl Harness {
    pub(crate) fn builder() -> HarnessBuilder {
        HarnessBuilder {
            behavior: FetchBehavior::Succeed,
            probe_status: 200,
            items: Vec::new(),
            concurrent_items: 1,
            max_items: None,
        }
    }

    pub(crate) async fn start(behavior: FetchBehavior) -> Self {
        Self::builder().behavior(behavior).start().await
    }

    pub(crate) fn data_dir(&self) -> &Path {
        self.orchestrator.config.data_dir()
    }

    pub(crate) fn fetch_calls(&self) -> usize {
        self.fetch.calls.load(Ordering::SeqCst)
    }

    pub(crate) fn transfers(&self) -> usize {
        self.transfer.calls.load(Ordering::SeqCst)
    }

    pub(crate) async fn wait_for_fetch_start(&self) {
        tokio::time::timeout(Duration::from_secs(5), self.fetch.started.notified())
            .await
            .unwrap();
    }

    /// Requests the mock tracker received on `endpoint` (e.g. "request", "done")
    pub(crate) async fn tracker_calls(&self, endpoint: &str) -> usize {
        let wanted = format!("/twitpic2/{endpoint}");
        self.server
            .received_requests()
            .await
            .unwrap_or_default()
            .iter()
            .filter(|r| r.url.path() == wanted)
            .count()
    }
}

/// Every event currently buffered in a receiver
pub(crate) fn drain(rx: &mut broadcast::Receiver<Event>) -> Vec<Event> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}
