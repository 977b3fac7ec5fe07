//! Fake collaborators plugged in through the orchestrator's trait seams

use async_trait::async_trait;
use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;
use warc_worker::{
    Components, Error, ExitOutcome, FetchInvocation, FetchRunner, Resolver, Result,
    TransferRequest, TransferRunner, UploadError,
};

/// Scripted fetch result
#[derive(Debug, Clone, Copy)]
pub enum FetchScript {
    /// Write `<stem>.warc.gz` (and a scrape text file) then exit 0
    Archive,
    /// Exit with a code without writing anything
    Exit(i32),
    /// Write an uncompressed `<stem>.warc` then exit 0
    Uncompressed,
}

/// Fetch runner that emulates wget-lua output files
pub struct ScriptedFetch {
    script: FetchScript,
    calls: AtomicUsize,
    invocations: Mutex<Vec<FetchInvocation>>,
}

impl ScriptedFetch {
    pub fn new(script: FetchScript) -> Self {
        Self {
            script,
            calls: AtomicUsize::new(0),
            invocations: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn invocations(&self) -> Vec<FetchInvocation> {
        self.invocations.lock().unwrap().clone()
    }
}

#[async_trait]
impl FetchRunner for ScriptedFetch {
    async fn run(
        &self,
        invocation: &FetchInvocation,
        _cancel: &CancellationToken,
    ) -> Result<ExitOutcome> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.invocations.lock().unwrap().push(invocation.clone());

        let stem = invocation
            .flag_value("--warc-file")
            .expect("invocation names the archive")
            .to_string();
        match self.script {
            FetchScript::Archive => {
                tokio::fs::write(format!("{stem}.warc.gz"), vec![0x1f; 512])
                    .await
                    .unwrap();
                // the fetch script records discovered usernames next to the archive
                let item_dir = PathBuf::from(invocation.env_value("item_dir").unwrap());
                let escaped = invocation.env_value("escaped_item_name").unwrap();
                tokio::fs::write(
                    item_dir.join(format!("twitpic2-scrape-{escaped}.txt")),
                    "alice\nbob\n",
                )
                .await
                .unwrap();
                Ok(ExitOutcome::code(0))
            }
            FetchScript::Exit(code) => Ok(ExitOutcome::code(code)),
            FetchScript::Uncompressed => {
                tokio::fs::write(format!("{stem}.warc"), b"WARC/1.0")
                    .await
                    .unwrap();
                Ok(ExitOutcome::code(0))
            }
        }
    }

    fn name(&self) -> &'static str {
        "scripted-fetch"
    }
}

/// Transfer runner recording every request
#[derive(Default)]
pub struct RecordingTransfer {
    fail_with: Option<i32>,
    requests: Mutex<Vec<TransferRequest>>,
}

impl RecordingTransfer {
    /// A transfer that always exits with `code`
    pub fn failing(code: i32) -> Self {
        Self {
            fail_with: Some(code),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<TransferRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl TransferRunner for RecordingTransfer {
    async fn transfer(&self, request: &TransferRequest, _cancel: &CancellationToken) -> Result<()> {
        self.requests.lock().unwrap().push(request.clone());
        match self.fail_with {
            Some(code) => Err(Error::from(UploadError::TransferFailed { code: Some(code) })),
            None => Ok(()),
        }
    }

    fn name(&self) -> &'static str {
        "recording-transfer"
    }
}

/// Resolver answering from a fixed table, or with one address per host
#[derive(Default)]
pub struct StaticResolver {
    table: HashMap<String, IpAddr>,
    fallback: Mutex<HashMap<String, IpAddr>>,
}

impl StaticResolver {
    /// Every host resolves to the same address, as behind a transparent proxy
    pub fn collapsed(hosts: &[String]) -> Self {
        let addr = IpAddr::V4(Ipv4Addr::new(198, 51, 100, 1));
        Self {
            table: hosts.iter().map(|h| (h.clone(), addr)).collect(),
            fallback: Mutex::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl Resolver for StaticResolver {
    async fn resolve(&self, host: &str) -> std::io::Result<Vec<IpAddr>> {
        if let Some(addr) = self.table.get(host) {
            return Ok(vec![*addr]);
        }
        let mut fallback = self.fallback.lock().unwrap();
        let next = fallback.len() as u8 + 1;
        let addr = *fallback
            .entry(host.to_string())
            .or_insert(IpAddr::V4(Ipv4Addr::new(203, 0, 113, next)));
        Ok(vec![addr])
    }
}

/// Fakes shared between a test and the orchestrator it builds
pub struct Fakes {
    pub fetch: Arc<ScriptedFetch>,
    pub transfer: Arc<RecordingTransfer>,
    pub resolver: Arc<StaticResolver>,
}

impl Fakes {
    pub fn new(script: FetchScript) -> Self {
        Self {
            fetch: Arc::new(ScriptedFetch::new(script)),
            transfer: Arc::new(RecordingTransfer::default()),
            resolver: Arc::new(StaticResolver::default()),
        }
    }

    pub fn with_transfer(mut self, transfer: RecordingTransfer) -> Self {
        self.transfer = Arc::new(transfer);
        self
    }

    pub fn with_resolver(mut self, resolver: StaticResolver) -> Self {
        self.resolver = Arc::new(resolver);
        self
    }

    pub fn components(&self) -> Components {
        Components {
            executable: PathBuf::from("/usr/local/bin/wget-lua"),
            fetch_runner: self.fetch.clone(),
            transfer_runner: self.transfer.clone(),
            resolver: self.resolver.clone(),
        }
    }
}
