//! Environment checks run before each item
//!
//! Two checks gate every item:
//! - a liveness probe against the target site; an access-denial status means
//!   this network identity is banned
//! - a DNS check that resolves a set of unrelated hostnames; if they collapse
//!   onto fewer distinct addresses than hosts, a transparent proxy or firewall
//!   is rewriting traffic
//!
//! The DNS check is throttled to every n-th call. The call counter belongs to
//! the guard instance and is shared by all pipelines using it.

use crate::config::GuardConfig;
use crate::error::{Error, GuardError, Result};
use async_trait::async_trait;
use std::collections::BTreeSet;
use std::net::IpAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, info, warn};

/// Status the target answers with once an address is banned
const BANNED_STATUS: u16 = 403;

/// Hostname resolution used by the DNS check
#[async_trait]
pub trait Resolver: Send + Sync {
    /// Resolve `host` to its addresses
    async fn resolve(&self, host: &str) -> std::io::Result<Vec<IpAddr>>;
}

/// Resolver backed by the system resolver via tokio
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemResolver;

#[async_trait]
impl Resolver for SystemResolver {
    async fn resolve(&self, host: &str) -> std::io::Result<Vec<IpAddr>> {
        let addrs = tokio::net::lookup_host((host, 80)).await?;
        Ok(addrs.map(|addr| addr.ip()).collect())
    }
}

/// Validates that the network environment is safe to archive from
pub struct EnvironmentGuard {
    config: GuardConfig,
    client: reqwest::Client,
    resolver: Arc<dyn Resolver>,
    calls: AtomicU64,
}

impl EnvironmentGuard {
    /// Create a guard using the system resolver
    pub fn new(config: GuardConfig) -> Result<Self> {
        Self::with_resolver(config, Arc::new(SystemResolver))
    }

    /// Create a guard with a custom resolver
    pub fn with_resolver(config: GuardConfig, resolver: Arc<dyn Resolver>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.probe_timeout)
            .build()?;

        Ok(Self {
            config,
            client,
            resolver,
            calls: AtomicU64::new(0),
        })
    }

    /// Run the environment checks
    ///
    /// The ban probe runs on every call; the DNS check on the first call and
    /// then every `dns_check_interval` calls.
    pub async fn check(&self) -> Result<()> {
        if !self.config.enabled {
            return Ok(());
        }

        self.check_not_banned().await?;

        if self.dns_check_due() {
            self.check_not_proxied().await?;
        }
        Ok(())
    }

    /// Number of times [`check`](Self::check) has reached the throttle
    pub fn checks_performed(&self) -> u64 {
        self.calls.load(Ordering::Relaxed)
    }

    fn dns_check_due(&self) -> bool {
        let call = self.calls.fetch_add(1, Ordering::Relaxed);
        call % self.config.dns_check_interval.max(1) == 0
    }

    async fn check_not_banned(&self) -> Result<()> {
        let url = &self.config.ban_probe_url;
        let response =
            self.client
                .get(url)
                .send()
                .await
                .map_err(|e| GuardError::ProbeFailed {
                    url: url.clone(),
                    reason: e.to_string(),
                })?;

        let status = response.status().as_u16();
        debug!(url = %url, status, "liveness probe answered");

        if status == BANNED_STATUS {
            return Err(GuardError::Banned {
                url: url.clone(),
                status,
            }
            .into());
        }
        Ok(())
    }

    async fn check_not_proxied(&self) -> Result<()> {
        info!(
            hosts = self.config.dns_check_hosts.len(),
            "checking for transparent proxy"
        );

        let mut addresses = BTreeSet::new();
        for host in &self.config.dns_check_hosts {
            let resolved =
                self.resolver
                    .resolve(host)
                    .await
                    .map_err(|e| GuardError::ResolveFailed {
                        host: host.clone(),
                        reason: e.to_string(),
                    })?;

            // One address per host: prefer IPv4, like a plain gethostbyname
            let first = resolved
                .iter()
                .find(|ip| ip.is_ipv4())
                .or_else(|| resolved.first())
                .copied()
                .ok_or_else(|| GuardError::ResolveFailed {
                    host: host.clone(),
                    reason: "no addresses returned".to_string(),
                })?;
            addresses.insert(first);
        }

        let expected = self.config.dns_check_hosts.len();
        if addresses.len() < expected {
            warn!(
                distinct = addresses.len(),
                expected,
                ?addresses,
                "DNS answers collapsed; behind a firewall or proxy"
            );
            return Err(Error::Guard(GuardError::ProxyDetected {
                distinct: addresses.len(),
                expected,
                addresses: addresses.into_iter().collect(),
            }));
        }
        Ok(())
    }
}
