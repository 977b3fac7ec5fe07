//! Fetch process command line and environment
//!
//! Builds the wget-lua invocation for one attempt at an item. Identity headers
//! (user agent, Accept-Language) are drawn again for every attempt.

use super::traits::FetchInvocation;
use crate::config::FetchConfig;
use crate::types::WorkItem;
use crate::workspace::Workspace;
use rand::Rng;
use rand::seq::SliceRandom;
use std::path::Path;

/// Operator named in every archive's provenance headers
const OPERATOR: &str = "Archive Team";

/// Who is running the fetch, for provenance headers and the child environment
#[derive(Debug, Clone)]
pub struct Provenance {
    /// Downloader nickname
    pub downloader: String,
    /// Fetch logic version
    pub version: String,
    /// Prefix of the provenance header names, e.g. `twitpic2`
    pub header_prefix: String,
}

/// Build the invocation for one fetch attempt
pub fn build_invocation<R: Rng + ?Sized>(
    config: &FetchConfig,
    provenance: &Provenance,
    executable: &Path,
    item: &WorkItem,
    workspace: &Workspace,
    rng: &mut R,
) -> FetchInvocation {
    let mut args: Vec<String> = Vec::with_capacity(64);

    if let Some(ua) = config.user_agents.choose(rng) {
        args.extend(["-U".to_string(), ua.clone()]);
    }
    args.push("-nv".to_string());
    if let Some(script) = &config.script {
        args.extend(["--lua-script".to_string(), script.display().to_string()]);
    }
    args.extend([
        "-o".to_string(),
        workspace.fetch_log_path().display().to_string(),
        "--no-check-certificate".to_string(),
        "--output-document".to_string(),
        workspace.fetch_tmp_path().display().to_string(),
        "--truncate-output".to_string(),
        "-e".to_string(),
        "robots=off".to_string(),
        "--no-cookies".to_string(),
        "--rotate-dns".to_string(),
        "--no-parent".to_string(),
        "--timeout".to_string(),
        config.timeout.as_secs().to_string(),
        "--tries".to_string(),
        "inf".to_string(),
        "--span-hosts".to_string(),
        "--waitretry".to_string(),
        config.retry_wait.as_secs().to_string(),
        "--domains".to_string(),
        config.domains.join(","),
        "--warc-file".to_string(),
        workspace.warc_stem_path().display().to_string(),
    ]);

    for header in [
        format!("operator: {OPERATOR}"),
        format!(
            "{}-dld-script-version: {}",
            provenance.header_prefix, provenance.version
        ),
        format!("{}-user: {}", provenance.header_prefix, item.name),
    ] {
        args.extend(["--warc-header".to_string(), header]);
    }

    for header in &config.extra_headers {
        args.extend(["--header".to_string(), header.clone()]);
    }
    if let Some(lang) = config.accept_language_headers.choose(rng) {
        args.extend(["--header".to_string(), lang.clone()]);
    }

    args.extend(item.kind.fetch_urls(&config.url_template));

    if let Some(addr) = config.bind_address {
        args.extend(["--bind-address".to_string(), addr.to_string()]);
    }

    let env = vec![
        (
            "item_dir".to_string(),
            workspace.item_dir.display().to_string(),
        ),
        ("item_value".to_string(), item.value.clone()),
        ("item_type".to_string(), item.item_type().to_string()),
        ("escaped_item_name".to_string(), item.escaped_name.clone()),
        ("downloader".to_string(), provenance.downloader.clone()),
    ];

    FetchInvocation {
        program: executable.to_path_buf(),
        args,
        env,
        working_dir: None,
    }
}
