//! Traits and types for running the fetch process

use crate::error::Result;
use async_trait::async_trait;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;

/// Everything needed to start one fetch process
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchInvocation {
    /// Executable to run
    pub program: PathBuf,
    /// Command-line arguments, in order
    pub args: Vec<String>,
    /// Extra environment variables for the child
    pub env: Vec<(String, String)>,
    /// Working directory (None = inherit)
    pub working_dir: Option<PathBuf>,
}

impl FetchInvocation {
    /// Value following the first occurrence of `flag`, if any
    pub fn flag_value(&self, flag: &str) -> Option<&str> {
        self.args
            .iter()
            .position(|a| a == flag)
            .and_then(|i| self.args.get(i + 1))
            .map(String::as_str)
    }

    /// Every value following occurrences of `flag`
    pub fn flag_values<'a>(&'a self, flag: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.args
            .windows(2)
            .filter(move |w| w[0] == flag)
            .map(|w| w[1].as_str())
    }

    /// Environment value by name
    pub fn env_value(&self, name: &str) -> Option<&str> {
        self.env
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }
}

/// How a fetch process ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitOutcome {
    /// Exit code; None when the process was killed by a signal
    pub code: Option<i32>,
}

impl ExitOutcome {
    /// Outcome with the given exit code
    pub fn code(code: i32) -> Self {
        Self { code: Some(code) }
    }
}

/// Runs a prepared fetch invocation to completion
///
/// Implementations must stop the child and return
/// [`Error::Cancelled`](crate::Error::Cancelled) once `cancel` fires.
#[async_trait]
pub trait FetchRunner: Send + Sync {
    /// Run the process and report how it exited
    async fn run(
        &self,
        invocation: &FetchInvocation,
        cancel: &CancellationToken,
    ) -> Result<ExitOutcome>;

    /// Name of this runner for logging
    fn name(&self) -> &'static str;
}
