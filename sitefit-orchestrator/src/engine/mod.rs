//! External crawl engine boundary
//!
//! - `args`: translation of a job into the engine's command line
//! - `process`: subprocess supervision (log streaming, timeout, termination)
//! - `manifest`: discovery and parsing of the engine's output manifest

pub mod args;
pub mod manifest;
pub mod process;

use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::repository::JobLog;

pub use process::ProcessEngine;

/// A fully resolved engine command
#[derive(Debug, Clone)]
pub struct EngineInvocation {
    pub program: String,
    pub args: Vec<String>,
    pub working_dir: PathBuf,
    /// Wall-clock budget, measured from spawn
    pub timeout: Duration,
}

/// How the engine process ended
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExitInfo {
    pub exit_code: Option<i32>,
    pub signal: Option<i32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineOutcome {
    /// The engine exited on its own
    Exited(ExitInfo),
    /// Stopped because the job was cancelled
    Cancelled(ExitInfo),
    /// Stopped because it ran past its deadline
    TimedOut(ExitInfo),
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("failed to launch `{program}`: {source}")]
    Launch {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("lost track of the engine process: {0}")]
    Wait(#[source] io::Error),
}

/// Runs one engine invocation to completion
///
/// Output lines go to `log` as they are produced. Implementations must stop
/// the engine when `cancel` fires or the invocation's timeout elapses.
#[async_trait]
pub trait EngineRunner: Send + Sync {
    async fn run(
        &self,
        invocation: EngineInvocation,
        log: Arc<JobLog>,
        cancel: CancellationToken,
    ) -> Result<EngineOutcome, EngineError>;
}
