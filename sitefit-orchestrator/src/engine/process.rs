//! Engine subprocess supervision

use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use sitefit_core::domain::log::LogStream;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{EngineError, EngineInvocation, EngineOutcome, EngineRunner, ExitInfo};
use crate::repository::JobLog;

/// Upper bound on waiting for output readers once the process is gone
const READER_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Runs the engine as a child process in its own process group
///
/// Stopping the engine signals the whole group, so worker processes the
/// engine forked are stopped with it.
#[derive(Debug, Clone)]
pub struct ProcessEngine {
    termination_grace: Duration,
}

impl ProcessEngine {
    pub fn new(termination_grace: Duration) -> Self {
        Self { termination_grace }
    }

    /// SIGTERM, then SIGKILL once the grace period is over
    async fn terminate(&self, child: &mut Child, log: &JobLog) -> Result<ExitInfo, EngineError> {
        let Some(pid) = child.id() else {
            // Already reaped.
            return child.wait().await.map(exit_info).map_err(EngineError::Wait);
        };

        signal_group(pid, Stop::Graceful);
        match tokio::time::timeout(self.termination_grace, child.wait()).await {
            Ok(status) => status.map(exit_info).map_err(EngineError::Wait),
            Err(_) => {
                log.append(
                    LogStream::Orchestrator,
                    format!(
                        "engine did not stop within {}s, killing it",
                        self.termination_grace.as_secs()
                    ),
                );
                signal_group(pid, Stop::Forced);
                child.start_kill().ok();
                child.wait().await.map(exit_info).map_err(EngineError::Wait)
            }
        }
    }
}

#[async_trait]
impl EngineRunner for ProcessEngine {
    async fn run(
        &self,
        invocation: EngineInvocation,
        log: Arc<JobLog>,
        cancel: CancellationToken,
    ) -> Result<EngineOutcome, EngineError> {
        let mut command = Command::new(&invocation.program);
        command
            .args(&invocation.args)
            .current_dir(&invocation.working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        #[cfg(unix)]
        command.process_group(0);

        let mut child = command.spawn().map_err(|source| EngineError::Launch {
            program: invocation.program.clone(),
            source,
        })?;
        info!(
            "Engine started (pid {:?}) in {}",
            child.id(),
            invocation.working_dir.display()
        );

        let readers = [
            child
                .stdout
                .take()
                .map(|out| spawn_reader(out, LogStream::Stdout, Arc::clone(&log))),
            child
                .stderr
                .take()
                .map(|err| spawn_reader(err, LogStream::Stderr, Arc::clone(&log))),
        ];

        let deadline = tokio::time::sleep(invocation.timeout);
        tokio::pin!(deadline);

        let outcome = tokio::select! {
            status = child.wait() => EngineOutcome::Exited(exit_info(status.map_err(EngineError::Wait)?)),
            _ = cancel.cancelled() => {
                log.append(LogStream::Orchestrator, "cancellation requested, stopping engine");
                EngineOutcome::Cancelled(self.terminate(&mut child, &log).await?)
            }
            _ = &mut deadline => {
                log.append(
                    LogStream::Orchestrator,
                    format!(
                        "engine exceeded its {}s time limit, stopping it",
                        invocation.timeout.as_secs_f64()
                    ),
                );
                EngineOutcome::TimedOut(self.terminate(&mut child, &log).await?)
            }
        };

        for reader in readers.into_iter().flatten() {
            let abort = reader.abort_handle();
            if tokio::time::timeout(READER_DRAIN_TIMEOUT, reader).await.is_err() {
                warn!("Engine output reader did not finish, abandoning it");
                abort.abort();
            }
        }

        debug!("Engine finished: {:?}", outcome);
        Ok(outcome)
    }
}

/// Copies `stream` into the job log line by line
fn spawn_reader<R>(stream: R, kind: LogStream, log: Arc<JobLog>) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut reader = BufReader::new(stream);
        let mut buf = Vec::new();
        loop {
            buf.clear();
            match reader.read_until(b'\n', &mut buf).await {
                Ok(0) => break,
                Ok(_) => {
                    let line = String::from_utf8_lossy(&buf);
                    log.append(kind, line.trim_end_matches(['\n', '\r']));
                }
                Err(e) => {
                    warn!("Failed to read engine {}: {}", kind, e);
                    break;
                }
            }
        }
    })
}

fn exit_info(status: ExitStatus) -> ExitInfo {
    #[cfg(unix)]
    let signal = std::os::unix::process::ExitStatusExt::signal(&status);
    #[cfg(not(unix))]
    let signal = None;

    ExitInfo {
        exit_code: status.code(),
        signal,
    }
}

#[derive(Debug, Clone, Copy)]
enum Stop {
    Graceful,
    Forced,
}

#[cfg(unix)]
fn signal_group(pid: u32, stop: Stop) {
    use nix::sys::signal::{Signal, killpg};
    use nix::unistd::Pid;

    let signal = match stop {
        Stop::Graceful => Signal::SIGTERM,
        Stop::Forced => Signal::SIGKILL,
    };
    let Ok(raw) = i32::try_from(pid) else {
        return;
    };
    if let Err(e) = killpg(Pid::from_raw(raw), signal) {
        debug!("Failed to send {} to process group {}: {}", signal, raw, e);
    }
}

#[cfg(not(unix))]
fn signal_group(_pid: u32, _stop: Stop) {}
