//! Job execution routine
//!
//! Drives one admitted job from `Queued` to a terminal state. Every failure
//! is recorded on the job itself; nothing escapes to the caller.

use std::sync::Arc;
use std::time::Duration;

use sitefit_core::domain::job::{Job, JobError, JobErrorKind, JobOutcome};
use sitefit_core::domain::log::LogStream;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::{EngineSettings, OrchestratorConfig};
use crate::engine::{
    EngineError, EngineInvocation, EngineOutcome, EngineRunner, ExitInfo, args, manifest,
};
use crate::repository::JobHandle;
use crate::scheduler::Admission;
use crate::workspace::Workspace;

pub struct JobExecutor {
    engine: Arc<dyn EngineRunner>,
    settings: EngineSettings,
    job_timeout: Duration,
    log_tail_lines: usize,
    shutdown: CancellationToken,
}

impl JobExecutor {
    pub fn new(
        engine: Arc<dyn EngineRunner>,
        config: &OrchestratorConfig,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            engine,
            settings: config.engine.clone(),
            job_timeout: config.job_timeout,
            log_tail_lines: config.log_tail_lines,
            shutdown,
        }
    }

    /// Runs the job if it was admitted, settles it as cancelled otherwise
    ///
    /// The admission permit is held until the terminal state is committed.
    pub async fn run(&self, handle: JobHandle, admission: Admission) {
        let _permit = match admission {
            Admission::Granted(permit) if !handle.cancel_token().is_cancelled() => permit,
            _ => {
                let error = self.cancellation_error(&handle, ExitInfo::default());
                self.settle(&handle, JobOutcome::Cancelled(error)).await;
                return;
            }
        };

        let job = match handle.start().await {
            Ok(job) => job,
            Err(e) => {
                warn!(job_id = %handle.id(), "Job cannot start: {}", e);
                return;
            }
        };
        info!(job_id = %job.id, "Job started");
        handle.log().append(LogStream::Orchestrator, "job started");

        let outcome = self.execute(&handle, &job).await;
        self.settle(&handle, outcome).await;
    }

    async fn execute(&self, handle: &JobHandle, job: &Job) -> JobOutcome {
        let log = handle.log();
        let workspace = Workspace::open(&job.workspace_path);

        let written = {
            let workspace = workspace.clone();
            let (points, origin, direction) =
                (job.footprint_points.clone(), job.front_origin, job.front_direction);
            tokio::task::spawn_blocking(move || {
                workspace
                    .write_footprint(&points, origin, direction)
                    .map_err(|e| e.to_string())
            })
            .await
            .unwrap_or_else(|e| Err(e.to_string()))
        };
        if let Err(e) = written {
            return self.failed(
                handle,
                JobErrorKind::EngineLaunchFailure,
                format!("failed to write engine input: {e}"),
                ExitInfo::default(),
            );
        }

        let args = match args::build_args(&self.settings, job, &workspace) {
            Ok(args) => args,
            Err(e) => {
                return self.failed(
                    handle,
                    JobErrorKind::EngineLaunchFailure,
                    e.to_string(),
                    ExitInfo::default(),
                );
            }
        };

        log.append(
            LogStream::Orchestrator,
            format!("launching engine: {} {}", self.settings.program, args.join(" ")),
        );
        let invocation = EngineInvocation {
            program: self.settings.program.clone(),
            args,
            working_dir: workspace.path().to_path_buf(),
            timeout: self.job_timeout,
        };

        match self
            .engine
            .run(invocation, Arc::clone(log), handle.cancel_token())
            .await
        {
            Err(e @ EngineError::Launch { .. }) => self.failed(
                handle,
                JobErrorKind::EngineLaunchFailure,
                e.to_string(),
                ExitInfo::default(),
            ),
            Err(e @ EngineError::Wait(_)) => self.failed(
                handle,
                JobErrorKind::EngineExecutionFailure,
                e.to_string(),
                ExitInfo::default(),
            ),
            Ok(EngineOutcome::Cancelled(exit)) => {
                JobOutcome::Cancelled(self.cancellation_error(handle, exit))
            }
            Ok(EngineOutcome::TimedOut(exit)) => self.failed(
                handle,
                JobErrorKind::EngineTimeout,
                format!(
                    "engine exceeded the {}s time limit",
                    self.job_timeout.as_secs_f64()
                ),
                exit,
            ),
            Ok(EngineOutcome::Exited(exit)) => {
                let name = self.settings.manifest_name.clone();
                let loaded = tokio::task::spawn_blocking(move || {
                    manifest::load(&workspace, &name, exit.exit_code).map_err(|e| e.to_string())
                })
                .await
                .unwrap_or_else(|e| Err(e.to_string()));
                match loaded {
                    Ok(manifest) => JobOutcome::Succeeded(manifest),
                    Err(e) => self.failed(
                        handle,
                        JobErrorKind::EngineExecutionFailure,
                        format!("{}: {e}", describe_exit(exit)),
                        exit,
                    ),
                }
            }
        }
    }

    fn failed(
        &self,
        handle: &JobHandle,
        kind: JobErrorKind,
        message: String,
        exit: ExitInfo,
    ) -> JobOutcome {
        handle.log().append(LogStream::Orchestrator, &message);
        JobOutcome::Failed(self.error(handle, kind, message, exit))
    }

    fn cancellation_error(&self, handle: &JobHandle, exit: ExitInfo) -> JobError {
        let message = match handle.cancel_reason() {
            Some(reason) => format!("cancelled: {reason}"),
            None if self.shutdown.is_cancelled() => "orchestrator shutting down".to_string(),
            None => "cancelled by request".to_string(),
        };
        self.error(handle, JobErrorKind::CancellationRequested, message, exit)
    }

    fn error(&self, handle: &JobHandle, kind: JobErrorKind, message: String, exit: ExitInfo) -> JobError {
        JobError::new(kind, message)
            .with_exit(exit.exit_code, exit.signal)
            .with_log_tail(handle.log().tail_lines(self.log_tail_lines))
    }

    async fn settle(&self, handle: &JobHandle, outcome: JobOutcome) {
        let status = outcome.status();
        handle
            .log()
            .append(LogStream::Orchestrator, format!("job {status}"));
        match handle.finish(outcome).await {
            Ok(job) => info!(job_id = %job.id, "Job finished: {}", job.status),
            Err(e) => warn!(job_id = %handle.id(), "Dropping terminal update: {}", e),
        }
    }
}

fn describe_exit(exit: ExitInfo) -> String {
    match (exit.exit_code, exit.signal) {
        (Some(code), _) => format!("engine exited with code {code}"),
        (None, Some(signal)) => format!("engine was killed by signal {signal}"),
        (None, None) => "engine exited".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_describe_exit() {
        let code = ExitInfo {
            exit_code: Some(2),
            signal: None,
        };
        assert_eq!(describe_exit(code), "engine exited with code 2");

        let signal = ExitInfo {
            exit_code: None,
            signal: Some(9),
        };
        assert_eq!(describe_exit(signal), "engine was killed by signal 9");
    }
}
