//! Job domain types and the job state machine

use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::domain::config::CrawlConfig;
use crate::geometry::Point;

/// One site-fit run
///
/// Inputs are captured at submission and never change afterwards. Only the
/// lifecycle fields (`status`, timestamps, `result`, `error`) move, and only
/// through [`Job::start`] and [`Job::finish`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: Uuid,
    pub status: JobStatus,
    pub address: String,
    pub dxf_source: String,
    pub config: CrawlConfig,
    pub footprint_points: Vec<Point>,
    pub front_origin: Point,
    pub front_direction: Point,
    pub workspace_path: PathBuf,
    pub requested_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub result: Option<ResultManifest>,
    pub error: Option<JobError>,
}

/// Validated submission inputs
#[derive(Debug, Clone, PartialEq)]
pub struct JobInput {
    pub address: String,
    pub dxf_source: String,
    pub config: CrawlConfig,
    pub footprint_points: Vec<Point>,
    pub front_origin: Point,
    pub front_direction: Point,
}

/// Job lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Running,
    Succeeded,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Cancelled)
    }

    pub fn can_transition_to(self, next: JobStatus) -> bool {
        use JobStatus::*;
        matches!(
            (self, next),
            (Queued, Running) | (Queued, Cancelled) | (Running, Succeeded | Failed | Cancelled)
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Running => "running",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Terminal outcome handed to [`Job::finish`]
#[derive(Debug, Clone)]
pub enum JobOutcome {
    Succeeded(ResultManifest),
    Failed(JobError),
    Cancelled(JobError),
}

impl JobOutcome {
    pub fn status(&self) -> JobStatus {
        match self {
            Self::Succeeded(_) => JobStatus::Succeeded,
            Self::Failed(_) => JobStatus::Failed,
            Self::Cancelled(_) => JobStatus::Cancelled,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("illegal job transition {from} -> {to}")]
pub struct TransitionError {
    pub from: JobStatus,
    pub to: JobStatus,
}

impl Job {
    pub fn new(id: Uuid, input: JobInput, workspace_path: PathBuf) -> Self {
        Self {
            id,
            status: JobStatus::Queued,
            address: input.address,
            dxf_source: input.dxf_source,
            config: input.config,
            footprint_points: input.footprint_points,
            front_origin: input.front_origin,
            front_direction: input.front_direction,
            workspace_path,
            requested_at: Utc::now(),
            started_at: None,
            finished_at: None,
            result: None,
            error: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    fn check(&self, to: JobStatus) -> Result<(), TransitionError> {
        if self.status.can_transition_to(to) {
            Ok(())
        } else {
            Err(TransitionError {
                from: self.status,
                to,
            })
        }
    }

    /// `Queued -> Running`
    pub fn start(&mut self, at: DateTime<Utc>) -> Result<(), TransitionError> {
        self.check(JobStatus::Running)?;
        self.status = JobStatus::Running;
        self.started_at = Some(at);
        Ok(())
    }

    /// Moves into a terminal state, recording the manifest or the error
    ///
    /// Terminal states have no outgoing transitions, so `result` and `error`
    /// can only ever be written once.
    pub fn finish(&mut self, outcome: JobOutcome, at: DateTime<Utc>) -> Result<(), TransitionError> {
        self.check(outcome.status())?;
        self.status = outcome.status();
        self.finished_at = Some(at);
        match outcome {
            JobOutcome::Succeeded(manifest) => self.result = Some(manifest),
            JobOutcome::Failed(error) | JobOutcome::Cancelled(error) => self.error = Some(error),
        }
        Ok(())
    }
}

/// Failure class recorded on a terminal job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobErrorKind {
    EngineLaunchFailure,
    EngineExecutionFailure,
    EngineTimeout,
    CancellationRequested,
}

impl fmt::Display for JobErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::EngineLaunchFailure => "engine_launch_failure",
            Self::EngineExecutionFailure => "engine_execution_failure",
            Self::EngineTimeout => "engine_timeout",
            Self::CancellationRequested => "cancellation_requested",
        };
        f.write_str(s)
    }
}

/// Failure detail stored on a Failed or Cancelled job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobError {
    pub kind: JobErrorKind,
    pub message: String,
    pub exit_code: Option<i32>,
    /// Signal that terminated the engine, when it did not exit on its own
    pub signal: Option<i32>,
    pub timed_out: bool,
    /// Last lines of the job log at the time of failure
    pub log_tail: Vec<String>,
}

impl JobError {
    pub fn new(kind: JobErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            exit_code: None,
            signal: None,
            timed_out: kind == JobErrorKind::EngineTimeout,
            log_tail: Vec::new(),
        }
    }

    pub fn with_exit(mut self, exit_code: Option<i32>, signal: Option<i32>) -> Self {
        self.exit_code = exit_code;
        self.signal = signal;
        self
    }

    pub fn with_log_tail(mut self, log_tail: Vec<String>) -> Self {
        self.log_tail = log_tail;
        self
    }
}

/// Parsed engine output for a successful job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultManifest {
    /// Manifest location relative to the workspace
    pub manifest_path: String,
    pub exit_code: Option<i32>,
    /// The manifest document as written by the engine
    pub summary: serde_json::Map<String, serde_json::Value>,
    pub artifacts: Vec<Artifact>,
}

/// A file produced in a job workspace
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifact {
    /// Path relative to the workspace, `/` separated
    pub path: String,
    pub size_bytes: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job() -> Job {
        let input = JobInput {
            address: "1 Main St".to_string(),
            dxf_source: "/data/site.dxf".to_string(),
            config: CrawlConfig::default(),
            footprint_points: vec![
                Point::new(0.0, 0.0),
                Point::new(10.0, 0.0),
                Point::new(10.0, 5.0),
            ],
            front_origin: Point::new(5.0, 0.0),
            front_direction: Point::new(1.0, 0.0),
        };
        Job::new(Uuid::new_v4(), input, PathBuf::from("/tmp/ws"))
    }

    #[test]
    fn test_transition_table() {
        use JobStatus::*;
        let all = [Queued, Running, Succeeded, Failed, Cancelled];
        let allowed = [
            (Queued, Running),
            (Queued, Cancelled),
            (Running, Succeeded),
            (Running, Failed),
            (Running, Cancelled),
        ];
        for from in all {
            for to in all {
                assert_eq!(
                    from.can_transition_to(to),
                    allowed.contains(&(from, to)),
                    "{from} -> {to}"
                );
            }
        }
    }

    #[test]
    fn test_success_path_sets_fields_once() {
        let mut job = job();
        let started = Utc::now();
        job.start(started).unwrap();
        assert_eq!(job.status, JobStatus::Running);
        assert_eq!(job.started_at, Some(started));

        let manifest = ResultManifest {
            manifest_path: "outputs/manifest.json".to_string(),
            exit_code: Some(0),
            summary: serde_json::Map::new(),
            artifacts: vec![],
        };
        let finished = Utc::now();
        job.finish(JobOutcome::Succeeded(manifest.clone()), finished).unwrap();
        assert_eq!(job.status, JobStatus::Succeeded);
        assert_eq!(job.result, Some(manifest));
        assert!(job.error.is_none());

        let err = job
            .finish(
                JobOutcome::Failed(JobError::new(JobErrorKind::EngineExecutionFailure, "late")),
                Utc::now(),
            )
            .unwrap_err();
        assert_eq!(err.from, JobStatus::Succeeded);
        assert_eq!(job.finished_at, Some(finished));
        assert!(job.error.is_none());
    }

    #[test]
    fn test_queued_job_cannot_succeed_directly() {
        let mut job = job();
        let manifest = ResultManifest {
            manifest_path: "manifest.json".to_string(),
            exit_code: None,
            summary: serde_json::Map::new(),
            artifacts: vec![],
        };
        assert!(job.finish(JobOutcome::Succeeded(manifest), Utc::now()).is_err());
        assert_eq!(job.status, JobStatus::Queued);

        let cancel = JobError::new(JobErrorKind::CancellationRequested, "stop");
        job.finish(JobOutcome::Cancelled(cancel), Utc::now()).unwrap();
        assert_eq!(job.status, JobStatus::Cancelled);
        assert!(job.start(Utc::now()).is_err());
    }

    #[test]
    fn test_timeout_error_sets_flag() {
        let err = JobError::new(JobErrorKind::EngineTimeout, "too slow")
            .with_exit(None, Some(15))
            .with_log_tail(vec!["last".to_string()]);
        assert!(err.timed_out);
        assert_eq!(err.signal, Some(15));
        assert!(!JobError::new(JobErrorKind::EngineLaunchFailure, "x").timed_out);
    }

    #[test]
    fn test_wire_names() {
        assert_eq!(serde_json::to_value(JobStatus::Cancelled).unwrap(), "cancelled");
        assert_eq!(
            serde_json::to_value(JobErrorKind::EngineTimeout).unwrap(),
            "engine_timeout"
        );

        let json = serde_json::to_value(job()).unwrap();
        assert_eq!(json["status"], "queued");
        assert_eq!(json["front_direction"], serde_json::json!([1.0, 0.0]));
        let back: Job = serde_json::from_value(json).unwrap();
        assert_eq!(back.status, JobStatus::Queued);
    }
}
