//! Job Service
//!
//! Client-facing job operations: submission (validation, workspace
//! allocation, scheduling), snapshots, cancellation and log/artifact reads.
//! Clients only ever read records; all mutation happens in the execution
//! routine through the job's handle.

use std::path::PathBuf;
use std::sync::Arc;

use sitefit_core::domain::job::{Job, JobInput};
use sitefit_core::domain::log::LogStream;
use sitefit_core::dto::health::HealthStatus;
use sitefit_core::dto::job::{ArtifactListing, CancelJobResponse, CancelOutcome, CreateJob, JobView};
use sitefit_core::dto::log::{LogPage, LogQuery};
use sitefit_core::geometry::{
    GeometryError, Point, major_axis_direction, polygon_centroid, validate_footprint,
};
use thiserror::Error;
use tokio::task::JoinError;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::OrchestratorConfig;
use crate::engine::{EngineRunner, args};
use crate::repository::{JobEntry, JobLog, JobRegistry};
use crate::scheduler::Scheduler;
use crate::service::execution::JobExecutor;
use crate::workspace::{self, Workspace, WorkspaceError};

const DEFAULT_LOG_PAGE: usize = 500;
const MAX_LOG_PAGE: usize = 5000;

/// Service error type
#[derive(Debug, Error)]
pub enum JobServiceError {
    #[error("invalid job spec: {0}")]
    InvalidJobSpec(String),

    #[error("invalid geometry input: {0}")]
    InvalidGeometryInput(#[from] GeometryError),

    #[error("job {0} not found")]
    NotFound(Uuid),

    #[error(transparent)]
    Workspace(#[from] WorkspaceError),

    #[error("background task failed: {0}")]
    Background(#[from] JoinError),
}

fn invalid(message: impl Into<String>) -> JobServiceError {
    JobServiceError::InvalidJobSpec(message.into())
}

/// Runs filesystem work on the blocking pool
async fn blocking<T, F>(work: F) -> Result<T, JobServiceError>
where
    F: FnOnce() -> Result<T, JobServiceError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work).await?
}

/// Opens the log of a freshly allocated workspace
///
/// The workspace is removed again when the log cannot be created.
fn open_log(workspace: Workspace, retain: usize) -> Result<JobLog, JobServiceError> {
    let log_path = workspace.log_path();
    match JobLog::create(&log_path, retain) {
        Ok(log) => Ok(log),
        Err(source) => {
            if let Err(e) = workspace.discard() {
                warn!("Failed to remove workspace after log error: {}", e);
            }
            Err(WorkspaceError::Io {
                path: log_path,
                source,
            }
            .into())
        }
    }
}

pub struct JobService {
    config: OrchestratorConfig,
    registry: Arc<JobRegistry>,
    scheduler: Scheduler,
    executor: Arc<JobExecutor>,
}

impl JobService {
    /// Must be called from within a Tokio runtime (starts the scheduler)
    ///
    /// Relative paths in `config` are anchored to the current directory,
    /// since engines run inside their job workspace.
    pub fn new(
        mut config: OrchestratorConfig,
        registry: Arc<JobRegistry>,
        engine: Arc<dyn EngineRunner>,
        shutdown: CancellationToken,
    ) -> Self {
        match std::env::current_dir() {
            Ok(cwd) => config.anchor_paths(&cwd),
            Err(e) => warn!("Cannot resolve the current directory, keeping relative paths: {}", e),
        }
        let scheduler = Scheduler::new(config.max_concurrent_jobs, shutdown.clone());
        let executor = Arc::new(JobExecutor::new(engine, &config, shutdown));
        Self {
            config,
            registry,
            scheduler,
            executor,
        }
    }

    /// Parses and submits a raw request body
    pub async fn submit_json(&self, body: &[u8]) -> Result<JobView, JobServiceError> {
        let req: CreateJob = serde_json::from_slice(body).map_err(|e| invalid(e.to_string()))?;
        self.submit(req).await
    }

    /// Validates a submission and queues it
    ///
    /// Nothing is left behind when validation or workspace setup fails.
    pub async fn submit(&self, req: CreateJob) -> Result<JobView, JobServiceError> {
        let input = validate_submission(req)?;

        let id = Uuid::new_v4();
        let address = input.address.clone();
        let root = self.config.workspace_root.clone();
        let retain = self.config.log_retain_lines;
        let registry = Arc::clone(&self.registry);
        let handle = blocking(move || {
            let workspace = Workspace::allocate(&root, id)?;
            let path = workspace.path().to_path_buf();
            let log = open_log(workspace, retain)?;
            Ok(registry.insert(Job::new(id, input, path), Arc::new(log)))
        })
        .await?;
        handle
            .log()
            .append(LogStream::Orchestrator, format!("job queued: {address}"));
        info!(job_id = %id, "Job submitted for {}", address);

        let view = self.view(&handle.snapshot(), handle.log());
        let executor = Arc::clone(&self.executor);
        self.scheduler
            .enqueue(id, handle.cancel_token(), move |admission| async move {
                executor.run(handle, admission).await;
            });
        Ok(view)
    }

    fn entry(&self, id: Uuid) -> Result<Arc<JobEntry>, JobServiceError> {
        self.registry.get(id).ok_or(JobServiceError::NotFound(id))
    }

    fn view(&self, job: &Job, log: &JobLog) -> JobView {
        JobView {
            job: job.clone(),
            log_tail: log.tail(self.config.log_tail_lines),
            log_available: log.is_persisted(),
        }
    }

    /// Current snapshot of a job
    pub fn get(&self, id: Uuid) -> Result<JobView, JobServiceError> {
        let entry = self.entry(id)?;
        Ok(self.view(&entry.snapshot(), entry.log()))
    }

    /// All jobs, most recent first
    pub fn list(&self) -> Vec<JobView> {
        self.registry
            .entries()
            .iter()
            .map(|entry| self.view(&entry.snapshot(), entry.log()))
            .collect()
    }

    /// Requests cancellation; a no-op for finished jobs
    pub fn cancel(
        &self,
        id: Uuid,
        reason: Option<String>,
    ) -> Result<CancelJobResponse, JobServiceError> {
        let entry = self.entry(id)?;
        let status = entry.snapshot().status;

        let outcome = if status.is_terminal() {
            debug!(job_id = %id, "Cancel ignored, job already {}", status);
            CancelOutcome::AlreadyTerminal
        } else {
            info!(job_id = %id, "Cancellation requested");
            entry.request_cancel(reason);
            CancelOutcome::Requested
        };

        Ok(CancelJobResponse {
            job_id: id,
            outcome,
            status,
        })
    }

    /// Incremental log read
    ///
    /// Entries older than the in-memory window come from `engine.log`. When
    /// that file is unavailable the page is marked `truncated` instead.
    pub async fn logs(&self, id: Uuid, query: LogQuery) -> Result<LogPage, JobServiceError> {
        let entry = self.entry(id)?;
        // Status first: a terminal status means the log is complete.
        let terminal = entry.snapshot().is_terminal();

        let after = query.after.unwrap_or(0);
        let limit = query.limit.unwrap_or(DEFAULT_LOG_PAGE).clamp(1, MAX_LOG_PAGE);
        let log = Arc::clone(entry.log());
        let entries = blocking(move || Ok(log.since(after, limit))).await?;
        let next_after = entries.last().map_or(after, |e| e.seq);
        let log = entry.log();

        Ok(LogPage {
            job_id: id,
            complete: terminal && next_after >= log.last_seq(),
            truncated: entries
                .first()
                .is_some_and(|e| e.seq > after.saturating_add(1)),
            first_available_seq: log.first_available_seq(),
            entries,
            next_after,
        })
    }

    pub async fn artifacts(&self, id: Uuid) -> Result<ArtifactListing, JobServiceError> {
        let workspace = Workspace::open(self.entry(id)?.snapshot().workspace_path);
        let artifacts = blocking(move || Ok(workspace.collect_artifacts())).await?;
        Ok(ArtifactListing {
            job_id: id,
            artifacts,
        })
    }

    /// Absolute path of a file inside the job's workspace
    pub async fn resolve_artifact(&self, id: Uuid, path: &str) -> Result<PathBuf, JobServiceError> {
        let workspace = Workspace::open(self.entry(id)?.snapshot().workspace_path);
        let path = path.to_string();
        blocking(move || Ok(workspace.resolve_artifact(&path)?)).await
    }

    pub async fn health(&self) -> Result<HealthStatus, JobServiceError> {
        let root = self.config.workspace_root.clone();
        let workspace = blocking(move || Ok(workspace::root_status(&root))).await?;
        let (queued_jobs, running_jobs) = self.registry.active_counts();
        Ok(HealthStatus {
            status: if workspace.writable { "ok" } else { "degraded" }.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            workspace,
            queued_jobs,
            running_jobs,
        })
    }

    /// Cancels all jobs and waits for them to settle
    pub async fn shutdown(&self) {
        self.scheduler.shutdown().await;
    }
}

/// Checks a submission and resolves its frontage
fn validate_submission(req: CreateJob) -> Result<JobInput, JobServiceError> {
    let address = req.address.trim();
    if address.is_empty() {
        return Err(invalid("address is required"));
    }
    let dxf = args::dxf_path(&req.dxf_source).map_err(|e| invalid(e.to_string()))?;
    // Engines run inside their workspace, so relative drawings are pinned
    // to the orchestrator's directory now.
    let dxf_source = if dxf.is_relative() {
        std::path::absolute(&dxf)
            .map_err(|e| invalid(format!("cannot resolve dxf path {}: {e}", dxf.display())))?
            .to_string_lossy()
            .into_owned()
    } else {
        req.dxf_source.trim().to_string()
    };
    req.config.validate().map_err(|e| invalid(e.to_string()))?;

    let ring = validate_footprint(&req.footprint_points)
        .map_err(|e| invalid(format!("invalid footprint: {e}")))?;

    let front_direction = resolve_front_direction(&req, &ring)?;
    let front_origin = match req.front_origin {
        Some(origin) if !origin.is_finite() => {
            return Err(invalid("front_origin must be finite"));
        }
        Some(origin) => origin,
        None => polygon_centroid(&ring),
    };

    Ok(JobInput {
        address: address.to_string(),
        dxf_source,
        config: req.config,
        footprint_points: ring,
        front_origin,
        front_direction,
    })
}

/// Explicit direction, then configured angle, then the footprint's major axis
fn resolve_front_direction(req: &CreateJob, ring: &[Point]) -> Result<Point, JobServiceError> {
    if let Some(direction) = req.front_direction {
        return direction
            .normalize()
            .ok_or_else(|| invalid("front_direction must be a non-zero finite vector"));
    }
    if let Some(angle) = req.config.front_angle {
        return Ok(Point::from_angle_deg(angle));
    }
    if req.config.auto_front {
        return major_axis_direction(ring)
            .ok_or_else(|| invalid("cannot derive a frontage from the footprint"));
    }
    Err(invalid(
        "no frontage given: set front_direction or config.front_angle, or enable config.auto_front",
    ))
}
