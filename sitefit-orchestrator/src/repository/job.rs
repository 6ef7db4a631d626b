//! Job Registry
//!
//! Owns every known job. Records live in `watch` channels: readers clone the
//! current snapshot and never see a half-applied change, while the job's
//! single [`JobHandle`] is the only way to move a record through its states.

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use parking_lot::{Mutex, RwLock};
use sitefit_core::domain::job::{
    Job, JobError, JobErrorKind, JobOutcome, JobStatus, TransitionError,
};
use sitefit_core::domain::log::LogStream;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::repository::log::JobLog;
use crate::workspace::{LOG_FILE, RECORD_FILE};

/// Registry slot of one job
#[derive(Debug)]
pub struct JobEntry {
    record: watch::Sender<Job>,
    log: Arc<JobLog>,
    cancel: CancellationToken,
    cancel_reason: Mutex<Option<String>>,
}

impl JobEntry {
    /// Point-in-time copy of the record
    pub fn snapshot(&self) -> Job {
        self.record.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Job> {
        self.record.subscribe()
    }

    pub fn log(&self) -> &Arc<JobLog> {
        &self.log
    }

    /// Asks the job to stop; only the first reason is kept
    pub fn request_cancel(&self, reason: Option<String>) {
        {
            let mut slot = self.cancel_reason.lock();
            if slot.is_none() {
                *slot = reason;
            }
        }
        self.cancel.cancel();
    }

    pub fn cancel_reason(&self) -> Option<String> {
        self.cancel_reason.lock().clone()
    }
}

/// Thread-safe map of job id to job entry
#[derive(Debug)]
pub struct JobRegistry {
    jobs: RwLock<HashMap<Uuid, Arc<JobEntry>>>,
    shutdown: CancellationToken,
}

impl JobRegistry {
    /// Creates an empty registry; every job token is a child of `shutdown`
    pub fn new(shutdown: CancellationToken) -> Self {
        Self {
            jobs: RwLock::new(HashMap::new()),
            shutdown,
        }
    }

    /// Restores the jobs persisted under `workspace_root`
    ///
    /// Jobs that were still queued or running when the previous process
    /// stopped are closed out, since their engine is gone.
    pub fn load(
        workspace_root: &Path,
        shutdown: CancellationToken,
        log_retain_lines: usize,
    ) -> io::Result<Self> {
        let registry = Self::new(shutdown);
        let dir = match fs::read_dir(workspace_root) {
            Ok(dir) => dir,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(registry),
            Err(e) => return Err(e),
        };

        for entry in dir {
            let workspace = entry?.path();
            let record_path = workspace.join(RECORD_FILE);
            if !record_path.is_file() {
                continue;
            }

            let mut job: Job = match fs::read(&record_path)
                .map_err(|e| e.to_string())
                .and_then(|bytes| serde_json::from_slice(&bytes).map_err(|e| e.to_string()))
            {
                Ok(job) => job,
                Err(e) => {
                    warn!("Skipping unreadable job record {}: {}", record_path.display(), e);
                    continue;
                }
            };

            let log_path = workspace.join(LOG_FILE);
            let log = match JobLog::restore(&log_path, log_retain_lines) {
                Ok(log) => log,
                Err(e) => {
                    warn!(
                        "Could not restore job log {}, starting an in-memory log: {}",
                        log_path.display(),
                        e
                    );
                    JobLog::in_memory(log_retain_lines)
                }
            };
            let log = Arc::new(log);
            job.workspace_path = workspace;

            if let Some(outcome) = interrupted_outcome(job.status) {
                log.append(LogStream::Orchestrator, outcome_message(&outcome));
                if let Err(e) = job.finish(outcome, Utc::now()) {
                    warn!("Could not close out restored job {}: {}", job.id, e);
                }
                if let Err(e) = persist(&record_path, &job) {
                    warn!("Failed to persist restored job {}: {}", job.id, e);
                }
            }

            debug!("Restored job {} ({})", job.id, job.status);
            registry.insert_entry(job, log);
        }

        info!("Restored {} job(s) from {}", registry.len(), workspace_root.display());
        Ok(registry)
    }

    fn insert_entry(&self, job: Job, log: Arc<JobLog>) -> Arc<JobEntry> {
        let entry = Arc::new(JobEntry {
            record: watch::Sender::new(job.clone()),
            log,
            cancel: self.shutdown.child_token(),
            cancel_reason: Mutex::new(None),
        });
        self.jobs.write().insert(job.id, Arc::clone(&entry));
        entry
    }

    /// Registers a new job and returns its only writer
    ///
    /// The record is persisted before it becomes visible.
    pub fn insert(&self, job: Job, log: Arc<JobLog>) -> JobHandle {
        let record_path = job.workspace_path.join(RECORD_FILE);
        if let Err(e) = persist(&record_path, &job) {
            warn!("Failed to persist job {}: {}", job.id, e);
        }
        let entry = self.insert_entry(job, log);
        JobHandle { entry, record_path }
    }

    pub fn get(&self, id: Uuid) -> Option<Arc<JobEntry>> {
        self.jobs.read().get(&id).cloned()
    }

    /// All entries, most recently requested first
    pub fn entries(&self) -> Vec<Arc<JobEntry>> {
        let mut entries: Vec<_> = self
            .jobs
            .read()
            .values()
            .map(|entry| (entry.record.borrow().requested_at, Arc::clone(entry)))
            .collect();
        entries.sort_by(|a, b| b.0.cmp(&a.0));
        entries.into_iter().map(|(_, entry)| entry).collect()
    }

    /// Snapshots of all jobs, most recently requested first
    pub fn list(&self) -> Vec<Job> {
        self.entries().iter().map(|entry| entry.snapshot()).collect()
    }

    pub fn len(&self) -> usize {
        self.jobs.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of queued and running jobs
    pub fn active_counts(&self) -> (usize, usize) {
        let jobs = self.jobs.read();
        jobs.values()
            .fold((0, 0), |(queued, running), entry| match entry.record.borrow().status {
                JobStatus::Queued => (queued + 1, running),
                JobStatus::Running => (queued, running + 1),
                _ => (queued, running),
            })
    }
}

fn interrupted_outcome(status: JobStatus) -> Option<JobOutcome> {
    match status {
        JobStatus::Queued => Some(JobOutcome::Cancelled(JobError::new(
            JobErrorKind::CancellationRequested,
            "orchestrator restarted before the job started",
        ))),
        JobStatus::Running => Some(JobOutcome::Failed(JobError::new(
            JobErrorKind::EngineExecutionFailure,
            "interrupted by orchestrator restart",
        ))),
        _ => None,
    }
}

fn outcome_message(outcome: &JobOutcome) -> &str {
    match outcome {
        JobOutcome::Failed(e) | JobOutcome::Cancelled(e) => &e.message,
        JobOutcome::Succeeded(_) => "succeeded",
    }
}

/// Writes the record next to the job's other files, replacing it atomically
fn persist(path: &Path, job: &Job) -> io::Result<()> {
    let json = serde_json::to_vec_pretty(job).map_err(io::Error::other)?;
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, json)?;
    fs::rename(&tmp, path)
}

/// The single writer of one job record
///
/// Handed to the job's execution routine. Every committed change is
/// published to readers and persisted to `job.json`.
#[derive(Debug)]
pub struct JobHandle {
    entry: Arc<JobEntry>,
    record_path: PathBuf,
}

impl JobHandle {
    pub fn id(&self) -> Uuid {
        self.entry.record.borrow().id
    }

    pub fn snapshot(&self) -> Job {
        self.entry.snapshot()
    }

    pub fn log(&self) -> &Arc<JobLog> {
        &self.entry.log
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.entry.cancel.clone()
    }

    pub fn cancel_reason(&self) -> Option<String> {
        self.entry.cancel_reason()
    }

    /// `Queued -> Running`
    pub async fn start(&self) -> Result<Job, TransitionError> {
        self.commit(|job| job.start(Utc::now())).await
    }

    /// Moves the job to its terminal state
    pub async fn finish(&self, outcome: JobOutcome) -> Result<Job, TransitionError> {
        self.commit(|job| job.finish(outcome, Utc::now())).await
    }

    /// Publishes the change, then writes the record on the blocking pool
    async fn commit<F>(&self, change: F) -> Result<Job, TransitionError>
    where
        F: FnOnce(&mut Job) -> Result<(), TransitionError>,
    {
        let mut result = Ok(());
        self.entry.record.send_if_modified(|job| match change(job) {
            Ok(()) => true,
            Err(e) => {
                result = Err(e);
                false
            }
        });
        result?;

        let job = self.snapshot();
        let (path, record) = (self.record_path.clone(), job.clone());
        match tokio::task::spawn_blocking(move || persist(&path, &record)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(job_id = %job.id, "Failed to persist job record: {}", e),
            Err(e) => warn!(job_id = %job.id, "Job record writer panicked: {}", e),
        }
        Ok(job)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sitefit_core::domain::config::CrawlConfig;
    use sitefit_core::domain::job::{JobInput, ResultManifest};
    use sitefit_core::geometry::Point;
    use tempfile::TempDir;

    fn new_job(root: &Path) -> Job {
        let id = Uuid::new_v4();
        let workspace = root.join(id.to_string());
        fs::create_dir_all(&workspace).unwrap();
        let input = JobInput {
            address: "7 Quay St".to_string(),
            dxf_source: "/data/site.dxf".to_string(),
            config: CrawlConfig::default(),
            footprint_points: vec![
                Point::new(0.0, 0.0),
                Point::new(10.0, 0.0),
                Point::new(10.0, 6.0),
            ],
            front_origin: Point::new(5.0, 0.0),
            front_direction: Point::new(1.0, 0.0),
        };
        Job::new(id, input, workspace)
    }

    fn manifest() -> ResultManifest {
        ResultManifest {
            manifest_path: "outputs/manifest.json".to_string(),
            exit_code: Some(0),
            summary: serde_json::Map::new(),
            artifacts: vec![],
        }
    }

    #[tokio::test]
    async fn test_handle_commits_are_visible_and_persisted() {
        let root = TempDir::new().unwrap();
        let registry = JobRegistry::new(CancellationToken::new());
        let job = new_job(root.path());
        let id = job.id;
        let record_path = job.workspace_path.join(RECORD_FILE);

        let handle = registry.insert(job, Arc::new(JobLog::in_memory(10)));
        assert!(record_path.is_file());
        let mut rx = registry.get(id).unwrap().subscribe();

        handle.start().await.unwrap();
        assert!(rx.has_changed().unwrap());
        assert_eq!(rx.borrow_and_update().status, JobStatus::Running);

        handle.finish(JobOutcome::Succeeded(manifest())).await.unwrap();
        let persisted: Job = serde_json::from_slice(&fs::read(&record_path).unwrap()).unwrap();
        assert_eq!(persisted.status, JobStatus::Succeeded);
        assert_eq!(registry.get(id).unwrap().snapshot().status, JobStatus::Succeeded);
    }

    #[tokio::test]
    async fn test_rejected_change_is_not_published() {
        let root = TempDir::new().unwrap();
        let registry = JobRegistry::new(CancellationToken::new());
        let job = new_job(root.path());
        let id = job.id;
        let handle = registry.insert(job, Arc::new(JobLog::in_memory(10)));
        let mut rx = registry.get(id).unwrap().subscribe();
        rx.borrow_and_update();

        assert!(handle.finish(JobOutcome::Succeeded(manifest())).await.is_err());
        assert!(!rx.has_changed().unwrap());
        assert_eq!(handle.snapshot().status, JobStatus::Queued);
    }

    #[test]
    fn test_list_is_most_recent_first() {
        let root = TempDir::new().unwrap();
        let registry = JobRegistry::new(CancellationToken::new());
        let mut older = new_job(root.path());
        older.requested_at = Utc::now() - chrono::Duration::minutes(5);
        let newer = new_job(root.path());
        let (older_id, newer_id) = (older.id, newer.id);

        registry.insert(older, Arc::new(JobLog::in_memory(10)));
        registry.insert(newer, Arc::new(JobLog::in_memory(10)));

        let ids: Vec<_> = registry.list().iter().map(|j| j.id).collect();
        assert_eq!(ids, vec![newer_id, older_id]);
        assert_eq!(registry.active_counts(), (2, 0));
    }

    #[test]
    fn test_cancel_tokens_follow_shutdown_and_keep_first_reason() {
        let root = TempDir::new().unwrap();
        let shutdown = CancellationToken::new();
        let registry = JobRegistry::new(shutdown.clone());
        let handle = registry.insert(new_job(root.path()), Arc::new(JobLog::in_memory(10)));
        let entry = registry.get(handle.id()).unwrap();

        entry.request_cancel(Some("wrong parcel".to_string()));
        entry.request_cancel(Some("again".to_string()));
        assert!(handle.cancel_token().is_cancelled());
        assert_eq!(handle.cancel_reason().as_deref(), Some("wrong parcel"));

        let other = registry.insert(new_job(root.path()), Arc::new(JobLog::in_memory(10)));
        assert!(!other.cancel_token().is_cancelled());
        shutdown.cancel();
        assert!(other.cancel_token().is_cancelled());
    }

    #[tokio::test]
    async fn test_load_closes_out_interrupted_jobs() {
        let root = TempDir::new().unwrap();
        let (queued_id, running_id, done_id) = {
            let registry = JobRegistry::new(CancellationToken::new());

            let queued = registry.insert(new_job(root.path()), Arc::new(JobLog::in_memory(10)));

            let running = registry.insert(new_job(root.path()), Arc::new(JobLog::in_memory(10)));
            running.start().await.unwrap();

            let done = registry.insert(new_job(root.path()), Arc::new(JobLog::in_memory(10)));
            done.start().await.unwrap();
            done.finish(JobOutcome::Succeeded(manifest())).await.unwrap();

            (queued.id(), running.id(), done.id())
        };
        fs::create_dir(root.path().join("not-a-job")).unwrap();

        let registry = JobRegistry::load(root.path(), CancellationToken::new(), 10).unwrap();
        assert_eq!(registry.len(), 3);

        let queued = registry.get(queued_id).unwrap().snapshot();
        assert_eq!(queued.status, JobStatus::Cancelled);
        assert!(queued.started_at.is_none());

        let running = registry.get(running_id).unwrap().snapshot();
        assert_eq!(running.status, JobStatus::Failed);
        let error = running.error.unwrap();
        assert_eq!(error.kind, JobErrorKind::EngineExecutionFailure);
        assert!(error.message.contains("restart"));

        let done = registry.get(done_id).unwrap().snapshot();
        assert_eq!(done.status, JobStatus::Succeeded);

        // The restored state was written back.
        let reloaded = JobRegistry::load(root.path(), CancellationToken::new(), 10).unwrap();
        assert_eq!(
            reloaded.get(running_id).unwrap().snapshot().status,
            JobStatus::Failed
        );
    }

    #[test]
    fn test_load_survives_undecodable_log() {
        let root = TempDir::new().unwrap();
        let registry = JobRegistry::new(CancellationToken::new());
        let garbled = registry.insert(new_job(root.path()), Arc::new(JobLog::in_memory(10)));
        let clean = registry.insert(new_job(root.path()), Arc::new(JobLog::in_memory(10)));
        let garbled_dir = garbled.snapshot().workspace_path;
        fs::write(garbled_dir.join(LOG_FILE), b"\xff\xfe engine noise\n").unwrap();
        // A log path that cannot be read as a file at all.
        fs::create_dir(clean.snapshot().workspace_path.join(LOG_FILE)).unwrap();

        let reloaded = JobRegistry::load(root.path(), CancellationToken::new(), 10).unwrap();
        assert_eq!(reloaded.len(), 2);

        let garbled_log = reloaded.get(garbled.id()).unwrap().log().tail_lines(10);
        assert!(garbled_log[0].contains("engine noise"));
        let clean_entry = reloaded.get(clean.id()).unwrap();
        assert_eq!(clean_entry.snapshot().status, JobStatus::Cancelled);
        assert!(!clean_entry.log().tail_lines(10).is_empty());
    }

    #[test]
    fn test_load_missing_root_is_empty() {
        let root = TempDir::new().unwrap();
        let registry =
            JobRegistry::load(&root.path().join("absent"), CancellationToken::new(), 10).unwrap();
        assert!(registry.is_empty());
    }
}
