//! Job-related API endpoints

use std::time::Duration;

use crate::OrchestratorClient;
use crate::error::{ClientError, Result};
use sitefit_core::dto::job::{ArtifactListing, CancelJob, CancelJobResponse, CreateJob, JobView};
use sitefit_core::dto::log::{LogPage, LogQuery};
use uuid::Uuid;

impl OrchestratorClient {
    // =============================================================================
    // Job Lifecycle
    // =============================================================================

    /// Submit a new job
    ///
    /// The job is queued immediately; the returned view has status `queued`.
    ///
    /// # Example
    /// ```no_run
    /// # use sitefit_client::OrchestratorClient;
    /// # use sitefit_core::dto::job::CreateJob;
    /// # async fn example(req: CreateJob) -> anyhow::Result<()> {
    /// let client = OrchestratorClient::new("http://localhost:8080");
    /// let view = client.submit_job(req).await?;
    /// println!("{} is {}", view.job.id, view.job.status);
    /// # Ok(())
    /// # }
    /// ```
    pub async fn submit_job(&self, req: CreateJob) -> Result<JobView> {
        let url = self.url("/jobs");
        let response = self.client.post(&url).json(&req).send().await?;

        self.handle_response(response).await
    }

    /// Get a job by ID
    pub async fn get_job(&self, job_id: Uuid) -> Result<JobView> {
        let url = self.url(&format!("/jobs/{}", job_id));
        let response = self.client.get(&url).send().await?;

        self.handle_response(response).await
    }

    /// List all jobs, most recent first
    pub async fn list_jobs(&self) -> Result<Vec<JobView>> {
        let url = self.url("/jobs");
        let response = self.client.get(&url).send().await?;

        self.handle_response(response).await
    }

    /// Request cancellation of a job
    ///
    /// Cancelling a finished job is not an error; the response reports
    /// that nothing changed.
    pub async fn cancel_job(&self, job_id: Uuid, reason: Option<String>) -> Result<CancelJobResponse> {
        let url = self.url(&format!("/jobs/{}/cancel", job_id));
        let response = self
            .client
            .post(&url)
            .json(&CancelJob { reason })
            .send()
            .await?;

        self.handle_response(response).await
    }

    /// Poll a job until it reaches a terminal status
    ///
    /// # Arguments
    /// * `interval` - Delay between polls
    /// * `timeout` - Give up after this long, `None` to wait indefinitely
    pub async fn wait_for_job(
        &self,
        job_id: Uuid,
        interval: Duration,
        timeout: Option<Duration>,
    ) -> Result<JobView> {
        let started = tokio::time::Instant::now();
        loop {
            let view = self.get_job(job_id).await?;
            if view.job.status.is_terminal() {
                return Ok(view);
            }
            if let Some(timeout) = timeout
                && started.elapsed() >= timeout
            {
                return Err(ClientError::WaitTimeout(job_id));
            }
            tokio::time::sleep(interval).await;
        }
    }

    // =============================================================================
    // Logs and Artifacts
    // =============================================================================

    /// Read job log entries after a sequence number
    ///
    /// Pass the returned `next_after` back to continue from where the
    /// previous page stopped.
    pub async fn get_job_logs(&self, job_id: Uuid, query: LogQuery) -> Result<LogPage> {
        let url = self.url(&format!("/jobs/{}/logs", job_id));
        let response = self.client.get(&url).query(&query).send().await?;

        self.handle_response(response).await
    }

    /// List the files the engine produced under the job's output directory
    pub async fn list_artifacts(&self, job_id: Uuid) -> Result<ArtifactListing> {
        let url = self.url(&format!("/jobs/{}/artifacts", job_id));
        let response = self.client.get(&url).send().await?;

        self.handle_response(response).await
    }

    /// Download a file from the job workspace
    ///
    /// # Arguments
    /// * `path` - Path relative to the workspace, as listed by [`Self::list_artifacts`]
    pub async fn download_file(&self, job_id: Uuid, path: &str) -> Result<Vec<u8>> {
        let url = self.url(&format!(
            "/jobs/{}/files/{}",
            job_id,
            path.trim_start_matches('/')
        ));
        let response = self.client.get(&url).send().await?;

        self.handle_bytes(response).await
    }
}
