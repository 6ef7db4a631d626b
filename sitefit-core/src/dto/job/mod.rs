//! Job DTOs

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::config::CrawlConfig;
use crate::domain::job::{Artifact, Job, JobStatus};
use crate::domain::log::LogEntry;
use crate::geometry::Point;

/// Request to submit a new site-fit job
///
/// `front_direction` and `front_origin` are optional: when missing the
/// orchestrator derives them from `config` and the footprint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateJob {
    pub address: String,
    /// Path or `file://` URL of the drawing handed to the engine
    #[serde(alias = "dxf_url")]
    pub dxf_source: String,
    #[serde(default)]
    pub config: CrawlConfig,
    pub footprint_points: Vec<Point>,
    #[serde(default)]
    pub front_origin: Option<Point>,
    #[serde(default)]
    pub front_direction: Option<Point>,
}

/// Optional body of a cancel request
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CancelJob {
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CancelOutcome {
    /// Termination was requested; the job will settle as cancelled
    Requested,
    /// The job had already finished, nothing changed
    AlreadyTerminal,
}

/// Acknowledgment of a cancel request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CancelJobResponse {
    pub job_id: Uuid,
    pub outcome: CancelOutcome,
    /// Status at the time the request was handled
    pub status: JobStatus,
}

/// A job snapshot as returned to clients
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobView {
    #[serde(flatten)]
    pub job: Job,
    /// Most recent log lines
    pub log_tail: Vec<LogEntry>,
    /// Whether the full log file exists in the workspace
    pub log_available: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactListing {
    pub job_id: Uuid,
    pub artifacts: Vec<Artifact>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_create_job_accepts_dxf_url_and_defaults() {
        let body = json!({
            "address": "12 Harbour Rd",
            "dxf_url": "file:///data/site.dxf",
            "footprint_points": [[0, 0], [10, 0], [10, 8]]
        });
        let req: CreateJob = serde_json::from_value(body).unwrap();
        assert_eq!(req.dxf_source, "file:///data/site.dxf");
        assert_eq!(req.config, CrawlConfig::default());
        assert_eq!(req.footprint_points[1], Point::new(10.0, 0.0));
        assert!(req.front_direction.is_none());
    }

    #[test]
    fn test_create_job_rejects_unknown_config_key() {
        let body = json!({
            "address": "a",
            "dxf_source": "b",
            "config": { "bogus": true },
            "footprint_points": []
        });
        assert!(serde_json::from_value::<CreateJob>(body).is_err());
    }

    #[test]
    fn test_cancel_body_is_optional() {
        let cancel: CancelJob = serde_json::from_value(json!({})).unwrap();
        assert!(cancel.reason.is_none());
        assert_eq!(
            serde_json::to_value(CancelOutcome::AlreadyTerminal).unwrap(),
            "already_terminal"
        );
    }
}
