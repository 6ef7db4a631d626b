//! Health DTOs

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthStatus {
    /// `ok` when the workspace root is usable, `degraded` otherwise
    pub status: String,
    pub version: String,
    pub workspace: WorkspaceStatus,
    pub queued_jobs: usize,
    pub running_jobs: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkspaceStatus {
    pub root: PathBuf,
    pub exists: bool,
    pub writable: bool,
}
