//! Log DTOs

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::log::LogEntry;

/// Query for an incremental log read
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct LogQuery {
    /// Only return entries with a sequence number greater than this
    #[serde(default)]
    pub after: Option<u64>,
    #[serde(default)]
    pub limit: Option<usize>,
}

/// A slice of a job's log
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogPage {
    pub job_id: Uuid,
    pub entries: Vec<LogEntry>,
    /// Pass back as `after` to continue reading
    pub next_after: u64,
    /// The job is terminal and every entry has been returned
    pub complete: bool,
    /// Entries between `after` and the first returned one are gone
    #[serde(default)]
    pub truncated: bool,
    /// Oldest sequence number the server can still return, 0 when empty
    #[serde(default)]
    pub first_available_seq: u64,
}
