//! Repository Module
//!
//! In-process storage of job records and job logs. Records are mirrored to
//! each job's workspace so they survive a restart.

pub mod job;
pub mod log;

pub use job::{JobEntry, JobHandle, JobRegistry};
pub use log::JobLog;
