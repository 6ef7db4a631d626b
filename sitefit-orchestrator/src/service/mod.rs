//! Service Module
//!
//! Business logic layer for the orchestrator.
//! Services sit between the HTTP API and the registry/scheduler/engine.

pub mod execution;
pub mod job;
pub mod shrinkwrap;

pub use job::{JobService, JobServiceError};
