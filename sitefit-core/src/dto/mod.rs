//! Data Transfer Objects
//!
//! Request and response bodies exchanged between the orchestrator's HTTP API
//! and its clients.

pub mod health;
pub mod job;
pub mod log;
pub mod shrinkwrap;
