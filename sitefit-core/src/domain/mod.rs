//! Core domain types
//!
//! Shared between the orchestrator (which owns and mutates job records) and
//! the client side (which only reads them).

pub mod config;
pub mod job;
pub mod log;
