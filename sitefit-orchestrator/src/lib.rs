//! Site-fit orchestrator
//!
//! Accepts crawl jobs over HTTP, runs the external engine for each one in an
//! isolated workspace with bounded concurrency, and exposes status, logs and
//! artifacts while the job runs and after it finishes.

pub mod api;
pub mod config;
pub mod engine;
pub mod repository;
pub mod scheduler;
pub mod service;
pub mod workspace;
