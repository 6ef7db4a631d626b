//! Sitefit Core
//!
//! Core types shared by the site-fit orchestrator, its client and the CLI.
//!
//! This crate contains:
//! - Domain types: jobs, their state machine, logs and engine options
//! - DTOs: request/response bodies of the HTTP API
//! - Geometry: the pure shrink-wrap footprint fitter and polygon checks

pub mod domain;
pub mod dto;
pub mod geometry;
