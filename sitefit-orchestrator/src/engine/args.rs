//! Engine command-line translation
//!
//! Numeric options are always passed explicitly. Boolean options that
//! default on are switched off with a `--no-*` flag; those that default off
//! are switched on with a bare flag.

use std::path::{Path, PathBuf};

use sitefit_core::domain::config::CrawlConfig;
use sitefit_core::domain::job::Job;
use thiserror::Error;

use crate::config::EngineSettings;
use crate::workspace::Workspace;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DxfSourceError {
    #[error("dxf source is empty")]
    Empty,

    #[error("unsupported dxf source scheme `{0}`, expected a local path or file:// URL")]
    UnsupportedScheme(String),
}

/// Local path of a drawing reference (`file://` URLs are unwrapped)
pub fn dxf_path(source: &str) -> Result<PathBuf, DxfSourceError> {
    let source = source.trim();
    if source.is_empty() {
        return Err(DxfSourceError::Empty);
    }
    if let Some(path) = source.strip_prefix("file://") {
        if path.is_empty() {
            return Err(DxfSourceError::Empty);
        }
        return Ok(PathBuf::from(path));
    }
    if let Some((scheme, _)) = source.split_once("://") {
        return Err(DxfSourceError::UnsupportedScheme(scheme.to_string()));
    }
    Ok(PathBuf::from(source))
}

fn path_arg(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

/// Builds the full argument list for `job`, base arguments first
pub fn build_args(
    settings: &EngineSettings,
    job: &Job,
    workspace: &Workspace,
) -> Result<Vec<String>, DxfSourceError> {
    let mut args = settings.base_args.clone();

    if let Some(flag) = &settings.headless_flag {
        args.push(flag.clone());
    }

    args.extend([
        "--address".to_string(),
        job.address.clone(),
        "--dxf".to_string(),
        path_arg(&dxf_path(&job.dxf_source)?),
        "--footprint-json".to_string(),
        path_arg(&workspace.footprint_path()),
        "--front-vector".to_string(),
        job.front_direction.x.to_string(),
        job.front_direction.y.to_string(),
        "--output-dir".to_string(),
        path_arg(&workspace.output_dir()),
    ]);

    args.extend(config_args(&job.config));
    Ok(args)
}

/// Engine flags for the per-job options
pub fn config_args(config: &CrawlConfig) -> Vec<String> {
    let mut args = Vec::new();
    let mut value = |flag: &str, v: String| {
        args.push(flag.to_string());
        args.push(v);
    };

    value("--cycles", config.cycles.to_string());
    value("--buffer", config.buffer.to_string());
    value("--max-neighbors", config.max_neighbors.to_string());
    value("--workers", config.workers.to_string());
    value("--score-workers", config.score_workers.to_string());
    value("--rotation-step", config.rotation_step.to_string());
    value("--offset-step-scale", config.offset_step_scale.to_string());
    if let Some(step) = config.offset_step {
        value("--offset-step", step.to_string());
    }
    value("--auto-offset-scale", config.auto_offset_scale.to_string());
    if let Some(range) = config.offset_range {
        value("--offset-range", range.to_string());
    }
    value("--setback", config.setback.to_string());
    value("--min-composite", config.min_composite.to_string());
    value("--log-level", config.log_level.to_string());

    let switches = [
        (config.full_rotation, "--full-rotation"),
        (!config.auto_offset, "--no-auto-offset"),
        (!config.render_cycle, "--no-render-cycle"),
        (!config.render_best, "--no-render-best"),
        (!config.render_composite, "--no-render-composite"),
        (config.skip_roads, "--skip-roads"),
        (config.frontage_perpendicular, "--frontage-perpendicular"),
    ];
    args.extend(
        switches
            .into_iter()
            .filter(|(on, _)| *on)
            .map(|(_, flag)| flag.to_string()),
    );
    args
}
