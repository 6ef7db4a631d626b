//! Shrink-wrap command handler

use std::path::Path;

use anyhow::{Context, Result};
use colored::*;
use sitefit_core::dto::shrinkwrap::ShrinkwrapRequest;

use crate::config::Config;

pub async fn run(config: &Config, request: &Path, local: bool, output: Option<&Path>) -> Result<()> {
    let raw = std::fs::read_to_string(request)
        .with_context(|| format!("Failed to read {}", request.display()))?;
    let req: ShrinkwrapRequest = serde_json::from_str(&raw)
        .with_context(|| format!("Invalid shrink-wrap request in {}", request.display()))?;

    let fit = if local {
        req.fit()?
    } else {
        config.client().shrinkwrap(&req).await?
    };

    let json = serde_json::to_string_pretty(&fit)?;
    match output {
        Some(path) => {
            std::fs::write(path, json)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            eprintln!(
                "{} Footprint fit written to {} (area {:.2})",
                "✓".green(),
                path.display().to_string().cyan(),
                fit.area
            );
        }
        None => println!("{}", json),
    }

    Ok(())
}
