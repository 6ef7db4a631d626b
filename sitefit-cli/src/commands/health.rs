//! Health command handler

use anyhow::Result;
use colored::*;

use crate::config::Config;

pub async fn run(config: &Config) -> Result<()> {
    let health = config.client().health().await?;

    let status = if health.status == "ok" {
        health.status.green()
    } else {
        health.status.red()
    };

    println!("{}", "Orchestrator:".bold());
    println!("  URL:       {}", config.orchestrator_url.cyan());
    println!("  Status:    {}", status);
    println!("  Version:   {}", health.version.dimmed());
    println!("  Queued:    {}", health.queued_jobs);
    println!("  Running:   {}", health.running_jobs);

    println!("\n{}", "Workspace:".bold());
    println!("  Root:      {}", health.workspace.root.display());
    println!("  Exists:    {}", yes_no(health.workspace.exists));
    println!("  Writable:  {}", yes_no(health.workspace.writable));

    Ok(())
}

fn yes_no(value: bool) -> ColoredString {
    if value { "✓".green() } else { "✗".red() }
}
