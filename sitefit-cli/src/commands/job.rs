//! Job command handlers
//!
//! Handles all job-related CLI commands: submission, listing, details,
//! logs, cancellation and artifacts.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, anyhow, bail};
use clap::Subcommand;
use colored::*;
use serde::Deserialize;
use sitefit_client::OrchestratorClient;
use sitefit_core::domain::config::CrawlConfig;
use sitefit_core::domain::job::{Job, JobStatus};
use sitefit_core::domain::log::{LogEntry, LogStream};
use sitefit_core::dto::job::{CancelOutcome, CreateJob, JobView};
use sitefit_core::dto::log::{LogPage, LogQuery};
use sitefit_core::geometry::Point;

use crate::config::Config;
use crate::id_resolver::resolve_job_id;

const FOLLOW_INTERVAL: Duration = Duration::from_secs(1);

/// Job subcommands
#[derive(Subcommand)]
pub enum JobCommands {
    /// Submit a new site-fit job
    Submit {
        /// Site address
        #[arg(long)]
        address: String,

        /// DXF path or file:// URL visible to the orchestrator host
        #[arg(long)]
        dxf: String,

        /// JSON file with the footprint: a point array or a shrinkwrap result
        #[arg(long)]
        footprint: PathBuf,

        /// Frontage direction, overrides the footprint file
        #[arg(long, num_args = 2, value_names = ["X", "Y"], allow_negative_numbers = true)]
        front_direction: Option<Vec<f64>>,

        /// Frontage origin, overrides the footprint file
        #[arg(long, num_args = 2, value_names = ["X", "Y"], allow_negative_numbers = true)]
        front_origin: Option<Vec<f64>>,

        /// Crawl configuration JSON file
        #[arg(long)]
        config: Option<PathBuf>,

        /// Override a configuration option (repeatable)
        #[arg(long = "set", value_name = "KEY=VALUE")]
        overrides: Vec<String>,

        /// Wait for the job to finish
        #[arg(short, long)]
        wait: bool,
    },
    /// List all jobs
    List,
    /// Get job details
    Get {
        /// Job ID or unambiguous prefix
        id: String,
    },
    /// Get job logs
    Logs {
        /// Job ID or unambiguous prefix
        id: String,

        /// Keep printing new lines until the job finishes
        #[arg(short, long)]
        follow: bool,
    },
    /// Cancel a queued or running job
    Cancel {
        /// Job ID or unambiguous prefix
        id: String,

        #[arg(long)]
        reason: Option<String>,
    },
    /// Wait for a job to finish
    Wait {
        /// Job ID or unambiguous prefix
        id: String,

        /// Seconds between status checks
        #[arg(long, default_value_t = 2)]
        interval: u64,

        /// Give up after this many seconds
        #[arg(long)]
        timeout: Option<u64>,
    },
    /// List job artifacts
    Artifacts {
        /// Job ID or unambiguous prefix
        id: String,
    },
    /// Download a file from the job workspace
    Download {
        /// Job ID or unambiguous prefix
        id: String,

        /// Path relative to the job workspace (e.g. outputs/manifest.json)
        path: String,

        /// Destination file, defaults to the file name of `path`
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

/// Routes job subcommands to their respective handlers.
pub async fn handle_job_command(command: JobCommands, config: &Config) -> Result<()> {
    let client = config.client();

    match command {
        JobCommands::Submit {
            address,
            dxf,
            footprint,
            front_direction,
            front_origin,
            config,
            overrides,
            wait,
        } => {
            let crawl_config = load_config(config.as_deref(), &overrides)?;
            let mut req = load_footprint(&footprint)?.into_request(address, dxf, crawl_config);
            if let Some(direction) = front_direction {
                req.front_direction = Some(point_arg(&direction)?);
            }
            if let Some(origin) = front_origin {
                req.front_origin = Some(point_arg(&origin)?);
            }
            submit_job(&client, req, wait).await
        }
        JobCommands::List => list_jobs(&client).await,
        JobCommands::Get { id } => get_job(&client, &id).await,
        JobCommands::Logs { id, follow } => get_job_logs(&client, &id, follow).await,
        JobCommands::Cancel { id, reason } => cancel_job(&client, &id, reason).await,
        JobCommands::Wait {
            id,
            interval,
            timeout,
        } => {
            let uuid = resolve_job_id(&client, &id).await?;
            wait_for_job(
                &client,
                uuid,
                Duration::from_secs(interval),
                timeout.map(Duration::from_secs),
            )
            .await
        }
        JobCommands::Artifacts { id } => list_artifacts(&client, &id).await,
        JobCommands::Download { id, path, output } => {
            download_file(&client, &id, &path, output).await
        }
    }
}

// =============================================================================
// Input files
// =============================================================================

/// Footprint file contents: either bare points or a shrinkwrap result
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum FootprintFile {
    Points(Vec<Point>),
    Fit {
        footprint_points: Vec<Point>,
        #[serde(default)]
        front_origin: Option<Point>,
        #[serde(default)]
        front_direction: Option<Point>,
    },
}

impl FootprintFile {
    fn into_request(self, address: String, dxf_source: String, config: CrawlConfig) -> CreateJob {
        let (footprint_points, front_origin, front_direction) = match self {
            FootprintFile::Points(points) => (points, None, None),
            FootprintFile::Fit {
                footprint_points,
                front_origin,
                front_direction,
            } => (footprint_points, front_origin, front_direction),
        };
        CreateJob {
            address,
            dxf_source,
            config,
            footprint_points,
            front_origin,
            front_direction,
        }
    }
}

fn load_footprint(path: &Path) -> Result<FootprintFile> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read footprint file {}", path.display()))?;
    serde_json::from_str(&raw)
        .with_context(|| format!("Invalid footprint in {}", path.display()))
}

/// Reads the optional config file, then applies `KEY=VALUE` overrides
fn load_config(path: Option<&Path>, overrides: &[String]) -> Result<CrawlConfig> {
    let base = match path {
        Some(path) => {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file {}", path.display()))?;
            let value = serde_json::from_str(&raw)
                .with_context(|| format!("Invalid JSON in {}", path.display()))?;
            CrawlConfig::from_json(value)?
        }
        None => CrawlConfig::default(),
    };

    let pairs = overrides
        .iter()
        .map(|raw| {
            raw.split_once('=')
                .map(|(key, value)| (key.trim(), value.trim()))
                .ok_or_else(|| anyhow!("Invalid override '{}', expected KEY=VALUE", raw))
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(base.with_overrides(pairs)?)
}

fn point_arg(values: &[f64]) -> Result<Point> {
    match values {
        [x, y] => Ok(Point::new(*x, *y)),
        _ => bail!("Expected two coordinates, got {}", values.len()),
    }
}

// =============================================================================
// Handlers
// =============================================================================

async fn submit_job(client: &OrchestratorClient, req: CreateJob, wait: bool) -> Result<()> {
    let view = client.submit_job(req).await?;

    println!(
        "{} Job {} queued",
        "✓".green(),
        view.job.id.to_string().cyan()
    );
    println!(
        "  Front: ({:.4}, {:.4}) from ({:.2}, {:.2})",
        view.job.front_direction.x,
        view.job.front_direction.y,
        view.job.front_origin.x,
        view.job.front_origin.y
    );

    if wait {
        println!();
        wait_for_job(client, view.job.id, Duration::from_secs(2), None).await?;
    }

    Ok(())
}

async fn list_jobs(client: &OrchestratorClient) -> Result<()> {
    let jobs = client.list_jobs().await?;

    if jobs.is_empty() {
        println!("{}", "No jobs found.".yellow());
    } else {
        println!("{}", format!("Found {} job(s):", jobs.len()).bold());
        println!();
        for view in jobs {
            print_job_summary(&view.job);
        }
    }

    Ok(())
}

async fn get_job(client: &OrchestratorClient, id: &str) -> Result<()> {
    let uuid = resolve_job_id(client, id).await?;
    let view = client.get_job(uuid).await?;

    print_job_details(&view);

    Ok(())
}

async fn get_job_logs(client: &OrchestratorClient, id: &str, follow: bool) -> Result<()> {
    let uuid = resolve_job_id(client, id).await?;
    let mut query = LogQuery::default();
    let mut printed_any = false;

    loop {
        let page = client.get_job_logs(uuid, query).await?;
        if let Some(notice) = gap_notice(query.after.unwrap_or(0), &page) {
            println!("{}", notice.yellow());
        }
        for entry in &page.entries {
            print_log_entry(entry);
            printed_any = true;
        }
        query.after = Some(page.next_after);

        if page.complete || (!follow && page.entries.is_empty()) {
            break;
        }
        if page.entries.is_empty() {
            tokio::time::sleep(FOLLOW_INTERVAL).await;
        }
    }

    if !printed_any {
        println!("{}", "No logs found for this job.".yellow());
    }

    Ok(())
}

/// Describes the entries the server could no longer return
fn gap_notice(after: u64, page: &LogPage) -> Option<String> {
    if !page.truncated {
        return None;
    }
    let first = page.entries.first()?.seq;
    Some(format!(
        "... log lines {}-{} are no longer available on the server",
        after + 1,
        first - 1
    ))
}

async fn cancel_job(client: &OrchestratorClient, id: &str, reason: Option<String>) -> Result<()> {
    let uuid = resolve_job_id(client, id).await?;
    let response = client.cancel_job(uuid, reason).await?;

    match response.outcome {
        CancelOutcome::Requested => println!(
            "{} Cancellation requested for job {}",
            "✓".green(),
            uuid.to_string().cyan()
        ),
        CancelOutcome::AlreadyTerminal => println!(
            "{} Job {} already finished ({})",
            "•".yellow(),
            uuid.to_string().cyan(),
            colorize_status(response.status)
        ),
    }

    Ok(())
}

async fn wait_for_job(
    client: &OrchestratorClient,
    uuid: uuid::Uuid,
    interval: Duration,
    timeout: Option<Duration>,
) -> Result<()> {
    println!(
        "{}",
        format!("Waiting for job {}...", uuid).dimmed()
    );
    let view = client.wait_for_job(uuid, interval, timeout).await?;
    print_job_details(&view);

    if view.job.status != JobStatus::Succeeded {
        bail!("Job {} finished as {}", uuid, view.job.status);
    }
    Ok(())
}

async fn list_artifacts(client: &OrchestratorClient, id: &str) -> Result<()> {
    let uuid = resolve_job_id(client, id).await?;
    let listing = client.list_artifacts(uuid).await?;

    if listing.artifacts.is_empty() {
        println!("{}", "No artifacts found for this job.".yellow());
        return Ok(());
    }

    println!(
        "{}",
        format!("{} artifact(s) for job {}:", listing.artifacts.len(), uuid).bold()
    );
    for artifact in &listing.artifacts {
        println!(
            "  {} {} {}",
            "▸".cyan(),
            artifact.path,
            format_size(artifact.size_bytes).dimmed()
        );
    }

    Ok(())
}

async fn download_file(
    client: &OrchestratorClient,
    id: &str,
    path: &str,
    output: Option<PathBuf>,
) -> Result<()> {
    let uuid = resolve_job_id(client, id).await?;
    let bytes = client.download_file(uuid, path).await?;

    let destination = match output {
        Some(output) => output,
        None => Path::new(path)
            .file_name()
            .map(PathBuf::from)
            .ok_or_else(|| anyhow!("Cannot derive a file name from '{}', use --output", path))?,
    };
    std::fs::write(&destination, &bytes)
        .with_context(|| format!("Failed to write {}", destination.display()))?;

    println!(
        "{} Saved {} ({})",
        "✓".green(),
        destination.display().to_string().cyan(),
        format_size(bytes.len() as u64)
    );
    Ok(())
}

// =============================================================================
// Output
// =============================================================================

fn print_job_summary(job: &Job) {
    println!("  {} Job {}", "▸".cyan(), job.id.to_string().dimmed());
    println!("    Address:  {}", job.address);
    println!("    Status:   {}", colorize_status(job.status));
    println!(
        "    Created:  {}",
        job.requested_at
            .format("%Y-%m-%d %H:%M:%S")
            .to_string()
            .dimmed()
    );
    println!();
}

fn print_job_details(view: &JobView) {
    let job = &view.job;

    println!("{}", "Job Details:".bold());
    println!("  ID:          {}", job.id.to_string().cyan());
    println!("  Address:     {}", job.address);
    println!("  DXF:         {}", job.dxf_source.dimmed());
    println!("  Status:      {}", colorize_status(job.status));
    println!(
        "  Requested:   {}",
        job.requested_at.format("%Y-%m-%d %H:%M:%S")
    );

    if let Some(started) = job.started_at {
        println!("  Started:     {}", started.format("%Y-%m-%d %H:%M:%S"));
    }

    if let Some(finished) = job.finished_at {
        println!("  Finished:    {}", finished.format("%Y-%m-%d %H:%M:%S"));

        if let Some(started) = job.started_at {
            let duration = finished.signed_duration_since(started);
            println!("  Duration:    {}s", duration.num_seconds());
        }
    }

    println!("  Workspace:   {}", job.workspace_path.display().to_string().dimmed());

    if let Some(result) = &job.result {
        println!("\n{}", "Result:".bold());
        println!("  Manifest:   {}", result.manifest_path);
        if let Some(code) = result.exit_code {
            println!("  Exit Code:  {}", code);
        }
        println!("  Artifacts:  {}", result.artifacts.len());
        if !result.summary.is_empty()
            && let Ok(pretty) = serde_json::to_string_pretty(&result.summary)
        {
            println!("\n{}", "Summary:".bold());
            println!("{}", pretty);
        }
    }

    if let Some(error) = &job.error {
        println!("\n{}", "Error:".bold());
        println!("  Kind:       {}", error.kind.to_string().red());
        println!("  Message:    {}", error.message.red());
        if let Some(code) = error.exit_code {
            println!("  Exit Code:  {}", code);
        }
        if let Some(signal) = error.signal {
            println!("  Signal:     {}", signal);
        }
        if !error.log_tail.is_empty() {
            println!("\n{}", "Last output:".bold());
            for line in &error.log_tail {
                println!("  {}", line.dimmed());
            }
        }
    } else if !view.log_tail.is_empty() {
        println!("\n{}", "Recent log:".bold());
        for entry in &view.log_tail {
            print_log_entry(entry);
        }
    }
}

fn print_log_entry(entry: &LogEntry) {
    let stream = entry.stream.to_string();
    let stream_colored = match entry.stream {
        LogStream::Stdout => stream.dimmed(),
        LogStream::Stderr => stream.yellow(),
        LogStream::Orchestrator => stream.cyan(),
    };

    println!(
        "{} [{}] {}",
        entry.timestamp.format("%H:%M:%S").to_string().dimmed(),
        stream_colored,
        entry.message
    );
}

fn colorize_status(status: JobStatus) -> ColoredString {
    let status_str = status.as_str();
    match status {
        JobStatus::Queued => status_str.yellow(),
        JobStatus::Running => status_str.cyan(),
        JobStatus::Succeeded => status_str.green(),
        JobStatus::Failed => status_str.red(),
        JobStatus::Cancelled => status_str.dimmed(),
    }
}

fn format_size(bytes: u64) -> String {
    const KIB: f64 = 1024.0;
    let bytes_f = bytes as f64;
    if bytes_f < KIB {
        format!("{} B", bytes)
    } else if bytes_f < KIB * KIB {
        format!("{:.1} KiB", bytes_f / KIB)
    } else {
        format!("{:.1} MiB", bytes_f / (KIB * KIB))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_footprint_file_accepts_points_and_fit() {
        let points: FootprintFile = serde_json::from_str("[[0,0],[10,0],[10,5],[0,5]]").unwrap();
        let req = points.into_request("a".into(), "/d.dxf".into(), CrawlConfig::default());
        assert_eq!(req.footprint_points.len(), 4);
        assert!(req.front_direction.is_none());

        let fit: FootprintFile = serde_json::from_str(
            r#"{"footprint_points":[[0,0],[10,0],[10,5],[0,5]],
                "front_origin":[5,0],"front_direction":[0,-1],"area":50.0}"#,
        )
        .unwrap();
        let req = fit.into_request("a".into(), "/d.dxf".into(), CrawlConfig::default());
        assert_eq!(req.front_direction, Some(Point::new(0.0, -1.0)));
        assert_eq!(req.front_origin, Some(Point::new(5.0, 0.0)));
    }

    #[test]
    fn test_gap_notice_names_missing_lines() {
        let page = |truncated: bool| -> LogPage {
            serde_json::from_value(serde_json::json!({
                "job_id": uuid::Uuid::new_v4(),
                "entries": [{
                    "seq": 4,
                    "timestamp": "2026-01-05T10:00:00Z",
                    "stream": "stdout",
                    "message": "cycle 4"
                }],
                "next_after": 4,
                "complete": false,
                "truncated": truncated,
                "first_available_seq": 4
            }))
            .unwrap()
        };

        assert_eq!(
            gap_notice(0, &page(true)).as_deref(),
            Some("... log lines 1-3 are no longer available on the server")
        );
        assert_eq!(gap_notice(3, &page(false)), None);
    }

    #[test]
    fn test_load_config_applies_overrides_over_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"cycles": 3, "workers": 2}}"#).unwrap();

        let config = load_config(
            Some(file.path()),
            &["workers=6".to_string(), "skip_roads = true".to_string()],
        )
        .unwrap();
        assert_eq!(config.cycles, 3);
        assert_eq!(config.workers, 6);
        assert!(config.skip_roads);
    }

    #[test]
    fn test_load_config_rejects_bad_overrides() {
        assert!(load_config(None, &["workers".to_string()]).is_err());
        assert!(load_config(None, &["no_such_option=1".to_string()]).is_err());
    }

    #[test]
    fn test_point_arg() {
        assert_eq!(point_arg(&[1.0, -2.0]).unwrap(), Point::new(1.0, -2.0));
        assert!(point_arg(&[1.0]).is_err());
    }

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(512), "512 B");
        assert_eq!(format_size(2048), "2.0 KiB");
        assert_eq!(format_size(3 * 1024 * 1024), "3.0 MiB");
    }
}
