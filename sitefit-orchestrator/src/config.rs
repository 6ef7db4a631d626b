//! Orchestrator configuration
//!
//! All tunables are read from `SITEFIT_*` environment variables with
//! defaults suited to a single-host deployment.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, bail};

/// Orchestrator configuration
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Address the HTTP API listens on
    pub bind_addr: String,

    /// Directory holding one workspace per job
    pub workspace_root: PathBuf,

    /// Upper bound on simultaneously running engine processes
    pub max_concurrent_jobs: usize,

    /// Wall-clock budget of a single engine run
    pub job_timeout: Duration,

    /// Time between the graceful and the forced stop of an engine
    pub termination_grace: Duration,

    /// Log lines included in job views and failure details
    pub log_tail_lines: usize,

    /// Log lines kept in memory per job; the full log is always on disk
    pub log_retain_lines: usize,

    pub engine: EngineSettings,
}

/// How the external crawl engine is invoked
#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub program: String,

    /// Arguments placed before the generated ones (typically the script path)
    pub base_args: Vec<String>,

    /// Flag forcing non-interactive mode, `None` when the engine has none
    pub headless_flag: Option<String>,

    /// File name the engine writes its output manifest to
    pub manifest_name: String,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            program: "python3".to_string(),
            base_args: vec!["parcel_crawl_demo_v4.py".to_string()],
            headless_flag: Some("--headless".to_string()),
            manifest_name: "manifest.json".to_string(),
        }
    }
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:8080".to_string(),
            workspace_root: PathBuf::from("./storage/jobs"),
            max_concurrent_jobs: 2,
            job_timeout: Duration::from_secs(3600),
            termination_grace: Duration::from_secs(10),
            log_tail_lines: 40,
            log_retain_lines: 5000,
            engine: EngineSettings::default(),
        }
    }
}

impl OrchestratorConfig {
    /// Creates configuration from environment variables
    ///
    /// Recognised variables:
    /// - SITEFIT_BIND_ADDR (default: 0.0.0.0:8080)
    /// - SITEFIT_WORKSPACE_ROOT (default: ./storage/jobs)
    /// - SITEFIT_MAX_CONCURRENT_JOBS (default: 2)
    /// - SITEFIT_JOB_TIMEOUT (seconds, default: 3600)
    /// - SITEFIT_TERMINATION_GRACE (seconds, default: 10)
    /// - SITEFIT_LOG_TAIL_LINES (default: 40)
    /// - SITEFIT_LOG_RETAIN_LINES (default: 5000)
    /// - SITEFIT_ENGINE_PROGRAM (default: python3)
    /// - SITEFIT_ENGINE_ARGS (whitespace separated, default: parcel_crawl_demo_v4.py)
    /// - SITEFIT_ENGINE_HEADLESS_FLAG (empty disables, default: --headless)
    /// - SITEFIT_MANIFEST_NAME (default: manifest.json)
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) with an arbitrary variable source
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let number = |key: &str, default: u64| -> anyhow::Result<u64> {
            match lookup(key) {
                Some(raw) => raw
                    .trim()
                    .parse::<u64>()
                    .with_context(|| format!("{key} must be a non-negative integer, got {raw:?}")),
                None => Ok(default),
            }
        };

        let engine = EngineSettings {
            program: lookup("SITEFIT_ENGINE_PROGRAM").unwrap_or(defaults.engine.program),
            base_args: lookup("SITEFIT_ENGINE_ARGS")
                .map(|raw| raw.split_whitespace().map(str::to_string).collect())
                .unwrap_or(defaults.engine.base_args),
            headless_flag: match lookup("SITEFIT_ENGINE_HEADLESS_FLAG") {
                Some(flag) if flag.trim().is_empty() => None,
                Some(flag) => Some(flag.trim().to_string()),
                None => defaults.engine.headless_flag,
            },
            manifest_name: lookup("SITEFIT_MANIFEST_NAME").unwrap_or(defaults.engine.manifest_name),
        };

        Ok(Self {
            bind_addr: lookup("SITEFIT_BIND_ADDR").unwrap_or(defaults.bind_addr),
            workspace_root: lookup("SITEFIT_WORKSPACE_ROOT")
                .map(PathBuf::from)
                .unwrap_or(defaults.workspace_root),
            max_concurrent_jobs: number(
                "SITEFIT_MAX_CONCURRENT_JOBS",
                defaults.max_concurrent_jobs as u64,
            )? as usize,
            job_timeout: Duration::from_secs(number(
                "SITEFIT_JOB_TIMEOUT",
                defaults.job_timeout.as_secs(),
            )?),
            termination_grace: Duration::from_secs(number(
                "SITEFIT_TERMINATION_GRACE",
                defaults.termination_grace.as_secs(),
            )?),
            log_tail_lines: number("SITEFIT_LOG_TAIL_LINES", defaults.log_tail_lines as u64)?
                as usize,
            log_retain_lines: number(
                "SITEFIT_LOG_RETAIN_LINES",
                defaults.log_retain_lines as u64,
            )? as usize,
            engine,
        })
    }

    /// Makes relative paths absolute against `base`
    ///
    /// Covers the workspace root, an engine program given as a path and
    /// base arguments naming files that exist under `base` (the engine
    /// script). Bare program names are left for `PATH` lookup.
    pub fn anchor_paths(&mut self, base: &Path) {
        if self.workspace_root.is_relative() {
            self.workspace_root = base.join(&self.workspace_root);
        }

        let program = Path::new(&self.engine.program);
        if program.is_relative() && program.components().count() > 1 {
            self.engine.program = base.join(program).to_string_lossy().into_owned();
        }

        for arg in &mut self.engine.base_args {
            let path = Path::new(arg.as_str());
            if arg.starts_with('-') || path.is_absolute() {
                continue;
            }
            let anchored = base.join(path);
            if anchored.is_file() {
                *arg = anchored.to_string_lossy().into_owned();
            }
        }
    }

    /// Validates the configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.max_concurrent_jobs == 0 {
            bail!("max_concurrent_jobs must be greater than 0");
        }

        if self.job_timeout.is_zero() {
            bail!("job_timeout must be greater than 0");
        }

        if self.engine.program.trim().is_empty() {
            bail!("engine program cannot be empty");
        }

        if self.engine.manifest_name.trim().is_empty() {
            bail!("manifest name cannot be empty");
        }

        if self.bind_addr.is_empty() {
            bail!("bind_addr cannot be empty");
        }

        Ok(())
    }
}
