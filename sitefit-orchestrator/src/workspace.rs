//! Per-job workspace directories
//!
//! Layout of `<workspace_root>/<job-id>/`:
//! - `footprint.json`: footprint and frontage handed to the engine
//! - `engine.log`: full combined job log
//! - `outputs/`: engine output directory
//! - `job.json`: the persisted job record

use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};

use serde::Serialize;
use sitefit_core::domain::job::Artifact;
use sitefit_core::dto::health::WorkspaceStatus;
use sitefit_core::geometry::Point;
use thiserror::Error;
use uuid::Uuid;
use walkdir::WalkDir;

pub const FOOTPRINT_FILE: &str = "footprint.json";
pub const LOG_FILE: &str = "engine.log";
pub const OUTPUT_DIR: &str = "outputs";
pub const RECORD_FILE: &str = "job.json";

#[derive(Debug, Error)]
pub enum WorkspaceError {
    #[error("workspace {0} already exists")]
    AlreadyExists(PathBuf),

    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("path `{0}` is outside the job workspace")]
    PathEscape(String),

    #[error("file `{0}` not found in the job workspace")]
    NotFound(String),
}

fn io_error(path: &Path) -> impl FnOnce(io::Error) -> WorkspaceError + '_ {
    move |source| WorkspaceError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Engine input file contents
#[derive(Debug, Serialize)]
struct FootprintFile<'a> {
    points: &'a [Point],
    front_origin: Point,
    front_direction: Point,
}

/// Exclusive directory of one job
#[derive(Debug, Clone)]
pub struct Workspace {
    path: PathBuf,
}

impl Workspace {
    /// Creates a fresh workspace for `job_id`
    ///
    /// The job directory itself is created non-recursively, so an existing
    /// directory is an error rather than being shared.
    pub fn allocate(workspace_root: &Path, job_id: Uuid) -> Result<Self, WorkspaceError> {
        fs::create_dir_all(workspace_root).map_err(io_error(workspace_root))?;

        let path = workspace_root.join(job_id.to_string());
        match fs::create_dir(&path) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                return Err(WorkspaceError::AlreadyExists(path));
            }
            Err(e) => return Err(io_error(&path)(e)),
        }

        let workspace = Self { path };
        let outputs = workspace.output_dir();
        if let Err(e) = fs::create_dir(&outputs) {
            // Best effort, the directory is still empty.
            let _ = fs::remove_dir(workspace.path());
            return Err(io_error(&outputs)(e));
        }
        Ok(workspace)
    }

    /// Deletes the workspace directory and everything in it
    pub fn discard(self) -> Result<(), WorkspaceError> {
        fs::remove_dir_all(&self.path).map_err(io_error(&self.path))
    }

    /// Wraps an existing workspace directory
    pub fn open(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn footprint_path(&self) -> PathBuf {
        self.path.join(FOOTPRINT_FILE)
    }

    pub fn log_path(&self) -> PathBuf {
        self.path.join(LOG_FILE)
    }

    pub fn output_dir(&self) -> PathBuf {
        self.path.join(OUTPUT_DIR)
    }

    pub fn record_path(&self) -> PathBuf {
        self.path.join(RECORD_FILE)
    }

    pub fn write_footprint(
        &self,
        points: &[Point],
        front_origin: Point,
        front_direction: Point,
    ) -> Result<PathBuf, WorkspaceError> {
        let path = self.footprint_path();
        let body = FootprintFile {
            points,
            front_origin,
            front_direction,
        };
        let json = serde_json::to_vec_pretty(&body)
            .map_err(|e| io_error(&path)(io::Error::other(e)))?;
        fs::write(&path, json).map_err(io_error(&path))?;
        Ok(path)
    }

    /// `/` separated path of `path` relative to the workspace
    pub fn relative(&self, path: &Path) -> Option<String> {
        let rel = path.strip_prefix(&self.path).ok()?;
        let parts: Vec<_> = rel
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect();
        Some(parts.join("/"))
    }

    /// Resolves a client-supplied relative path to a file in this workspace
    pub fn resolve_artifact(&self, relative: &str) -> Result<PathBuf, WorkspaceError> {
        let requested = Path::new(relative);
        let plain = requested
            .components()
            .all(|c| matches!(c, Component::Normal(_) | Component::CurDir));
        if relative.is_empty() || !plain {
            return Err(WorkspaceError::PathEscape(relative.to_string()));
        }

        let candidate = self.path.join(requested);
        let resolved = match candidate.canonicalize() {
            Ok(resolved) => resolved,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(WorkspaceError::NotFound(relative.to_string()));
            }
            Err(e) => return Err(io_error(&candidate)(e)),
        };
        let root = self.path.canonicalize().map_err(io_error(&self.path))?;

        // Symlinks may still point outside.
        if !resolved.starts_with(&root) {
            return Err(WorkspaceError::PathEscape(relative.to_string()));
        }
        if !resolved.is_file() {
            return Err(WorkspaceError::NotFound(relative.to_string()));
        }
        Ok(resolved)
    }

    /// Files under `outputs/`, sorted by path
    pub fn collect_artifacts(&self) -> Vec<Artifact> {
        WalkDir::new(self.output_dir())
            .sort_by_file_name()
            .into_iter()
            .filter_map(Result::ok)
            .filter(|entry| entry.file_type().is_file())
            .filter_map(|entry| {
                let size_bytes = entry.metadata().ok()?.len();
                let path = self.relative(entry.path())?;
                Some(Artifact { path, size_bytes })
            })
            .collect()
    }
}

/// Reports whether the workspace root exists and accepts new files
pub fn root_status(workspace_root: &Path) -> WorkspaceStatus {
    let exists = workspace_root.is_dir();
    let writable = exists && {
        let marker = workspace_root.join(format!(".write-check-{}", Uuid::new_v4()));
        let ok = fs::write(&marker, b"").is_ok();
        let _ = fs::remove_file(&marker);
        ok
    };
    WorkspaceStatus {
        root: workspace_root.to_path_buf(),
        exists,
        writable,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_allocate_creates_layout_and_is_exclusive() {
        let root = TempDir::new().unwrap();
        let id = Uuid::new_v4();

        let ws = Workspace::allocate(root.path(), id).unwrap();
        assert!(ws.output_dir().is_dir());
        assert_eq!(ws.path(), root.path().join(id.to_string()));

        assert!(matches!(
            Workspace::allocate(root.path(), id),
            Err(WorkspaceError::AlreadyExists(_))
        ));
    }

    #[test]
    fn test_write_footprint() {
        let root = TempDir::new().unwrap();
        let ws = Workspace::allocate(root.path(), Uuid::new_v4()).unwrap();
        let points = [Point::new(0.0, 0.0), Point::new(4.0, 0.0), Point::new(4.0, 3.0)];

        let path = ws
            .write_footprint(&points, Point::new(2.0, 0.0), Point::new(1.0, 0.0))
            .unwrap();
        let json: serde_json::Value = serde_json::from_slice(&fs::read(path).unwrap()).unwrap();
        assert_eq!(json["points"][2], serde_json::json!([4.0, 3.0]));
        assert_eq!(json["front_direction"], serde_json::json!([1.0, 0.0]));
    }

    #[test]
    fn test_resolve_artifact_guards_paths() {
        let root = TempDir::new().unwrap();
        let ws = Workspace::allocate(root.path(), Uuid::new_v4()).unwrap();
        fs::write(ws.output_dir().join("best.png"), b"png").unwrap();
        fs::write(root.path().join("secret.txt"), b"x").unwrap();

        let ok = ws.resolve_artifact("outputs/best.png").unwrap();
        assert!(ok.ends_with("outputs/best.png"));

        assert!(matches!(
            ws.resolve_artifact("../secret.txt"),
            Err(WorkspaceError::PathEscape(_))
        ));
        assert!(matches!(
            ws.resolve_artifact("/etc/passwd"),
            Err(WorkspaceError::PathEscape(_))
        ));
        assert!(matches!(
            ws.resolve_artifact("outputs/missing.png"),
            Err(WorkspaceError::NotFound(_))
        ));
        assert!(matches!(
            ws.resolve_artifact("outputs"),
            Err(WorkspaceError::NotFound(_))
        ));
    }

    #[cfg(unix)]
    #[test]
    fn test_resolve_artifact_rejects_symlink_escape() {
        let root = TempDir::new().unwrap();
        let ws = Workspace::allocate(root.path(), Uuid::new_v4()).unwrap();
        fs::write(root.path().join("secret.txt"), b"x").unwrap();
        std::os::unix::fs::symlink(root.path().join("secret.txt"), ws.output_dir().join("link"))
            .unwrap();

        assert!(matches!(
            ws.resolve_artifact("outputs/link"),
            Err(WorkspaceError::PathEscape(_))
        ));
    }

    #[test]
    fn test_collect_artifacts_is_relative_and_sorted() {
        let root = TempDir::new().unwrap();
        let ws = Workspace::allocate(root.path(), Uuid::new_v4()).unwrap();
        fs::create_dir(ws.output_dir().join("cycle_1")).unwrap();
        fs::write(ws.output_dir().join("cycle_1").join("best.png"), b"12345").unwrap();
        fs::write(ws.output_dir().join("manifest.json"), b"{}").unwrap();

        let artifacts = ws.collect_artifacts();
        let paths: Vec<_> = artifacts.iter().map(|a| a.path.as_str()).collect();
        assert_eq!(paths, vec!["outputs/cycle_1/best.png", "outputs/manifest.json"]);
        assert_eq!(artifacts[0].size_bytes, 5);
    }

    #[test]
    fn test_root_status() {
        let root = TempDir::new().unwrap();
        let status = root_status(root.path());
        assert!(status.exists && status.writable);

        let missing = root_status(&root.path().join("nope"));
        assert!(!missing.exists && !missing.writable);
    }
}
