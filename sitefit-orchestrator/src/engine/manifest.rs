//! Output manifest discovery
//!
//! A run counts as successful when the engine left a manifest that parses
//! as a JSON object. The exit code is recorded but does not decide success.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use sitefit_core::domain::job::ResultManifest;
use thiserror::Error;
use walkdir::WalkDir;

use crate::workspace::Workspace;

#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("engine produced no {0}")]
    Missing(String),

    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("{path} is not a JSON object: {reason}")]
    Invalid { path: String, reason: String },
}

/// Shallowest file called `name` below `dir` (ties broken by file name)
fn shallowest(dir: &Path, name: &str) -> Option<PathBuf> {
    WalkDir::new(dir)
        .sort_by_file_name()
        .into_iter()
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_file() && entry.file_name() == name)
        .min_by_key(|entry| entry.depth())
        .map(|entry| entry.into_path())
}

/// Looks for the manifest under `outputs/`, then anywhere in the workspace
pub fn discover(workspace: &Workspace, manifest_name: &str) -> Option<PathBuf> {
    shallowest(&workspace.output_dir(), manifest_name)
        .or_else(|| shallowest(workspace.path(), manifest_name))
}

/// Locates and parses the manifest of a finished run
pub fn load(
    workspace: &Workspace,
    manifest_name: &str,
    exit_code: Option<i32>,
) -> Result<ResultManifest, ManifestError> {
    let path = discover(workspace, manifest_name)
        .ok_or_else(|| ManifestError::Missing(manifest_name.to_string()))?;
    let manifest_path = workspace
        .relative(&path)
        .unwrap_or_else(|| path.to_string_lossy().into_owned());

    let bytes = fs::read(&path).map_err(|source| ManifestError::Io {
        path: path.clone(),
        source,
    })?;
    let summary = match serde_json::from_slice::<serde_json::Value>(&bytes) {
        Ok(serde_json::Value::Object(map)) => map,
        Ok(other) => {
            return Err(ManifestError::Invalid {
                path: manifest_path,
                reason: format!("found {}", json_kind(&other)),
            });
        }
        Err(e) => {
            return Err(ManifestError::Invalid {
                path: manifest_path,
                reason: e.to_string(),
            });
        }
    };

    Ok(ResultManifest {
        manifest_path,
        exit_code,
        summary,
        artifacts: workspace.collect_artifacts(),
    })
}

fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "a boolean",
        serde_json::Value::Number(_) => "a number",
        serde_json::Value::String(_) => "a string",
        serde_json::Value::Array(_) => "an array",
        serde_json::Value::Object(_) => "an object",
    }
}
