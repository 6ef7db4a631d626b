//! ID resolver module
//!
//! Lets users pass a short, unambiguous prefix instead of a full job UUID.

use anyhow::{Context, Result, anyhow};
use sitefit_client::OrchestratorClient;
use uuid::Uuid;

/// Identifier that can be either a full UUID or an unambiguous prefix
#[derive(Debug, Clone, PartialEq)]
pub enum IdOrPrefix {
    Full(Uuid),
    Prefix(String),
}

impl IdOrPrefix {
    /// Attempts to parse as a full UUID first, otherwise treats as a prefix
    pub fn parse(input: &str) -> Self {
        match Uuid::parse_str(input) {
            Ok(uuid) => IdOrPrefix::Full(uuid),
            Err(_) => IdOrPrefix::Prefix(input.trim().to_lowercase()),
        }
    }
}

/// Resolve a job ID or prefix to a full UUID
///
/// Full UUIDs are returned as-is without contacting the orchestrator.
/// Prefixes are matched against the current job list.
pub async fn resolve_job_id(client: &OrchestratorClient, input: &str) -> Result<Uuid> {
    let prefix = match IdOrPrefix::parse(input) {
        IdOrPrefix::Full(uuid) => return Ok(uuid),
        IdOrPrefix::Prefix(prefix) => prefix,
    };

    let jobs = client
        .list_jobs()
        .await
        .context("Failed to fetch jobs for ID resolution")?;

    match_prefix(jobs.iter().map(|view| view.job.id), &prefix)
}

fn match_prefix(ids: impl IntoIterator<Item = Uuid>, prefix: &str) -> Result<Uuid> {
    if prefix.is_empty() {
        return Err(anyhow!("Job ID must not be empty"));
    }

    let matches: Vec<Uuid> = ids
        .into_iter()
        .filter(|id| id.to_string().starts_with(prefix))
        .collect();

    match matches.as_slice() {
        [] => Err(anyhow!("No job found with ID starting with '{}'", prefix)),
        [id] => Ok(*id),
        _ => {
            let ids: Vec<String> = matches.iter().map(Uuid::to_string).collect();
            Err(anyhow!(
                "Ambiguous prefix '{}' matches multiple jobs: {}",
                prefix,
                ids.join(", ")
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(s: &str) -> Uuid {
        Uuid::parse_str(s).unwrap()
    }

    #[test]
    fn test_parse_full_and_prefix() {
        let full = "0f5c2a9e-1b7d-4c3e-9a41-7d2f8e6b5a10";
        assert_eq!(IdOrPrefix::parse(full), IdOrPrefix::Full(id(full)));
        assert_eq!(
            IdOrPrefix::parse("0F5C"),
            IdOrPrefix::Prefix("0f5c".to_string())
        );
    }

    #[test]
    fn test_match_prefix() {
        let a = id("0f5c2a9e-1b7d-4c3e-9a41-7d2f8e6b5a10");
        let b = id("0f5d0000-0000-4000-8000-000000000000");
        let c = id("a1000000-0000-4000-8000-000000000000");

        assert_eq!(match_prefix([a, b, c], "a1").unwrap(), c);
        assert_eq!(match_prefix([a, b, c], "0f5c").unwrap(), a);

        let err = match_prefix([a, b, c], "0f5").unwrap_err().to_string();
        assert!(err.contains("Ambiguous"));

        let err = match_prefix([a, b, c], "ff").unwrap_err().to_string();
        assert!(err.contains("No job found"));

        assert!(match_prefix([a], "").is_err());
    }
}
