//! Sitefit HTTP Client
//!
//! A type-safe HTTP client for the site-fit orchestrator API, shared by the
//! CLI and any other tool that submits or watches jobs.
//!
//! # Example
//!
//! ```no_run
//! use sitefit_client::OrchestratorClient;
//! use sitefit_core::dto::job::CreateJob;
//! use sitefit_core::geometry::Point;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let client = OrchestratorClient::new("http://localhost:8080");
//!
//!     let view = client.submit_job(CreateJob {
//!         address: "12 Harbour Rd".to_string(),
//!         dxf_source: "/data/site.dxf".to_string(),
//!         config: Default::default(),
//!         footprint_points: vec![
//!             Point::new(0.0, 0.0),
//!             Point::new(20.0, 0.0),
//!             Point::new(20.0, 12.0),
//!             Point::new(0.0, 12.0),
//!         ],
//!         front_origin: None,
//!         front_direction: None,
//!     }).await?;
//!
//!     println!("Queued job: {}", view.job.id);
//!     Ok(())
//! }
//! ```

pub mod error;
mod geometry;
mod jobs;

// Re-export commonly used types
pub use error::{ClientError, Result};

use reqwest::Client;
use serde::de::DeserializeOwned;
use sitefit_core::dto::health::HealthStatus;

/// HTTP client for the orchestrator API
///
/// Methods are grouped by resource:
/// - Job lifecycle (submit, list, get, cancel, wait)
/// - Logs and artifacts
/// - Shrink-wrap geometry fitting
/// - Health
#[derive(Debug, Clone)]
pub struct OrchestratorClient {
    /// Base URL of the orchestrator (e.g., "http://localhost:8080")
    base_url: String,
    /// HTTP client instance
    client: Client,
}

impl OrchestratorClient {
    /// Create a new orchestrator client
    ///
    /// # Example
    /// ```
    /// use sitefit_client::OrchestratorClient;
    ///
    /// let client = OrchestratorClient::new("http://localhost:8080");
    /// ```
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(base_url, Client::new())
    }

    /// Create a new orchestrator client with a custom HTTP client
    ///
    /// This allows you to configure timeouts, proxies, TLS settings, etc.
    pub fn with_client(base_url: impl Into<String>, client: Client) -> Self {
        let base_url = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        }
    }

    /// Get the base URL of the orchestrator
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Check orchestrator liveness and workspace status
    pub async fn health(&self) -> Result<HealthStatus> {
        let url = self.url("/health");
        let response = self.client.get(&url).send().await?;

        self.handle_response(response).await
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    // =============================================================================
    // Response Handlers
    // =============================================================================

    /// Check the status code and deserialize the JSON body
    ///
    /// Error bodies of the form `{"error": "..."}` are unwrapped into the
    /// returned [`ClientError::ApiError`].
    async fn handle_response<T: DeserializeOwned>(&self, response: reqwest::Response) -> Result<T> {
        let status = response.status();

        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            tracing::debug!("API error {}: {}", status, error_text);
            return Err(ClientError::api_error(
                status.as_u16(),
                error_message(&error_text),
            ));
        }

        response
            .json()
            .await
            .map_err(|e| ClientError::ParseError(format!("Failed to parse JSON response: {}", e)))
    }

    /// Check the status code and return the raw body
    async fn handle_bytes(&self, response: reqwest::Response) -> Result<Vec<u8>> {
        let status = response.status();

        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(ClientError::api_error(
                status.as_u16(),
                error_message(&error_text),
            ));
        }

        Ok(response.bytes().await?.to_vec())
    }
}

fn error_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v.get("error").and_then(|e| e.as_str()).map(str::to_string))
        .unwrap_or_else(|| body.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_creation() {
        let client = OrchestratorClient::new("http://localhost:8080");
        assert_eq!(client.base_url(), "http://localhost:8080");
    }

    #[test]
    fn test_client_trims_trailing_slash() {
        let client = OrchestratorClient::new("http://localhost:8080/");
        assert_eq!(client.base_url(), "http://localhost:8080");
        assert_eq!(client.url("/jobs"), "http://localhost:8080/jobs");
    }

    #[test]
    fn test_client_with_custom_client() {
        let http_client = Client::new();
        let client = OrchestratorClient::with_client("http://localhost:8080", http_client);
        assert_eq!(client.base_url(), "http://localhost:8080");
    }

    #[test]
    fn test_error_message_unwraps_json_body() {
        assert_eq!(
            error_message(r#"{"error":"invalid job spec: address is required"}"#),
            "invalid job spec: address is required"
        );
        assert_eq!(error_message("Bad Gateway"), "Bad Gateway");
    }
}
