//! Shrink-wrap endpoint

use crate::OrchestratorClient;
use crate::error::Result;
use sitefit_core::dto::shrinkwrap::{ShrinkwrapRequest, ShrinkwrapResponse};

impl OrchestratorClient {
    /// Fit a footprint rectangle and frontage around raw drawing geometry
    ///
    /// The same computation is available offline through
    /// [`ShrinkwrapRequest::fit`]; this call runs it on the orchestrator.
    pub async fn shrinkwrap(&self, req: &ShrinkwrapRequest) -> Result<ShrinkwrapResponse> {
        let url = self.url("/shrinkwrap");
        let response = self.client.post(&url).json(req).send().await?;

        self.handle_response(response).await
    }
}
