//! Pipeline-related API endpoints

use crate::OrchestratorClient;
use crate::error::Result;
use gantry_core::dto::pipeline::PipelineView;

impl OrchestratorClient {
    /// Get the pipeline definition the orchestrator would run next
    ///
    /// # Returns
    /// The definition with its stages grouped into topological batches
    ///
    /// # Errors
    /// A `422` API error when the orchestrator's document does not parse or
    /// its graph is invalid.
    pub async fn get_pipeline(&self) -> Result<PipelineView> {
        let url = format!("{}/pipeline", self.base_url);
        let response = self.client.get(&url).send().await?;

        self.handle_response(response).await
    }
}
