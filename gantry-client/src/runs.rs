//! Run-related API endpoints

use crate::OrchestratorClient;
use crate::error::{ClientError, Result};
use gantry_core::domain::event::EventPayload;
use gantry_core::domain::log::{LogEntry, LogRef};
use gantry_core::domain::run::{RunState, RunSummary};
use gantry_core::dto::run::{CancelRunResponse, SubmitRunRequest, SubmitRunResponse};
use uuid::Uuid;

impl OrchestratorClient {
    // =============================================================================
    // Run Lifecycle
    // =============================================================================

    /// Submit an event
    ///
    /// # Arguments
    /// * `event` - The event payload (type, branch, commit)
    ///
    /// # Returns
    /// The id of the started run and why it was admitted
    ///
    /// # Example
    /// ```no_run
    /// # use gantry_client::OrchestratorClient;
    /// # use gantry_core::domain::event::EventPayload;
    /// # async fn example() -> anyhow::Result<()> {
    /// let client = OrchestratorClient::new("http://localhost:8080");
    /// let submitted = client
    ///     .submit_run(EventPayload::pull_request("feature/login", "9f1c2e"))
    ///     .await?;
    /// # Ok(())
    /// # }
    /// ```
    pub async fn submit_run(&self, event: EventPayload) -> Result<SubmitRunResponse> {
        let url = format!("{}/runs", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(&SubmitRunRequest { event })
            .send()
            .await?;

        self.handle_response(response).await
    }

    /// Get a run by ID
    ///
    /// # Arguments
    /// * `run_id` - The run UUID
    ///
    /// # Returns
    /// A snapshot of the run's state
    pub async fn get_run(&self, run_id: Uuid) -> Result<RunState> {
        let url = format!("{}/runs/{}", self.base_url, run_id);
        let response = self.client.get(&url).send().await?;

        self.handle_response(response).await
    }

    /// List all runs, newest first
    pub async fn list_runs(&self) -> Result<Vec<RunSummary>> {
        let url = format!("{}/runs", self.base_url);
        let response = self.client.get(&url).send().await?;

        self.handle_response(response).await
    }

    /// Request cancellation of a run
    ///
    /// # Returns
    /// The acknowledgement; `accepted` is false when the run had already
    /// finished
    pub async fn cancel_run(&self, run_id: Uuid) -> Result<CancelRunResponse> {
        let url = format!("{}/runs/{}/cancel", self.base_url, run_id);
        let response = self.client.post(&url).send().await?;

        self.handle_response(response).await
    }

    // =============================================================================
    // Logs
    // =============================================================================

    /// Get the event log of a run
    pub async fn get_run_logs(&self, run_id: Uuid) -> Result<Vec<LogEntry>> {
        let url = format!("{}/runs/{}/logs", self.base_url, run_id);
        let response = self.client.get(&url).send().await?;

        self.handle_response(response).await
    }

    /// Get captured step or stage output
    ///
    /// # Arguments
    /// * `log_ref` - A ref taken from a stage or step record
    pub async fn get_output(&self, log_ref: &str) -> Result<String> {
        let log_ref = LogRef::parse(log_ref)
            .ok_or_else(|| ClientError::InvalidRequest(format!("invalid log ref '{}'", log_ref)))?;

        let url = format!("{}/logs", self.base_url);
        let response = self
            .client
            .get(&url)
            .query(&[("log_ref", log_ref.as_str())])
            .send()
            .await?;

        self.handle_text_response(response).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_invalid_log_ref_is_rejected_locally() {
        let client = OrchestratorClient::new("http://127.0.0.1:9");
        let err = client.get_output("../secrets").await.unwrap_err();
        assert!(matches!(err, ClientError::InvalidRequest(_)));
    }
}
