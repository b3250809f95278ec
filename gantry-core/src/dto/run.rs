//! Run DTOs

use serde::{Deserialize, Serialize};

use crate::domain::event::EventPayload;
use crate::domain::run::{RunId, RunStatus};
use crate::trigger::AdmissionReason;

/// Request to start a run for an event
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitRunRequest {
    #[serde(default, deserialize_with = "EventPayload::deserialize_lenient")]
    pub event: EventPayload,
}

/// Response to an admitted submission
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitRunResponse {
    pub run_id: RunId,
    pub reason: AdmissionReason,
}

/// Acknowledgement of a cancellation request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CancelRunResponse {
    pub run_id: RunId,
    /// False when the run had already finished
    pub accepted: bool,
    /// Run status at the time the request was handled
    pub status: RunStatus,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trigger::TriggerPolicy;

    #[test]
    fn test_malformed_submissions_reach_the_trigger_policy() {
        for body in [r#"{}"#, r#"{"event":5}"#, r#"{"event":{"type":5}}"#, r#"{"event":null}"#] {
            let request: SubmitRunRequest = serde_json::from_str(body).unwrap();
            let decision = TriggerPolicy::default().admit(&request.event);
            assert!(!decision.run, "{body}");
            assert_eq!(decision.reason, AdmissionReason::InvalidEvent, "{body}");
        }
    }
}
