//! Trigger evaluator
//!
//! Decides whether an incoming event starts a run. Evaluation is a pure
//! function of the event and a static policy table: no registry, no
//! callbacks, nothing to set up before calling [`TriggerPolicy::admit`].

use serde::{Deserialize, Serialize};

use crate::domain::event::{Event, EventKind, EventPayload};

/// Policy table deciding which events are admitted
///
/// Defaults to pushes on `main` and `develop`, and every pull request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggerPolicy {
    /// Branches whose pushes start a run
    pub push_branches: Vec<String>,
    /// Whether pull requests start a run, whatever their target branch
    pub pull_requests: bool,
}

impl Default for TriggerPolicy {
    fn default() -> Self {
        Self {
            push_branches: vec!["main".to_string(), "develop".to_string()],
            pull_requests: true,
        }
    }
}

/// Why an event was admitted or rejected
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdmissionReason {
    PushToTrackedBranch,
    PullRequest,
    UntrackedBranch,
    UnsupportedEvent,
    InvalidEvent,
}

impl AdmissionReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            AdmissionReason::PushToTrackedBranch => "push_to_tracked_branch",
            AdmissionReason::PullRequest => "pull_request",
            AdmissionReason::UntrackedBranch => "untracked_branch",
            AdmissionReason::UnsupportedEvent => "unsupported_event",
            AdmissionReason::InvalidEvent => "invalid_event",
        }
    }
}

impl std::fmt::Display for AdmissionReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of [`TriggerPolicy::admit`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdmissionDecision {
    pub run: bool,
    pub reason: AdmissionReason,
}

impl AdmissionDecision {
    fn admit(reason: AdmissionReason) -> Self {
        Self { run: true, reason }
    }

    fn reject(reason: AdmissionReason) -> Self {
        Self { run: false, reason }
    }
}

impl TriggerPolicy {
    /// Restricts pushes to the given branches
    pub fn with_push_branches<I, S>(mut self, branches: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.push_branches = branches.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_pull_requests(mut self, enabled: bool) -> Self {
        self.pull_requests = enabled;
        self
    }

    /// Decides whether an event starts a run
    ///
    /// A payload missing its type, branch or commit (or carrying empty
    /// values) is rejected with [`AdmissionReason::InvalidEvent`].
    pub fn admit(&self, payload: &EventPayload) -> AdmissionDecision {
        match self.evaluate(payload) {
            Ok((_, reason)) => AdmissionDecision::admit(reason),
            Err(decision) => decision,
        }
    }

    /// Like [`admit`](Self::admit), but hands back the validated event
    pub fn evaluate(
        &self,
        payload: &EventPayload,
    ) -> Result<(Event, AdmissionReason), AdmissionDecision> {
        let (Some(kind), Some(branch), Some(commit)) = (
            non_empty(&payload.kind),
            non_empty(&payload.branch),
            non_empty(&payload.commit),
        ) else {
            return Err(AdmissionDecision::reject(AdmissionReason::InvalidEvent));
        };

        let Some(kind) = EventKind::parse(kind) else {
            return Err(AdmissionDecision::reject(AdmissionReason::UnsupportedEvent));
        };

        let reason = match kind {
            EventKind::Push if self.push_branches.iter().any(|b| b == branch) => {
                AdmissionReason::PushToTrackedBranch
            }
            EventKind::Push => {
                return Err(AdmissionDecision::reject(AdmissionReason::UntrackedBranch));
            }
            EventKind::PullRequest if self.pull_requests => AdmissionReason::PullRequest,
            EventKind::PullRequest => {
                return Err(AdmissionDecision::reject(AdmissionReason::UnsupportedEvent));
            }
        };

        let event = Event {
            kind,
            branch: branch.to_string(),
            commit: commit.to_string(),
        };

        Ok((event, reason))
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_to_tracked_branches_is_admitted() {
        let policy = TriggerPolicy::default();
        for branch in ["main", "develop"] {
            let decision = policy.admit(&EventPayload::push(branch, "abc"));
            assert!(decision.run);
            assert_eq!(decision.reason, AdmissionReason::PushToTrackedBranch);
        }
    }

    #[test]
    fn test_push_to_other_branch_is_rejected() {
        let decision = TriggerPolicy::default().admit(&EventPayload::push("feature/x", "abc"));
        assert!(!decision.run);
        assert_eq!(decision.reason, AdmissionReason::UntrackedBranch);
    }

    #[test]
    fn test_pull_request_admitted_for_any_branch() {
        let policy = TriggerPolicy::default();
        for branch in ["main", "feature/x", "release/1.0"] {
            let decision = policy.admit(&EventPayload::pull_request(branch, "abc"));
            assert!(decision.run);
            assert_eq!(decision.reason, AdmissionReason::PullRequest);
        }
    }

    #[test]
    fn test_malformed_event_is_invalid_not_a_crash() {
        let policy = TriggerPolicy::default();
        let cases = [
            EventPayload::default(),
            EventPayload {
                kind: Some("push".into()),
                branch: None,
                commit: Some("abc".into()),
            },
            EventPayload {
                kind: None,
                branch: Some("main".into()),
                commit: Some("abc".into()),
            },
            EventPayload::push("  ", "abc"),
            EventPayload::push("main", ""),
        ];

        for payload in cases {
            let decision = policy.admit(&payload);
            assert!(!decision.run, "{payload:?} should be rejected");
            assert_eq!(decision.reason, AdmissionReason::InvalidEvent);
        }
    }

    #[test]
    fn test_unknown_event_type_is_unsupported() {
        let decision = TriggerPolicy::default().admit(&EventPayload::new("tag", "v1.0", "abc"));
        assert!(!decision.run);
        assert_eq!(decision.reason, AdmissionReason::UnsupportedEvent);
    }

    #[test]
    fn test_custom_policy_table() {
        let policy = TriggerPolicy::default()
            .with_push_branches(["trunk"])
            .with_pull_requests(false);

        assert!(policy.admit(&EventPayload::push("trunk", "abc")).run);
        assert!(!policy.admit(&EventPayload::push("main", "abc")).run);
        assert!(!policy.admit(&EventPayload::pull_request("trunk", "abc")).run);
    }

    #[test]
    fn test_evaluate_returns_validated_event() {
        let (event, reason) = TriggerPolicy::default()
            .evaluate(&EventPayload::push("main", "abc123"))
            .unwrap();
        assert_eq!(event.kind, EventKind::Push);
        assert_eq!(event.branch, "main");
        assert_eq!(event.commit, "abc123");
        assert_eq!(reason, AdmissionReason::PushToTrackedBranch);
    }

    #[test]
    fn test_reason_wire_names() {
        let json = serde_json::to_value(AdmissionReason::InvalidEvent).unwrap();
        assert_eq!(json, "invalid_event");
        assert_eq!(AdmissionReason::UntrackedBranch.to_string(), "untracked_branch");
    }
}
