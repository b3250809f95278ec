//! Source control event types

use serde::de::IgnoredAny;
use serde::{Deserialize, Deserializer, Serialize};

/// Kind of source control event that may trigger a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Push,
    PullRequest,
}

impl EventKind {
    /// Wire name of the event kind
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Push => "push",
            EventKind::PullRequest => "pull_request",
        }
    }

    /// Parses a wire name, returning `None` for unsupported kinds
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "push" => Some(EventKind::Push),
            "pull_request" => Some(EventKind::PullRequest),
            _ => None,
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A validated source control event
///
/// Immutable once built. Only the trigger evaluator creates these, from an
/// [`EventPayload`] it has admitted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    #[serde(rename = "type")]
    pub kind: EventKind,
    pub branch: String,
    pub commit: String,
}

/// Event as received from a webhook or CLI
///
/// Every field is optional, and a field holding anything but a string reads
/// as absent, so malformed events are rejected with a reason instead of
/// failing deserialization.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventPayload {
    #[serde(
        rename = "type",
        default,
        deserialize_with = "lenient_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub kind: Option<String>,
    #[serde(
        default,
        deserialize_with = "lenient_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub branch: Option<String>,
    #[serde(
        default,
        deserialize_with = "lenient_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub commit: Option<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Lenient<T> {
    Valid(T),
    Other(IgnoredAny),
}

fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Lenient<String>>::deserialize(deserializer)? {
        Some(Lenient::Valid(value)) => Some(value),
        Some(Lenient::Other(_)) | None => None,
    })
}

impl EventPayload {
    /// Reads a payload from any JSON shape
    ///
    /// Anything that is not an object becomes an empty payload.
    pub fn deserialize_lenient<'de, D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(match Option::<Lenient<EventPayload>>::deserialize(deserializer)? {
            Some(Lenient::Valid(payload)) => payload,
            Some(Lenient::Other(_)) | None => EventPayload::default(),
        })
    }

    /// Builds a complete payload
    pub fn new(
        kind: impl Into<String>,
        branch: impl Into<String>,
        commit: impl Into<String>,
    ) -> Self {
        Self {
            kind: Some(kind.into()),
            branch: Some(branch.into()),
            commit: Some(commit.into()),
        }
    }

    /// Shorthand for a push event
    pub fn push(branch: impl Into<String>, commit: impl Into<String>) -> Self {
        Self::new("push", branch, commit)
    }

    /// Shorthand for a pull request event
    pub fn pull_request(branch: impl Into<String>, commit: impl Into<String>) -> Self {
        Self::new("pull_request", branch, commit)
    }
}

impl From<Event> for EventPayload {
    fn from(event: Event) -> Self {
        Self {
            kind: Some(event.kind.as_str().to_string()),
            branch: Some(event.branch),
            commit: Some(event.commit),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_kind_round_trips_wire_names() {
        assert_eq!(EventKind::parse("push"), Some(EventKind::Push));
        assert_eq!(EventKind::parse("pull_request"), Some(EventKind::PullRequest));
        assert_eq!(EventKind::parse("tag"), None);
        assert_eq!(EventKind::PullRequest.to_string(), "pull_request");
    }

    #[test]
    fn test_payload_accepts_missing_fields() {
        let payload: EventPayload = serde_json::from_str(r#"{"type":"push"}"#).unwrap();
        assert_eq!(payload.kind.as_deref(), Some("push"));
        assert_eq!(payload.branch, None);
        assert_eq!(payload.commit, None);
    }

    #[test]
    fn test_payload_treats_mistyped_fields_as_missing() {
        let payload: EventPayload =
            serde_json::from_str(r#"{"type":5,"branch":["main"],"commit":null,"extra":true}"#)
                .unwrap();
        assert_eq!(payload, EventPayload::default());

        let payload: EventPayload =
            serde_json::from_str(r#"{"type":"push","branch":"main","commit":42}"#).unwrap();
        assert_eq!(payload.branch.as_deref(), Some("main"));
        assert_eq!(payload.commit, None);
    }

    #[test]
    fn test_event_serializes_kind_as_type() {
        let event = Event {
            kind: EventKind::PullRequest,
            branch: "feature/login".to_string(),
            commit: "abc123".to_string(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "pull_request");
        assert_eq!(json["branch"], "feature/login");
    }
}
