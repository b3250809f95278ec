//! Log domain types

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// An entry in a run's event log
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub level: LogLevel,
    pub message: String,
}

impl LogEntry {
    pub fn now(level: LogLevel, message: impl Into<String>) -> Self {
        Self {
            timestamp: chrono::Utc::now(),
            level,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogLevel {
    Debug,
    Info,
    Warning,
    Error,
}

/// Which captured stream a step log holds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputStream {
    Stdout,
    Stderr,
}

impl OutputStream {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutputStream::Stdout => "stdout",
            OutputStream::Stderr => "stderr",
        }
    }
}

/// Reference to captured output held by a log store
///
/// Refs are relative, slash-separated paths such as
/// `<run>/<stage>/step-1.stdout`. Stage names are escaped so a ref never
/// escapes its run directory and two stages never share one.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LogRef(String);

impl LogRef {
    /// Ref to one stream of one step (steps are numbered from 1)
    pub fn for_step(run_id: Uuid, stage: &str, step: usize, stream: OutputStream) -> Self {
        Self(format!(
            "{}/{}/step-{}.{}",
            run_id,
            sanitize(stage),
            step,
            stream.as_str()
        ))
    }

    /// Ref to a stage's combined log
    pub fn for_stage(run_id: Uuid, stage: &str) -> Self {
        Self(format!("{}/{}/stage.log", run_id, sanitize(stage)))
    }

    /// Wraps a ref received over the wire
    ///
    /// Returns `None` for refs that are empty, absolute or contain `..`
    /// segments.
    pub fn parse(raw: &str) -> Option<Self> {
        if raw.is_empty() || raw.starts_with('/') || raw.contains('\\') {
            return None;
        }
        if raw.split('/').any(|seg| seg.is_empty() || seg == "." || seg == "..") {
            return None;
        }
        Some(Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for LogRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Encodes a stage name as a single path segment
///
/// ASCII letters, digits and `-` are kept; every other byte (including `_`)
/// becomes `_xx`. Distinct names therefore never share a segment.
fn sanitize(name: &str) -> String {
    if name.is_empty() {
        return "_".to_string();
    }

    let mut out = String::with_capacity(name.len());
    for byte in name.bytes() {
        if byte.is_ascii_alphanumeric() || byte == b'-' {
            out.push(byte as char);
        } else {
            out.push_str(&format!("_{:02x}", byte));
        }
    }
    out
}
