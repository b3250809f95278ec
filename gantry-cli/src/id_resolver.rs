//! ID resolver module
//!
//! Lets users name a run by a short, unambiguous prefix of its UUID instead
//! of the full id.

use anyhow::{Context, Result, anyhow};
use gantry_client::OrchestratorClient;
use uuid::Uuid;

/// Identifier that can be either a full UUID or an unambiguous prefix
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdOrPrefix {
    Full(Uuid),
    Prefix(String),
}

impl IdOrPrefix {
    /// Parses a full UUID, falling back to a lowercase prefix
    pub fn parse(input: &str) -> Self {
        match Uuid::parse_str(input) {
            Ok(uuid) => IdOrPrefix::Full(uuid),
            Err(_) => IdOrPrefix::Prefix(input.trim().to_lowercase()),
        }
    }

    /// Picks the single id among `candidates` this identifier designates
    ///
    /// # Errors
    /// Returns an error if nothing matches or the prefix is ambiguous.
    pub fn pick(&self, candidates: impl IntoIterator<Item = Uuid>) -> Result<Uuid> {
        let prefix = match self {
            IdOrPrefix::Full(uuid) => return Ok(*uuid),
            IdOrPrefix::Prefix(prefix) if prefix.is_empty() => {
                return Err(anyhow!("Run id cannot be empty"));
            }
            IdOrPrefix::Prefix(prefix) => prefix,
        };

        let matches: Vec<Uuid> = candidates
            .into_iter()
            .filter(|id| id.to_string().starts_with(prefix.as_str()))
            .collect();

        match matches.as_slice() {
            [] => Err(anyhow!("No run found with ID starting with '{}'", prefix)),
            [id] => Ok(*id),
            _ => {
                let ids: Vec<String> = matches.iter().map(Uuid::to_string).collect();
                Err(anyhow!(
                    "Ambiguous prefix '{}' matches multiple runs: {}",
                    prefix,
                    ids.join(", ")
                ))
            }
        }
    }
}

/// Resolve a run ID or prefix to a full UUID
///
/// If the input is already a full UUID, returns it without contacting the
/// orchestrator. Otherwise, lists the runs and finds the one matching the
/// prefix.
///
/// # Arguments
/// * `client` - The API client to use for listing runs
/// * `input` - The ID or prefix typed by the user
///
/// # Errors
/// Returns an error if:
/// - No run matches the prefix
/// - Multiple runs match the prefix (ambiguous)
/// - API call fails
pub async fn resolve_run_id(client: &OrchestratorClient, input: &str) -> Result<Uuid> {
    let id = IdOrPrefix::parse(input);
    if let IdOrPrefix::Full(uuid) = id {
        return Ok(uuid);
    }

    let runs = client
        .list_runs()
        .await
        .context("Failed to fetch runs for ID resolution")?;

    id.pick(runs.iter().map(|run| run.id))
}
