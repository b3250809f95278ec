//! Gantry Orchestrator
//!
//! HTTP front door of the Gantry CI/CD engine. Events posted to `/runs` are
//! checked against the pipeline's trigger policy and admitted runs execute
//! in-process.

use std::sync::Arc;

use anyhow::Context;
use gantry_lua::LuaFileSource;
use gantry_runner::RunManager;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

pub mod api;
pub mod config;

use config::OrchestratorConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "gantry_orchestrator=info,gantry_runner=info,tower_http=debug".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Gantry Orchestrator...");

    let config = OrchestratorConfig::from_env().context("Invalid configuration")?;

    let source = Arc::new(LuaFileSource::new(&config.pipeline_path));
    let manager = RunManager::from_config(source, &config.runner)
        .context("Failed to initialize runner stores")?;

    // A broken document is not fatal: it is re-read on every submission.
    match manager.load_pipeline() {
        Ok((definition, graph)) => tracing::info!(
            "Loaded pipeline '{}' with {} stages from {}",
            definition.name,
            graph.len(),
            config.pipeline_path.display()
        ),
        Err(e) => tracing::warn!(
            "Pipeline at {} is not valid yet: {}",
            config.pipeline_path.display(),
            e
        ),
    }

    // Build router with all API endpoints
    let app = api::create_router(api::AppState::new(manager));

    tracing::info!("Listening on {}", config.bind_addr);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("Failed to bind to {}", config.bind_addr))?;

    axum::serve(listener, app)
        .await
        .context("Failed to start server")?;

    Ok(())
}
