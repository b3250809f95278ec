//! Pipeline API Handlers
//!
//! Read-only view of the definition new runs would use.

use axum::{Json, extract::State};
use gantry_core::dto::pipeline::PipelineView;

use crate::api::AppState;
use crate::api::error::ApiResult;

/// GET /pipeline
/// Loads the current definition and returns it with its topological batches
pub async fn get_pipeline(State(state): State<AppState>) -> ApiResult<Json<PipelineView>> {
    tracing::debug!("Loading pipeline from {}", state.manager.source().describe());

    let (definition, graph) = state.manager.load_pipeline()?;

    Ok(Json(PipelineView::new(&definition, &graph)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::error::ApiError;
    use crate::api::test_support;
    use gantry_lua::LuaSource;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_get_pipeline_lists_batches() {
        let (state, _workspace) = test_support::state();

        let Json(view) = get_pipeline(State(state)).await.unwrap();

        assert_eq!(view.name, "web");
        assert_eq!(view.batches, vec![vec!["build"], vec!["test"]]);
        assert_eq!(view.stages[1].needs, vec!["build"]);
    }

    #[tokio::test]
    async fn test_cyclic_definition_is_reported() {
        let source = LuaSource::new(
            r#"
            return {
                name = "loop",
                stages = {
                    { name = "a", needs = { "b" }, steps = { "true" } },
                    { name = "b", needs = { "a" }, steps = { "true" } },
                },
            }
            "#,
        );
        let (state, _workspace) = test_support::state_with(Arc::new(source));

        let err = get_pipeline(State(state)).await.unwrap_err();
        match err {
            ApiError::Definition(err) => assert_eq!(err.kind(), "cyclic_dependency"),
            other => panic!("unexpected error: {:?}", other),
        }
    }
}
