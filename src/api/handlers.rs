use axum::{extract::State, Json};
use std::sync::Arc;
use tracing::debug;

use crate::{api::models::*, index::VectorIndex, retriever::Retriever, Error, Result};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub retriever: Arc<Retriever>,
    pub index: Arc<dyn VectorIndex>,
    pub settings: crate::config::Settings,
}

/// POST /api/recipe - Find recipes for available ingredients
pub async fn find_recipe(
    State(state): State<AppState>,
    Json(request): Json<RecipeRequest>,
) -> Result<Json<RecipeResponse>> {
    debug!("Recipe request: {:?}", request);

    let retrieval = &state.settings.retrieval;
    let k = request
        .k
        .unwrap_or(retrieval.default_k)
        .clamp(1, retrieval.max_k);

    let results = state
        .retriever
        .find_recipe(
            &request.ingredients,
            &request.preferred_tags,
            &request.allergic_ingredients,
            k,
        )
        .await?;

    let count = results.len();

    Ok(Json(RecipeResponse { results, count }))
}

/// GET /health - Health check endpoint
pub async fn health_check() -> Result<Json<HealthResponse>> {
    Ok(Json(HealthResponse {
        status: "ok".to_string(),
    }))
}

/// GET /ready - Readiness check endpoint
pub async fn readiness_check(State(state): State<AppState>) -> Result<Json<ReadinessResponse>> {
    // Readiness means the index answers; any failure reports 503 so
    // orchestrators keep traffic away until it recovers
    state
        .index
        .count()
        .await
        .map_err(|e| Error::IndexUnavailable(format!("Index is not ready: {e}")))?;

    Ok(Json(ReadinessResponse {
        ready: true,
        index: "ok".to_string(),
    }))
}
