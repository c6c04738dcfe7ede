use serde::{Deserialize, Serialize};

use crate::retriever::RecipeResult;

/// Recipe search request body
#[derive(Debug, Clone, Deserialize)]
pub struct RecipeRequest {
    #[serde(default)]
    pub ingredients: Vec<String>,
    #[serde(default)]
    pub preferred_tags: Vec<String>,
    #[serde(default)]
    pub allergic_ingredients: Vec<String>,
    // Falls back to the configured default, clamped to the maximum
    #[serde(default)]
    pub k: Option<usize>,
}

/// Recipe search response
#[derive(Debug, Clone, Serialize)]
pub struct RecipeResponse {
    pub results: Vec<RecipeResult>,
    pub count: usize,
}

/// Health check response
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub status: String,
}

/// Readiness check response
#[derive(Debug, Clone, Serialize)]
pub struct ReadinessResponse {
    pub ready: bool,
    pub index: String,
}
