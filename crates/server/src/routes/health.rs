use axum::{Json, extract::State};
use mcpgate_api::HealthResponse;

use crate::AppConfig;

/// GET /health — server liveness check.
pub async fn health(State(config): State<AppConfig>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: config.app_version.clone(),
    })
}
