use axum::{
    Json,
    extract::State,
    http::header,
    response::IntoResponse,
};

use mcpgate_api::ProtectedResourceMetadata;

use crate::AppConfig;

/// GET /.well-known/oauth-protected-resource — where to get a token for `/mcp`.
pub async fn protected_resource(State(config): State<AppConfig>) -> impl IntoResponse {
    (
        [(header::CACHE_CONTROL, "no-store")],
        Json(ProtectedResourceMetadata {
            resource: config.resource_id.clone(),
            authorization_servers: vec![config.provider.issuer().to_string()],
        }),
    )
}
