//! mcpgate server: an MCP endpoint behind an OAuth2/OIDC login.

pub mod config;
pub mod context;
pub mod error;
pub mod exchange;
pub mod jwks;
pub mod pages;
pub mod routes;
pub mod state_store;
pub mod storage;
pub mod verifier;

use axum::{
    Router,
    extract::FromRef,
    http::header,
    middleware,
    routing::{any, get, post},
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub use config::AppConfig;
use exchange::TokenExchanger;
use state_store::StateStore;
use storage::Db;
use verifier::IdTokenVerifier;

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    pub db: Db,
    pub config: AppConfig,
    pub states: StateStore,
    pub verifier: Arc<IdTokenVerifier>,
    pub exchanger: TokenExchanger,
}

impl AppState {
    /// Wire up the provider clients for `config`. Outbound calls use the
    /// client's default timeouts.
    pub fn new(db: Db, config: AppConfig) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder().build()?;
        let provider = Arc::new(config.provider.clone());
        let verifier = IdTokenVerifier::new(provider.clone(), http.clone());
        let exchanger = TokenExchanger::new(provider, config.redirect_uri.clone(), http);
        Ok(Self {
            db,
            config,
            states: StateStore::new(),
            verifier: Arc::new(verifier),
            exchanger,
        })
    }

    /// Swap in a differently configured verifier (e.g. other algorithms).
    pub fn with_verifier(mut self, verifier: IdTokenVerifier) -> Self {
        self.verifier = Arc::new(verifier);
        self
    }
}

impl FromRef<AppState> for Db {
    fn from_ref(state: &AppState) -> Self {
        state.db.clone()
    }
}

impl FromRef<AppState> for AppConfig {
    fn from_ref(state: &AppState) -> Self {
        state.config.clone()
    }
}

/// Build the full router: public auth routes plus bearer-protected `/mcp`.
pub fn build_router(state: AppState) -> Router {
    let protected = Router::new()
        .route(
            "/mcp",
            post(routes::mcp::handle).get(routes::mcp::no_stream),
        )
        .route("/mcp/", any(routes::mcp::not_found))
        .route("/mcp/{*rest}", any(routes::mcp::not_found))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            routes::auth::require_bearer,
        ));

    Router::new()
        .route("/health", get(routes::health::health))
        .route("/auth/login", get(routes::oauth::login))
        .route("/auth/callback", get(routes::oauth::callback))
        .route(
            "/.well-known/oauth-protected-resource",
            get(routes::well_known::protected_resource),
        )
        .route(
            "/.well-known/oauth-protected-resource/mcp",
            get(routes::well_known::protected_resource),
        )
        .merge(protected)
        .layer(middleware::from_fn(routes::security::security_headers))
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any)
                .expose_headers([header::WWW_AUTHENTICATE]),
        )
        .with_state(state)
}
