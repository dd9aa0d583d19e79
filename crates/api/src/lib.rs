//! Shared types, OAuth/OIDC helpers, and SQL builders for mcpgate.
//!
//! Nothing in this crate performs I/O. HTTP calls, JWKS fetching and the
//! SQLite connection live in `mcpgate-server`; this crate only holds the
//! data shapes, pure URL/form builders, claim checks and query builders they
//! share.

use serde::{Deserialize, Serialize};

pub mod crypto;
pub mod db;
pub mod mcp;
pub mod oauth;
pub mod oidc;

pub use oidc::{ClaimsError, IdTokenClaims, VerifiedIdentity};

// ─── Persisted entities ─────────────────────────────────────────────────────

/// A local user. Email is unique across all providers.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct User {
    pub id: String,
    pub email: String,
    pub name: Option<String>,
    pub avatar_url: Option<String>,
    pub created_at: String,
}

/// A `(provider, subject)` link to a [`User`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Account {
    pub provider: String,
    pub subject: String,
    pub user_id: String,
    pub created_at: String,
}

// ─── HTTP response shapes ───────────────────────────────────────────────────

/// GET /health
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// GET /.well-known/oauth-protected-resource (RFC 9728).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProtectedResourceMetadata {
    pub resource: String,
    pub authorization_servers: Vec<String>,
}

/// JSON error shape `{ "error": "..." }` returned by all JSON error responses.
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiError {
    pub error: String,
}
