use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use std::fmt;

use mcpgate_api::{ApiError, ClaimsError};

/// Unified JSON API error type.
///
/// Produces `{"error": "<message>"}` JSON responses.
#[derive(Debug)]
pub struct ApiErr {
    status: StatusCode,
    message: String,
}

impl ApiErr {
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: msg.into(),
        }
    }

    pub fn method_not_allowed(msg: impl Into<String>) -> Self {
        Self {
            status: StatusCode::METHOD_NOT_ALLOWED,
            message: msg.into(),
        }
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: msg.into(),
        }
    }

    /// Build a closure that logs a DB/IO error and returns `500 Internal Server Error`.
    pub fn from_db<E: fmt::Display>(context: &str) -> impl FnOnce(E) -> Self + '_ {
        move |e| {
            tracing::error!("database error: {context}: {e}");
            Self::internal("internal server error")
        }
    }

    /// Like [`ApiErr::from_db`], for failures outside the database (RNG,
    /// blocking task joins).
    pub fn from_internal<E: fmt::Display>(context: &str) -> impl FnOnce(E) -> Self + '_ {
        move |e| {
            tracing::error!("{context}: {e}");
            Self::internal("internal server error")
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl IntoResponse for ApiErr {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(ApiError {
                error: self.message,
            }),
        )
            .into_response()
    }
}

/// Failures of the login flow and of bearer-token verification.
///
/// The `Display` text is for server-side logs only; handlers map variants to
/// fixed user-facing pages and status codes.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("invalid, expired or reused OAuth state")]
    InvalidState,
    #[error("provider rejected the login: {error}: {description}")]
    Provider { error: String, description: String },
    #[error("missing authorization code")]
    MissingCode,
    #[error("token endpoint request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("token exchange failed: {status} {body}")]
    ExchangeFailed { status: u16, body: String },
    #[error("token response missing id_token")]
    MissingIdToken,
    #[error("malformed token: {0}")]
    MalformedToken(String),
    #[error("signing key unavailable: {0}")]
    KeySet(String),
    #[error("token signature or registered claims invalid: {0}")]
    SignatureInvalid(String),
    #[error(transparent)]
    Claims(#[from] ClaimsError),
    #[error("persistence failure: {0}")]
    Persistence(String),
}

impl AuthError {
    /// Whether the failure is the token's fault (401 on protected requests)
    /// rather than ours (500).
    pub fn is_token_rejection(&self) -> bool {
        matches!(
            self,
            Self::MalformedToken(_)
                | Self::KeySet(_)
                | Self::SignatureInvalid(_)
                | Self::Claims(_)
        )
    }
}
