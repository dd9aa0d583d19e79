use axum::{
    extract::{Query, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::Deserialize;

use mcpgate_api::oauth;

use crate::AppState;
use crate::error::{ApiErr, AuthError};
use crate::pages::{self, AuthPage};

// ---------------------------------------------------------------------------
// GET /auth/login — redirect to the provider's authorize page
// ---------------------------------------------------------------------------

/// GET /auth/login — issue state + nonce and 302 to the provider.
pub async fn login(State(state): State<AppState>) -> Result<Response, ApiErr> {
    let issued = state
        .states
        .issue()
        .map_err(ApiErr::from_internal("issue oauth state"))?;
    let url = oauth::build_authorize_url(
        state.verifier.provider(),
        &state.config.redirect_uri,
        &issued.state,
        &issued.nonce,
    );

    Ok((
        StatusCode::FOUND,
        [(header::LOCATION, url), (header::CACHE_CONTROL, "no-store".to_string())],
    )
        .into_response())
}

// ---------------------------------------------------------------------------
// GET /auth/callback — finish the login
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
pub struct CallbackParams {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
}

/// GET /auth/callback — validate state, exchange the code, verify the ID
/// token, upsert the user, and hand the token to the opener window.
pub async fn callback(
    State(state): State<AppState>,
    Query(params): Query<CallbackParams>,
) -> AuthPage {
    match complete_login(&state, params).await {
        Ok((id_token, nonce)) => AuthPage::success(&id_token, &nonce, state.config.origin()),
        Err(e) => failure_page(&e),
    }
}

/// The steps run strictly in order; the first failure ends the flow.
async fn complete_login(
    state: &AppState,
    params: CallbackParams,
) -> Result<(String, String), AuthError> {
    if let Some(error) = params.error {
        return Err(AuthError::Provider {
            error,
            description: params
                .error_description
                .unwrap_or_else(|| "Unknown error".into()),
        });
    }

    let nonce = params
        .state
        .as_deref()
        .and_then(|s| state.states.validate_and_consume(s))
        .ok_or(AuthError::InvalidState)?;

    let code = params
        .code
        .filter(|c| !c.is_empty())
        .ok_or(AuthError::MissingCode)?;

    let tokens = state.exchanger.exchange(&code).await?;
    let id_token = tokens.id_token.ok_or(AuthError::MissingIdToken)?;

    let identity = state
        .verifier
        .verify(&id_token, Some(&nonce), tokens.access_token.as_deref())
        .await?;

    let db = state.db.clone();
    let provider = state.verifier.provider().id.clone();
    let user = tokio::task::spawn_blocking(move || db.upsert_identity(&provider, &identity))
        .await
        .map_err(|e| AuthError::Persistence(e.to_string()))?
        .map_err(|e| AuthError::Persistence(format!("{e:#}")))?;

    tracing::info!(
        "Authenticated {} user {} ({})",
        state.verifier.provider().display_name,
        user.email,
        user.id
    );
    Ok((id_token, nonce))
}

fn failure_page(err: &AuthError) -> AuthPage {
    match err {
        AuthError::Provider { .. } => {
            tracing::error!("OAuth error from provider: {err}");
            AuthPage::error(StatusCode::BAD_REQUEST, pages::MSG_PROVIDER_ERROR)
        }
        AuthError::InvalidState => {
            tracing::warn!("Invalid or expired OAuth state");
            AuthPage::error(StatusCode::BAD_REQUEST, pages::MSG_INVALID_STATE)
        }
        AuthError::MissingCode => {
            tracing::warn!("OAuth callback without authorization code");
            AuthPage::error(StatusCode::BAD_REQUEST, pages::MSG_MISSING_CODE)
        }
        _ => {
            tracing::error!("Login failed: {err}");
            AuthPage::error(StatusCode::INTERNAL_SERVER_ERROR, pages::MSG_INTERNAL)
        }
    }
}
