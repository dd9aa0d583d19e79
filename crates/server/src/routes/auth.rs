use axum::{
    extract::{FromRequestParts, Request, State},
    http::{HeaderMap, HeaderValue, StatusCode, header, request::Parts},
    middleware::Next,
    response::{IntoResponse, Response},
};

use mcpgate_api::User;

use crate::AppState;
use crate::context::{self, RequestContext};
use crate::error::ApiErr;

// ---------------------------------------------------------------------------
// Bearer middleware
// ---------------------------------------------------------------------------

/// Gate for `/mcp`: verify the bearer ID token, map it to a local user, and
/// run the rest of the request inside that user's [`RequestContext`].
///
/// Any token problem yields 401 with a `WWW-Authenticate` challenge pointing
/// at the protected-resource metadata. A storage failure after a good token
/// is a 500.
pub async fn require_bearer(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Response {
    let Some(token) = bearer_token(req.headers()) else {
        return unauthorized(&state, None);
    };

    let identity = match state.verifier.verify(&token, None, None).await {
        Ok(identity) => identity,
        Err(e) if e.is_token_rejection() => {
            tracing::warn!("Rejected bearer token: {e}");
            return unauthorized(&state, Some("invalid_token"));
        }
        Err(e) => {
            tracing::error!("Bearer verification failed: {e}");
            return ApiErr::internal("internal server error").into_response();
        }
    };

    let db = state.db.clone();
    let provider = state.verifier.provider().id.clone();
    let upserted =
        tokio::task::spawn_blocking(move || db.upsert_identity(&provider, &identity)).await;
    let user = match upserted {
        Ok(Ok(user)) => user,
        Ok(Err(e)) => return ApiErr::from_db("bearer user upsert")(e).into_response(),
        Err(e) => return ApiErr::from_internal("bearer user upsert task")(e).into_response(),
    };

    req.extensions_mut().insert(user.clone());
    context::scope(RequestContext { user }, next.run(req)).await
}

/// `Authorization: Bearer <token>`, scheme matched case-insensitively.
fn bearer_token(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.trim().split_once(' ')?;
    let token = token.trim();
    if !scheme.eq_ignore_ascii_case("bearer") || token.is_empty() {
        return None;
    }
    Some(token.to_string())
}

fn unauthorized(state: &AppState, error: Option<&str>) -> Response {
    let mut challenge = format!(
        "Bearer resource_metadata=\"{}\"",
        state.config.resource_metadata_url()
    );
    if let Some(error) = error {
        challenge.push_str(&format!(", error=\"{error}\""));
    }

    let mut response = (
        StatusCode::UNAUTHORIZED,
        axum::Json(mcpgate_api::ApiError {
            error: "unauthorized".into(),
        }),
    )
        .into_response();
    if let Ok(value) = HeaderValue::from_str(&challenge) {
        response
            .headers_mut()
            .insert(header::WWW_AUTHENTICATE, value);
    }
    response
}

// ---------------------------------------------------------------------------
// Auth extractor
// ---------------------------------------------------------------------------

/// The user resolved by [`require_bearer`], for handlers behind it.
pub struct AuthUser(pub User);

impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<User>()
            .cloned()
            .map(AuthUser)
            .ok_or_else(|| {
                (
                    StatusCode::UNAUTHORIZED,
                    axum::Json(mcpgate_api::ApiError {
                        error: "unauthorized".into(),
                    }),
                )
                    .into_response()
            })
    }
}
