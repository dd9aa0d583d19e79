//! OAuth2 / OIDC provider configuration.
//!
//! Config-driven: Google, Auth0 and any standards-compliant OIDC issuer share
//! one [`ProviderConfig`] shape. Presets only fill in endpoints, issuer
//! variants and extra authorize parameters.
//!
//! This module contains only types, URL builders, and JSON parsing.
//! HTTP calls live in the server.

use serde::{Deserialize, Serialize};

/// Scopes requested from every provider.
pub const DEFAULT_SCOPES: &[&str] = &["openid", "email", "profile"];

// ── Provider Configuration ──────────────────────────────────────────────────

/// Identity provider configuration. One per deployment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Provider identifier stored on `accounts.provider`: "google", "auth0", "oidc"
    pub id: String,
    /// UI display name
    pub display_name: String,

    pub authorize_url: String,
    pub token_url: String,
    /// Used to backfill claims missing from the ID token
    pub userinfo_url: Option<String>,
    pub jwks_url: String,

    /// Accepted `iss` values. The first entry is the canonical issuer
    /// advertised in protected-resource metadata.
    pub issuers: Vec<String>,

    pub client_id: String,
    #[serde(skip_serializing)]
    pub client_secret: String,
    pub scopes: Vec<String>,

    /// API audience. Sent as the `audience` authorize parameter and accepted
    /// as an `aud` value next to the client id.
    pub audience: Option<String>,

    /// Provider-specific authorize parameters appended after the standard ones.
    #[serde(default)]
    pub extra_authorize_params: Vec<(String, String)>,
}

impl ProviderConfig {
    /// Canonical issuer (first entry of the allow-list).
    pub fn issuer(&self) -> &str {
        self.issuers.first().map(String::as_str).unwrap_or_default()
    }

    /// `aud` values a token may carry to be accepted.
    pub fn accepted_audiences(&self) -> Vec<String> {
        let mut audiences = vec![self.client_id.clone()];
        if let Some(audience) = self.audience.as_ref().filter(|a| !a.is_empty()) {
            if audience != &self.client_id {
                audiences.push(audience.clone());
            }
        }
        audiences
    }
}

/// Token endpoint response. The ID token is not validated here.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TokenResponse {
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default)]
    pub id_token: Option<String>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_in: Option<u64>,
    #[serde(default)]
    pub scope: Option<String>,
    #[serde(default)]
    pub token_type: Option<String>,
}

// ── URL Builders (pure functions, no HTTP) ──────────────────────────────────

/// Build the authorize URL the user's browser is redirected to.
///
/// Parameter order is fixed, so identical inputs always produce the same
/// string.
pub fn build_authorize_url(
    config: &ProviderConfig,
    redirect_uri: &str,
    state: &str,
    nonce: &str,
) -> String {
    let scope = config.scopes.join(" ");
    let mut params: Vec<(&str, &str)> = vec![
        ("client_id", config.client_id.as_str()),
        ("redirect_uri", redirect_uri),
        ("response_type", "code"),
        ("scope", scope.as_str()),
    ];
    if let Some(audience) = config.audience.as_deref().filter(|a| !a.is_empty()) {
        params.push(("audience", audience));
    }
    for (k, v) in &config.extra_authorize_params {
        params.push((k.as_str(), v.as_str()));
    }
    params.push(("state", state));
    params.push(("nonce", nonce));

    let query = params
        .into_iter()
        .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
        .collect::<Vec<_>>()
        .join("&");

    let separator = if config.authorize_url.contains('?') { '&' } else { '?' };
    format!("{}{}{}", config.authorize_url, separator, query)
}

/// Build the authorization-code token request as form pairs.
pub fn build_token_request_form(
    config: &ProviderConfig,
    code: &str,
    redirect_uri: &str,
) -> Vec<(String, String)> {
    vec![
        ("grant_type".into(), "authorization_code".into()),
        ("code".into(), code.to_string()),
        ("client_id".into(), config.client_id.clone()),
        ("client_secret".into(), config.client_secret.clone()),
        ("redirect_uri".into(), redirect_uri.to_string()),
    ]
}

// ── Provider Presets ────────────────────────────────────────────────────────

/// Google accounts. Only needs client credentials.
pub fn google_preset(client_id: String, client_secret: String) -> ProviderConfig {
    ProviderConfig {
        id: "google".into(),
        display_name: "Google".into(),
        authorize_url: "https://accounts.google.com/o/oauth2/v2/auth".into(),
        token_url: "https://oauth2.googleapis.com/token".into(),
        userinfo_url: Some("https://openidconnect.googleapis.com/v1/userinfo".into()),
        jwks_url: "https://www.googleapis.com/oauth2/v3/certs".into(),
        issuers: vec![
            "https://accounts.google.com".into(),
            "accounts.google.com".into(),
        ],
        client_id,
        client_secret,
        scopes: default_scopes(),
        audience: None,
        extra_authorize_params: vec![
            ("prompt".into(), "consent".into()),
            ("access_type".into(), "offline".into()),
        ],
    }
}

/// Auth0 tenant. `issuer` is the tenant URL, with or without trailing slash.
pub fn auth0_preset(
    issuer: String,
    client_id: String,
    client_secret: String,
    audience: Option<String>,
) -> ProviderConfig {
    let base = issuer.trim_end_matches('/').to_string();
    ProviderConfig {
        id: "auth0".into(),
        display_name: "Auth0".into(),
        authorize_url: format!("{base}/authorize"),
        token_url: format!("{base}/oauth/token"),
        userinfo_url: Some(format!("{base}/userinfo")),
        jwks_url: format!("{base}/.well-known/jwks.json"),
        issuers: issuer_variants(&issuer),
        client_id,
        client_secret,
        scopes: default_scopes(),
        audience: audience.filter(|a| !a.is_empty()),
        extra_authorize_params: Vec::new(),
    }
}

/// Explicit endpoint overrides for [`oidc_preset`].
#[derive(Debug, Clone, Default)]
pub struct OidcEndpoints {
    pub authorize_url: Option<String>,
    pub token_url: Option<String>,
    pub userinfo_url: Option<String>,
    pub jwks_url: Option<String>,
}

/// Generic OIDC issuer. Endpoints not overridden are derived from the issuer.
pub fn oidc_preset(
    issuer: String,
    client_id: String,
    client_secret: String,
    audience: Option<String>,
    endpoints: OidcEndpoints,
) -> ProviderConfig {
    let base = issuer.trim_end_matches('/').to_string();
    ProviderConfig {
        id: "oidc".into(),
        display_name: "OpenID Connect".into(),
        authorize_url: endpoints
            .authorize_url
            .unwrap_or_else(|| format!("{base}/authorize")),
        token_url: endpoints.token_url.unwrap_or_else(|| format!("{base}/token")),
        userinfo_url: Some(
            endpoints
                .userinfo_url
                .unwrap_or_else(|| format!("{base}/userinfo")),
        ),
        jwks_url: endpoints
            .jwks_url
            .unwrap_or_else(|| format!("{base}/.well-known/jwks.json")),
        issuers: issuer_variants(&issuer),
        client_id,
        client_secret,
        scopes: default_scopes(),
        audience: audience.filter(|a| !a.is_empty()),
        extra_authorize_params: Vec::new(),
    }
}

// ── Helpers ─────────────────────────────────────────────────────────────────

fn default_scopes() -> Vec<String> {
    DEFAULT_SCOPES.iter().map(|s| s.to_string()).collect()
}

/// The issuer as configured, plus the same URL with the trailing slash toggled.
fn issuer_variants(issuer: &str) -> Vec<String> {
    let alternate = match issuer.strip_suffix('/') {
        Some(trimmed) => trimmed.to_string(),
        None => format!("{issuer}/"),
    };
    vec![issuer.to_string(), alternate]
}
