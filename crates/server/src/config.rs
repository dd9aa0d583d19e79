//! Server configuration loaded from environment variables.

use anyhow::{Context, Result, bail};
use std::path::PathBuf;
use url::Url;

use mcpgate_api::oauth::{self, OidcEndpoints, ProviderConfig};

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub port: u16,
    pub app_name: String,
    pub app_version: String,
    /// Public URL of this deployment, no trailing slash.
    pub base_url: String,
    /// `scheme://host[:port]` of `base_url`.
    origin: String,
    pub data_dir: PathBuf,
    pub redirect_uri: String,
    /// Resource identifier advertised in protected-resource metadata.
    pub resource_id: String,
    pub provider: ProviderConfig,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the config from any key lookup. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|s| !s.is_empty());

        let port = match var("PORT") {
            Some(p) => p
                .parse::<u16>()
                .map_err(|_| anyhow::anyhow!("PORT must be a port number, got {p:?}"))?,
            None => 3001,
        };
        let base_url = var("APP_BASE_URL")
            .unwrap_or_else(|| format!("http://localhost:{port}"))
            .trim_end_matches('/')
            .to_string();
        let origin = Url::parse(&base_url)
            .with_context(|| format!("APP_BASE_URL is not a valid URL: {base_url:?}"))?
            .origin()
            .ascii_serialization();

        let provider = load_provider(&var)?;
        tracing::info!("OAuth provider enabled: {}", provider.display_name);

        let redirect_uri =
            var("OAUTH_REDIRECT_URI").unwrap_or_else(|| format!("{base_url}/auth/callback"));
        let resource_id = var("OAUTH_RESOURCE_ID")
            .or_else(|| provider.audience.clone())
            .unwrap_or_else(|| format!("{base_url}/mcp"));

        Ok(Self {
            port,
            app_name: var("APP_NAME").unwrap_or_else(|| "mcpgate".into()),
            app_version: var("APP_VERSION").unwrap_or_else(|| env!("CARGO_PKG_VERSION").into()),
            data_dir: var("MCPGATE_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("data")),
            base_url,
            origin,
            redirect_uri,
            resource_id,
            provider,
        })
    }

    /// Origin of `base_url`, the postMessage target for the login popup.
    pub fn origin(&self) -> &str {
        &self.origin
    }

    pub fn resource_metadata_url(&self) -> String {
        format!("{}/.well-known/oauth-protected-resource", self.base_url)
    }
}

fn load_provider(var: &dyn Fn(&str) -> Option<String>) -> Result<ProviderConfig> {
    let kind = match var("OAUTH_PROVIDER") {
        Some(kind) => kind.to_ascii_lowercase(),
        None if var("AUTH0_ISSUER").is_some() => "auth0".into(),
        None if var("OIDC_ISSUER").is_some() => "oidc".into(),
        None => "google".into(),
    };

    let required = |key: &str| {
        var(key).ok_or_else(|| anyhow::anyhow!("{key} is required for the {kind} provider"))
    };

    let provider = match kind.as_str() {
        "google" => oauth::google_preset(
            required("GOOGLE_CLIENT_ID")?,
            required("GOOGLE_CLIENT_SECRET")?,
        ),
        "auth0" => oauth::auth0_preset(
            required("AUTH0_ISSUER")?,
            required("AUTH0_CLIENT_ID")?,
            required("AUTH0_CLIENT_SECRET")?,
            var("AUTH0_AUDIENCE"),
        ),
        "oidc" => oauth::oidc_preset(
            required("OIDC_ISSUER")?,
            required("OIDC_CLIENT_ID")?,
            required("OIDC_CLIENT_SECRET")?,
            var("OIDC_AUDIENCE"),
            OidcEndpoints {
                authorize_url: var("OIDC_AUTHORIZE_URL"),
                token_url: var("OIDC_TOKEN_URL"),
                userinfo_url: var("OIDC_USERINFO_URL"),
                jwks_url: var("OIDC_JWKS_URL"),
            },
        ),
        other => bail!("unknown OAUTH_PROVIDER {other:?} (expected google, auth0 or oidc)"),
    };
    Ok(provider)
}
