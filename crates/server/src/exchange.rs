//! Authorization-code exchange at the provider's token endpoint.

use std::sync::Arc;

use mcpgate_api::oauth::{self, ProviderConfig, TokenResponse};

use crate::error::AuthError;

/// Error bodies are logged, so keep them short.
const MAX_ERROR_BODY: usize = 512;

#[derive(Clone)]
pub struct TokenExchanger {
    http: reqwest::Client,
    provider: Arc<ProviderConfig>,
    redirect_uri: String,
}

impl TokenExchanger {
    pub fn new(provider: Arc<ProviderConfig>, redirect_uri: String, http: reqwest::Client) -> Self {
        Self {
            http,
            provider,
            redirect_uri,
        }
    }

    /// Exchange `code` for tokens. Non-2xx responses become
    /// [`AuthError::ExchangeFailed`] carrying status and body.
    pub async fn exchange(&self, code: &str) -> Result<TokenResponse, AuthError> {
        let form = oauth::build_token_request_form(&self.provider, code, &self.redirect_uri);

        let response = self
            .http
            .post(&self.provider.token_url)
            .header("Accept", "application/json")
            .form(&form)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let mut body = response.text().await.unwrap_or_default();
            truncate_on_char_boundary(&mut body, MAX_ERROR_BODY);
            return Err(AuthError::ExchangeFailed {
                status: status.as_u16(),
                body,
            });
        }

        Ok(response.json::<TokenResponse>().await?)
    }
}

fn truncate_on_char_boundary(s: &mut String, max: usize) {
    if s.len() <= max {
        return;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    s.truncate(end);
}
