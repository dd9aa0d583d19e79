//! ID-token verification against the provider's published keys.

use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode, decode_header};
use std::sync::Arc;

use mcpgate_api::oauth::ProviderConfig;
use mcpgate_api::{IdTokenClaims, VerifiedIdentity};

use crate::error::AuthError;
use crate::jwks::JwksClient;

/// Clock skew tolerated on `exp`/`iat`/`nbf`.
pub const DEFAULT_LEEWAY_SECS: u64 = 60;

/// Asymmetric algorithms OIDC providers sign ID tokens with.
pub const DEFAULT_ALGORITHMS: &[Algorithm] = &[
    Algorithm::RS256,
    Algorithm::RS384,
    Algorithm::RS512,
    Algorithm::ES256,
    Algorithm::ES384,
    Algorithm::PS256,
    Algorithm::PS384,
    Algorithm::PS512,
];

/// Verifies ID tokens issued by the configured provider.
///
/// Used for both the login callback (with the nonce from the state store)
/// and for bearer tokens on protected requests (no nonce).
pub struct IdTokenVerifier {
    provider: Arc<ProviderConfig>,
    jwks: JwksClient,
    http: reqwest::Client,
    algorithms: Vec<Algorithm>,
}

impl IdTokenVerifier {
    pub fn new(provider: Arc<ProviderConfig>, http: reqwest::Client) -> Self {
        let jwks = JwksClient::new(provider.jwks_url.clone(), http.clone());
        Self {
            provider,
            jwks,
            http,
            algorithms: DEFAULT_ALGORITHMS.to_vec(),
        }
    }

    /// Replace the accepted signing algorithms.
    pub fn with_algorithms(mut self, algorithms: Vec<Algorithm>) -> Self {
        self.algorithms = algorithms;
        self
    }

    pub fn provider(&self) -> &ProviderConfig {
        &self.provider
    }

    /// Verify `token` and produce the identity it asserts.
    ///
    /// Order: header and algorithm, signing key, signature with issuer /
    /// audience / expiry, nonce, subject, then email (backfilled from
    /// userinfo when the token has none) and its verification flag.
    ///
    /// `access_token` is used for the userinfo call when available; bearer
    /// requests pass `None` and the ID token itself is presented instead.
    pub async fn verify(
        &self,
        token: &str,
        expected_nonce: Option<&str>,
        access_token: Option<&str>,
    ) -> Result<VerifiedIdentity, AuthError> {
        let header = decode_header(token).map_err(|e| AuthError::MalformedToken(e.to_string()))?;
        if !self.algorithms.contains(&header.alg) {
            return Err(AuthError::SignatureInvalid(format!(
                "algorithm {:?} not allowed",
                header.alg
            )));
        }

        let jwk = self.jwks.find_key(header.kid.as_deref()).await?;
        let key = DecodingKey::from_jwk(&jwk).map_err(|e| AuthError::KeySet(e.to_string()))?;

        let mut validation = Validation::new(header.alg);
        validation.set_issuer(&self.provider.issuers);
        validation.set_audience(&self.provider.accepted_audiences());
        validation.set_required_spec_claims(&["exp", "iss", "aud"]);
        validation.leeway = DEFAULT_LEEWAY_SECS;

        let mut claims = decode::<IdTokenClaims>(token, &key, &validation)
            .map_err(|e| {
                tracing::debug!(error = %e, "ID token rejected");
                AuthError::SignatureInvalid(e.to_string())
            })?
            .claims;

        claims.check_nonce(expected_nonce)?;
        let subject = claims.subject()?.to_string();

        if !claims.has_email() {
            let bearer = access_token.unwrap_or(token);
            match self.fetch_userinfo(bearer).await {
                Ok(Some(info)) if info.sub.as_deref().is_none_or(|s| s == subject) => {
                    claims.backfill(info)
                }
                Ok(Some(_)) => tracing::warn!(
                    subject = %subject,
                    "Userinfo subject mismatch, ignoring response"
                ),
                Ok(None) => {}
                Err(e) => tracing::warn!(error = %e, "Userinfo lookup failed"),
            }
        }

        Ok(claims.into_identity()?)
    }

    async fn fetch_userinfo(&self, bearer: &str) -> Result<Option<IdTokenClaims>, reqwest::Error> {
        let Some(url) = self.provider.userinfo_url.as_deref() else {
            return Ok(None);
        };
        let info = self
            .http
            .get(url)
            .bearer_auth(bearer)
            .send()
            .await?
            .error_for_status()?
            .json::<IdTokenClaims>()
            .await?;
        Ok(Some(info))
    }
}
