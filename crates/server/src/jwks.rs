//! Provider signing keys (JWKS), fetched on demand and cached.

use jsonwebtoken::jwk::{Jwk, JwkSet};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use url::{Host, Url};

use crate::error::AuthError;

const CACHE_TTL: Duration = Duration::from_secs(600);
const MIN_REFRESH_INTERVAL: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
struct CachedJwks {
    jwks: JwkSet,
    fetched_at: Instant,
}

/// Cached view of one provider's JWKS endpoint.
///
/// Keys are cached for ten minutes. An unknown `kid` triggers a refresh, but
/// refreshes are rate limited so a flood of bogus tokens cannot hammer the
/// provider.
#[derive(Debug, Clone)]
pub struct JwksClient {
    jwks_uri: String,
    http: reqwest::Client,
    cache: Arc<RwLock<Option<CachedJwks>>>,
    last_refresh: Arc<RwLock<Option<Instant>>>,
    cache_ttl: Duration,
}

impl JwksClient {
    pub fn new(jwks_uri: impl Into<String>, http: reqwest::Client) -> Self {
        Self {
            jwks_uri: jwks_uri.into(),
            http,
            cache: Arc::new(RwLock::new(None)),
            last_refresh: Arc::new(RwLock::new(None)),
            cache_ttl: CACHE_TTL,
        }
    }

    /// Current key set, from cache while it is fresh.
    pub async fn get_jwks(&self) -> Result<JwkSet, AuthError> {
        {
            let cache = self.cache.read().await;
            if let Some(cached) = cache.as_ref() {
                if cached.fetched_at.elapsed() < self.cache_ttl {
                    return Ok(cached.jwks.clone());
                }
            }
        }
        self.fetch_and_cache().await
    }

    /// Refetch the key set unless a fetch happened very recently.
    pub async fn refresh(&self) -> Result<JwkSet, AuthError> {
        let recently = {
            let last = self.last_refresh.read().await;
            last.is_some_and(|at| at.elapsed() < MIN_REFRESH_INTERVAL)
        };
        if recently {
            tracing::debug!(jwks_uri = %self.jwks_uri, "JWKS refresh rate limited, using cache");
            return self.get_jwks().await;
        }
        self.fetch_and_cache().await
    }

    /// Resolve the key for `kid`, refreshing once if it is unknown.
    ///
    /// Without a `kid`, a key set holding exactly one key is unambiguous and
    /// that key is used.
    pub async fn find_key(&self, kid: Option<&str>) -> Result<Jwk, AuthError> {
        let jwks = self.get_jwks().await?;
        if let Some(key) = select_key(&jwks, kid) {
            return Ok(key);
        }

        tracing::info!(kid = ?kid, "Signing key not in cached JWKS, refreshing");
        let jwks = self.refresh().await?;
        select_key(&jwks, kid).ok_or_else(|| match kid {
            Some(kid) => AuthError::KeySet(format!("no key with kid {kid}")),
            None => AuthError::KeySet("token has no kid and key set is ambiguous".into()),
        })
    }

    async fn fetch_and_cache(&self) -> Result<JwkSet, AuthError> {
        if !is_allowed_endpoint(&self.jwks_uri) {
            return Err(AuthError::KeySet(format!(
                "JWKS endpoint must use https: {}",
                self.jwks_uri
            )));
        }

        *self.last_refresh.write().await = Some(Instant::now());

        let response = self
            .http
            .get(&self.jwks_uri)
            .send()
            .await
            .map_err(|e| AuthError::KeySet(format!("fetch failed: {e}")))?;
        if !response.status().is_success() {
            return Err(AuthError::KeySet(format!(
                "JWKS endpoint returned {}",
                response.status()
            )));
        }
        let jwks: JwkSet = response
            .json()
            .await
            .map_err(|e| AuthError::KeySet(format!("invalid JWKS document: {e}")))?;

        tracing::info!(
            jwks_uri = %self.jwks_uri,
            key_count = jwks.keys.len(),
            "Fetched JWKS"
        );

        *self.cache.write().await = Some(CachedJwks {
            jwks: jwks.clone(),
            fetched_at: Instant::now(),
        });
        Ok(jwks)
    }
}

fn select_key(jwks: &JwkSet, kid: Option<&str>) -> Option<Jwk> {
    match kid {
        Some(kid) => jwks.find(kid).cloned(),
        None if jwks.keys.len() == 1 => jwks.keys.first().cloned(),
        None => None,
    }
}

/// HTTPS only, except loopback for local development and tests.
pub(crate) fn is_allowed_endpoint(uri: &str) -> bool {
    let Ok(url) = Url::parse(uri) else {
        return false;
    };
    match url.scheme() {
        "https" => true,
        "http" => match url.host() {
            Some(Host::Domain(domain)) => domain.eq_ignore_ascii_case("localhost"),
            Some(Host::Ipv4(ip)) => ip.is_loopback(),
            Some(Host::Ipv6(ip)) => ip.is_loopback(),
            None => false,
        },
        _ => false,
    }
}
