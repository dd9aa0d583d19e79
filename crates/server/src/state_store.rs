//! Pending OAuth login attempts.
//!
//! Process-local: a restart forgets every pending login, which is fine for a
//! browser round-trip that completes within the TTL. A multi-instance
//! deployment would need a shared store.

use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use mcpgate_api::crypto::{self, RngError};

/// How long an issued state stays redeemable, in seconds.
pub const STATE_TTL_SECS: i64 = 5 * 60;

#[derive(Debug, Clone)]
struct PendingLogin {
    nonce: String,
    created_at: DateTime<Utc>,
}

/// A freshly issued `(state, nonce)` pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuedState {
    pub state: String,
    pub nonce: String,
}

#[derive(Clone)]
pub struct StateStore {
    pending: Arc<Mutex<HashMap<String, PendingLogin>>>,
    ttl: Duration,
}

impl Default for StateStore {
    fn default() -> Self {
        Self::new()
    }
}

impl StateStore {
    pub fn new() -> Self {
        Self::with_ttl(Duration::seconds(STATE_TTL_SECS))
    }

    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            pending: Arc::new(Mutex::new(HashMap::new())),
            ttl,
        }
    }

    /// Issue a new state and nonce, sweeping expired entries first.
    pub fn issue(&self) -> Result<IssuedState, RngError> {
        self.issue_at(Utc::now())
    }

    /// Look up and remove `state`. Returns its nonce if it was still fresh.
    ///
    /// The entry is removed even when expired, so a state value can never
    /// validate twice.
    pub fn validate_and_consume(&self, state: &str) -> Option<String> {
        self.validate_and_consume_at(state, Utc::now())
    }

    pub fn issue_at(&self, now: DateTime<Utc>) -> Result<IssuedState, RngError> {
        let issued = IssuedState {
            state: crypto::generate_token()?,
            nonce: crypto::generate_token()?,
        };

        let mut pending = self.lock();
        let ttl = self.ttl;
        pending.retain(|_, login| now - login.created_at <= ttl);
        pending.insert(
            issued.state.clone(),
            PendingLogin {
                nonce: issued.nonce.clone(),
                created_at: now,
            },
        );
        Ok(issued)
    }

    pub fn validate_and_consume_at(&self, state: &str, now: DateTime<Utc>) -> Option<String> {
        if state.is_empty() {
            return None;
        }
        let login = self.lock().remove(state)?;
        if now - login.created_at > self.ttl {
            return None;
        }
        Some(login.nonce)
    }

    /// Number of pending (possibly expired, not yet swept) entries.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, PendingLogin>> {
        self.pending.lock().expect("state store mutex poisoned")
    }
}
