//! ID-token claim checks.
//!
//! Signature, issuer, audience and expiry are checked by the server's
//! verifier. What remains here is pure: nonce binding, the required-claim
//! rules, and merging userinfo results into the token claims.

use serde::{Deserialize, Deserializer, Serialize};

/// A claim-level rejection of an otherwise well-signed token.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ClaimsError {
    #[error("nonce does not match the login attempt")]
    NonceMismatch,
    #[error("missing subject (sub) claim")]
    MissingSubject,
    #[error("missing email claim")]
    MissingEmail,
    #[error("email is not verified")]
    EmailNotVerified,
}

/// The subset of ID-token (or userinfo) claims this service reads.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IdTokenClaims {
    #[serde(default)]
    pub sub: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default, deserialize_with = "lenient_bool")]
    pub email_verified: Option<bool>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub picture: Option<String>,
    #[serde(default)]
    pub nonce: Option<String>,
}

/// An identity produced from a cryptographically validated token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedIdentity {
    pub subject: String,
    pub email: String,
    pub email_verified: bool,
    pub name: Option<String>,
    pub picture: Option<String>,
}

impl IdTokenClaims {
    /// Non-empty `sub`, or [`ClaimsError::MissingSubject`].
    pub fn subject(&self) -> Result<&str, ClaimsError> {
        self.sub
            .as_deref()
            .filter(|s| !s.is_empty())
            .ok_or(ClaimsError::MissingSubject)
    }

    /// True when the token carries a usable email.
    pub fn has_email(&self) -> bool {
        self.email.as_deref().is_some_and(|e| !e.is_empty())
    }

    /// When a nonce is expected, the token must carry exactly that nonce.
    pub fn check_nonce(&self, expected: Option<&str>) -> Result<(), ClaimsError> {
        match expected {
            None => Ok(()),
            Some(expected) if self.nonce.as_deref() == Some(expected) => Ok(()),
            Some(_) => Err(ClaimsError::NonceMismatch),
        }
    }

    /// Fill email (and profile fields) from a userinfo response. Claims the
    /// token already has are never overwritten.
    pub fn backfill(&mut self, userinfo: IdTokenClaims) {
        if !self.has_email() && userinfo.has_email() {
            self.email = userinfo.email;
            self.email_verified = userinfo.email_verified;
        }
        if self.name.is_none() {
            self.name = userinfo.name;
        }
        if self.picture.is_none() {
            self.picture = userinfo.picture;
        }
    }

    /// Apply the required-claim rules and project into a [`VerifiedIdentity`].
    ///
    /// An explicit `email_verified: false` is fatal; an absent flag is accepted.
    pub fn into_identity(self) -> Result<VerifiedIdentity, ClaimsError> {
        let subject = self.subject()?.to_string();
        let email = self
            .email
            .filter(|e| !e.is_empty())
            .ok_or(ClaimsError::MissingEmail)?;
        if self.email_verified == Some(false) {
            return Err(ClaimsError::EmailNotVerified);
        }
        Ok(VerifiedIdentity {
            subject,
            email,
            email_verified: self.email_verified.unwrap_or(true),
            name: self.name,
            picture: self.picture,
        })
    }
}

/// Accept `true`/`false` as booleans or strings; anything else is "not reported".
fn lenient_bool<'de, D>(deserializer: D) -> Result<Option<bool>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::Bool(b)) => Some(b),
        Some(serde_json::Value::String(s)) => match s.to_ascii_lowercase().as_str() {
            "true" => Some(true),
            "false" => Some(false),
            _ => None,
        },
        _ => None,
    })
}
