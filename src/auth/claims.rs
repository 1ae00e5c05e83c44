/// JWT Claims structures
///
/// `IdentityClaims` is the identity every token carries; `TokenClaims` is
/// the signed payload (identity plus the registered RFC 7519 fields).

use std::time::Duration;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::permissions::Role;
use crate::error::{AppError, AuthError};

/// Identity claim set: who the bearer is and what role they hold
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityClaims {
    /// Subject (user ID as UUID string)
    pub sub: String,
    pub email: String,
    pub role: Role,
}

impl IdentityClaims {
    pub fn new(user_id: Uuid, email: impl Into<String>, role: Role) -> Self {
        Self {
            sub: user_id.to_string(),
            email: email.into(),
            role,
        }
    }

    /// Extract user ID from claims
    ///
    /// # Errors
    /// A subject that is not a UUID means the token was not minted here
    pub fn user_id(&self) -> Result<Uuid, AppError> {
        Uuid::parse_str(&self.sub).map_err(|_| AppError::Auth(AuthError::TokenInvalid))
    }
}

/// Signed token payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenClaims {
    pub sub: String,
    pub email: String,
    pub role: Role,
    /// Issued at (Unix timestamp)
    pub iat: i64,
    /// Expiration time (Unix timestamp)
    pub exp: i64,
    pub iss: String,
    /// Unique token id; set on refresh tokens only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jti: Option<String>,
}

impl TokenClaims {
    pub fn new(
        identity: &IdentityClaims,
        issued_at: i64,
        expiry_seconds: i64,
        issuer: &str,
        jti: Option<String>,
    ) -> Self {
        Self {
            sub: identity.sub.clone(),
            email: identity.email.clone(),
            role: identity.role,
            iat: issued_at,
            exp: issued_at + expiry_seconds,
            iss: issuer.to_string(),
            jti,
        }
    }

    pub fn identity(&self) -> IdentityClaims {
        IdentityClaims {
            sub: self.sub.clone(),
            email: self.email.clone(),
            role: self.role,
        }
    }

    /// A token stays valid through the second named by `exp`
    pub fn is_expired_at(&self, now: i64) -> bool {
        self.exp < now
    }

    /// How long the token is still honoured, counting the `exp` second
    /// itself. Zero once expired.
    pub fn remaining_lifetime(&self, now: i64) -> Duration {
        Duration::from_secs(u64::try_from(self.exp - now + 1).unwrap_or(0))
    }
}
