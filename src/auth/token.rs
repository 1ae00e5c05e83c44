/// Token Service
///
/// Issues and verifies the two token classes:
/// - access tokens: short-lived, proven by signature + expiry alone
/// - refresh tokens: long-lived, additionally checked against the
///   revocation list
///
/// Each class has its own HS256 secret and lifetime.

use std::sync::Arc;
use std::time::Duration;

use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use uuid::Uuid;

use crate::auth::claims::{IdentityClaims, TokenClaims};
use crate::auth::clock::Clock;
use crate::auth::revocation::RevocationList;
use crate::configuration::JwtSettings;
use crate::error::{AppError, TokenError};

const ALGORITHM: Algorithm = Algorithm::HS256;

/// Signing material and lifetime of one token class
struct TokenClass {
    encoding: EncodingKey,
    decoding: DecodingKey,
    expiry_seconds: i64,
}

impl TokenClass {
    fn new(secret: &str, expiry_seconds: i64) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            expiry_seconds,
        }
    }
}

pub struct TokenService {
    access: TokenClass,
    refresh: TokenClass,
    issuer: String,
    clock: Arc<dyn Clock>,
    revocations: RevocationList,
}

impl TokenService {
    pub fn new(config: &JwtSettings, clock: Arc<dyn Clock>, revocations: RevocationList) -> Self {
        Self {
            access: TokenClass::new(&config.access_secret, config.access_token_expiry),
            refresh: TokenClass::new(&config.refresh_secret, config.refresh_token_expiry),
            issuer: config.issuer.clone(),
            clock,
            revocations,
        }
    }

    pub fn access_ttl(&self) -> i64 {
        self.access.expiry_seconds
    }

    pub fn revocations(&self) -> &RevocationList {
        &self.revocations
    }

    /// Sign a short-lived access token.
    ///
    /// Deterministic: identical claims, clock reading and secret produce
    /// the same string.
    pub fn issue_access(&self, identity: &IdentityClaims) -> Result<String, AppError> {
        self.sign(&self.access, identity, None)
    }

    /// Sign a long-lived refresh token.
    ///
    /// Carries a random `jti` so two tokens minted in the same second for
    /// the same identity never collide in the revocation list.
    pub fn issue_refresh(&self, identity: &IdentityClaims) -> Result<String, AppError> {
        self.sign(&self.refresh, identity, Some(Uuid::new_v4().to_string()))
    }

    fn sign(
        &self,
        class: &TokenClass,
        identity: &IdentityClaims,
        jti: Option<String>,
    ) -> Result<String, AppError> {
        let claims = TokenClaims::new(
            identity,
            self.clock.now(),
            class.expiry_seconds,
            &self.issuer,
            jti,
        );

        encode(&Header::new(ALGORITHM), &claims, &class.encoding)
            .map_err(|e| AppError::Internal(format!("Token generation failed: {}", e)))
    }

    /// Verify an access token: signature and expiry only
    pub fn verify_access(&self, token: &str) -> Result<TokenClaims, TokenError> {
        self.verify(&self.access, token)
    }

    /// Verify a refresh token's signature and expiry without consulting the
    /// revocation list
    pub fn verify_refresh_signature(&self, token: &str) -> Result<TokenClaims, TokenError> {
        self.verify(&self.refresh, token)
    }

    /// Verify a refresh token: signature, expiry and revocation
    pub async fn verify_refresh(&self, token: &str) -> Result<TokenClaims, TokenError> {
        let claims = self.verify_refresh_signature(token)?;

        if self.revocations.is_revoked(&claims.sub, token).await {
            tracing::warn!(user_id = %claims.sub, "Attempt to use revoked refresh token");
            return Err(TokenError::Revoked);
        }

        Ok(claims)
    }

    fn verify(&self, class: &TokenClass, token: &str) -> Result<TokenClaims, TokenError> {
        let mut validation = Validation::new(ALGORITHM);
        // Expiry is checked against the injected clock below
        validation.validate_exp = false;
        validation.leeway = 0;
        validation.set_issuer(&[&self.issuer]);
        validation.set_required_spec_claims(&["exp", "iat", "iss", "sub"]);

        let claims = decode::<TokenClaims>(token, &class.decoding, &validation)
            .map(|data| data.claims)
            .map_err(|e| {
                tracing::debug!(error = %e, "Token rejected");
                TokenError::Invalid
            })?;

        if claims.is_expired_at(self.clock.now()) {
            return Err(TokenError::Expired);
        }

        Ok(claims)
    }

    /// Read a token's payload WITHOUT verifying its signature or expiry.
    ///
    /// Not authentication. Only for labelling log lines with a subject.
    pub fn decode_unsafe(token: &str) -> Option<TokenClaims> {
        let mut validation = Validation::new(ALGORITHM);
        validation.insecure_disable_signature_validation();
        validation.validate_exp = false;
        validation.required_spec_claims.clear();

        decode::<TokenClaims>(token, &DecodingKey::from_secret(&[]), &validation)
            .map(|data| data.claims)
            .ok()
    }

    /// Lifetime left on a token, used as the TTL of its revocation entry
    pub fn remaining_lifetime(&self, claims: &TokenClaims) -> Duration {
        claims.remaining_lifetime(self.clock.now())
    }
}
