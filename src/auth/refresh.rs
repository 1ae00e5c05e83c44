/// Refresh Coordinator
///
/// Mints a new access token from a refresh token:
///
/// 1. extract the presented token (missing: `RefreshTokenMissing`)
/// 2. verify signature and expiry (failure: `InvalidRefreshToken`)
/// 3. check the revocation list, failing open (revoked: `RefreshTokenRevoked`)
/// 4. issue a new access token
/// 5. when rotation is on, revoke the old refresh token and issue a new one
///
/// With `RotationRace::Accept` two concurrent refreshes of the same token
/// can both pass step 3 before either revocation lands, so both succeed.
/// `RotationRace::CompareAndRevoke` closes that window by atomically
/// claiming the old token before anything is minted.

use std::sync::Arc;

use crate::auth::claims::{IdentityClaims, TokenClaims};
use crate::auth::revocation::{ClaimOutcome, RevokeOutcome};
use crate::auth::token::TokenService;
use crate::auth::users::UserDirectory;
use crate::configuration::{JwtSettings, RotationRace};
use crate::error::{AppError, AuthError, TokenError};

/// Tokens produced by a successful refresh
#[derive(Debug, Clone)]
pub struct RefreshOutcome {
    pub identity: IdentityClaims,
    pub access_token: String,
    /// Present only when rotation is enabled
    pub refresh_token: Option<String>,
}

/// What logout managed to do with the presented refresh token
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogoutOutcome {
    Revoked,
    /// The blacklist write failed; logout still succeeds for the caller
    Degraded,
    /// Token absent, unverifiable or already expired
    NothingToRevoke,
}

pub struct RefreshCoordinator {
    tokens: Arc<TokenService>,
    users: Arc<dyn UserDirectory>,
    rotate: bool,
    race: RotationRace,
}

impl RefreshCoordinator {
    pub fn new(tokens: Arc<TokenService>, users: Arc<dyn UserDirectory>, config: &JwtSettings) -> Self {
        Self {
            tokens,
            users,
            rotate: config.rotate_refresh_tokens,
            race: config.rotation_race,
        }
    }

    pub async fn refresh(&self, presented: Option<&str>) -> Result<RefreshOutcome, AppError> {
        let token = presented
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .ok_or(AuthError::RefreshTokenMissing)?;

        let claims = self
            .tokens
            .verify_refresh(token)
            .await
            .map_err(|e| match e {
                TokenError::Revoked => AuthError::RefreshTokenRevoked,
                TokenError::Expired | TokenError::Invalid => {
                    let subject = TokenService::decode_unsafe(token).map(|c| c.sub);
                    tracing::info!(subject = ?subject, reason = %e, "Refresh token rejected");
                    AuthError::InvalidRefreshToken
                }
            })?;

        let revocations = self.tokens.revocations();

        let identity = self.current_identity(&claims).await?;
        let ttl = self.tokens.remaining_lifetime(&claims);

        if self.rotate && self.race == RotationRace::CompareAndRevoke {
            match revocations.claim(&claims.sub, token, ttl).await {
                ClaimOutcome::Claimed | ClaimOutcome::Degraded => {}
                ClaimOutcome::AlreadyRevoked => {
                    tracing::warn!(
                        user_id = %claims.sub,
                        "Concurrent refresh lost the rotation claim"
                    );
                    return Err(AuthError::RefreshTokenRevoked.into());
                }
            }
        }

        let access_token = self.tokens.issue_access(&identity)?;

        let refresh_token = if self.rotate {
            if self.race == RotationRace::Accept {
                revocations.revoke(&claims.sub, token, ttl).await;
            }
            Some(self.tokens.issue_refresh(&identity)?)
        } else {
            None
        };

        tracing::info!(
            user_id = %identity.sub,
            rotated = refresh_token.is_some(),
            "Token refreshed successfully"
        );

        Ok(RefreshOutcome {
            identity,
            access_token,
            refresh_token,
        })
    }

    /// Re-read the account so email/role changes land in the new token
    async fn current_identity(&self, claims: &TokenClaims) -> Result<IdentityClaims, AppError> {
        let user_id = claims
            .identity()
            .user_id()
            .map_err(|_| AuthError::InvalidRefreshToken)?;

        match self.users.find_by_id(user_id).await? {
            Some(user) if user.is_active => Ok(IdentityClaims::new(user.id, user.email, user.role)),
            Some(_) => {
                tracing::warn!(user_id = %user_id, "Refresh attempted for inactive account");
                Err(AuthError::AccountInactive.into())
            }
            None => {
                tracing::warn!(user_id = %user_id, "Refresh token subject no longer exists");
                Err(AuthError::InvalidRefreshToken.into())
            }
        }
    }

    /// Blacklist the presented refresh token for the rest of its lifetime.
    /// Never fails: logout must succeed for the user either way.
    pub async fn logout(&self, presented: Option<&str>) -> LogoutOutcome {
        let Some(token) = presented.map(str::trim).filter(|token| !token.is_empty()) else {
            return LogoutOutcome::NothingToRevoke;
        };

        let claims = match self.tokens.verify_refresh_signature(token) {
            Ok(claims) => claims,
            Err(TokenError::Expired) => return LogoutOutcome::NothingToRevoke,
            Err(e) => {
                let subject = TokenService::decode_unsafe(token).map(|c| c.sub);
                tracing::info!(subject = ?subject, reason = %e, "Logout with unverifiable refresh token");
                return LogoutOutcome::NothingToRevoke;
            }
        };

        let ttl = self.tokens.remaining_lifetime(&claims);
        match self.tokens.revocations().revoke(&claims.sub, token, ttl).await {
            RevokeOutcome::Recorded => {
                tracing::info!(user_id = %claims.sub, "User logged out");
                LogoutOutcome::Revoked
            }
            RevokeOutcome::Degraded => LogoutOutcome::Degraded,
        }
    }
}
