/// Refresh Token Revocation
///
/// Blacklist of refresh tokens that must no longer be honoured. Entries are
/// keyed by `(subject id, token)` and live exactly as long as the token they
/// blacklist would have, so the store prunes itself.
///
/// Tokens are never stored in plaintext: the key uses the SHA-256 of the
/// token string.
///
/// Backends implement [`RevocationStore`]. Callers go through
/// [`RevocationList`], which bounds every call with a timeout and applies
/// the failure policy:
/// - reads fail open (`is_revoked` answers `false` when the store is down)
/// - writes are best-effort (a failed write is logged, never propagated)

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use sqlx::PgPool;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;

use crate::auth::clock::Clock;
use crate::error::RevocationError;

/// Hash a token using SHA-256
pub(crate) fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Short, non-reversible token label for log lines
pub(crate) fn fingerprint(token: &str) -> String {
    hash_token(token)[..12].to_string()
}

/// Storage backend for revocation entries
#[async_trait]
pub trait RevocationStore: Send + Sync {
    /// Record `token` as revoked for `subject_id` for `ttl`.
    /// Revoking an already-revoked token succeeds.
    async fn revoke(&self, subject_id: &str, token: &str, ttl: Duration)
        -> Result<(), RevocationError>;

    /// Atomically record the revocation unless a live entry already exists.
    /// Returns `true` when this call created the entry.
    async fn revoke_if_absent(
        &self,
        subject_id: &str,
        token: &str,
        ttl: Duration,
    ) -> Result<bool, RevocationError>;

    async fn is_revoked(&self, subject_id: &str, token: &str) -> Result<bool, RevocationError>;

    /// Delete entries whose TTL has elapsed. Returns the number removed.
    async fn prune_expired(&self) -> Result<u64, RevocationError>;
}

// ============================================================================
// Postgres backend
// ============================================================================

/// Revocation entries in the `revoked_tokens` table. TTL is enforced on
/// read (`expires_at > now()`) and by [`spawn_pruner`].
#[derive(Clone)]
pub struct PgRevocationStore {
    pool: PgPool,
}

impl PgRevocationStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RevocationStore for PgRevocationStore {
    async fn revoke(
        &self,
        subject_id: &str,
        token: &str,
        ttl: Duration,
    ) -> Result<(), RevocationError> {
        sqlx::query(
            r#"
            INSERT INTO revoked_tokens (subject_id, token_hash, revoked_at, expires_at)
            VALUES ($1, $2, now(), now() + make_interval(secs => $3))
            ON CONFLICT (subject_id, token_hash)
            DO UPDATE SET expires_at = GREATEST(revoked_tokens.expires_at, EXCLUDED.expires_at)
            "#,
        )
        .bind(subject_id)
        .bind(hash_token(token))
        .bind(ttl.as_secs_f64())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn revoke_if_absent(
        &self,
        subject_id: &str,
        token: &str,
        ttl: Duration,
    ) -> Result<bool, RevocationError> {
        // A stale row (expired but not yet pruned) may be reclaimed.
        let result = sqlx::query(
            r#"
            INSERT INTO revoked_tokens (subject_id, token_hash, revoked_at, expires_at)
            VALUES ($1, $2, now(), now() + make_interval(secs => $3))
            ON CONFLICT (subject_id, token_hash)
            DO UPDATE SET revoked_at = EXCLUDED.revoked_at, expires_at = EXCLUDED.expires_at
            WHERE revoked_tokens.expires_at <= now()
            "#,
        )
        .bind(subject_id)
        .bind(hash_token(token))
        .bind(ttl.as_secs_f64())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn is_revoked(&self, subject_id: &str, token: &str) -> Result<bool, RevocationError> {
        let revoked = sqlx::query_scalar::<_, bool>(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM revoked_tokens
                WHERE subject_id = $1 AND token_hash = $2 AND expires_at > now()
            )
            "#,
        )
        .bind(subject_id)
        .bind(hash_token(token))
        .fetch_one(&self.pool)
        .await?;

        Ok(revoked)
    }

    async fn prune_expired(&self) -> Result<u64, RevocationError> {
        let result = sqlx::query("DELETE FROM revoked_tokens WHERE expires_at <= now()")
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }
}

// ============================================================================
// In-memory backend
// ============================================================================

/// Process-local revocation entries. Suitable for a single instance and
/// for tests; expired entries are dropped lazily.
pub struct InMemoryRevocationStore {
    entries: RwLock<HashMap<(String, String), i64>>,
    clock: Arc<dyn Clock>,
}

impl InMemoryRevocationStore {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            clock,
        }
    }

    fn key(subject_id: &str, token: &str) -> (String, String) {
        (subject_id.to_string(), hash_token(token))
    }

    fn expires_at(&self, ttl: Duration) -> i64 {
        let ttl = i64::try_from(ttl.as_secs()).unwrap_or(i64::MAX);
        self.clock.now().saturating_add(ttl)
    }

    pub async fn len(&self) -> usize {
        let now = self.clock.now();
        self.entries
            .read()
            .await
            .values()
            .filter(|expires_at| **expires_at > now)
            .count()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl RevocationStore for InMemoryRevocationStore {
    async fn revoke(
        &self,
        subject_id: &str,
        token: &str,
        ttl: Duration,
    ) -> Result<(), RevocationError> {
        let expires_at = self.expires_at(ttl);
        let mut entries = self.entries.write().await;
        let entry = entries.entry(Self::key(subject_id, token)).or_insert(expires_at);
        *entry = (*entry).max(expires_at);
        Ok(())
    }

    async fn revoke_if_absent(
        &self,
        subject_id: &str,
        token: &str,
        ttl: Duration,
    ) -> Result<bool, RevocationError> {
        let now = self.clock.now();
        let expires_at = self.expires_at(ttl);
        let mut entries = self.entries.write().await;
        let key = Self::key(subject_id, token);

        match entries.get(&key) {
            Some(existing) if *existing > now => Ok(false),
            _ => {
                entries.insert(key, expires_at);
                Ok(true)
            }
        }
    }

    async fn is_revoked(&self, subject_id: &str, token: &str) -> Result<bool, RevocationError> {
        let now = self.clock.now();
        let entries = self.entries.read().await;
        Ok(entries
            .get(&Self::key(subject_id, token))
            .is_some_and(|expires_at| *expires_at > now))
    }

    async fn prune_expired(&self) -> Result<u64, RevocationError> {
        let now = self.clock.now();
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, expires_at| *expires_at > now);
        Ok((before - entries.len()) as u64)
    }
}

// ============================================================================
// Failure policy
// ============================================================================

/// Result of a best-effort revocation write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RevokeOutcome {
    Recorded,
    /// The write failed or timed out; the token stays usable until expiry
    Degraded,
}

/// Result of an atomic compare-and-revoke
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClaimOutcome {
    /// This caller revoked the token and may proceed
    Claimed,
    /// Someone else revoked it first
    AlreadyRevoked,
    /// The store could not answer; treated as claimed (fail-open)
    Degraded,
}

/// Policy wrapper around a [`RevocationStore`]
#[derive(Clone)]
pub struct RevocationList {
    store: Arc<dyn RevocationStore>,
    timeout: Duration,
}

impl RevocationList {
    pub fn new(store: Arc<dyn RevocationStore>, timeout: Duration) -> Self {
        Self { store, timeout }
    }

    pub fn store(&self) -> &Arc<dyn RevocationStore> {
        &self.store
    }

    async fn bounded<T, F>(&self, call: F) -> Result<T, RevocationError>
    where
        F: Future<Output = Result<T, RevocationError>>,
    {
        match tokio::time::timeout(self.timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(RevocationError::Timeout(self.timeout.as_millis() as u64)),
        }
    }

    /// Best-effort blacklist write. Never fails the caller.
    pub async fn revoke(&self, subject_id: &str, token: &str, ttl: Duration) -> RevokeOutcome {
        match self.bounded(self.store.revoke(subject_id, token, ttl)).await {
            Ok(()) => {
                tracing::debug!(
                    subject_id,
                    token = %fingerprint(token),
                    ttl_secs = ttl.as_secs(),
                    "Refresh token revoked"
                );
                RevokeOutcome::Recorded
            }
            Err(e) => {
                tracing::error!(
                    subject_id,
                    token = %fingerprint(token),
                    error = %e,
                    "Failed to record refresh token revocation; token remains valid until expiry"
                );
                RevokeOutcome::Degraded
            }
        }
    }

    /// Revocation check. Fails open: an unreachable store reads as "not revoked".
    pub async fn is_revoked(&self, subject_id: &str, token: &str) -> bool {
        match self.bounded(self.store.is_revoked(subject_id, token)).await {
            Ok(revoked) => revoked,
            Err(e) => {
                tracing::warn!(
                    subject_id,
                    token = %fingerprint(token),
                    error = %e,
                    "Revocation store unavailable; failing open on refresh token check"
                );
                false
            }
        }
    }

    /// Atomic compare-and-revoke used to serialize concurrent rotations
    pub async fn claim(&self, subject_id: &str, token: &str, ttl: Duration) -> ClaimOutcome {
        match self
            .bounded(self.store.revoke_if_absent(subject_id, token, ttl))
            .await
        {
            Ok(true) => ClaimOutcome::Claimed,
            Ok(false) => ClaimOutcome::AlreadyRevoked,
            Err(e) => {
                tracing::error!(
                    subject_id,
                    token = %fingerprint(token),
                    error = %e,
                    "Revocation store unavailable during rotation; failing open"
                );
                ClaimOutcome::Degraded
            }
        }
    }
}

/// Periodically delete expired revocation entries
pub fn spawn_pruner(store: Arc<dyn RevocationStore>, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        loop {
            ticker.tick().await;
            match store.prune_expired().await {
                Ok(0) => {}
                Ok(removed) => tracing::debug!(removed, "Pruned expired revocation entries"),
                Err(e) => tracing::warn!(error = %e, "Failed to prune revocation entries"),
            }
        }
    })
}
