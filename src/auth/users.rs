/// User Directory
///
/// Account lookup consumed by the auth core: id, email, credential hash,
/// role and active flag. Postgres in production, in-memory for tests and
/// local development.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use sqlx::PgPool;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::auth::permissions::Role;
use crate::error::{AppError, DatabaseError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserRecord {
    pub id: Uuid,
    pub email: String,
    pub name: String,
    pub password_hash: String,
    pub role: Role,
    pub is_active: bool,
}

/// Input for account creation
#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: String,
    pub name: String,
    pub password_hash: String,
    pub role: Role,
}

#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn find_by_email(&self, email: &str) -> Result<Option<UserRecord>, AppError>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<UserRecord>, AppError>;

    /// # Errors
    /// `DatabaseError::UniqueConstraintViolation` when the email is taken
    async fn create(&self, user: NewUser) -> Result<UserRecord, AppError>;
}

// ============================================================================
// Postgres backend
// ============================================================================

#[derive(Clone)]
pub struct PgUserDirectory {
    pool: PgPool,
}

impl PgUserDirectory {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

type UserRow = (Uuid, String, String, String, String, bool);

fn from_row((id, email, name, password_hash, role, is_active): UserRow) -> UserRecord {
    let role = role.parse().unwrap_or_else(|_| {
        tracing::warn!(user_id = %id, role = %role, "User has an unrecognized role");
        Role::Unknown
    });

    UserRecord {
        id,
        email,
        name,
        password_hash,
        role,
        is_active,
    }
}

#[async_trait]
impl UserDirectory for PgUserDirectory {
    async fn find_by_email(&self, email: &str) -> Result<Option<UserRecord>, AppError> {
        let row = sqlx::query_as::<_, UserRow>(
            "SELECT id, email, name, password_hash, role, is_active FROM users WHERE email = $1",
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(from_row))
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<UserRecord>, AppError> {
        let row = sqlx::query_as::<_, UserRow>(
            "SELECT id, email, name, password_hash, role, is_active FROM users WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(from_row))
    }

    async fn create(&self, user: NewUser) -> Result<UserRecord, AppError> {
        let id = Uuid::new_v4();
        let now = Utc::now();

        sqlx::query(
            r#"
            INSERT INTO users (id, email, name, password_hash, role, is_active, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, true, $6, $7)
            "#,
        )
        .bind(id)
        .bind(&user.email)
        .bind(&user.name)
        .bind(&user.password_hash)
        .bind(user.role.as_str())
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(UserRecord {
            id,
            email: user.email,
            name: user.name,
            password_hash: user.password_hash,
            role: user.role,
            is_active: true,
        })
    }
}

// ============================================================================
// In-memory backend
// ============================================================================

#[derive(Default)]
pub struct InMemoryUserDirectory {
    users: RwLock<HashMap<Uuid, UserRecord>>,
}

impl InMemoryUserDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a record as-is
    pub async fn upsert(&self, user: UserRecord) {
        self.users.write().await.insert(user.id, user);
    }

    pub async fn set_role(&self, id: Uuid, role: Role) -> bool {
        match self.users.write().await.get_mut(&id) {
            Some(user) => {
                user.role = role;
                true
            }
            None => false,
        }
    }

    pub async fn set_active(&self, id: Uuid, is_active: bool) -> bool {
        match self.users.write().await.get_mut(&id) {
            Some(user) => {
                user.is_active = is_active;
                true
            }
            None => false,
        }
    }
}

#[async_trait]
impl UserDirectory for InMemoryUserDirectory {
    async fn find_by_email(&self, email: &str) -> Result<Option<UserRecord>, AppError> {
        let users = self.users.read().await;
        Ok(users
            .values()
            .find(|user| user.email.eq_ignore_ascii_case(email))
            .cloned())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<UserRecord>, AppError> {
        Ok(self.users.read().await.get(&id).cloned())
    }

    async fn create(&self, user: NewUser) -> Result<UserRecord, AppError> {
        let mut users = self.users.write().await;
        if users
            .values()
            .any(|existing| existing.email.eq_ignore_ascii_case(&user.email))
        {
            return Err(AppError::Database(DatabaseError::UniqueConstraintViolation(
                "Email already registered".to_string(),
            )));
        }

        let record = UserRecord {
            id: Uuid::new_v4(),
            email: user.email,
            name: user.name,
            password_hash: user.password_hash,
            role: user.role,
            is_active: true,
        };
        users.insert(record.id, record.clone());
        Ok(record)
    }
}
