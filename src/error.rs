/// Error Handling Module
///
/// Unified error handling for the gateway:
/// 1. Domain-specific error types (token, revocation, permission, auth, ...)
/// 2. A single `AppError` used for control flow
/// 3. HTTP response mapping with structured bodies
/// 4. Structured error logging with context

use actix_web::{error::ResponseError, http::StatusCode, HttpResponse};
use thiserror::Error;

use crate::auth::{Permission, Role};

/// ============================================================================
/// 1. DOMAIN-SPECIFIC ERROR TYPES
/// ============================================================================

/// Validation errors for input data
#[derive(Debug, Clone, Error)]
pub enum ValidationError {
    #[error("{0} is empty")]
    EmptyField(String),
    #[error("{0} is too short (minimum {1} characters)")]
    TooShort(String, usize),
    #[error("{0} is too long (maximum {1} characters)")]
    TooLong(String, usize),
    #[error("{0} has invalid format")]
    InvalidFormat(String),
    #[error("{0} contains suspicious content")]
    SuspiciousContent(String),
}

/// Database operation errors
#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("Duplicate entry: {0}")]
    UniqueConstraintViolation(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Database connection error: {0}")]
    ConnectionPool(String),
    #[error("Database error: {0}")]
    UnexpectedError(String),
}

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required config: {0}")]
    MissingRequired(String),
    #[error("Invalid config value: {0}")]
    InvalidValue(String),
    #[error("Config parse error: {0}")]
    ParseError(String),
}

impl From<config::ConfigError> for ConfigError {
    fn from(err: config::ConfigError) -> Self {
        ConfigError::ParseError(err.to_string())
    }
}

/// Outcome of a failed token verification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TokenError {
    #[error("token has expired")]
    Expired,
    #[error("token signature or format is invalid")]
    Invalid,
    #[error("token has been revoked")]
    Revoked,
}

/// Revocation store failures. Never surfaced to clients: the
/// revocation policy decides how each one degrades.
#[derive(Debug, Error)]
pub enum RevocationError {
    #[error("revocation store unavailable: {0}")]
    Unavailable(String),
    #[error("revocation store call timed out after {0}ms")]
    Timeout(u64),
    #[error("revocation store error: {0}")]
    Backend(String),
}

impl From<sqlx::Error> for RevocationError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
                RevocationError::Unavailable(err.to_string())
            }
            other => RevocationError::Backend(other.to_string()),
        }
    }
}

/// Permission table lookup failures. Always resolved to a denial.
#[derive(Debug, Clone, Error)]
pub enum PermissionError {
    #[error("invalid resource type '{0}'")]
    InvalidResourceType(String),
    #[error("unknown permission '{0}'")]
    UnknownPermission(String),
    #[error("unknown role '{0}'")]
    UnknownRole(String),
}

/// Authentication and authorization errors
#[derive(Debug, Clone, Error)]
pub enum AuthError {
    #[error("Invalid credentials")]
    InvalidCredentials,
    #[error("Account is inactive")]
    AccountInactive,
    #[error("Missing authentication token")]
    TokenMissing,
    #[error("Token has expired")]
    TokenExpired,
    #[error("Invalid token")]
    TokenInvalid,
    #[error("Missing refresh token")]
    RefreshTokenMissing,
    #[error("Invalid refresh token")]
    InvalidRefreshToken,
    #[error("Refresh token has been revoked")]
    RefreshTokenRevoked,
    #[error("Role '{0}' is not allowed to access this resource")]
    RoleDenied(Role),
    #[error("Permission '{permission}' denied{}", .resource.as_ref().map(|r| format!(" on '{r}'")).unwrap_or_default())]
    PermissionDenied {
        permission: Permission,
        resource: Option<String>,
    },
}

impl From<TokenError> for AuthError {
    fn from(err: TokenError) -> Self {
        match err {
            TokenError::Expired => AuthError::TokenExpired,
            TokenError::Invalid => AuthError::TokenInvalid,
            TokenError::Revoked => AuthError::RefreshTokenRevoked,
        }
    }
}

/// ============================================================================
/// 2. UNIFIED APPLICATION ERROR TYPE
/// ============================================================================

/// Central error type that all application errors map to
#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Database(#[from] DatabaseError),
    #[error(transparent)]
    Auth(#[from] AuthError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<TokenError> for AppError {
    fn from(err: TokenError) -> Self {
        AppError::Auth(err.into())
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db_err) = &err {
            if db_err.code().as_deref() == Some("23505") {
                return AppError::Database(DatabaseError::UniqueConstraintViolation(
                    "Email already registered".to_string(),
                ));
            }
        }

        match err {
            sqlx::Error::RowNotFound => {
                AppError::Database(DatabaseError::NotFound("Record not found".to_string()))
            }
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
                AppError::Database(DatabaseError::ConnectionPool(err.to_string()))
            }
            other => AppError::Database(DatabaseError::UnexpectedError(other.to_string())),
        }
    }
}

// ============================================================================
// 3. HTTP RESPONSE MAPPING
// ============================================================================

/// Error response structure for HTTP responses
#[derive(Debug, serde::Serialize)]
pub struct ErrorResponse {
    /// Unique error ID, logged alongside the failure
    pub error_id: String,
    /// Human-readable error message
    pub message: String,
    /// Error code for client-side handling
    pub code: String,
    /// HTTP status code
    pub status: u16,
    /// Timestamp when error occurred
    pub timestamp: String,
}

impl ErrorResponse {
    pub fn new(error_id: String, message: String, code: String, status: u16) -> Self {
        Self {
            error_id,
            message,
            code,
            status,
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// Converts errors to HTTP responses with matching logs
pub trait ErrorHandler {
    fn error_response(&self, error_id: &str) -> (StatusCode, ErrorResponse);
    fn log_error(&self, error_id: &str);
}

impl AppError {
    /// Stable machine-readable code for the error
    pub fn code(&self) -> &'static str {
        match self {
            AppError::Validation(_) => "VALIDATION_ERROR",
            AppError::Database(e) => match e {
                DatabaseError::UniqueConstraintViolation(_) => "DUPLICATE_ENTRY",
                DatabaseError::NotFound(_) => "NOT_FOUND",
                DatabaseError::ConnectionPool(_) => "SERVICE_UNAVAILABLE",
                DatabaseError::UnexpectedError(_) => "DATABASE_ERROR",
            },
            AppError::Auth(e) => match e {
                AuthError::InvalidCredentials => "INVALID_CREDENTIALS",
                AuthError::AccountInactive => "ACCOUNT_INACTIVE",
                AuthError::TokenMissing => "TOKEN_MISSING",
                AuthError::TokenExpired => "TOKEN_EXPIRED",
                AuthError::TokenInvalid => "TOKEN_INVALID",
                AuthError::RefreshTokenMissing => "REFRESH_TOKEN_MISSING",
                AuthError::InvalidRefreshToken => "INVALID_REFRESH_TOKEN",
                AuthError::RefreshTokenRevoked => "REFRESH_TOKEN_REVOKED",
                AuthError::RoleDenied(_) => "ROLE_DENIED",
                AuthError::PermissionDenied { .. } => "PERMISSION_DENIED",
            },
            AppError::Config(_) => "CONFIG_ERROR",
            AppError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Message safe to show to clients. Internal details stay in the logs.
    fn public_message(&self) -> String {
        match self {
            AppError::Validation(e) => e.to_string(),
            AppError::Auth(e) => e.to_string(),
            AppError::Database(e) => match e {
                DatabaseError::UniqueConstraintViolation(_) | DatabaseError::NotFound(_) => {
                    e.to_string()
                }
                DatabaseError::ConnectionPool(_) => {
                    "Database service temporarily unavailable".to_string()
                }
                DatabaseError::UnexpectedError(_) => "Database error occurred".to_string(),
            },
            AppError::Config(_) => "Server configuration error".to_string(),
            AppError::Internal(_) => "Internal server error".to_string(),
        }
    }
}

impl ErrorHandler for AppError {
    fn error_response(&self, error_id: &str) -> (StatusCode, ErrorResponse) {
        let status = self.status_code();
        let body = ErrorResponse::new(
            error_id.to_string(),
            self.public_message(),
            self.code().to_string(),
            status.as_u16(),
        );
        (status, body)
    }

    fn log_error(&self, error_id: &str) {
        match self {
            AppError::Validation(e) => {
                tracing::warn!(error_id = error_id, error = %e, "Validation error");
            }
            AppError::Database(DatabaseError::UniqueConstraintViolation(_)) => {
                tracing::warn!(error_id = error_id, error = %self, "Duplicate entry attempt");
            }
            AppError::Database(e) => {
                tracing::error!(error_id = error_id, error = %e, "Database error");
            }
            AppError::Auth(AuthError::InvalidCredentials) => {
                tracing::warn!(error_id = error_id, "Invalid credentials attempt");
            }
            AppError::Auth(e @ (AuthError::RoleDenied(_) | AuthError::PermissionDenied { .. })) => {
                tracing::warn!(error_id = error_id, error = %e, "Authorization denied");
            }
            AppError::Auth(e) => {
                tracing::info!(error_id = error_id, error = %e, "Authentication rejected");
            }
            AppError::Config(e) => {
                tracing::error!(error_id = error_id, error = %e, "Configuration error");
            }
            AppError::Internal(msg) => {
                tracing::error!(error_id = error_id, error = %msg, "Internal error");
            }
        }
    }
}

impl ResponseError for AppError {
    fn error_response(&self) -> HttpResponse {
        let error_id = uuid::Uuid::new_v4().to_string();
        self.log_error(&error_id);

        let (status, body) = <Self as ErrorHandler>::error_response(self, &error_id);
        HttpResponse::build(status).json(body)
    }

    fn status_code(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::Database(e) => match e {
                DatabaseError::UniqueConstraintViolation(_) => StatusCode::CONFLICT,
                DatabaseError::NotFound(_) => StatusCode::NOT_FOUND,
                DatabaseError::ConnectionPool(_) => StatusCode::SERVICE_UNAVAILABLE,
                DatabaseError::UnexpectedError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            AppError::Auth(e) => match e {
                AuthError::AccountInactive
                | AuthError::RoleDenied(_)
                | AuthError::PermissionDenied { .. } => StatusCode::FORBIDDEN,
                _ => StatusCode::UNAUTHORIZED,
            },
            AppError::Config(_) | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

// ============================================================================
// 4. ERROR CONTEXT ENRICHMENT
// ============================================================================

/// Context attached to log lines of a single auth operation
#[derive(Debug, Clone)]
pub struct ErrorContext {
    pub request_id: String,
    pub user_id: Option<String>,
    pub operation: String,
}

impl ErrorContext {
    pub fn new(operation: impl Into<String>) -> Self {
        Self {
            request_id: uuid::Uuid::new_v4().to_string(),
            user_id: None,
            operation: operation.into(),
        }
    }

    /// Reuse the id assigned by the request logger, if any
    pub fn for_request(req: &actix_web::HttpRequest, operation: impl Into<String>) -> Self {
        use actix_web::HttpMessage;

        let mut context = Self::new(operation);
        if let Some(id) = req.extensions().get::<crate::request_id::RequestId>() {
            context.request_id = id.0.clone();
        }
        context
    }

    pub fn with_user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn log_error(&self, error: &AppError) {
        tracing::warn!(
            request_id = %self.request_id,
            operation = %self.operation,
            user_id = ?self.user_id,
            code = error.code(),
            error = %error,
            "Operation failed"
        );
    }
}
