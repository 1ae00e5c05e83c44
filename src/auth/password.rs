/// Credential Verification
///
/// The login flow only sees [`CredentialVerifier`]: it checks a secret
/// against a stored hash, and spends the same work when there is no stored
/// hash at all so an unknown account answers no faster than a wrong
/// password.

use bcrypt::{hash, verify, DEFAULT_COST};
use uuid::Uuid;

use crate::error::{AppError, ValidationError};

pub trait CredentialVerifier: Send + Sync {
    fn verify(&self, secret: &str, stored_hash: &str) -> Result<bool, AppError>;

    /// Burn one verification's worth of work for a missing account
    fn verify_absent(&self, secret: &str);
}

/// bcrypt-backed verifier
#[derive(Debug, Clone)]
pub struct BcryptVerifier {
    // Hash of a random secret, same cost as stored passwords
    decoy_hash: String,
}

impl BcryptVerifier {
    pub fn new() -> Result<Self, AppError> {
        Self::with_cost(DEFAULT_COST)
    }

    pub fn with_cost(cost: u32) -> Result<Self, AppError> {
        let decoy_hash = hash(Uuid::new_v4().to_string(), cost)
            .map_err(|e| AppError::Internal(format!("Password hashing failed: {}", e)))?;
        Ok(Self { decoy_hash })
    }
}

impl CredentialVerifier for BcryptVerifier {
    fn verify(&self, secret: &str, stored_hash: &str) -> Result<bool, AppError> {
        verify_password(secret, stored_hash)
    }

    fn verify_absent(&self, secret: &str) {
        let _ = verify(secret, &self.decoy_hash);
    }
}

const MIN_PASSWORD_LENGTH: usize = 8;
const MAX_PASSWORD_LENGTH: usize = 128;

/// Hash a new account's password after checking its strength
pub fn hash_password(password: &str) -> Result<String, AppError> {
    validate_password_strength(password)?;

    hash(password, DEFAULT_COST)
        .map_err(|e| AppError::Internal(format!("Password hashing failed: {}", e)))
}

pub fn verify_password(password: &str, hash: &str) -> Result<bool, AppError> {
    verify(password, hash)
        .map_err(|e| AppError::Internal(format!("Password verification failed: {}", e)))
}

/// 8..=128 characters with at least one digit, one lowercase and one
/// uppercase letter. The upper bound keeps bcrypt input bounded.
fn validate_password_strength(password: &str) -> Result<(), AppError> {
    if password.len() < MIN_PASSWORD_LENGTH {
        return Err(ValidationError::TooShort("password".to_string(), MIN_PASSWORD_LENGTH).into());
    }
    if password.len() > MAX_PASSWORD_LENGTH {
        return Err(ValidationError::TooLong("password".to_string(), MAX_PASSWORD_LENGTH).into());
    }

    let has_digit = password.chars().any(|c| c.is_ascii_digit());
    let has_lowercase = password.chars().any(char::is_lowercase);
    let has_uppercase = password.chars().any(char::is_uppercase);

    if has_digit && has_lowercase && has_uppercase {
        Ok(())
    } else {
        Err(ValidationError::InvalidFormat(
            "password must mix digits, lowercase and uppercase letters".to_string(),
        )
        .into())
    }
}
