use std::time::Duration;

use crate::auth::ResourceOverride;
use crate::error::ConfigError;

#[derive(serde::Deserialize, Clone)]
pub struct Settings {
    pub database: DatabaseSettings,
    pub application: ApplicationSettings,
    pub jwt: JwtSettings,
    #[serde(default)]
    pub revocation: RevocationSettings,
    #[serde(default)]
    pub cookies: CookieSettings,
    #[serde(default)]
    pub permissions: PermissionSettings,
}

#[derive(serde::Deserialize, Clone)]
pub struct ApplicationSettings {
    #[serde(default = "default_host")]
    pub host: String,
    pub port: u16,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

#[derive(serde::Deserialize, Clone)]
pub struct DatabaseSettings {
    pub username: String,
    pub password: String,
    pub port: u16,
    pub host: String,
    pub database_name: String,
}

impl DatabaseSettings {
    pub fn connection_string(&self) -> String {
        format!(
            "postgres://{}:{}@{}:{}/{}",
            self.username, self.password, self.host, self.port, self.database_name
        )
    }
}

/// What to do when two refreshes race on the same refresh token
#[derive(serde::Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RotationRace {
    /// Both requests may succeed; the old token is revoked after the fact
    #[default]
    Accept,
    /// The old token is atomically claimed first; only one request wins
    CompareAndRevoke,
}

/// Token signing and lifetime settings
#[derive(serde::Deserialize, Clone)]
pub struct JwtSettings {
    pub access_secret: String,
    pub refresh_secret: String,
    pub access_token_expiry: i64,   // seconds (e.g., 900 for 15 minutes)
    pub refresh_token_expiry: i64,  // seconds (e.g., 604800 for 7 days)
    pub issuer: String,
    #[serde(default)]
    pub rotate_refresh_tokens: bool,
    #[serde(default)]
    pub rotation_race: RotationRace,
}

#[derive(serde::Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RevocationBackend {
    Memory,
    Postgres,
}

#[derive(serde::Deserialize, Clone, Debug)]
#[serde(default)]
pub struct RevocationSettings {
    pub backend: RevocationBackend,
    pub timeout_ms: u64,
    pub prune_interval_secs: u64,
}

impl Default for RevocationSettings {
    fn default() -> Self {
        Self {
            backend: RevocationBackend::Postgres,
            timeout_ms: 250,
            prune_interval_secs: 300,
        }
    }
}

impl RevocationSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn prune_interval(&self) -> Duration {
        Duration::from_secs(self.prune_interval_secs)
    }
}

#[derive(serde::Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SameSitePolicy {
    Strict,
    Lax,
}

#[derive(serde::Deserialize, Clone, Debug)]
#[serde(default)]
pub struct CookieSettings {
    /// Only send cookies over TLS; disable for local development only
    pub secure: bool,
    pub same_site: SameSitePolicy,
    pub access_name: String,
    pub refresh_name: String,
    pub refresh_path: String,
}

impl Default for CookieSettings {
    fn default() -> Self {
        Self {
            secure: true,
            same_site: SameSitePolicy::Strict,
            access_name: "access_token".to_string(),
            refresh_name: "refresh_token".to_string(),
            refresh_path: "/auth/refresh".to_string(),
        }
    }
}

#[derive(serde::Deserialize, Clone, Debug, Default)]
#[serde(default)]
pub struct PermissionSettings {
    pub resource_overrides: Vec<ResourceOverride>,
}

impl Settings {
    /// Reject configurations that would weaken the token model
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.jwt.validate()?;

        if self.revocation.timeout_ms == 0 {
            return Err(ConfigError::InvalidValue(
                "revocation.timeout_ms must be greater than zero".to_string(),
            ));
        }
        if self.revocation.prune_interval_secs == 0 {
            return Err(ConfigError::InvalidValue(
                "revocation.prune_interval_secs must be greater than zero".to_string(),
            ));
        }
        if !self.cookies.refresh_path.starts_with('/') {
            return Err(ConfigError::InvalidValue(
                "cookies.refresh_path must be an absolute path".to_string(),
            ));
        }
        Ok(())
    }
}

impl JwtSettings {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.access_secret.trim().is_empty() {
            return Err(ConfigError::MissingRequired("jwt.access_secret".to_string()));
        }
        if self.refresh_secret.trim().is_empty() {
            return Err(ConfigError::MissingRequired("jwt.refresh_secret".to_string()));
        }
        if self.access_secret == self.refresh_secret {
            return Err(ConfigError::InvalidValue(
                "jwt.access_secret and jwt.refresh_secret must differ".to_string(),
            ));
        }
        if self.access_token_expiry <= 0 || self.refresh_token_expiry <= 0 {
            return Err(ConfigError::InvalidValue(
                "token expiries must be positive".to_string(),
            ));
        }
        if self.access_token_expiry >= self.refresh_token_expiry {
            return Err(ConfigError::InvalidValue(
                "jwt.access_token_expiry must be shorter than jwt.refresh_token_expiry".to_string(),
            ));
        }
        Ok(())
    }
}

/// Load settings from `configuration.{yaml,toml,json}` (optional) and
/// `APP_*` environment variables, e.g. `APP_JWT__ACCESS_SECRET`.
pub fn get_configuration() -> Result<Settings, ConfigError> {
    let settings = config::Config::builder()
        .add_source(config::File::with_name("configuration").required(false))
        .add_source(
            config::Environment::with_prefix("APP")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        )
        .build()?;

    let settings = settings.try_deserialize::<Settings>()?;
    settings.validate()?;
    Ok(settings)
}
