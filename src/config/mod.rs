//! Configuration Module
//!
//! Environment driven configuration for the account service: server,
//! database, session tokens, mail, identity providers, geolocation,
//! password reset and account policy.

use std::time::Duration;

use thiserror::Error;

use crate::database::DatabaseConfig;
use crate::models::Role;

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {value} - {reason}")]
    InvalidValue {
        key: String,
        value: String,
        reason: String,
    },

    #[error("Configuration validation error: {0}")]
    ValidationError(String),
}

/// Environment variable helpers
pub mod env {
    use std::env;

    use super::ConfigError;

    /// Get environment variable as string with default
    pub fn get_string(key: &str, default: &str) -> String {
        env::var(key).unwrap_or_else(|_| default.to_string())
    }

    /// Get environment variable as boolean with default
    pub fn get_bool(key: &str, default: bool) -> bool {
        env::var(key)
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(default)
    }

    /// Get environment variable as u32 with default
    pub fn get_u32(key: &str, default: u32) -> u32 {
        env::var(key)
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(default)
    }

    /// Get environment variable as u16 with default
    pub fn get_u16(key: &str, default: u16) -> u16 {
        env::var(key)
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(default)
    }

    /// Get environment variable as u64 with default
    pub fn get_u64(key: &str, default: u64) -> u64 {
        env::var(key)
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(default)
    }

    /// Get environment variable as i64 with default
    pub fn get_i64(key: &str, default: i64) -> i64 {
        env::var(key)
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(default)
    }

    /// Comma separated list, blanks dropped
    pub fn get_list(key: &str, default: &str) -> Vec<String> {
        split_list(&get_string(key, default))
    }

    pub fn split_list(raw: &str) -> Vec<String> {
        raw.split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect()
    }

    /// Check if environment variable is set to a non-empty value
    pub fn is_set(key: &str) -> bool {
        env::var(key).map(|v| !v.is_empty()).unwrap_or(false)
    }

    /// Get required environment variable
    pub fn get_required(key: &str) -> Result<String, ConfigError> {
        env::var(key).map_err(|_| ConfigError::MissingEnvVar(key.to_string()))
    }
}

/// Application configuration combining all service configurations
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub jwt: JwtConfig,

    /// SMTP settings; mail is disabled when absent
    pub email: Option<EmailConfig>,

    pub oauth: OAuthConfig,
    pub geo: GeoConfig,
    pub reset: ResetConfig,
    pub policy: PolicyConfig,
}

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub cors_origins: Vec<String>,
    pub request_timeout_seconds: u64,
}

/// Session token configuration
#[derive(Debug, Clone)]
pub struct JwtConfig {
    pub secret: String,
    pub session_expires_hours: i64,
}

/// SMTP configuration
#[derive(Debug, Clone)]
pub struct EmailConfig {
    pub smtp_host: String,
    pub smtp_port: u16,
    pub smtp_username: String,
    pub smtp_password: String,
    pub from_name: String,
    pub from_email: String,
    pub timeout_seconds: u64,
}

/// Client credentials for one authorization-code provider
#[derive(Debug, Clone)]
pub struct ProviderCredentials {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,
}

/// Identity provider configuration
#[derive(Debug, Clone, Default)]
pub struct OAuthConfig {
    pub facebook: Option<ProviderCredentials>,
    pub google: Option<ProviderCredentials>,

    /// Client ids accepted as `aud` of Google id tokens
    pub google_id_token_audiences: Vec<String>,

    pub apple_client_id: Option<String>,
    pub request_timeout_seconds: u64,
}

/// Geolocation provider configuration
#[derive(Debug, Clone)]
pub struct GeoConfig {
    pub enabled: bool,
    pub endpoint: String,
    pub timeout_seconds: u64,
}

/// Password reset configuration
#[derive(Debug, Clone)]
pub struct ResetConfig {
    /// Origins allowed to appear in reset links
    pub allowed_origins: Vec<String>,

    /// Link domain used when the request origin is absent or not allowed
    pub default_domain: String,

    pub ttl_hours: i64,
}

/// Account policy
#[derive(Debug, Clone)]
pub struct PolicyConfig {
    /// Role given to accounts created through an identity provider
    pub default_oauth_role: Role,
    pub bcrypt_cost: u32,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            cors_origins: vec!["*".to_string()],
            request_timeout_seconds: 30,
        }
    }
}

impl Default for GeoConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            endpoint: "http://ip-api.com/json".to_string(),
            timeout_seconds: 3,
        }
    }
}

impl Default for ResetConfig {
    fn default() -> Self {
        Self {
            allowed_origins: vec!["http://localhost:3000".to_string()],
            default_domain: "http://localhost:3000".to_string(),
            ttl_hours: crate::models::RESET_REQUEST_TTL_HOURS,
        }
    }
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            default_oauth_role: Role::Patient,
            bcrypt_cost: crate::utils::security::DEFAULT_BCRYPT_COST,
        }
    }
}

impl ServerConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            host: env::get_string("SERVER_HOST", &defaults.host),
            port: env::get_u16("SERVER_PORT", defaults.port),
            cors_origins: env::get_list("CORS_ORIGINS", "*"),
            request_timeout_seconds: env::get_u64(
                "REQUEST_TIMEOUT_SECONDS",
                defaults.request_timeout_seconds,
            ),
        }
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn database_from_env() -> Result<DatabaseConfig, ConfigError> {
    let defaults = DatabaseConfig::default();
    Ok(DatabaseConfig {
        url: env::get_required("DATABASE_URL")?,
        max_connections: env::get_u32("DB_MAX_CONNECTIONS", defaults.max_connections),
        min_connections: env::get_u32("DB_MIN_CONNECTIONS", defaults.min_connections),
        connect_timeout: Duration::from_secs(env::get_u64("DB_CONNECT_TIMEOUT", 30)),
        idle_timeout: Duration::from_secs(env::get_u64("DB_IDLE_TIMEOUT", 600)),
        max_lifetime: Duration::from_secs(env::get_u64("DB_MAX_LIFETIME", 3600)),
        query_timeout: Duration::from_secs(env::get_u64("DB_QUERY_TIMEOUT", 10)),
    })
}

impl JwtConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            secret: env::get_required("JWT_SECRET")?,
            session_expires_hours: env::get_i64(
                "JWT_SESSION_EXPIRES_HOURS",
                crate::service::jwt::DEFAULT_SESSION_HOURS,
            ),
        })
    }
}

impl EmailConfig {
    pub fn from_env() -> Result<Option<Self>, ConfigError> {
        if !env::is_set("SMTP_HOST") {
            return Ok(None);
        }

        Ok(Some(Self {
            smtp_host: env::get_required("SMTP_HOST")?,
            smtp_port: env::get_u16("SMTP_PORT", 587),
            smtp_username: env::get_required("SMTP_USERNAME")?,
            smtp_password: env::get_required("SMTP_PASSWORD")?,
            from_name: env::get_string("SMTP_FROM_NAME", "Account Service"),
            from_email: env::get_required("SMTP_FROM_EMAIL")?,
            timeout_seconds: env::get_u64("SMTP_TIMEOUT_SECONDS", 10),
        }))
    }
}

impl ProviderCredentials {
    /// Reads `<PREFIX>_CLIENT_ID`, `_CLIENT_SECRET` and `_CALLBACK_URL`
    fn from_env(prefix: &str) -> Result<Option<Self>, ConfigError> {
        let id_key = format!("{}_CLIENT_ID", prefix);
        if !env::is_set(&id_key) {
            return Ok(None);
        }

        Ok(Some(Self {
            client_id: env::get_required(&id_key)?,
            client_secret: env::get_required(&format!("{}_CLIENT_SECRET", prefix))?,
            redirect_uri: env::get_required(&format!("{}_CALLBACK_URL", prefix))?,
        }))
    }
}

impl OAuthConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            facebook: ProviderCredentials::from_env("FACEBOOK")?,
            google: ProviderCredentials::from_env("GOOGLE")?,
            google_id_token_audiences: env::get_list("GOOGLE_ID_TOKEN_AUDIENCES", ""),
            apple_client_id: env::is_set("APPLE_CLIENT_ID")
                .then(|| env::get_string("APPLE_CLIENT_ID", "")),
            request_timeout_seconds: env::get_u64("OAUTH_REQUEST_TIMEOUT_SECONDS", 30),
        })
    }
}

impl GeoConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            enabled: env::get_bool("GEO_ENABLED", defaults.enabled),
            endpoint: env::get_string("GEO_ENDPOINT", &defaults.endpoint),
            timeout_seconds: env::get_u64("GEO_TIMEOUT_SECONDS", defaults.timeout_seconds),
        }
    }
}

impl ResetConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let default_domain = env::get_string("RESET_DEFAULT_DOMAIN", &defaults.default_domain);
        Self {
            allowed_origins: env::get_list("RESET_ALLOWED_ORIGINS", &default_domain),
            default_domain,
            ttl_hours: env::get_i64("RESET_TOKEN_TTL_HOURS", defaults.ttl_hours),
        }
    }

    /// Link domain for a request coming from `origin`
    pub fn link_domain(&self, origin: Option<&str>) -> String {
        origin
            .map(|o| o.trim_end_matches('/'))
            .filter(|o| {
                self.allowed_origins
                    .iter()
                    .any(|allowed| allowed.trim_end_matches('/') == *o)
            })
            .unwrap_or(self.default_domain.as_str())
            .to_string()
    }
}

impl PolicyConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let raw_role = env::get_string("DEFAULT_OAUTH_ROLE", defaults.default_oauth_role.as_str());
        let default_oauth_role = raw_role
            .parse()
            .map_err(|reason| ConfigError::InvalidValue {
                key: "DEFAULT_OAUTH_ROLE".to_string(),
                value: raw_role.clone(),
                reason,
            })?;

        Ok(Self {
            default_oauth_role,
            bcrypt_cost: env::get_u32("BCRYPT_COST", defaults.bcrypt_cost),
        })
    }
}

impl AppConfig {
    /// Load complete application configuration from environment
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            server: ServerConfig::from_env(),
            database: database_from_env()?,
            jwt: JwtConfig::from_env()?,
            email: EmailConfig::from_env()?,
            oauth: OAuthConfig::from_env()?,
            geo: GeoConfig::from_env(),
            reset: ResetConfig::from_env(),
            policy: PolicyConfig::from_env()?,
        })
    }

    /// Validate the complete configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.port == 0 {
            return Err(ConfigError::ValidationError(
                "Server port must be greater than 0".into(),
            ));
        }

        if self.database.max_connections == 0 {
            return Err(ConfigError::ValidationError(
                "Database max_connections must be greater than 0".into(),
            ));
        }

        if self.database.min_connections > self.database.max_connections {
            return Err(ConfigError::ValidationError(
                "Database min_connections cannot be greater than max_connections".into(),
            ));
        }

        if self.jwt.secret.is_empty() {
            return Err(ConfigError::ValidationError(
                "JWT secret cannot be empty".into(),
            ));
        }

        if self.jwt.session_expires_hours <= 0 {
            return Err(ConfigError::ValidationError(
                "Session expiry must be greater than 0 hours".into(),
            ));
        }

        if !(4..=31).contains(&self.policy.bcrypt_cost) {
            return Err(ConfigError::InvalidValue {
                key: "BCRYPT_COST".into(),
                value: self.policy.bcrypt_cost.to_string(),
                reason: "Must be between 4 and 31".into(),
            });
        }

        if self.reset.ttl_hours <= 0 {
            return Err(ConfigError::ValidationError(
                "Reset token TTL must be greater than 0 hours".into(),
            ));
        }

        if url::Url::parse(&self.reset.default_domain).is_err() {
            return Err(ConfigError::InvalidValue {
                key: "RESET_DEFAULT_DOMAIN".into(),
                value: self.reset.default_domain.clone(),
                reason: "Must be an absolute URL".into(),
            });
        }

        Ok(())
    }
}
