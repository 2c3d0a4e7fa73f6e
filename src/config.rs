/// Configuration management for the moderation desk
use crate::error::{ModerationError, ModResult};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// Main server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub service: ServiceConfig,
    pub storage: StorageConfig,
    pub authentication: AuthConfig,
    pub moderation: ModerationConfig,
    pub logging: LoggingConfig,
}

/// Service-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    pub hostname: String,
    pub port: u16,
    pub version: String,
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub database: PathBuf,
    pub max_connections: u32,
}

/// Authentication configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    pub jwt_secret: String,
    /// Member ids always treated as administrators (comma-separated)
    pub admin_ids: Vec<String>,
}

/// Report and appeal lifecycle tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModerationConfig {
    /// Upper bound on any single store or audit call
    pub store_timeout_ms: u64,
    pub list_limit_default: i64,
    pub list_limit_max: i64,
}

impl ModerationConfig {
    pub fn store_timeout(&self) -> Duration {
        Duration::from_millis(self.store_timeout_ms)
    }
}

impl Default for ModerationConfig {
    fn default() -> Self {
        Self {
            store_timeout_ms: 5000,
            list_limit_default: 50,
            list_limit_max: 200,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// `EnvFilter` directives
    pub level: String,
    /// "text" or "json"
    pub format: String,
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> ModResult<T> {
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ModerationError::Validation(format!("Invalid value for {}: {}", key, raw))),
        Err(_) => Ok(default),
    }
}

impl ServerConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> ModResult<Self> {
        dotenv::dotenv().ok();

        let hostname = env_or("MODDESK_HOSTNAME", "127.0.0.1");
        let port = env_parse("MODDESK_PORT", 8087u16)?;
        let version = env_or("MODDESK_VERSION", env!("CARGO_PKG_VERSION"));

        let database: PathBuf = env_or("MODDESK_DATABASE", "./data/moderation.sqlite").into();
        let max_connections = env_parse("MODDESK_DB_MAX_CONNECTIONS", 10u32)?;

        let jwt_secret = env::var("MODDESK_JWT_SECRET")
            .map_err(|_| ModerationError::Validation("JWT secret required".to_string()))?;

        // Parse admin ids from comma-separated list
        let admin_ids = env_or("MODDESK_ADMIN_IDS", "")
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect::<Vec<String>>();

        let defaults = ModerationConfig::default();
        let store_timeout_ms = env_parse("MODDESK_STORE_TIMEOUT_MS", defaults.store_timeout_ms)?;
        let list_limit_default =
            env_parse("MODDESK_LIST_LIMIT_DEFAULT", defaults.list_limit_default)?;
        let list_limit_max = env_parse("MODDESK_LIST_LIMIT_MAX", defaults.list_limit_max)?;

        let level = env_or("RUST_LOG", "moderation_desk=debug,tower_http=debug");
        let format = env_or("MODDESK_LOG_FORMAT", "text");

        Ok(ServerConfig {
            service: ServiceConfig {
                hostname,
                port,
                version,
            },
            storage: StorageConfig {
                database,
                max_connections,
            },
            authentication: AuthConfig {
                jwt_secret,
                admin_ids,
            },
            moderation: ModerationConfig {
                store_timeout_ms,
                list_limit_default,
                list_limit_max,
            },
            logging: LoggingConfig { level, format },
        })
    }

    /// Validate configuration
    pub fn validate(&self) -> ModResult<()> {
        if self.service.hostname.is_empty() {
            return Err(ModerationError::Validation("Hostname cannot be empty".to_string()));
        }

        if self.authentication.jwt_secret.len() < 32 {
            return Err(ModerationError::Validation(
                "JWT secret must be at least 32 characters".to_string(),
            ));
        }

        if self.storage.max_connections == 0 {
            return Err(ModerationError::Validation(
                "Database pool needs at least one connection".to_string(),
            ));
        }

        if self.moderation.store_timeout_ms == 0 {
            return Err(ModerationError::Validation(
                "Store timeout must be greater than zero".to_string(),
            ));
        }

        if self.moderation.list_limit_default < 1
            || self.moderation.list_limit_default > self.moderation.list_limit_max
        {
            return Err(ModerationError::Validation(format!(
                "Default list limit {} must be between 1 and {}",
                self.moderation.list_limit_default, self.moderation.list_limit_max
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> ServerConfig {
        ServerConfig {
            service: ServiceConfig {
                hostname: "127.0.0.1".to_string(),
                port: 8087,
                version: "0.1.0".to_string(),
            },
            storage: StorageConfig {
                database: PathBuf::from("./data/moderation.sqlite"),
                max_connections: 4,
            },
            authentication: AuthConfig {
                jwt_secret: "0123456789abcdef0123456789abcdef".to_string(),
                admin_ids: vec!["root".to_string()],
            },
            moderation: ModerationConfig::default(),
            logging: LoggingConfig {
                level: "info".to_string(),
                format: "text".to_string(),
            },
        }
    }

    #[test]
    fn test_valid_config() {
        assert!(sample().validate().is_ok());
        assert_eq!(sample().moderation.store_timeout(), Duration::from_secs(5));
    }

    #[test]
    fn test_short_secret_rejected() {
        let mut config = sample();
        config.authentication.jwt_secret = "short".to_string();
        assert!(matches!(config.validate(), Err(ModerationError::Validation(_))));
    }

    #[test]
    fn test_limits_checked() {
        let mut config = sample();
        config.moderation.list_limit_default = 500;
        assert!(config.validate().is_err());

        let mut config = sample();
        config.moderation.store_timeout_ms = 0;
        assert!(config.validate().is_err());
    }
}
