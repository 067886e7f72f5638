//! Store configuration.
//!
//! Configuration is loaded from environment variables with fallback to
//! defaults. `DB_USER` and `DB_PASSWORD` are accepted so that a deployment
//! written for a server engine still starts; SQLite ignores them.

use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;
use tracing::debug;

/// Application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Store driver, only `sqlite` is supported
    pub db_driver: String,

    /// Directory holding the database file
    pub db_server: String,

    /// Database file name (`.db` appended when missing)
    pub db_name: String,

    /// Accepted, unused by SQLite
    pub db_user: Option<String>,

    /// Accepted, unused by SQLite
    #[serde(skip_serializing)]
    pub db_password: Option<String>,

    /// Pool size
    pub max_connections: u32,

    /// How long a writer waits for the SQLite lock before giving up
    pub busy_timeout_ms: u64,

    /// Offset of the shop's local time, used for business dates
    pub utc_offset_hours: i32,

    /// Audit IP when the session supplies none
    pub default_ip: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        AppConfig {
            db_driver: "sqlite".to_string(),
            db_server: ".".to_string(),
            db_name: "bodega".to_string(),
            db_user: None,
            db_password: None,
            max_connections: 5,
            busy_timeout_ms: 5000,
            utc_offset_hours: -4,
            default_ip: bodega_core::DEFAULT_AUDIT_IP.to_string(),
        }
    }
}

impl AppConfig {
    /// Load configuration from environment variables.
    pub fn load() -> Result<Self, ConfigError> {
        let defaults = AppConfig::default();

        let config = AppConfig {
            db_driver: env::var("DB_DRIVER")
                .unwrap_or(defaults.db_driver)
                .to_ascii_lowercase(),

            db_server: env::var("DB_SERVER").unwrap_or(defaults.db_server),

            db_name: env::var("DB_NAME").unwrap_or(defaults.db_name),

            db_user: env::var("DB_USER").ok(),

            db_password: env::var("DB_PASSWORD").ok(),

            max_connections: env::var("BODEGA_MAX_CONNECTIONS")
                .unwrap_or_else(|_| "5".to_string())
                .parse()
                .map_err(|_| ConfigError::InvalidValue("BODEGA_MAX_CONNECTIONS".to_string()))?,

            busy_timeout_ms: env::var("BODEGA_BUSY_TIMEOUT_MS")
                .unwrap_or_else(|_| "5000".to_string())
                .parse()
                .map_err(|_| ConfigError::InvalidValue("BODEGA_BUSY_TIMEOUT_MS".to_string()))?,

            utc_offset_hours: env::var("BODEGA_UTC_OFFSET_HOURS")
                .unwrap_or_else(|_| "-4".to_string())
                .parse()
                .map_err(|_| ConfigError::InvalidValue("BODEGA_UTC_OFFSET_HOURS".to_string()))?,

            default_ip: env::var("BODEGA_DEFAULT_IP").unwrap_or(defaults.default_ip),
        };

        config.validate()?;

        if config.db_user.is_some() || config.db_password.is_some() {
            debug!("DB_USER/DB_PASSWORD set; ignored by the SQLite driver");
        }

        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.db_driver != "sqlite" {
            return Err(ConfigError::UnsupportedDriver(self.db_driver.clone()));
        }
        if self.db_name.trim().is_empty() {
            return Err(ConfigError::MissingRequired("DB_NAME".to_string()));
        }
        if self.max_connections == 0 {
            return Err(ConfigError::InvalidValue("BODEGA_MAX_CONNECTIONS".to_string()));
        }
        if !(-12..=14).contains(&self.utc_offset_hours) {
            return Err(ConfigError::InvalidValue("BODEGA_UTC_OFFSET_HOURS".to_string()));
        }
        Ok(())
    }

    /// Full path of the database file.
    pub fn database_path(&self) -> PathBuf {
        let name = if self.db_name.ends_with(".db") {
            self.db_name.clone()
        } else {
            format!("{}.db", self.db_name)
        };
        PathBuf::from(&self.db_server).join(name)
    }
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for {0}")]
    InvalidValue(String),

    #[error("Unsupported DB_DRIVER '{0}', only sqlite is available")]
    UnsupportedDriver(String),

    #[error("Missing required configuration: {0}")]
    MissingRequired(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_database_path_appends_extension() {
        let config = AppConfig {
            db_server: "/var/lib/bodega".into(),
            ..AppConfig::default()
        };
        assert_eq!(config.database_path(), PathBuf::from("/var/lib/bodega/bodega.db"));

        let config = AppConfig {
            db_name: "tienda.db".into(),
            ..AppConfig::default()
        };
        assert_eq!(config.database_path(), PathBuf::from("./tienda.db"));
    }

    #[test]
    fn test_validate_rejects_other_drivers() {
        let config = AppConfig {
            db_driver: "postgres".into(),
            ..AppConfig::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::UnsupportedDriver(_))));
    }

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.utc_offset_hours, -4);
        assert_eq!(config.default_ip, "127.0.0.1");
        assert!(config.validate().is_ok());
    }
}
