//! Configuration management for MedTrack server

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::{env, path::PathBuf, time::Duration};

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    /// SQLite connection URL (`sqlite://data/medtrack.db`, `sqlite::memory:`)
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AuthConfig {
    pub jwt_secret: String,
    pub jwt_expiration_hours: u64,
    /// Account created at startup when the users table is empty
    pub bootstrap_admin_username: String,
    pub bootstrap_admin_password: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    pub level: String,
    /// `pretty` or `json`
    pub format: String,
    /// When set, logs are also written to daily rolling files in this directory
    pub directory: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct CacheConfig {
    pub listing_ttl_secs: u64,
    pub dashboard_ttl_secs: u64,
    /// Optional shared Redis region registered alongside the in-process regions
    pub redis_url: Option<String>,
}

impl CacheConfig {
    pub fn listing_ttl(&self) -> Duration {
        Duration::from_secs(self.listing_ttl_secs)
    }

    pub fn dashboard_ttl(&self) -> Duration {
        Duration::from_secs(self.dashboard_ttl_secs)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct UploadsConfig {
    pub directory: PathBuf,
    pub max_file_size_bytes: u64,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct LegacyConfig {
    /// Directory holding `ppm.json`, `ocm.json`, `training.json` and
    /// `equipment_history.json` from the JSON-file era
    pub json_dir: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AuditConfig {
    /// Oldest entries beyond this count are dropped; 0 keeps everything
    pub max_entries: u32,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub auth: AuthConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub uploads: UploadsConfig,
    #[serde(default)]
    pub legacy: LegacyConfig,
    #[serde(default)]
    pub audit: AuditConfig,
}

impl AppConfig {
    /// Load configuration from files and environment variables
    pub fn load() -> Result<Self, ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let config = Config::builder()
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", run_mode)).required(false))
            // MEDTRACK_SERVER__PORT=9000, MEDTRACK_CACHE__REDIS_URL=...
            .add_source(
                Environment::with_prefix("MEDTRACK")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .set_override_option("database.url", env::var("DATABASE_URL").ok())?
            .set_override_option("auth.jwt_secret", env::var("JWT_SECRET").ok())?
            .set_override_option("cache.redis_url", env::var("REDIS_URL").ok())?
            .build()?;

        config.try_deserialize()
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://data/medtrack.db".to_string(),
            max_connections: 5,
            min_connections: 1,
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: "change-this-secret-in-production".to_string(),
            jwt_expiration_hours: 24,
            bootstrap_admin_username: "admin".to_string(),
            bootstrap_admin_password: None,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
            directory: None,
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            listing_ttl_secs: 300,
            dashboard_ttl_secs: 300,
            redis_url: None,
        }
    }
}

impl Default for UploadsConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("data/uploads"),
            max_file_size_bytes: 10 * 1024 * 1024,
        }
    }
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self { max_entries: 1000 }
    }
}
