//! Application configuration management.
//!
//! Handles loading, saving, and accessing application configuration including
//! the HTTP bind address, database location, push notification credentials,
//! and media storage. Configuration is persisted as TOML on disk; a handful of
//! deployment values can be overridden through `RIMAY_*` environment variables.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::constants;
use crate::error::{RimayError, RimayResult};
use crate::platform::Platform;

/// Top-level application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// HTTP server settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// Database settings.
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Push notification (FCM) settings.
    #[serde(default)]
    pub push: PushConfig,

    /// Uploaded media settings.
    #[serde(default)]
    pub media: MediaConfig,

    /// Geographic search radii.
    #[serde(default)]
    pub geo: GeoConfig,
}

/// HTTP server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Socket address to bind (e.g. "0.0.0.0:8000").
    #[serde(default = "default_bind_address")]
    pub bind_address: String,

    /// Lifetime of a browser session in hours.
    #[serde(default = "default_session_ttl_hours")]
    pub session_ttl_hours: i64,

    /// Mark the session cookie `Secure` (serve over HTTPS only).
    #[serde(default)]
    pub secure_cookies: bool,

    /// Origins allowed for cross-origin API calls. Empty allows any origin.
    #[serde(default)]
    pub cors_origins: Vec<String>,

    /// Google Maps browser key rendered into map pages.
    #[serde(default)]
    pub maps_api_key: String,

    /// PBKDF2 rounds for newly hashed passwords.
    #[serde(default = "default_password_iterations")]
    pub password_iterations: u32,
}

/// Database configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Path to the SQLite database file. If empty, uses default location.
    #[serde(default)]
    pub path: String,

    /// Enable WAL (Write-Ahead Logging) mode. Always recommended.
    #[serde(default = "default_true")]
    pub wal_mode: bool,

    /// Maximum number of connections in the pool.
    #[serde(default = "default_pool_size")]
    pub pool_size: u32,

    /// Run integrity check on startup.
    #[serde(default = "default_true")]
    pub integrity_check_on_startup: bool,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level or filter directive: trace, debug, info, warn, error.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Directory for log files. If empty, uses default location.
    #[serde(default)]
    pub directory: String,

    /// Enable JSON structured logging output.
    #[serde(default)]
    pub json_output: bool,
}

/// Firebase Cloud Messaging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushConfig {
    /// Whether push notifications are sent at all.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Firebase project id used in the send URL.
    #[serde(default)]
    pub project_id: String,

    /// FCM API origin.
    #[serde(default = "default_fcm_endpoint")]
    pub endpoint: String,

    /// OAuth2 access token for the FCM HTTP v1 API.
    #[serde(default)]
    pub access_token: String,

    /// File holding the access token; re-read on every send so an external
    /// refresher can rotate it.
    #[serde(default)]
    pub access_token_file: String,

    /// Per-request timeout in milliseconds.
    #[serde(default = "default_push_timeout")]
    pub timeout_ms: u64,

    /// Maximum retry attempts for transient failures.
    #[serde(default = "default_push_retries")]
    pub max_retries: u32,
}

/// Uploaded media configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaConfig {
    /// Root directory for uploaded files. If empty, uses default location.
    #[serde(default)]
    pub root: String,

    /// Maximum accepted upload size in bytes.
    #[serde(default = "default_max_upload")]
    pub max_upload_bytes: usize,
}

/// Radii used by the geographic lookups.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeoConfig {
    /// Users within this distance of a new incident are notified.
    #[serde(default = "default_notify_radius")]
    pub notify_radius_km: f64,

    /// Incidents within this distance of the user appear on the map.
    #[serde(default = "default_map_radius")]
    pub map_radius_km: f64,
}

// Default value functions for serde

fn default_bind_address() -> String {
    constants::DEFAULT_BIND_ADDRESS.to_string()
}

fn default_session_ttl_hours() -> i64 {
    constants::DEFAULT_SESSION_TTL_HOURS
}

fn default_password_iterations() -> u32 {
    constants::PASSWORD_ITERATIONS
}

fn default_true() -> bool {
    true
}

fn default_pool_size() -> u32 {
    8
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_fcm_endpoint() -> String {
    constants::FCM_ENDPOINT.to_string()
}

fn default_push_timeout() -> u64 {
    10_000
}

fn default_push_retries() -> u32 {
    2
}

fn default_max_upload() -> usize {
    10 * 1024 * 1024 // 10 MB
}

fn default_notify_radius() -> f64 {
    constants::NOTIFY_RADIUS_KM
}

fn default_map_radius() -> f64 {
    constants::MAP_RADIUS_KM
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            session_ttl_hours: default_session_ttl_hours(),
            secure_cookies: false,
            cors_origins: Vec::new(),
            maps_api_key: String::new(),
            password_iterations: default_password_iterations(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: String::new(),
            wal_mode: true,
            pool_size: default_pool_size(),
            integrity_check_on_startup: true,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            directory: String::new(),
            json_output: false,
        }
    }
}

impl Default for PushConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            project_id: String::new(),
            endpoint: default_fcm_endpoint(),
            access_token: String::new(),
            access_token_file: String::new(),
            timeout_ms: default_push_timeout(),
            max_retries: default_push_retries(),
        }
    }
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            root: String::new(),
            max_upload_bytes: default_max_upload(),
        }
    }
}

impl Default for GeoConfig {
    fn default() -> Self {
        Self {
            notify_radius_km: default_notify_radius(),
            map_radius_km: default_map_radius(),
        }
    }
}

impl PushConfig {
    /// Whether enough is configured to attempt sending.
    pub fn is_configured(&self) -> bool {
        self.enabled
            && !self.project_id.is_empty()
            && (!self.access_token.is_empty() || !self.access_token_file.is_empty())
    }
}

impl AppConfig {
    /// Load configuration from the default config file path.
    pub fn load_default() -> RimayResult<Self> {
        let path = Self::default_config_path()?;
        let mut config = if path.exists() {
            Self::load_from_file(&path)?
        } else {
            Self::default()
        };
        config.apply_env_overrides();
        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from_file(path: &Path) -> RimayResult<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: AppConfig = toml::from_str(&contents)?;
        debug!("loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Save configuration to a specific file path.
    pub fn save_to_file(&self, path: &Path) -> RimayResult<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = toml::to_string_pretty(self)
            .map_err(|e| RimayError::Config(format!("failed to serialize config: {e}")))?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    /// Get the default configuration file path.
    pub fn default_config_path() -> RimayResult<PathBuf> {
        Ok(Platform::config_dir()?.join("config.toml"))
    }

    /// Apply `RIMAY_*` environment variable overrides.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("RIMAY_BIND_ADDRESS") {
            self.server.bind_address = v;
        }
        if let Some(v) = lookup("RIMAY_DB_PATH") {
            self.database.path = v;
        }
        if let Some(v) = lookup("RIMAY_MEDIA_ROOT") {
            self.media.root = v;
        }
        if let Some(v) = lookup("RIMAY_LOG_LEVEL") {
            self.logging.level = v;
        }
        if let Some(v) = lookup("RIMAY_FCM_PROJECT_ID") {
            self.push.project_id = v;
        }
        if let Some(v) = lookup("RIMAY_FCM_ACCESS_TOKEN") {
            self.push.access_token = v;
        }
        if let Some(v) = lookup("RIMAY_FCM_ACCESS_TOKEN_FILE") {
            self.push.access_token_file = v;
        }
        if let Some(v) = lookup("RIMAY_MAPS_API_KEY") {
            self.server.maps_api_key = v;
        }
        if let Some(v) = lookup("RIMAY_PUSH_ENABLED") {
            match v.parse::<bool>() {
                Ok(b) => self.push.enabled = b,
                Err(_) => warn!("ignoring invalid RIMAY_PUSH_ENABLED={v}"),
            }
        }
    }

    /// Get the effective database path, using the configured path or the default.
    pub fn effective_db_path(&self) -> RimayResult<PathBuf> {
        if self.database.path.is_empty() {
            Ok(Platform::data_dir()?.join("rimay.db"))
        } else {
            Ok(PathBuf::from(&self.database.path))
        }
    }

    /// Get the effective log directory, using the configured path or the default.
    pub fn effective_log_dir(&self) -> RimayResult<PathBuf> {
        if self.logging.directory.is_empty() {
            Ok(Platform::data_dir()?.join("logs"))
        } else {
            Ok(PathBuf::from(&self.logging.directory))
        }
    }

    /// Get the effective media root, using the configured path or the default.
    pub fn effective_media_root(&self) -> RimayResult<PathBuf> {
        if self.media.root.is_empty() {
            Ok(Platform::data_dir()?.join("media"))
        } else {
            Ok(PathBuf::from(&self.media.root))
        }
    }
}

/// Thread-safe configuration holder for shared access across services.
#[derive(Clone)]
pub struct ConfigHandle {
    inner: Arc<RwLock<AppConfig>>,
}

impl ConfigHandle {
    /// Create a new configuration handle.
    pub fn new(config: AppConfig) -> Self {
        Self {
            inner: Arc::new(RwLock::new(config)),
        }
    }

    /// Read the configuration.
    pub async fn read(&self) -> tokio::sync::RwLockReadGuard<'_, AppConfig> {
        self.inner.read().await
    }

    /// Write/update the configuration.
    pub async fn write(&self) -> tokio::sync::RwLockWriteGuard<'_, AppConfig> {
        self.inner.write().await
    }

    /// Clone out the current configuration.
    pub async fn snapshot(&self) -> AppConfig {
        self.inner.read().await.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.server.bind_address, "0.0.0.0:8000");
        assert!(config.database.wal_mode);
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.geo.notify_radius_km, 2.0);
        assert_eq!(config.geo.map_radius_km, 5.0);
        assert!(!config.push.is_configured());
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: AppConfig = toml::from_str(
            r#"
            [push]
            project_id = "rimay-alert"
            access_token = "ya29.token"
            "#,
        )
        .unwrap();
        assert!(config.push.is_configured());
        assert_eq!(config.push.endpoint, "https://fcm.googleapis.com");
        assert_eq!(config.database.pool_size, 8);
    }

    #[test]
    fn test_env_overrides() {
        let vars: HashMap<&str, &str> = [
            ("RIMAY_BIND_ADDRESS", "127.0.0.1:9000"),
            ("RIMAY_DB_PATH", "/tmp/rimay-test.db"),
            ("RIMAY_PUSH_ENABLED", "false"),
        ]
        .into_iter()
        .collect();

        let mut config = AppConfig::default();
        config.apply_overrides(|k| vars.get(k).map(|v| v.to_string()));

        assert_eq!(config.server.bind_address, "127.0.0.1:9000");
        assert_eq!(config.database.path, "/tmp/rimay-test.db");
        assert!(!config.push.enabled);
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        let mut config = AppConfig::default();
        config.server.maps_api_key = "maps-key".into();
        config.save_to_file(&path).unwrap();

        let loaded = AppConfig::load_from_file(&path).unwrap();
        assert_eq!(loaded.server.maps_api_key, "maps-key");
    }
}
