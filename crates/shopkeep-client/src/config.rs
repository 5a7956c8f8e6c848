//! # Client Configuration
//!
//! Configuration for the back office client.
//!
//! ## Configuration Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Priority                               │
//! │                                                                         │
//! │  1. Environment Variables (highest priority)                            │
//! │     SHOPKEEP_API_URL=https://api.myshop.pk                              │
//! │     SHOPKEEP_DEBOUNCE_MS=300                                            │
//! │                                                                         │
//! │  2. TOML Config File                                                    │
//! │     ~/.config/shopkeep/shopkeep.toml (Linux)                            │
//! │     ~/Library/Application Support/pk.shopkeep.backoffice/... (macOS)    │
//! │                                                                         │
//! │  3. Default Values (lowest priority)                                    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration File Format
//! ```toml
//! # shopkeep.toml
//! [api]
//! base_url = "https://api.myshop.pk"
//! timeout_secs = 15
//!
//! [retry]
//! max_retries = 2       # additional attempts after the first
//! base_delay_ms = 300   # delay = base × 2^attempt
//!
//! [cache]
//! default_ttl_secs = 30
//!
//! [search]
//! debounce_ms = 500
//! min_remote_query_len = 2
//! remote_limit = 20
//!
//! [storage]
//! database_path = "/var/lib/shopkeep/shopkeep.db"
//!
//! [notifications]
//! toast_ttl_secs = 5
//! ```

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::error::{ClientError, ClientResult};

// =============================================================================
// API Settings
// =============================================================================

/// Where the back office API lives.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiSettings {
    /// Base URL, e.g. `https://api.myshop.pk` or `http://localhost:5000/api`.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Per-request timeout (seconds).
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

fn default_base_url() -> String {
    "http://localhost:5000".to_string()
}

fn default_timeout() -> u64 {
    15
}

impl Default for ApiSettings {
    fn default() -> Self {
        ApiSettings {
            base_url: default_base_url(),
            timeout_secs: default_timeout(),
        }
    }
}

impl ApiSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

// =============================================================================
// Retry Settings
// =============================================================================

/// Retry policy for network errors, timeouts and 5xx responses.
///
/// ## Delay Schedule (defaults)
/// ```text
/// attempt 0 ──fail──► wait 300ms ──► attempt 1 ──fail──► wait 600ms ──► attempt 2
///                                                                      │
///                                                   fail ──► error surfaced
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrySettings {
    /// Additional attempts after the first one.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Base delay (milliseconds); attempt `n` waits `base × 2^n`.
    #[serde(default = "default_base_delay")]
    pub base_delay_ms: u64,
}

fn default_max_retries() -> u32 {
    2
}

fn default_base_delay() -> u64 {
    300
}

impl Default for RetrySettings {
    fn default() -> Self {
        RetrySettings {
            max_retries: default_max_retries(),
            base_delay_ms: default_base_delay(),
        }
    }
}

impl RetrySettings {
    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }
}

// =============================================================================
// Cache / Search / Storage / Notifications
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheSettings {
    /// TTL for cached GET responses when the caller does not pass one.
    #[serde(default = "default_cache_ttl")]
    pub default_ttl_secs: u64,
}

fn default_cache_ttl() -> u64 {
    30
}

impl Default for CacheSettings {
    fn default() -> Self {
        CacheSettings {
            default_ttl_secs: default_cache_ttl(),
        }
    }
}

impl CacheSettings {
    pub fn default_ttl(&self) -> Duration {
        Duration::from_secs(self.default_ttl_secs)
    }
}

/// Search box behaviour.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchSettings {
    /// Quiet period before a remote search fires (milliseconds).
    #[serde(default = "default_debounce")]
    pub debounce_ms: u64,

    /// Shortest trimmed query that may go to the server.
    #[serde(default = "default_min_remote_len")]
    pub min_remote_query_len: usize,

    /// Page size of remote searches.
    #[serde(default = "default_remote_limit")]
    pub remote_limit: u64,
}

fn default_debounce() -> u64 {
    500
}

fn default_min_remote_len() -> usize {
    2
}

fn default_remote_limit() -> u64 {
    20
}

impl Default for SearchSettings {
    fn default() -> Self {
        SearchSettings {
            debounce_ms: default_debounce(),
            min_remote_query_len: default_min_remote_len(),
            remote_limit: default_remote_limit(),
        }
    }
}

impl SearchSettings {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageSettings {
    /// SQLite file. Defaults to the platform data directory.
    #[serde(default)]
    pub database_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationSettings {
    /// How long a transient toast stays up (seconds).
    #[serde(default = "default_toast_ttl")]
    pub toast_ttl_secs: u64,
}

fn default_toast_ttl() -> u64 {
    5
}

impl Default for NotificationSettings {
    fn default() -> Self {
        NotificationSettings {
            toast_ttl_secs: default_toast_ttl(),
        }
    }
}

impl NotificationSettings {
    pub fn toast_ttl(&self) -> Duration {
        Duration::from_secs(self.toast_ttl_secs)
    }
}

// =============================================================================
// Main Configuration
// =============================================================================

/// Complete client configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClientConfig {
    #[serde(default)]
    pub api: ApiSettings,

    #[serde(default)]
    pub retry: RetrySettings,

    #[serde(default)]
    pub cache: CacheSettings,

    #[serde(default)]
    pub search: SearchSettings,

    #[serde(default)]
    pub storage: StorageSettings,

    #[serde(default)]
    pub notifications: NotificationSettings,
}

impl ClientConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads configuration from file, environment, and defaults.
    ///
    /// ## Load Order (later overrides earlier)
    /// 1. Default values
    /// 2. Config file (shopkeep.toml)
    /// 3. Environment variables
    pub fn load(config_path: Option<PathBuf>) -> ClientResult<Self> {
        let mut config = Self::default();

        if let Some(path) = config_path.or_else(Self::default_config_path) {
            if path.exists() {
                info!(?path, "Loading client config from file");
                let contents = std::fs::read_to_string(&path)?;
                config = toml::from_str(&contents)?;
            } else {
                debug!(?path, "Config file not found, using defaults");
            }
        }

        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    /// Loads config or returns default if load fails.
    pub fn load_or_default(config_path: Option<PathBuf>) -> Self {
        Self::load(config_path).unwrap_or_else(|e| {
            warn!("Failed to load client config: {}. Using defaults.", e);
            Self::default()
        })
    }

    /// Saves configuration to file.
    pub fn save(&self, config_path: Option<PathBuf>) -> ClientResult<()> {
        let path = config_path
            .or_else(Self::default_config_path)
            .ok_or_else(|| ClientError::Config("Could not determine config path".into()))?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self)?;
        std::fs::write(&path, contents)?;

        info!(?path, "Saved client config");
        Ok(())
    }

    /// Validates the configuration.
    pub fn validate(&self) -> ClientResult<()> {
        let url = self.api.base_url.trim();
        if !url.starts_with("http://") && !url.starts_with("https://") {
            return Err(ClientError::Config(format!(
                "API base URL must start with http:// or https://, got: {}",
                url
            )));
        }
        url::Url::parse(url)?;

        if self.api.timeout_secs == 0 {
            return Err(ClientError::Config(
                "timeout_secs must be greater than 0".into(),
            ));
        }

        if self.search.min_remote_query_len == 0 {
            return Err(ClientError::Config(
                "min_remote_query_len must be at least 1".into(),
            ));
        }

        Ok(())
    }

    /// Applies environment variable overrides.
    fn apply_env_overrides(&mut self) {
        if let Ok(url) = std::env::var("SHOPKEEP_API_URL") {
            debug!(url = %url, "Overriding API URL from environment");
            self.api.base_url = url;
        }

        if let Ok(secs) = std::env::var("SHOPKEEP_API_TIMEOUT_SECS") {
            match secs.parse::<u64>() {
                Ok(s) => self.api.timeout_secs = s,
                Err(_) => warn!(value = %secs, "Ignoring invalid SHOPKEEP_API_TIMEOUT_SECS"),
            }
        }

        if let Ok(retries) = std::env::var("SHOPKEEP_MAX_RETRIES") {
            match retries.parse::<u32>() {
                Ok(r) => self.retry.max_retries = r,
                Err(_) => warn!(value = %retries, "Ignoring invalid SHOPKEEP_MAX_RETRIES"),
            }
        }

        if let Ok(path) = std::env::var("SHOPKEEP_DB_PATH") {
            debug!(path = %path, "Overriding database path from environment");
            self.storage.database_path = Some(PathBuf::from(path));
        }

        if let Ok(ms) = std::env::var("SHOPKEEP_DEBOUNCE_MS") {
            if let Ok(ms) = ms.parse::<u64>() {
                self.search.debounce_ms = ms;
            }
        }
    }

    fn project_dirs() -> Option<directories::ProjectDirs> {
        directories::ProjectDirs::from("pk", "shopkeep", "backoffice")
    }

    /// Returns the default config file path.
    fn default_config_path() -> Option<PathBuf> {
        Self::project_dirs().map(|dirs| dirs.config_dir().join("shopkeep.toml"))
    }

    /// The SQLite file to open: configured path or the platform data dir.
    pub fn database_path(&self) -> Option<PathBuf> {
        self.storage.database_path.clone().or_else(|| {
            Self::project_dirs().map(|dirs| dirs.data_dir().join("shopkeep.db"))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ClientConfig::default();
        assert_eq!(config.retry.max_retries, 2);
        assert_eq!(config.retry.base_delay_ms, 300);
        assert_eq!(config.search.debounce_ms, 500);
        assert_eq!(config.search.min_remote_query_len, 2);
        assert_eq!(config.notifications.toast_ttl_secs, 5);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config: ClientConfig = toml::from_str(
            r#"
            [api]
            base_url = "https://api.myshop.pk"

            [search]
            debounce_ms = 250
            "#,
        )
        .unwrap();

        assert_eq!(config.api.base_url, "https://api.myshop.pk");
        assert_eq!(config.api.timeout_secs, 15);
        assert_eq!(config.search.debounce_ms, 250);
        assert_eq!(config.search.remote_limit, 20);
    }

    #[test]
    fn test_validation() {
        let mut config = ClientConfig::default();
        config.api.base_url = "ftp://example.com".into();
        assert!(matches!(config.validate(), Err(ClientError::Config(_))));

        config.api.base_url = "https://example.com/api".into();
        assert!(config.validate().is_ok());

        config.api.timeout_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_save_then_load() {
        let path = std::env::temp_dir().join(format!(
            "shopkeep-config-test-{}.toml",
            std::process::id()
        ));
        let mut config = ClientConfig::default();
        config.cache.default_ttl_secs = 90;
        config.save(Some(path.clone())).unwrap();

        let loaded: ClientConfig =
            toml::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(loaded.cache.default_ttl_secs, 90);
        let _ = std::fs::remove_file(path);
    }

    #[test]
    fn test_toml_serialization() {
        let toml_str = toml::to_string_pretty(&ClientConfig::default()).unwrap();
        assert!(toml_str.contains("[api]"));
        assert!(toml_str.contains("[retry]"));
    }
}
