//! # Sync Configuration
//!
//! Configuration management for the sync engine.
//!
//! ## Configuration Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Priority                               │
//! │                                                                         │
//! │  1. Environment Variables (highest priority)                           │
//! │     KICKS_REMOTE_URL=https://shop.example.co                           │
//! │     KICKS_DEVICE_ID=till-2                                             │
//! │                                                                         │
//! │  2. SQLite Database (settings table)                                   │
//! │     remote_url / remote_key edited from the admin dashboard            │
//! │                                                                         │
//! │  3. TOML Config File                                                   │
//! │     ~/.config/kicks-pos/sync.toml (Linux)                              │
//! │     ~/Library/Application Support/com.kicks.pos/sync.toml (macOS)      │
//! │                                                                         │
//! │  4. Default Values (lowest priority)                                   │
//! │     15 s timer, realtime on, auto-generated device_id                  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration File Format
//! ```toml
//! # sync.toml
//! [device]
//! id = "550e8400-e29b-41d4-a716-446655440000"
//! name = "Front till"
//!
//! [remote]
//! url = "https://shop.example.co"
//! key = "public-anon-key"
//! request_timeout_secs = 10
//!
//! [sync]
//! interval_secs = 15
//! page_size = 1000
//! recent_window = 100
//!
//! [realtime]
//! enabled = true
//! heartbeat_secs = 30
//! ```

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;
use uuid::Uuid;

use kicks_db::{setting_keys, Database};

use crate::error::{SyncError, SyncResult};

// =============================================================================
// Device Configuration
// =============================================================================

/// Configuration for this till.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// Unique device identifier (UUID v4).
    /// Auto-generated on first run if not provided.
    pub id: String,

    /// Human-readable device name (e.g., "Front till").
    #[serde(default = "default_device_name")]
    pub name: String,
}

fn default_device_name() -> String {
    "Till".to_string()
}

impl Default for DeviceConfig {
    fn default() -> Self {
        DeviceConfig {
            id: Uuid::new_v4().to_string(),
            name: default_device_name(),
        }
    }
}

// =============================================================================
// Remote Store Configuration
// =============================================================================

/// Where the shared remote store lives.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteConfig {
    /// Base URL of the hosted store (scheme + host).
    #[serde(default)]
    pub url: Option<String>,

    /// Access key sent as `apikey` and bearer token.
    #[serde(default)]
    pub key: Option<String>,

    /// Per-request timeout (seconds).
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

fn default_request_timeout() -> u64 {
    10
}

impl Default for RemoteConfig {
    fn default() -> Self {
        RemoteConfig {
            url: None,
            key: None,
            request_timeout_secs: default_request_timeout(),
        }
    }
}

/// A complete endpoint + key pair, ready to build a client from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteSettings {
    pub url: String,
    pub key: String,
    pub request_timeout: Duration,
}

impl RemoteSettings {
    pub fn new(url: impl Into<String>, key: impl Into<String>) -> Self {
        RemoteSettings {
            url: url.into(),
            key: key.into(),
            request_timeout: Duration::from_secs(default_request_timeout()),
        }
    }

    /// Parses and checks the endpoint.
    pub fn base_url(&self) -> SyncResult<Url> {
        let url = Url::parse(&self.url)?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(SyncError::InvalidUrl(format!(
                "Remote URL must start with http:// or https://, got: {}",
                self.url
            )));
        }
        Ok(url)
    }

    /// WebSocket endpoint of the realtime change feed for this store.
    ///
    /// `https://shop.example.co` becomes
    /// `wss://shop.example.co/realtime/v1/websocket?apikey=...&vsn=1.0.0`.
    pub fn realtime_url(&self) -> SyncResult<Url> {
        let mut url = self.base_url()?.join("realtime/v1/websocket")?;
        let scheme = if url.scheme() == "https" { "wss" } else { "ws" };
        url.set_scheme(scheme)
            .map_err(|_| SyncError::InvalidUrl(format!("Cannot derive websocket URL from {}", self.url)))?;
        url.query_pairs_mut()
            .clear()
            .append_pair("apikey", &self.key)
            .append_pair("vsn", "1.0.0");
        Ok(url)
    }
}

// =============================================================================
// Sync Settings
// =============================================================================

/// Cycle behavior settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncSettings {
    /// Period of the background timer (seconds).
    #[serde(default = "default_interval")]
    pub interval_secs: u64,

    /// Window size for full (paginated) pulls.
    #[serde(default = "default_page_size")]
    pub page_size: usize,

    /// How many of the newest remote rows a timer cycle pulls.
    #[serde(default = "default_recent_window")]
    pub recent_window: usize,
}

fn default_interval() -> u64 {
    15
}
fn default_page_size() -> usize {
    1000
}
fn default_recent_window() -> usize {
    100
}

impl Default for SyncSettings {
    fn default() -> Self {
        SyncSettings {
            interval_secs: default_interval(),
            page_size: default_page_size(),
            recent_window: default_recent_window(),
        }
    }
}

impl SyncSettings {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

// =============================================================================
// Realtime Settings
// =============================================================================

/// Change-feed connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RealtimeSettings {
    /// Subscribe to row-level changes at all.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Heartbeat period (seconds).
    #[serde(default = "default_heartbeat")]
    pub heartbeat_secs: u64,

    /// Connection timeout (seconds).
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    /// Initial backoff duration (milliseconds) for reconnection.
    #[serde(default = "default_initial_backoff")]
    pub initial_backoff_ms: u64,

    /// Maximum backoff duration (seconds) for reconnection.
    #[serde(default = "default_max_backoff")]
    pub max_backoff_secs: u64,
}

fn default_true() -> bool {
    true
}
fn default_heartbeat() -> u64 {
    30
}
fn default_connect_timeout() -> u64 {
    10
}
fn default_initial_backoff() -> u64 {
    500
}
fn default_max_backoff() -> u64 {
    60
}

impl Default for RealtimeSettings {
    fn default() -> Self {
        RealtimeSettings {
            enabled: true,
            heartbeat_secs: default_heartbeat(),
            connect_timeout_secs: default_connect_timeout(),
            initial_backoff_ms: default_initial_backoff(),
            max_backoff_secs: default_max_backoff(),
        }
    }
}

// =============================================================================
// Main Sync Configuration
// =============================================================================

/// Complete sync configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SyncConfig {
    #[serde(default)]
    pub device: DeviceConfig,

    #[serde(default)]
    pub remote: RemoteConfig,

    #[serde(default)]
    pub sync: SyncSettings,

    #[serde(default)]
    pub realtime: RealtimeSettings,
}

impl SyncConfig {
    /// Creates a new config with defaults and a generated device ID.
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads configuration from file and environment.
    ///
    /// ## Load Order (later overrides earlier)
    /// 1. Default values
    /// 2. Config file (sync.toml)
    /// 3. Environment variables
    pub fn load(config_path: Option<PathBuf>) -> SyncResult<Self> {
        let mut config = Self::from_file(config_path)?;
        config.apply_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Like [`SyncConfig::load`], with the settings table layered between
    /// the file and the environment.
    pub async fn resolve(config_path: Option<PathBuf>, db: &Database) -> SyncResult<Self> {
        let mut config = Self::from_file(config_path)?;
        let stored = db.settings().all().await?;
        config.apply_db_settings(&stored);
        config.apply_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Loads config or returns default if load fails.
    pub fn load_or_default(config_path: Option<PathBuf>) -> Self {
        Self::load(config_path).unwrap_or_else(|e| {
            warn!("Failed to load sync config: {}. Using defaults.", e);
            Self::default()
        })
    }

    fn from_file(config_path: Option<PathBuf>) -> SyncResult<Self> {
        if let Some(path) = config_path.or_else(Self::default_config_path) {
            if path.exists() {
                info!(?path, "Loading sync config from file");
                let contents = std::fs::read_to_string(&path)?;
                return Ok(toml::from_str(&contents)?);
            }
            debug!(?path, "Config file not found, using defaults");
        }
        Ok(Self::default())
    }

    /// Saves configuration to file.
    pub fn save(&self, config_path: Option<PathBuf>) -> SyncResult<()> {
        let path = config_path
            .or_else(Self::default_config_path)
            .ok_or_else(|| SyncError::ConfigSaveFailed("No config path available".into()))?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self)?;
        std::fs::write(&path, contents)?;

        info!(?path, "Sync config saved");
        Ok(())
    }

    /// Validates the configuration.
    pub fn validate(&self) -> SyncResult<()> {
        if self.device.id.trim().is_empty() {
            return Err(SyncError::MissingDeviceId);
        }

        if let Some(settings) = self.remote_settings() {
            settings.base_url()?;
        }

        if self.sync.page_size == 0 {
            return Err(SyncError::InvalidConfig(
                "page_size must be greater than 0".into(),
            ));
        }

        if self.sync.recent_window == 0 {
            return Err(SyncError::InvalidConfig(
                "recent_window must be greater than 0".into(),
            ));
        }

        if self.sync.interval_secs == 0 {
            return Err(SyncError::InvalidConfig(
                "interval_secs must be greater than 0".into(),
            ));
        }

        Ok(())
    }

    /// Applies values stored in the settings table.
    pub fn apply_db_settings(&mut self, stored: &[(String, String)]) {
        for (key, value) in stored {
            match key.as_str() {
                setting_keys::REMOTE_URL => self.remote.url = non_empty(value),
                setting_keys::REMOTE_KEY => self.remote.key = non_empty(value),
                setting_keys::SYNC_INTERVAL_SECS => match value.parse() {
                    Ok(secs) => self.sync.interval_secs = secs,
                    Err(_) => warn!(value = %value, "Ignoring non-numeric sync interval setting"),
                },
                _ => {}
            }
        }
    }

    /// Applies `KICKS_*` overrides read through `lookup`.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(id) = lookup("KICKS_DEVICE_ID") {
            debug!(device_id = %id, "Overriding device ID from environment");
            self.device.id = id;
        }

        if let Some(name) = lookup("KICKS_DEVICE_NAME") {
            self.device.name = name;
        }

        if let Some(url) = lookup("KICKS_REMOTE_URL") {
            debug!(url = %url, "Overriding remote URL from environment");
            self.remote.url = non_empty(&url);
        }

        if let Some(key) = lookup("KICKS_REMOTE_KEY") {
            self.remote.key = non_empty(&key);
        }

        if let Some(secs) = lookup("KICKS_SYNC_INTERVAL_SECS") {
            match secs.parse::<u64>() {
                Ok(s) => self.sync.interval_secs = s,
                Err(_) => warn!(value = %secs, "Ignoring invalid KICKS_SYNC_INTERVAL_SECS"),
            }
        }

        if let Some(flag) = lookup("KICKS_REALTIME") {
            match flag.to_lowercase().as_str() {
                "1" | "true" | "on" | "yes" => self.realtime.enabled = true,
                "0" | "false" | "off" | "no" => self.realtime.enabled = false,
                _ => warn!(value = %flag, "Unknown KICKS_REALTIME value"),
            }
        }
    }

    /// Returns the default config file path.
    pub fn default_config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("com", "kicks", "pos").map(|dirs| {
            let config_dir = dirs.config_dir();
            config_dir.join("sync.toml")
        })
    }

    // =========================================================================
    // Convenience Methods
    // =========================================================================

    /// Returns the device ID.
    pub fn device_id(&self) -> &str {
        &self.device.id
    }

    /// Endpoint + key when both are set.
    pub fn remote_settings(&self) -> Option<RemoteSettings> {
        match (&self.remote.url, &self.remote.key) {
            (Some(url), Some(key)) => Some(RemoteSettings {
                url: url.clone(),
                key: key.clone(),
                request_timeout: Duration::from_secs(self.remote.request_timeout_secs),
            }),
            _ => None,
        }
    }

    /// Returns true if a remote store is configured.
    pub fn is_sync_enabled(&self) -> bool {
        self.remote_settings().is_some()
    }
}

fn non_empty(value: &str) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = SyncConfig::default();
        assert!(!config.device.id.is_empty()); // Auto-generated
        assert_eq!(config.sync.interval_secs, 15);
        assert!(config.realtime.enabled);
        assert!(!config.is_sync_enabled());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let mut config = SyncConfig::default();

        config.device.id = String::new();
        assert!(matches!(config.validate(), Err(SyncError::MissingDeviceId)));

        config.device.id = "till-1".to_string();
        config.remote.url = Some("ftp://shop.example.co".to_string());
        config.remote.key = Some("k".to_string());
        assert!(config.validate().unwrap_err().is_config_error());

        config.remote.url = Some("https://shop.example.co".to_string());
        assert!(config.validate().is_ok());

        config.sync.page_size = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_priority_env_over_db_over_file() {
        let mut config: SyncConfig = toml::from_str(
            r#"
            [remote]
            url = "https://file.example.co"
            key = "file-key"
            "#,
        )
        .unwrap();

        config.apply_db_settings(&[
            ("remote_url".to_string(), "https://db.example.co".to_string()),
            ("sync_interval_secs".to_string(), "30".to_string()),
        ]);
        assert_eq!(config.remote.url.as_deref(), Some("https://db.example.co"));
        assert_eq!(config.remote.key.as_deref(), Some("file-key"));
        assert_eq!(config.sync.interval_secs, 30);

        config.apply_overrides(env(&[
            ("KICKS_REMOTE_URL", "https://env.example.co"),
            ("KICKS_REALTIME", "off"),
            ("KICKS_SYNC_INTERVAL_SECS", "soon"),
        ]));
        assert_eq!(config.remote.url.as_deref(), Some("https://env.example.co"));
        assert!(!config.realtime.enabled);
        assert_eq!(config.sync.interval_secs, 30);
    }

    #[test]
    fn test_blank_setting_clears_remote() {
        let mut config = SyncConfig::default();
        config.apply_db_settings(&[
            ("remote_url".to_string(), "https://db.example.co".to_string()),
            ("remote_key".to_string(), "  ".to_string()),
        ]);
        assert!(config.remote_settings().is_none());
    }

    #[test]
    fn test_realtime_url() {
        let settings = RemoteSettings::new("https://shop.example.co", "anon");
        let url = settings.realtime_url().unwrap();
        assert_eq!(
            url.as_str(),
            "wss://shop.example.co/realtime/v1/websocket?apikey=anon&vsn=1.0.0"
        );

        let local = RemoteSettings::new("http://localhost:54321", "anon");
        assert_eq!(local.realtime_url().unwrap().scheme(), "ws");
    }

    #[test]
    fn test_toml_serialization() {
        let config = SyncConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        assert!(toml_str.contains("[device]"));
        assert!(toml_str.contains("[sync]"));
        assert!(toml_str.contains("[realtime]"));
    }
}
