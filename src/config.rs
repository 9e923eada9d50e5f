//! Configuration types.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::error::ConfigError;
use crate::store::stats::{DEFAULT_UPCOMING_DAYS, MAX_UPCOMING_DAYS};

/// Assets every cache generation must hold before it can take over.
pub const DEFAULT_PRECACHE: &[&str] = &[
    "/",
    "/index.html",
    "/manifest.json",
    "/css/styles.css",
    "/css/themes.css",
    "/css/animations.css",
    "/js/app.js",
    "/js/db.js",
    "/js/ui.js",
    "/icons/icon-192x192.png",
    "/icons/icon-512x512.png",
    "/icons/favicon.ico",
];

/// Record store configuration.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Key holding the serialized subscription collection.
    pub subscriptions_key: String,
    /// Key holding the settings mapping.
    pub settings_key: String,
    /// Directory holding the key-value database.
    pub data_dir: PathBuf,
    /// Optional write quota in bytes per key.
    pub quota_bytes: Option<usize>,
    /// Horizon of the upcoming-payments view, in days.
    pub upcoming_days: i64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            subscriptions_key: "pwa-subscriptions".to_string(),
            settings_key: "pwa-settings".to_string(),
            data_dir: PathBuf::from("./data"),
            quota_bytes: None,
            upcoming_days: DEFAULT_UPCOMING_DAYS,
        }
    }
}

impl StoreConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        if let Ok(dir) = std::env::var("SUBTRACK_DATA_DIR") {
            config.data_dir = PathBuf::from(dir);
        }
        config.quota_bytes = env_parse("SUBTRACK_STORAGE_QUOTA")?;
        if let Some(days) = env_parse::<i64>("SUBTRACK_UPCOMING_DAYS")? {
            config.upcoming_days = checked_upcoming_days(days)?;
        }
        Ok(config)
    }

    /// SQLite database file inside `data_dir`.
    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join("subtrack.db")
    }
}

fn checked_upcoming_days(days: i64) -> Result<i64, ConfigError> {
    if !(0..=MAX_UPCOMING_DAYS).contains(&days) {
        return Err(ConfigError::InvalidValue {
            key: "SUBTRACK_UPCOMING_DAYS".to_string(),
            message: format!("must be between 0 and {MAX_UPCOMING_DAYS}"),
        });
    }
    Ok(days)
}

/// Asset cache configuration.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Version string naming the current cache generation.
    pub version: String,
    /// Origin relative asset paths are resolved against.
    pub origin: String,
    /// Assets fetched and stored during install.
    pub precache: Vec<String>,
    /// Cached document served when a navigation fails offline.
    pub offline_document: String,
    /// Body of the synthetic response returned when nothing else works.
    pub offline_message: String,
    /// Activate right after a successful install instead of waiting.
    pub skip_waiting_on_install: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            version: "pwa-subscription-v1".to_string(),
            origin: "http://localhost:8080".to_string(),
            precache: DEFAULT_PRECACHE.iter().map(|s| s.to_string()).collect(),
            offline_document: "/index.html".to_string(),
            offline_message: "Offline mode. Check your internet connection.".to_string(),
            skip_waiting_on_install: true,
        }
    }
}

impl CacheConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        if let Ok(version) = std::env::var("SUBTRACK_CACHE_VERSION") {
            if version.trim().is_empty() {
                return Err(ConfigError::InvalidValue {
                    key: "SUBTRACK_CACHE_VERSION".to_string(),
                    message: "must not be empty".to_string(),
                });
            }
            config.version = version;
        }
        if let Ok(origin) = std::env::var("SUBTRACK_ORIGIN") {
            reqwest::Url::parse(&origin).map_err(|e| ConfigError::InvalidValue {
                key: "SUBTRACK_ORIGIN".to_string(),
                message: e.to_string(),
            })?;
            config.origin = origin;
        }
        Ok(config)
    }
}

/// Reminder scheduling configuration.
#[derive(Debug, Clone)]
pub struct ReminderConfig {
    /// How often upcoming payments are re-scanned.
    pub interval: Duration,
    /// Reminders fire when a payment is at most this many days away.
    pub window_days: i64,
}

impl Default for ReminderConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(3600), // 1 hour
            window_days: 3,
        }
    }
}

impl ReminderConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        if let Some(secs) = env_parse::<u64>("SUBTRACK_REMINDER_INTERVAL_SECS")? {
            if secs == 0 {
                return Err(ConfigError::InvalidValue {
                    key: "SUBTRACK_REMINDER_INTERVAL_SECS".to_string(),
                    message: "must be positive".to_string(),
                });
            }
            config.interval = Duration::from_secs(secs);
        }
        Ok(config)
    }
}

/// Background synchronization configuration.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Tag registered with the deferred sync facility.
    pub tag: String,
    /// How often the origin is polled to detect connectivity changes.
    pub reachability_interval: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            tag: "background-sync-subscriptions".to_string(),
            reachability_interval: Duration::from_secs(30),
        }
    }
}

impl SyncConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        if let Some(secs) = env_parse::<u64>("SUBTRACK_REACHABILITY_SECS")? {
            if secs == 0 {
                return Err(ConfigError::InvalidValue {
                    key: "SUBTRACK_REACHABILITY_SECS".to_string(),
                    message: "must be positive".to_string(),
                });
            }
            config.reachability_interval = Duration::from_secs(secs);
        }
        Ok(config)
    }
}

/// Full application configuration.
#[derive(Debug, Clone, Default)]
pub struct AppConfig {
    pub store: StoreConfig,
    pub cache: CacheConfig,
    pub reminders: ReminderConfig,
    pub sync: SyncConfig,
}

impl AppConfig {
    /// Load configuration from `SUBTRACK_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            store: StoreConfig::from_env()?,
            cache: CacheConfig::from_env()?,
            reminders: ReminderConfig::from_env()?,
            sync: SyncConfig::from_env()?,
        })
    }
}

fn env_parse<T>(key: &str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e: T::Err| ConfigError::InvalidValue {
                key: key.to_string(),
                message: e.to_string(),
            }),
        Err(_) => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_shell_layout() {
        let config = AppConfig::default();
        assert_eq!(config.store.subscriptions_key, "pwa-subscriptions");
        assert_eq!(config.store.settings_key, "pwa-settings");
        assert_eq!(config.cache.version, "pwa-subscription-v1");
        assert!(config.cache.precache.contains(&"/index.html".to_string()));
        assert_eq!(config.reminders.interval, Duration::from_secs(3600));
        assert_eq!(config.reminders.window_days, 3);
        assert_eq!(config.sync.tag, "background-sync-subscriptions");
        assert_eq!(config.store.upcoming_days, 30);
        assert!(config.store.database_path().ends_with("subtrack.db"));
    }

    #[test]
    fn upcoming_horizon_is_bounded() {
        assert_eq!(checked_upcoming_days(90).unwrap(), 90);
        assert!(checked_upcoming_days(-1).is_err());
        assert!(matches!(
            checked_upcoming_days(i64::MAX),
            Err(ConfigError::InvalidValue { key, .. }) if key == "SUBTRACK_UPCOMING_DAYS"
        ));
    }

    #[test]
    fn env_parse_missing_is_none() {
        let parsed: Option<u64> = env_parse("SUBTRACK_TEST_SURELY_UNSET_VAR").unwrap();
        assert!(parsed.is_none());
    }
}
