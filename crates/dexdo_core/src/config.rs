//! Environment-driven core configuration.
//!
//! # Responsibility
//! - Resolve database path, lookup endpoint, reminder and banner settings.
//! - Reject malformed overrides instead of silently falling back.
//!
//! # Invariants
//! - Blank variables count as unset.
//! - `reminder_hour` is always within `0..=23`.

use std::collections::HashMap;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::PathBuf;
use std::time::Duration;

pub const ENV_DB_PATH: &str = "DEXDO_DB_PATH";
pub const ENV_LOOKUP_BASE_URL: &str = "DEXDO_LOOKUP_BASE_URL";
pub const ENV_LOOKUP_TIMEOUT_MS: &str = "DEXDO_LOOKUP_TIMEOUT_MS";
pub const ENV_REMINDER_HOUR: &str = "DEXDO_REMINDER_HOUR";
pub const ENV_STALE_BANNER_MINUTES: &str = "DEXDO_STALE_BANNER_MINUTES";

const DB_FILE_NAME: &str = "dexdo.sqlite3";
const DEFAULT_LOOKUP_BASE_URL: &str = "https://pokeapi.co/api/v2";
const DEFAULT_LOOKUP_TIMEOUT_MS: u64 = 5_000;
const DEFAULT_REMINDER_HOUR: u32 = 9;
const DEFAULT_STALE_BANNER_MINUTES: u64 = 24 * 60;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    InvalidValue { key: &'static str, value: String },
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidValue { key, value } => write!(f, "invalid value `{value}` for {key}"),
        }
    }
}

impl Error for ConfigError {}

/// Creature lookup endpoint settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LookupConfig {
    pub base_url: String,
    pub timeout: Duration,
}

impl Default for LookupConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_LOOKUP_BASE_URL.to_string(),
            timeout: Duration::from_millis(DEFAULT_LOOKUP_TIMEOUT_MS),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoreConfig {
    pub db_path: PathBuf,
    pub lookup: LookupConfig,
    /// Local hour at which due-date reminders fire.
    pub reminder_hour: u32,
    /// Unchanged-list window after which the reminder banner shows.
    pub stale_banner_after: Duration,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            db_path: std::env::temp_dir().join(DB_FILE_NAME),
            lookup: LookupConfig::default(),
            reminder_hour: DEFAULT_REMINDER_HOUR,
            stale_banner_after: Duration::from_secs(DEFAULT_STALE_BANNER_MINUTES * 60),
        }
    }
}

impl CoreConfig {
    /// Reads overrides from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads overrides from an explicit key/value map.
    pub fn from_map(values: &HashMap<String, String>) -> Result<Self, ConfigError> {
        Self::from_lookup(|key| values.get(key).cloned())
    }

    fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let read = |key: &str| {
            get(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };
        let mut config = Self::default();

        if let Some(path) = read(ENV_DB_PATH) {
            config.db_path = PathBuf::from(path);
        }
        if let Some(url) = read(ENV_LOOKUP_BASE_URL) {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(ConfigError::InvalidValue {
                    key: ENV_LOOKUP_BASE_URL,
                    value: url,
                });
            }
            config.lookup.base_url = url;
        }
        if let Some(raw) = read(ENV_LOOKUP_TIMEOUT_MS) {
            let millis = parse_number(ENV_LOOKUP_TIMEOUT_MS, &raw)?;
            if millis == 0 {
                return Err(ConfigError::InvalidValue {
                    key: ENV_LOOKUP_TIMEOUT_MS,
                    value: raw,
                });
            }
            config.lookup.timeout = Duration::from_millis(millis);
        }
        if let Some(raw) = read(ENV_REMINDER_HOUR) {
            let hour = parse_number(ENV_REMINDER_HOUR, &raw)?;
            config.reminder_hour = u32::try_from(hour)
                .ok()
                .filter(|hour| *hour < 24)
                .ok_or(ConfigError::InvalidValue {
                    key: ENV_REMINDER_HOUR,
                    value: raw,
                })?;
        }
        if let Some(raw) = read(ENV_STALE_BANNER_MINUTES) {
            let minutes = parse_number(ENV_STALE_BANNER_MINUTES, &raw)?;
            config.stale_banner_after = Duration::from_secs(minutes.saturating_mul(60));
        }

        Ok(config)
    }
}

fn parse_number(key: &'static str, raw: &str) -> Result<u64, ConfigError> {
    raw.parse::<u64>().map_err(|_| ConfigError::InvalidValue {
        key,
        value: raw.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::{
        ConfigError, CoreConfig, ENV_DB_PATH, ENV_LOOKUP_BASE_URL, ENV_LOOKUP_TIMEOUT_MS,
        ENV_REMINDER_HOUR,
    };
    use std::collections::HashMap;
    use std::path::PathBuf;
    use std::time::Duration;

    fn map(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect()
    }

    #[test]
    fn empty_map_yields_defaults() {
        let config = CoreConfig::from_map(&HashMap::new()).expect("defaults should load");
        assert_eq!(config, CoreConfig::default());
        assert_eq!(config.reminder_hour, 9);
        assert_eq!(config.lookup.base_url, "https://pokeapi.co/api/v2");
    }

    #[test]
    fn overrides_are_applied_and_blank_values_ignored() {
        let config = CoreConfig::from_map(&map(&[
            (ENV_DB_PATH, "/tmp/dexdo-test.sqlite3"),
            (ENV_LOOKUP_TIMEOUT_MS, "250"),
            (ENV_REMINDER_HOUR, "  "),
        ]))
        .expect("overrides should load");
        assert_eq!(config.db_path, PathBuf::from("/tmp/dexdo-test.sqlite3"));
        assert_eq!(config.lookup.timeout, Duration::from_millis(250));
        assert_eq!(config.reminder_hour, 9);
    }

    #[test]
    fn invalid_values_are_rejected() {
        for (key, value) in [
            (ENV_REMINDER_HOUR, "24"),
            (ENV_LOOKUP_TIMEOUT_MS, "0"),
            (ENV_LOOKUP_TIMEOUT_MS, "soon"),
            (ENV_LOOKUP_BASE_URL, "pokeapi.co"),
        ] {
            let err = CoreConfig::from_map(&map(&[(key, value)]))
                .expect_err("invalid value must be rejected");
            assert!(matches!(err, ConfigError::InvalidValue { .. }));
        }
    }
}
