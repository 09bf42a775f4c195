//! TOML-based application configuration.
//!
//! Stores the user preferences the rest-timer core reads but does not own:
//! - Notification channel toggles (live status, scheduled alerts, overlay)
//! - Rest timer defaults surfaced in the CLI
//!
//! Configuration is stored at `~/.config/liftroom/config.toml`.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use super::data_dir;

/// Notification channel toggles. Each channel is individually disabled by
/// the user; a disabled channel is skipped by the coordinator, not
/// attempted-then-ignored. All default to enabled when unset.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct NotificationsConfig {
    #[serde(default = "default_true")]
    pub live_status: bool,
    #[serde(default = "default_true")]
    pub scheduled_alerts: bool,
    #[serde(default = "default_true")]
    pub in_app_overlay: bool,
}

/// Rest timer configuration.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RestConfig {
    #[serde(default = "default_rest_duration")]
    pub default_duration_secs: u32,
    /// Persisted state older than this is discarded on restore.
    #[serde(default = "default_max_state_age_hours")]
    pub max_state_age_hours: u32,
}

/// Application configuration.
///
/// Serialized to/from TOML at `~/.config/liftroom/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub notifications: NotificationsConfig,
    #[serde(default)]
    pub rest: RestConfig,
}

// Default functions
fn default_true() -> bool {
    true
}
fn default_rest_duration() -> u32 {
    90
}
fn default_max_state_age_hours() -> u32 {
    24
}

impl Default for NotificationsConfig {
    fn default() -> Self {
        Self {
            live_status: true,
            scheduled_alerts: true,
            in_app_overlay: true,
        }
    }
}

impl Default for RestConfig {
    fn default() -> Self {
        Self {
            default_duration_secs: default_rest_duration(),
            max_state_age_hours: default_max_state_age_hours(),
        }
    }
}

impl Config {
    fn get_json_value_by_path<'a>(
        root: &'a serde_json::Value,
        key: &str,
    ) -> Option<&'a serde_json::Value> {
        if key.is_empty() {
            return None;
        }

        let mut current = root;
        for part in key.split('.') {
            current = current.get(part)?;
        }
        Some(current)
    }

    fn path() -> Result<PathBuf, Box<dyn std::error::Error>> {
        Ok(data_dir()?.join("config.toml"))
    }

    /// Load from disk or return default.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be parsed,
    /// or if the default config cannot be written to disk.
    pub fn load() -> Result<Self, Box<dyn std::error::Error>> {
        let path = Self::path()?;
        match std::fs::read_to_string(&path) {
            Ok(content) => {
                let cfg: Config = toml::from_str(&content)?;
                Ok(cfg)
            }
            Err(_) => {
                let cfg = Self::default();
                cfg.save()?;
                Ok(cfg)
            }
        }
    }

    /// Persist to disk.
    ///
    /// # Errors
    ///
    /// Returns an error if the config cannot be serialized or written to disk.
    pub fn save(&self) -> Result<(), Box<dyn std::error::Error>> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(Self::path()?, content)?;
        Ok(())
    }

    /// Get a config value as string by dot-separated key.
    pub fn get(&self, key: &str) -> Option<String> {
        let json = serde_json::to_value(self).ok()?;
        let val = Self::get_json_value_by_path(&json, key)?;
        match val {
            serde_json::Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }

    /// Set a config value by dot-separated key. Only existing keys can be
    /// set; the value is parsed to match the current value's type.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is unknown or the value cannot be parsed.
    pub fn set(&mut self, key: &str, value: &str) -> Result<(), Box<dyn std::error::Error>> {
        let mut json = serde_json::to_value(&*self)?;

        let mut parts = key.split('.').peekable();
        if parts.peek().is_none() {
            return Err("config key is empty".into());
        }

        let mut current = &mut json;
        while let Some(part) = parts.next() {
            let is_leaf = parts.peek().is_none();
            if is_leaf {
                let obj = current
                    .as_object_mut()
                    .ok_or_else(|| format!("unknown config key: {key}"))?;
                let existing = obj
                    .get(part)
                    .ok_or_else(|| format!("unknown config key: {key}"))?;

                let new_value = match existing {
                    serde_json::Value::Bool(_) => serde_json::Value::Bool(value.parse::<bool>()?),
                    serde_json::Value::Number(_) => {
                        serde_json::Value::Number(value.parse::<u64>()?.into())
                    }
                    _ => serde_json::Value::String(value.into()),
                };

                obj.insert(part.to_string(), new_value);
                *self = serde_json::from_value(json)?;
                return Ok(());
            }

            current = current
                .get_mut(part)
                .ok_or_else(|| format!("unknown config key: {key}"))?;
        }

        Err(format!("unknown config key: {key}").into())
    }
}
