//! Machine configuration structures.

use std::env;

use serde::{Deserialize, Serialize};

use crate::core::DEFAULT_MAX_ROUTINES;

/// Cache backend selection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheBackendConfig {
    /// In-memory map.
    #[default]
    InMemory,
}

/// Event bus backend selection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PubSubBackendConfig {
    /// In-memory single-slot lanes.
    #[default]
    InMemory,
}

fn default_max_routines() -> usize {
    DEFAULT_MAX_ROUTINES
}

const fn default_publish_timeout_ms() -> u64 {
    5_000
}

/// Machine configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MachineConfig {
    /// Name used in log fields.
    #[serde(default)]
    pub name: Option<String>,
    /// Maximum concurrently active routines across the machine's tree.
    #[serde(default = "default_max_routines")]
    pub max_routines: usize,
    /// How long a publish waits for one subscriber lane, in milliseconds.
    #[serde(default = "default_publish_timeout_ms")]
    pub publish_timeout_ms: u64,
    /// Cache backend selection.
    #[serde(default)]
    pub cache: CacheBackendConfig,
    /// Event bus backend selection.
    #[serde(default)]
    pub pubsub: PubSubBackendConfig,
}

impl Default for MachineConfig {
    fn default() -> Self {
        Self {
            name: None,
            max_routines: default_max_routines(),
            publish_timeout_ms: default_publish_timeout_ms(),
            cache: CacheBackendConfig::default(),
            pubsub: PubSubBackendConfig::default(),
        }
    }
}

impl MachineConfig {
    /// Validate configuration values.
    ///
    /// # Errors
    ///
    /// Returns a description of the first invalid field.
    pub fn validate(&self) -> Result<(), String> {
        if self.max_routines == 0 {
            return Err("max_routines must be greater than 0".into());
        }
        if self.publish_timeout_ms == 0 {
            return Err("publish_timeout_ms must be greater than 0".into());
        }
        if self.name.as_deref().is_some_and(str::is_empty) {
            return Err("name must not be empty".into());
        }
        Ok(())
    }

    /// Parse machine configuration from a JSON string and validate.
    ///
    /// # Errors
    ///
    /// Returns a parse or validation message.
    pub fn from_json_str(input: &str) -> Result<Self, String> {
        let cfg: Self = serde_json::from_str(input).map_err(|e| format!("parse error: {e}"))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Build configuration from the environment, loading `.env` first if
    /// present. Recognized variables: `MACHINE_NAME`,
    /// `MACHINE_MAX_ROUTINES`, `MACHINE_PUBLISH_TIMEOUT_MS`,
    /// `MACHINE_CACHE`, `MACHINE_PUBSUB`. Unset variables keep defaults.
    ///
    /// # Errors
    ///
    /// Returns a parse or validation message.
    pub fn from_env() -> Result<Self, String> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup.
    ///
    /// # Errors
    ///
    /// Returns a parse or validation message.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, String> {
        let mut cfg = Self::default();
        if let Some(name) = lookup("MACHINE_NAME") {
            cfg.name = Some(name);
        }
        if let Some(raw) = lookup("MACHINE_MAX_ROUTINES") {
            cfg.max_routines = raw
                .trim()
                .parse()
                .map_err(|e| format!("MACHINE_MAX_ROUTINES: {e}"))?;
        }
        if let Some(raw) = lookup("MACHINE_PUBLISH_TIMEOUT_MS") {
            cfg.publish_timeout_ms = raw
                .trim()
                .parse()
                .map_err(|e| format!("MACHINE_PUBLISH_TIMEOUT_MS: {e}"))?;
        }
        if let Some(raw) = lookup("MACHINE_CACHE") {
            cfg.cache = parse_backend(&raw).map_err(|e| format!("MACHINE_CACHE: {e}"))?;
        }
        if let Some(raw) = lookup("MACHINE_PUBSUB") {
            cfg.pubsub = parse_backend(&raw).map_err(|e| format!("MACHINE_PUBSUB: {e}"))?;
        }
        cfg.validate()?;
        Ok(cfg)
    }
}

/// Parse a backend selector written the way it appears in JSON.
fn parse_backend<T: for<'de> Deserialize<'de>>(raw: &str) -> Result<T, String> {
    serde_json::from_value(serde_json::Value::String(raw.trim().to_owned()))
        .map_err(|e| e.to_string())
}
