//! Configuration (spec.md §6): `serde` + `toml`, matching the teacher's
//! preference for typed config over raw environment parsing. Unknown keys
//! warn but never fail; missing keys take the documented defaults.

use crate::domain::ConfigError;
use crate::pricing::ModelPrice;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use tracing::warn;

fn default_grpc_port() -> u16 {
    4317
}
fn default_http_port() -> u16 {
    4318
}
fn default_scan_interval() -> f64 {
    5.0
}
fn default_target_binary_names() -> Vec<String> {
    vec!["claude".to_string()]
}
fn default_event_buffer_size() -> usize {
    2000
}
fn default_refresh_rate_ms() -> u64 {
    500
}
fn default_green_below() -> f64 {
    5.0
}
fn default_yellow_below() -> f64 {
    10.0
}
fn default_session_attr_key() -> String {
    "session.id".to_string()
}
fn default_storage_path() -> StoragePath {
    StoragePath::Memory
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ReceiverConfig {
    pub grpc_port: u16,
    pub http_port: u16,
    pub session_attr_key: String,
}

impl Default for ReceiverConfig {
    fn default() -> Self {
        Self {
            grpc_port: default_grpc_port(),
            http_port: default_http_port(),
            session_attr_key: default_session_attr_key(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ScannerConfig {
    pub interval_seconds: f64,
    pub target_binary_names: Vec<String>,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self { interval_seconds: default_scan_interval(), target_binary_names: default_target_binary_names() }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    pub event_buffer_size: usize,
    pub refresh_rate_ms: u64,
    pub cost_color_green_below: f64,
    pub cost_color_yellow_below: f64,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            event_buffer_size: default_event_buffer_size(),
            refresh_rate_ms: default_refresh_rate_ms(),
            cost_color_green_below: default_green_below(),
            cost_color_yellow_below: default_yellow_below(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct AlertRuleConfig {
    pub name: String,
    pub threshold: f64,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct NotificationsConfig {
    pub system_notify: bool,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AlertsConfig {
    pub rules: Vec<AlertRuleConfig>,
    pub notifications: NotificationsConfig,
}

#[derive(Debug, Clone)]
pub enum StoragePath {
    Memory,
    Path(String),
}

impl<'de> Deserialize<'de> for StoragePath {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        Ok(if raw == "memory" { StoragePath::Memory } else { StoragePath::Path(raw) })
    }
}

impl Default for StoragePath {
    fn default() -> Self {
        StoragePath::Memory
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub path: StoragePath,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self { path: default_storage_path() }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub receiver: ReceiverConfig,
    pub scanner: ScannerConfig,
    pub display: DisplayConfig,
    pub alerts: AlertsConfig,
    pub pricing: HashMap<String, ModelPrice>,
    pub storage: StorageConfig,
}

impl Config {
    /// Load from `path`, applying defaults for anything absent. Unknown
    /// top-level keys are logged as warnings, not rejected — `toml`'s
    /// default `Deserialize` already ignores unrecognized fields, so this
    /// is purely a courtesy scan.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)
            .map_err(|source| ConfigError::Read { path: path.display().to_string(), source })?;
        warn_on_unknown_keys(&text);
        let config: Config = toml::from_str(&text)?;
        Ok(config)
    }
}

fn warn_on_unknown_keys(text: &str) {
    const KNOWN: &[&str] = &["receiver", "scanner", "display", "alerts", "pricing", "storage"];
    let Ok(raw) = toml::from_str::<toml::Value>(text) else { return };
    let Some(table) = raw.as_table() else { return };
    for key in table.keys() {
        if !KNOWN.contains(&key.as_str()) {
            warn!(key, "unrecognized top-level config key, ignoring");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_keys_take_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.receiver.grpc_port, 4317);
        assert_eq!(config.scanner.interval_seconds, 5.0);
        assert_eq!(config.display.event_buffer_size, 2000);
    }

    #[test]
    fn partial_override_keeps_other_defaults() {
        let toml_text = "[receiver]\ngrpc_port = 9000\n";
        let config: Config = toml::from_str(toml_text).unwrap();
        assert_eq!(config.receiver.grpc_port, 9000);
        assert_eq!(config.receiver.http_port, 4318);
    }

    #[test]
    fn storage_memory_keyword_parses() {
        let toml_text = "[storage]\npath = \"memory\"\n";
        let config: Config = toml::from_str(toml_text).unwrap();
        assert!(matches!(config.storage.path, StoragePath::Memory));
    }

    #[test]
    fn storage_path_string_parses() {
        let toml_text = "[storage]\npath = \"/tmp/aiwatch.db\"\n";
        let config: Config = toml::from_str(toml_text).unwrap();
        match config.storage.path {
            StoragePath::Path(p) => assert_eq!(p, "/tmp/aiwatch.db"),
            StoragePath::Memory => panic!("expected Path variant"),
        }
    }

    #[test]
    fn pricing_table_parses_model_map() {
        let toml_text = "[pricing.claude-opus]\ninput_per_1k = 0.015\noutput_per_1k = 0.075\n";
        let config: Config = toml::from_str(toml_text).unwrap();
        assert_eq!(config.pricing.get("claude-opus").unwrap().input_per_1k, 0.015);
    }
}
