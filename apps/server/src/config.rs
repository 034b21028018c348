//! Application configuration: YAML settings tree with `${VAR}` environment expansion.
//!
//! Grounded on the teacher's `apps/server/src/config.rs` settings-struct/`Default`-impl
//! idiom, generalized from JSON to YAML per the `${VAR}` expansion rule this system's
//! config file requires.

use std::collections::HashMap;
use std::path::Path;

use kimp_core::TradingConfig;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io { path: String, source: std::io::Error },

    #[error("failed to parse config YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("config references undefined environment variable: {0}")]
    MissingEnvVar(String),
}

/// Top-level application configuration (spec §6 config file shape).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub exchanges: HashMap<String, ExchangeSettings>,
    pub trading: TradingConfig,
    pub logging: LoggingSettings,
    /// Korean symbol / foreign symbol pairs this process trades.
    pub pairs: Vec<PairSettings>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PairSettings {
    pub base: String,
    pub quote: String,
    pub korean_exchange: String,
    pub foreign_exchange: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExchangeSettings {
    pub enabled: bool,
    pub ws_endpoint: String,
    #[serde(default)]
    pub ws_private_endpoint: Option<String>,
    #[serde(default)]
    pub ws_trade_endpoint: Option<String>,
    pub rest_endpoint: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub secret_key: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSettings {
    #[serde(default = "default_log_level")]
    pub level: String,
    /// File to rotate logs into; stderr-only if absent.
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default = "default_rotation_size")]
    pub rotation_size_mb: u64,
    #[serde(default = "default_rotation_count")]
    pub rotation_count: u32,
}

fn default_log_level() -> String {
    "info".to_string()
}
fn default_rotation_size() -> u64 {
    100
}
fn default_rotation_count() -> u32 {
    5
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            path: None,
            rotation_size_mb: default_rotation_size(),
            rotation_count: default_rotation_count(),
        }
    }
}

/// Loads `AppConfig` from `path`, expanding `${VAR}` references against the process
/// environment before deserializing. Per spec §7: a missing referenced variable is fatal.
pub fn load_config(path: &Path) -> Result<AppConfig, ConfigError> {
    let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.display().to_string(),
        source,
    })?;
    let mut value: serde_yaml::Value = serde_yaml::from_str(&raw)?;
    expand_env(&mut value)?;
    let config: AppConfig = serde_yaml::from_value(value)?;
    Ok(config)
}

/// Recursively substitutes `${VAR}` in every string scalar, failing closed on any variable
/// that isn't set in the process environment.
fn expand_env(value: &mut serde_yaml::Value) -> Result<(), ConfigError> {
    match value {
        serde_yaml::Value::String(s) => {
            *s = expand_string(s)?;
        }
        serde_yaml::Value::Sequence(seq) => {
            for item in seq {
                expand_env(item)?;
            }
        }
        serde_yaml::Value::Mapping(map) => {
            for (_, v) in map.iter_mut() {
                expand_env(v)?;
            }
        }
        _ => {}
    }
    Ok(())
}

fn expand_string(input: &str) -> Result<String, ConfigError> {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;
    while let Some(start) = rest.find("${") {
        let Some(end) = rest[start..].find('}') else {
            out.push_str(rest);
            return Ok(out);
        };
        out.push_str(&rest[..start]);
        let var_name = &rest[start + 2..start + end];
        let value = std::env::var(var_name).map_err(|_| ConfigError::MissingEnvVar(var_name.to_string()))?;
        out.push_str(&value);
        rest = &rest[start + end + 1..];
    }
    out.push_str(rest);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expands_known_variable() {
        std::env::set_var("KIMP_TEST_VAR", "secret123");
        let expanded = expand_string("key=${KIMP_TEST_VAR}").unwrap();
        assert_eq!(expanded, "key=secret123");
    }

    #[test]
    fn missing_variable_is_fatal() {
        let err = expand_string("key=${KIMP_TEST_DEFINITELY_UNSET}").unwrap_err();
        assert!(matches!(err, ConfigError::MissingEnvVar(_)));
    }

    #[test]
    fn string_without_placeholder_is_unchanged() {
        assert_eq!(expand_string("plain-value").unwrap(), "plain-value");
    }

    #[test]
    fn logging_settings_default_matches_constants() {
        let l = LoggingSettings::default();
        assert_eq!(l.level, "info");
        assert_eq!(l.rotation_count, 5);
    }
}
