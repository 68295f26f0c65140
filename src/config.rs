//! Configuration loaded from `formwork.toml`.
//!
//! [`FormConfig`] carries the tunable parameters of the default HTTP
//! transport. Values not present in the file use sensible defaults. The
//! recently-successful window is deliberately not configurable; it is a
//! fixed part of the submission lifecycle.

use std::path::Path;

use anyhow::Result;
use serde::Deserialize;

/// Top-level configuration, typically loaded from `formwork.toml`.
#[derive(Debug, Clone, Deserialize)]
pub struct FormConfig {
    /// Connection establishment timeout for the default transport, in milliseconds.
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,

    /// Whole-request timeout for the default transport, in milliseconds.
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

fn default_connect_timeout_ms() -> u64 {
    10_000
}

fn default_request_timeout_ms() -> u64 {
    120_000
}

impl Default for FormConfig {
    fn default() -> Self {
        Self {
            connect_timeout_ms: default_connect_timeout_ms(),
            request_timeout_ms: default_request_timeout_ms(),
        }
    }
}

impl FormConfig {
    /// Loads the configuration from `formwork.toml` in the current directory.
    /// Uses defaults if the file does not exist.
    pub fn load() -> Result<Self> {
        let path = Path::new("formwork.toml");
        let config = if path.exists() {
            let contents = std::fs::read_to_string(path)?;
            toml::from_str::<FormConfig>(&contents)?
        } else {
            Self::default()
        };
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_values() {
        let config = FormConfig::default();
        assert_eq!(config.connect_timeout_ms, 10_000);
        assert_eq!(config.request_timeout_ms, 120_000);
    }

    #[test]
    fn deserialize_partial_toml() {
        let toml_str = r#"
            request_timeout_ms = 30000
        "#;
        let config: FormConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.request_timeout_ms, 30_000);
        assert_eq!(config.connect_timeout_ms, 10_000);
    }

    #[test]
    fn load_falls_back_to_defaults() {
        // The test working directory has no formwork.toml.
        let config = FormConfig::load().unwrap();
        assert_eq!(config.connect_timeout_ms, 10_000);
    }
}
