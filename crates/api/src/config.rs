use anyhow::{Context, Result};
use extract::ExtractorConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;

pub const CONFIG_ENV: &str = "ARTIFACTS_CONFIG";
pub const BIND_ENV: &str = "ARTIFACTS_BIND";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub pipeline: ExtractorConfig,
    pub cache: CacheConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub enabled: bool,
    pub max_entries: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter when `RUST_LOG` is unset.
    pub level: String,
    pub json: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:3000".to_string(),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_entries: 10000,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

impl AppConfig {
    /// Only what the model explicitly marked becomes an artifact; nothing is cached.
    pub fn strict_mode() -> Self {
        Self {
            pipeline: ExtractorConfig {
                auto_wrap_unreferenced: false,
                ..ExtractorConfig::default()
            },
            cache: CacheConfig {
                enabled: false,
                max_entries: 0,
            },
            ..Self::default()
        }
    }

    /// Defaults, overlaid by the JSON file named in `ARTIFACTS_CONFIG`, then `ARTIFACTS_BIND`.
    pub fn load() -> Result<Self> {
        let mut config = match std::env::var(CONFIG_ENV) {
            Ok(path) => Self::from_file(Path::new(&path))?,
            Err(_) => Self::default(),
        };
        if let Ok(bind) = std::env::var(BIND_ENV) {
            config.server.bind = bind;
        }
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::from_json(&raw).with_context(|| format!("Invalid config file {}", path.display()))
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        serde_json::from_str(raw).context("Failed to parse config JSON")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();

        assert_eq!(config.server.bind, "0.0.0.0:3000");
        assert!(config.cache.enabled);
        assert!(config.pipeline.emit_placeholders);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config = AppConfig::from_json(r#"{"logging": {"json": true}, "pipeline": {"preview_chars": 120}}"#).unwrap();

        assert!(config.logging.json);
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.pipeline.preview_chars, 120);
        assert_eq!(config.pipeline.max_unescape_depth, 2);
        assert_eq!(config.cache.max_entries, 10000);
    }

    #[test]
    fn test_invalid_json_is_an_error() {
        assert!(AppConfig::from_json("{not json").is_err());
    }

    #[test]
    fn test_missing_file_reports_path() {
        let err = AppConfig::from_file(Path::new("/nonexistent/artifacts.json")).unwrap_err();
        assert!(err.to_string().contains("/nonexistent/artifacts.json"));
    }

    #[test]
    fn test_strict_mode() {
        let config = AppConfig::strict_mode();

        assert!(!config.pipeline.auto_wrap_unreferenced);
        assert!(!config.cache.enabled);
        assert_eq!(config.server, ServerConfig::default());
    }
}
