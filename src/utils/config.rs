//! Configuration files
//!
//! One TOML file holds the model hyperparameters, the windowing options, the
//! synthetic series settings and the log level. Missing sections and keys
//! fall back to their defaults.

use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::warn;

use crate::data::{SyntheticConfig, WindowConfig};
use crate::error::Result;
use crate::model::HarhnConfig;

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// Main configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub model: HarhnConfig,
    pub data: WindowConfig,
    pub synthetic: SyntheticConfig,
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Load configuration from file
    ///
    /// The model section is validated after parsing.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: AppConfig = toml::from_str(&content)?;
        config.model.validate()?;
        Ok(config)
    }

    /// Load configuration from file or use default
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Self {
        match Self::load(path.as_ref()) {
            Ok(config) => config,
            Err(e) => {
                warn!("Using default configuration, {} unusable: {}", path.as_ref().display(), e);
                Self::default()
            }
        }
    }

    /// Save configuration to file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Create default configuration file
    pub fn create_default<P: AsRef<Path>>(path: P) -> Result<()> {
        AppConfig::default().save(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::HarhnError;

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("harhn.toml");

        let mut config = AppConfig::default();
        config.model = config.model.with_rec_depth(2).with_seed(11);
        config.data = config.data.with_target_column(0);
        config.save(&path).unwrap();

        let loaded = AppConfig::load(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("partial.toml");
        std::fs::write(&path, "[model]\nlookback = 8\n\n[logging]\nlevel = \"debug\"\n").unwrap();

        let config = AppConfig::load(&path).unwrap();
        assert_eq!(config.model.lookback, 8);
        assert_eq!(config.model.rec_depth, HarhnConfig::default().rec_depth);
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.synthetic, SyntheticConfig::default());
    }

    #[test]
    fn test_invalid_model_section_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "[model]\nrec_depth = 0\n").unwrap();

        let err = AppConfig::load(&path).unwrap_err();
        assert!(err.is_config_error());
    }

    #[test]
    fn test_unparsable_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.toml");
        std::fs::write(&path, "[model\n").unwrap();

        assert!(matches!(AppConfig::load(&path), Err(HarhnError::ConfigParse(_))));
        assert_eq!(AppConfig::load_or_default(&path), AppConfig::default());
    }

    #[test]
    fn test_missing_file_falls_back_to_default() {
        let config = AppConfig::load_or_default("/nonexistent/harhn.toml");
        assert_eq!(config, AppConfig::default());
    }
}
