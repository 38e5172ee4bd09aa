//! Loading and saving layer configuration files.

use std::path::Path;

use ini::Ini;
use thiserror::Error;

use super::settings::LayerConfig;
use crate::cache::WatermarkError;
use crate::grid::LevelSetError;

/// Configuration file errors.
#[derive(Debug, Error)]
pub enum ConfigFileError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] ini::Error),

    #[error("Failed to parse config: {0}")]
    ParseError(#[from] ini::ParseError),

    #[error("Failed to write config file: {0}")]
    WriteError(#[source] std::io::Error),

    #[error("Invalid configuration: {section}.{key} = '{value}' - {reason}")]
    InvalidValue {
        section: String,
        key: String,
        value: String,
        reason: String,
    },

    #[error("Invalid level set: {0}")]
    Levels(#[from] LevelSetError),

    #[error("Invalid cache watermarks: {0}")]
    Watermarks(#[from] WatermarkError),
}

impl LayerConfig {
    /// Load and validate a configuration file.
    pub fn load(path: &Path) -> Result<Self, ConfigFileError> {
        let ini = Ini::load_from_file(path)?;
        let config = super::parser::parse_ini(&ini)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse and validate configuration text.
    pub fn from_ini_str(text: &str) -> Result<Self, ConfigFileError> {
        let ini = Ini::load_from_str(text)?;
        let config = super::parser::parse_ini(&ini)?;
        config.validate()?;
        Ok(config)
    }

    /// Check the settings that only make sense together.
    pub fn validate(&self) -> Result<(), ConfigFileError> {
        self.level_set()?;
        self.watermarks()?;
        Ok(())
    }

    /// Commented INI text for this configuration.
    pub fn to_ini_string(&self) -> String {
        super::writer::to_config_string(self)
    }

    /// Write this configuration, creating parent directories.
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigFileError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(ConfigFileError::WriteError)?;
        }
        std::fs::write(path, self.to_ini_string()).map_err(ConfigFileError::WriteError)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_save_and_load() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("layers/bluemarble.ini");

        let mut config = LayerConfig::named("bluemarble");
        config.levels.level_count = 7;
        config.lod.force_level_zero_loads = true;
        config.save_to(&path).unwrap();

        let loaded = LayerConfig::load(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let temp = TempDir::new().unwrap();
        let result = LayerConfig::load(&temp.path().join("nope.ini"));
        assert!(matches!(result, Err(ConfigFileError::ReadError(_))));
    }

    #[test]
    fn test_validation_runs_on_load() {
        let err = LayerConfig::from_ini_str("[levels]\ncount = 0\n").unwrap_err();
        assert!(matches!(err, ConfigFileError::Levels(LevelSetError::NoLevels)));

        let err =
            LayerConfig::from_ini_str("[cache]\nhigh_watermark = 1MB\nlow_watermark = 2MB\n")
                .unwrap_err();
        assert!(matches!(err, ConfigFileError::Watermarks(_)));
    }

    #[test]
    fn test_invalid_value_message() {
        let err = LayerConfig::from_ini_str("[levels]\ntile_size = big\n").unwrap_err();
        assert_eq!(
            err.to_string(),
            "Invalid configuration: levels.tile_size = 'big' - must be a size in pixels"
        );
    }
}
