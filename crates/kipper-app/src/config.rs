//! Configuration management for kipper-log
//!
//! Config stored at: ~/.config/kipper-log/config.json

use std::path::{Path, PathBuf};

use kipper_domain::service::DetectionConfig;
use kipper_domain::TruckType;
use kipper_types::{ConfigError, OutputFormat, Result};
use serde::{Deserialize, Serialize};

/// Application configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Data directory override (loads, sites, materials)
    #[serde(default)]
    pub data_dir: Option<PathBuf>,

    /// Default output format (json, table)
    #[serde(default)]
    pub output_format: OutputFormat,

    /// Device-wide truck type for new auto loads
    #[serde(default)]
    pub current_truck_type: TruckType,

    /// Automatic load detection on/off
    #[serde(default = "default_true")]
    pub auto_detect_enabled: bool,

    /// Detector timings and accuracy gate
    #[serde(default)]
    pub detection: DetectionConfig,
}

fn default_true() -> bool {
    true
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: None,
            output_format: OutputFormat::default(),
            current_truck_type: TruckType::default(),
            auto_detect_enabled: true,
            detection: DetectionConfig::default(),
        }
    }
}

impl Config {
    /// Get the config directory path
    pub fn config_dir() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or(ConfigError::NotFound)?
            .join("kipper-log");
        Ok(config_dir)
    }

    /// Get the config file path
    pub fn config_path() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.json"))
    }

    /// Directory holding the JSON stores
    pub fn data_dir(&self) -> Result<PathBuf> {
        if let Some(ref dir) = self.data_dir {
            return Ok(dir.clone());
        }

        let data_dir = dirs::data_dir()
            .ok_or(ConfigError::NotFound)?
            .join("kipper-log");
        Ok(data_dir)
    }

    /// Load config from file, or create default
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Config::default());
        }
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&content)
            .map_err(|e| ConfigError::ParseError(format!("{}: {}", path.display(), e)))?;
        config
            .detection
            .validate()
            .map_err(|e| ConfigError::ParseError(format!("{}: {}", path.display(), e)))?;
        Ok(config)
    }

    /// Save config to file
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        self.detection.validate()?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)
            .map_err(|e| ConfigError::SaveError(format!("{}: {}", path.display(), e)))?;
        Ok(())
    }
}

impl std::fmt::Display for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Kipper-Log Configuration")?;
        writeln!(f, "========================")?;
        writeln!(f)?;
        writeln!(
            f,
            "Data dir:          {}",
            self.data_dir()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|_| "(error)".to_string())
        )?;
        writeln!(f, "Output format:     {}", self.output_format)?;
        writeln!(
            f,
            "Truck type:        {} ({} m³)",
            self.current_truck_type.label(),
            self.current_truck_type.default_volume()
        )?;
        writeln!(
            f,
            "Auto detection:    {}",
            if self.auto_detect_enabled { "on" } else { "off" }
        )?;
        writeln!(f, "Dwell time:        {} ms", self.detection.dwell_ms)?;
        writeln!(f, "Finalize cooldown: {} ms", self.detection.finalize_cooldown_ms)?;
        writeln!(f, "Duplicate window:  {} ms", self.detection.duplicate_window_ms)?;
        writeln!(f, "Accuracy limit:    {} m", self.detection.accuracy_threshold_m)?;

        if let Ok(path) = Self::config_path() {
            writeln!(f)?;
            writeln!(f, "Config file:       {}", path.display())?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempdir().unwrap();
        let config = Config::load_from(&dir.path().join("config.json")).unwrap();
        assert_eq!(config, Config::default());
        assert!(config.auto_detect_enabled);
        assert_eq!(config.current_truck_type, TruckType::FourAxle);
        assert_eq!(config.detection.dwell_ms, 5_000);
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(
            &path,
            r#"{ "current_truck_type": "3-axle", "detection": { "dwell_ms": 8000 } }"#,
        )
        .unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.current_truck_type, TruckType::ThreeAxle);
        assert_eq!(config.detection.dwell_ms, 8_000);
        assert_eq!(config.detection.duplicate_window_ms, 15_000);
        assert!(config.auto_detect_enabled);
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");
        let config = Config {
            data_dir: Some(dir.path().join("data")),
            auto_detect_enabled: false,
            ..Config::default()
        };
        config.save_to(&path).unwrap();
        assert_eq!(Config::load_from(&path).unwrap(), config);
        assert_eq!(config.data_dir().unwrap(), dir.path().join("data"));
    }

    #[test]
    fn test_absurd_timings_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{ "detection": { "dwell_ms": 18446744073709551615 } }"#).unwrap();
        assert!(matches!(
            Config::load_from(&path),
            Err(kipper_types::Error::Config(ConfigError::ParseError(_)))
        ));

        let mut config = Config::default();
        config.detection.finalize_cooldown_ms = 90_000_000_000;
        assert!(config.save_to(&dir.path().join("other.json")).is_err());
    }

    #[test]
    fn test_invalid_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "not json").unwrap();
        assert!(matches!(
            Config::load_from(&path),
            Err(kipper_types::Error::Config(ConfigError::ParseError(_)))
        ));
    }
}
