//! Hardware configuration files.
//!
//! A hardware file lists the devices an application uses, each with the driver type that
//! builds it and that driver's parameters:
//!
//! ```toml
//! [[devices]]
//! id = "soil"
//! driver = "ads1115"
//! i2c_bus = 1
//! [devices.config]
//! Address = 0x48
//! "Gain 1" = "1"
//!
//! [[devices]]
//! id = "lights"
//! driver = "pca9685"
//! [devices.config]
//! Frequency = 200
//! ```
//!
//! Files are loaded with figment; `IOHAL_`-prefixed environment variables override top-level
//! keys (for example `IOHAL_MOCK=true`).

use figment::providers::{Env, Format, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

use iohal_core::Configuration;

/// Environment variable prefix for overrides.
pub const ENV_PREFIX: &str = "IOHAL_";

/// Errors loading a hardware file.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// File not found.
    #[error("hardware file not found: {}", .0.display())]
    NotFound(PathBuf),

    /// Invalid TOML or wrong shape.
    #[error("failed to parse hardware file: {0}")]
    Parse(#[from] Box<figment::Error>),

    /// Two devices share an id.
    #[error("device id '{0}' is used more than once")]
    DuplicateDevice(String),

    /// A device has an empty id.
    #[error("device #{0} has an empty id")]
    EmptyId(usize),
}

/// Contents of a hardware file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HardwareConfig {
    /// Use in-memory transports instead of real buses and sockets.
    #[serde(default)]
    pub mock: bool,

    /// Devices to build, in file order.
    #[serde(default)]
    pub devices: Vec<DeviceConfig>,
}

/// One device entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// Unique device id.
    pub id: String,

    /// Driver type of the factory that builds it, e.g. `"ads1115"`.
    pub driver: String,

    /// I2C bus number (`/dev/i2c-N`). Ignored by non-I2C drivers.
    #[serde(default = "default_i2c_bus")]
    pub i2c_bus: u8,

    /// Driver parameters, validated by the factory.
    #[serde(default)]
    pub config: Configuration,
}

fn default_i2c_bus() -> u8 {
    1
}

impl HardwareConfig {
    /// Load `path`, apply environment overrides and check device ids.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }
        debug!(path = %path.display(), "loading hardware file");

        let config = Self::extract(Figment::new().merge(Toml::file(path)))?;
        info!(
            path = %path.display(),
            devices = config.devices.len(),
            mock = config.mock,
            "hardware file loaded"
        );
        Ok(config)
    }

    /// Parse TOML text, apply environment overrides and check device ids.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Self::extract(Figment::new().merge(Toml::string(text)))
    }

    fn extract(figment: Figment) -> Result<Self, ConfigError> {
        let config: Self = figment
            .merge(Env::prefixed(ENV_PREFIX))
            .extract()
            .map_err(Box::new)?;
        config.check_ids()?;
        Ok(config)
    }

    fn check_ids(&self) -> Result<(), ConfigError> {
        let mut seen = HashSet::new();
        for (index, device) in self.devices.iter().enumerate() {
            if device.id.trim().is_empty() {
                return Err(ConfigError::EmptyId(index));
            }
            if !seen.insert(device.id.as_str()) {
                return Err(ConfigError::DuplicateDevice(device.id.clone()));
            }
        }
        Ok(())
    }

    /// Device entry with `id`.
    pub fn device(&self, id: &str) -> Option<&DeviceConfig> {
        self.devices.iter().find(|d| d.id == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_devices_with_defaults() {
        let config = HardwareConfig::from_toml_str(
            r#"
            [[devices]]
            id = "soil"
            driver = "ads1115"
            [devices.config]
            Address = 72
            "Gain 1" = "1"

            [[devices]]
            id = "pump"
            driver = "tplink-hs103"
            i2c_bus = 0
            "#,
        )
        .unwrap();

        assert!(!config.mock);
        assert_eq!(config.devices.len(), 2);
        let soil = config.device("soil").unwrap();
        assert_eq!(soil.driver, "ads1115");
        assert_eq!(soil.i2c_bus, 1);
        assert_eq!(soil.config["Address"].as_integer(), Some(72));
        assert!(config.device("pump").unwrap().config.is_empty());
        assert!(config.device("missing").is_none());
    }

    #[test]
    fn test_empty_file_has_no_devices() {
        let config = HardwareConfig::from_toml_str("").unwrap();
        assert!(config.devices.is_empty());
    }

    #[test]
    fn test_duplicate_ids_rejected() {
        let err = HardwareConfig::from_toml_str(
            r#"
            [[devices]]
            id = "a"
            driver = "mock-analog"
            [[devices]]
            id = "a"
            driver = "mock-digital"
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::DuplicateDevice(id) if id == "a"));
    }

    #[test]
    fn test_empty_id_rejected() {
        let err = HardwareConfig::from_toml_str(
            r#"
            [[devices]]
            id = " "
            driver = "mock-analog"
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::EmptyId(0)));
    }

    #[test]
    fn test_missing_driver_is_parse_error() {
        let err = HardwareConfig::from_toml_str(
            r#"
            [[devices]]
            id = "a"
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }
}
