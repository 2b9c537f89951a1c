//! Device registry.
//!
//! Holds the factories an application supports and the devices built from them. Factories
//! are registered explicitly at startup, usually through [`register_builtin_factories`], so
//! there is no global state: tests and applications each own their registry.
//!
//! # Thread Safety
//!
//! DeviceRegistry is internally thread-safe using DashMap for both collections. Share it as
//! `Arc<DeviceRegistry>`; built devices are handed out as `Arc<dyn Driver>`.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::Serialize;
use std::sync::Arc;

use iohal_core::{
    Capability, Configuration, Driver, DriverFactory, DriverState, FactoryInfo, FactoryRegistry,
    Metadata, Transport,
};
use tracing::{debug, info, warn};

use crate::config::HardwareConfig;
use crate::error::RegistryError;
use crate::transport::TransportProvider;

type Result<T> = std::result::Result<T, RegistryError>;

/// A built device.
struct RegisteredDevice {
    driver_type: String,
    driver: Arc<dyn Driver>,
}

/// Summary of a registered device.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeviceInfo {
    /// Device id.
    pub id: String,
    /// Driver type that built it.
    pub driver_type: String,
    /// Driver metadata.
    pub metadata: Metadata,
    /// Lifecycle state.
    pub state: DriverState,
}

/// A device from a hardware file that could not be created.
#[derive(Debug)]
pub struct RegistrationFailure {
    /// Device id from the file.
    pub device_id: String,
    /// Driver type from the file.
    pub driver_type: String,
    /// Why it failed.
    pub error: RegistryError,
}

/// Factories and the devices built from them.
pub struct DeviceRegistry {
    factories: DashMap<String, Box<dyn DriverFactory>>,
    devices: DashMap<String, RegisteredDevice>,
}

impl DeviceRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            factories: DashMap::new(),
            devices: DashMap::new(),
        }
    }

    // =========================================================================
    // Factories
    // =========================================================================

    /// Register a factory, replacing and returning any previous one for its driver type.
    pub fn register_factory(
        &self,
        factory: Box<dyn DriverFactory>,
    ) -> Option<Box<dyn DriverFactory>> {
        let driver_type = factory.driver_type().to_string();
        info!(
            driver_type = %driver_type,
            name = factory.metadata().name(),
            capabilities = ?factory.metadata().capabilities(),
            "Registering driver factory"
        );
        self.factories.insert(driver_type, factory)
    }

    /// Remove the factory for `driver_type`. Devices it already built stay registered.
    pub fn unregister_factory(&self, driver_type: &str) -> Option<Box<dyn DriverFactory>> {
        self.factories
            .remove(driver_type)
            .map(|(_, factory)| factory)
    }

    /// Check if a factory is registered for a driver type.
    pub fn has_factory(&self, driver_type: &str) -> bool {
        self.factories.contains_key(driver_type)
    }

    /// Registered driver types, sorted.
    pub fn list_factories(&self) -> Vec<String> {
        let mut types: Vec<String> = self
            .factories
            .iter()
            .map(|entry| entry.key().clone())
            .collect();
        types.sort();
        types
    }

    /// Metadata, transport and parameters of one factory.
    pub fn factory_info(&self, driver_type: &str) -> Option<FactoryInfo> {
        self.factories
            .get(driver_type)
            .map(|entry| entry.value().info())
    }

    /// Info for every factory, sorted by driver type.
    pub fn list_factory_info(&self) -> Vec<FactoryInfo> {
        let mut infos: Vec<FactoryInfo> = self
            .factories
            .iter()
            .map(|entry| entry.value().info())
            .collect();
        infos.sort_by(|a, b| a.driver_type.cmp(&b.driver_type));
        infos
    }

    /// Validate `config` for `driver_type` without building anything.
    pub fn validate(&self, driver_type: &str, config: &Configuration) -> Result<()> {
        let factory = self.factory(driver_type)?;
        factory
            .validate(config)
            .map_err(|failures| RegistryError::InvalidConfiguration {
                driver: driver_type.to_string(),
                failures,
            })
    }

    fn factory(
        &self,
        driver_type: &str,
    ) -> Result<dashmap::mapref::one::Ref<'_, String, Box<dyn DriverFactory>>> {
        self.factories
            .get(driver_type)
            .ok_or_else(|| RegistryError::UnknownDriver {
                driver: driver_type.to_string(),
                available: self.list_factories(),
            })
    }

    // =========================================================================
    // Devices
    // =========================================================================

    /// Validate `config`, build a `driver_type` device over `transport` and register it as
    /// `id`.
    pub fn create_device(
        &self,
        id: &str,
        driver_type: &str,
        config: &Configuration,
        transport: Transport,
    ) -> Result<Arc<dyn Driver>> {
        if self.devices.contains_key(id) {
            return Err(RegistryError::DuplicateDevice(id.to_string()));
        }

        let driver: Arc<dyn Driver> = {
            let factory = self.factory(driver_type)?;
            factory
                .validate(config)
                .map_err(|failures| RegistryError::InvalidConfiguration {
                    driver: driver_type.to_string(),
                    failures,
                })?;

            info!(device_id = %id, driver_type = %driver_type, "Building device from factory");
            factory
                .build(config, transport)
                .map_err(|source| RegistryError::Device {
                    device: id.to_string(),
                    driver: driver_type.to_string(),
                    source,
                })?
                .into()
        };

        match self.devices.entry(id.to_string()) {
            Entry::Occupied(_) => {
                // Lost a race with another create_device for the same id.
                if let Err(err) = driver.close() {
                    warn!(device_id = %id, error = %err, "failed to close duplicate device");
                }
                Err(RegistryError::DuplicateDevice(id.to_string()))
            }
            Entry::Vacant(slot) => {
                slot.insert(RegisteredDevice {
                    driver_type: driver_type.to_string(),
                    driver: Arc::clone(&driver),
                });
                info!(device_id = %id, "Device registered successfully");
                Ok(driver)
            }
        }
    }

    /// Build every device in `config`, asking `transports` for what each factory needs.
    ///
    /// Devices that fail are skipped and returned; the rest stay registered.
    pub fn create_from_config(
        &self,
        config: &HardwareConfig,
        transports: &dyn TransportProvider,
    ) -> Vec<RegistrationFailure> {
        let mut failures = Vec::new();
        for device in &config.devices {
            let result = self
                .factory(&device.driver)
                .map(|factory| factory.transport_kind())
                .and_then(|kind| {
                    transports
                        .transport(kind, device)
                        .map_err(|source| RegistryError::Device {
                            device: device.id.clone(),
                            driver: device.driver.clone(),
                            source,
                        })
                })
                .and_then(|transport| {
                    self.create_device(&device.id, &device.driver, &device.config, transport)
                });

            if let Err(error) = result {
                warn!(device_id = %device.id, driver_type = %device.driver, error = %error, "device registration failed");
                failures.push(RegistrationFailure {
                    device_id: device.id.clone(),
                    driver_type: device.driver.clone(),
                    error,
                });
            }
        }

        info!(
            created = config.devices.len() - failures.len(),
            failed = failures.len(),
            "hardware file applied"
        );
        failures
    }

    /// Check every device in `config` against its factory without building anything.
    pub fn validate_config(&self, config: &HardwareConfig) -> Vec<RegistrationFailure> {
        config
            .devices
            .iter()
            .filter_map(|device| {
                self.validate(&device.driver, &device.config)
                    .err()
                    .map(|error| RegistrationFailure {
                        device_id: device.id.clone(),
                        driver_type: device.driver.clone(),
                        error,
                    })
            })
            .collect()
    }

    /// Device registered as `id`.
    pub fn device(&self, id: &str) -> Option<Arc<dyn Driver>> {
        self.devices
            .get(id)
            .map(|entry| Arc::clone(&entry.value().driver))
    }

    /// Whether a device is registered as `id`.
    pub fn contains(&self, id: &str) -> bool {
        self.devices.contains_key(id)
    }

    /// Number of registered devices.
    pub fn len(&self) -> usize {
        self.devices.len()
    }

    /// True when no device is registered.
    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    /// Every registered device, sorted by id.
    pub fn list_devices(&self) -> Vec<DeviceInfo> {
        let mut devices: Vec<DeviceInfo> = self
            .devices
            .iter()
            .map(|entry| {
                let device = entry.value();
                DeviceInfo {
                    id: entry.key().clone(),
                    driver_type: device.driver_type.clone(),
                    metadata: device.driver.metadata().clone(),
                    state: device.driver.state(),
                }
            })
            .collect();
        devices.sort_by(|a, b| a.id.cmp(&b.id));
        devices
    }

    /// Ids of devices whose metadata lists `capability`, sorted.
    pub fn devices_with_capability(&self, capability: Capability) -> Vec<String> {
        let mut ids: Vec<String> = self
            .devices
            .iter()
            .filter(|entry| entry.value().driver.metadata().has_capability(capability))
            .map(|entry| entry.key().clone())
            .collect();
        ids.sort();
        ids
    }

    /// Close and remove `id`. Returns false if no such device exists.
    ///
    /// The device is removed even when closing fails.
    pub fn remove_device(&self, id: &str) -> Result<bool> {
        let Some((_, device)) = self.devices.remove(id) else {
            return Ok(false);
        };
        debug!(device_id = %id, "removing device");
        device
            .driver
            .close()
            .map_err(|source| RegistryError::Device {
                device: id.to_string(),
                driver: device.driver_type.clone(),
                source,
            })?;
        Ok(true)
    }

    /// Close and remove every device, collecting failures.
    pub fn close_all(&self) -> Result<()> {
        let ids: Vec<String> = self
            .devices
            .iter()
            .map(|entry| entry.key().clone())
            .collect();
        let mut errors = Vec::new();

        for id in ids {
            if let Err(err) = self.remove_device(&id) {
                warn!(device_id = %id, error = %err, "close failed");
                errors.push(err);
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(RegistryError::CloseFailed(errors))
        }
    }
}

impl Default for DeviceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl FactoryRegistry for DeviceRegistry {
    fn register_factory(&self, factory: Box<dyn DriverFactory>) {
        DeviceRegistry::register_factory(self, factory);
    }
}

/// Register every factory shipped with iohal.
///
/// - Mock drivers (`mock-analog`, `mock-digital`)
/// - TI ADS1015 / ADS1115
/// - NXP PCA9685
/// - TP-Link HS103 / HS110
pub fn register_builtin_factories(registry: &DeviceRegistry) {
    iohal_driver_mock::register_all(registry);
    iohal_driver_ads1x15::register_all(registry);
    iohal_driver_pca9685::register_all(registry);
    iohal_driver_tplink::register_all(registry);
}

#[cfg(test)]
mod tests {
    use super::*;
    use iohal_driver_mock::MockAnalogFactory;
    use tracing_test::traced_test;

    #[traced_test]
    #[test]
    fn test_register_factory_logs_and_replaces() {
        let registry = DeviceRegistry::new();
        assert!(registry
            .register_factory(Box::new(MockAnalogFactory::new()))
            .is_none());
        assert!(logs_contain("Registering driver factory"));

        let previous = registry.register_factory(Box::new(MockAnalogFactory::new()));
        assert_eq!(previous.unwrap().driver_type(), "mock-analog");
        assert_eq!(registry.list_factories(), vec!["mock-analog"]);
    }

    #[test]
    fn test_builtin_factories() {
        let registry = DeviceRegistry::new();
        register_builtin_factories(&registry);
        assert_eq!(
            registry.list_factories(),
            vec![
                "ads1015",
                "ads1115",
                "mock-analog",
                "mock-digital",
                "pca9685",
                "tplink-hs103",
                "tplink-hs110"
            ]
        );
    }

    #[test]
    fn test_unknown_driver_lists_available() {
        let registry = DeviceRegistry::new();
        registry.register_factory(Box::new(MockAnalogFactory::new()));
        let err = registry
            .validate("ads9999", &Configuration::new())
            .unwrap_err();
        match err {
            RegistryError::UnknownDriver { driver, available } => {
                assert_eq!(driver, "ads9999");
                assert_eq!(available, vec!["mock-analog"]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[traced_test]
    #[test]
    fn test_failed_config_device_is_logged() {
        let registry = DeviceRegistry::new();
        let config = HardwareConfig {
            mock: true,
            devices: vec![crate::config::DeviceConfig {
                id: "x".into(),
                driver: "nope".into(),
                i2c_bus: 1,
                config: Configuration::new(),
            }],
        };
        let failures = registry.create_from_config(&config, &crate::MockTransports::new());
        assert_eq!(failures.len(), 1);
        assert!(logs_contain("device registration failed"));
    }
}
