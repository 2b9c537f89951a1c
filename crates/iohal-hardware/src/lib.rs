//! Device registry and hardware configuration for iohal.
//!
//! - [`DeviceRegistry`]: explicit factory registry; builds devices by id and looks them up
//! - [`HardwareConfig`]: TOML hardware file listing devices and their parameters
//! - [`TransportProvider`]: supplies buses and dialers to configuration-driven devices
//!
//! # Example
//!
//! ```rust,no_run
//! use iohal_hardware::{register_builtin_factories, DeviceRegistry, HardwareConfig, MockTransports};
//! use std::path::Path;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let registry = DeviceRegistry::new();
//! register_builtin_factories(&registry);
//!
//! let config = HardwareConfig::from_file(Path::new("hardware.toml"))?;
//! for failure in registry.create_from_config(&config, &MockTransports::new()) {
//!     eprintln!("{}: {}", failure.device_id, failure.error);
//! }
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod registry;
pub mod transport;

pub use config::{ConfigError, DeviceConfig, HardwareConfig};
pub use error::RegistryError;
pub use registry::{
    register_builtin_factories, DeviceInfo, DeviceRegistry, RegistrationFailure,
};
pub use transport::{MockTransports, TransportProvider};
