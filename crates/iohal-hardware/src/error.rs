//! Registry errors.

use thiserror::Error;

use iohal_core::{HalError, ValidationFailures};

use crate::config::ConfigError;

/// Errors raised by [`DeviceRegistry`](crate::DeviceRegistry).
#[derive(Debug, Error)]
pub enum RegistryError {
    /// A device with this id already exists.
    #[error("device '{0}' is already registered")]
    DuplicateDevice(String),

    /// No factory handles this driver type.
    #[error("no factory registered for driver type '{driver}'. Available factories: {available:?}")]
    UnknownDriver {
        /// Requested driver type.
        driver: String,
        /// Registered driver types.
        available: Vec<String>,
    },

    /// No device with this id.
    #[error("device '{0}' is not registered")]
    UnknownDevice(String),

    /// Configuration rejected by the factory.
    #[error("invalid configuration for {driver}: {failures}")]
    InvalidConfiguration {
        /// Driver type.
        driver: String,
        /// Every failure, by parameter.
        failures: ValidationFailures,
    },

    /// The driver failed to build or close.
    #[error("device '{device}' ({driver}): {source}")]
    Device {
        /// Device id.
        device: String,
        /// Driver type.
        driver: String,
        /// Underlying failure.
        #[source]
        source: HalError,
    },

    /// Some devices failed to close.
    #[error("{} device(s) failed to close", .0.len())]
    CloseFailed(Vec<RegistryError>),

    /// Hardware file could not be loaded.
    #[error(transparent)]
    Config(#[from] ConfigError),
}
