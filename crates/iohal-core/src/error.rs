//! Error types shared by every iohal driver.
//!
//! `HalError` is the single error type returned by factories, drivers and pins.
//! It is built with `thiserror` and splits into two families:
//!
//! - **Caller mistakes** - `Configuration`, `Calibration`, `NotCalibrated`,
//!   `UnsupportedCapability`, `InvalidChannel`, `OutOfRange`, `Closed`, `WrongTransport`.
//!   These are never retried.
//! - **Device/bus faults** - `Transport` and `ProtocolVerification`. Protocol drivers retry
//!   these a small fixed number of times at the lowest layer and then surface them unchanged.
//!
//! Transports report [`TransportError`], which converts into `HalError::Transport` via `?`.

use crate::capability::Capability;
use crate::parameter::ValidationFailures;
use std::time::Duration;
use thiserror::Error;

/// Convenience alias for results using the HAL error type.
pub type Result<T> = std::result::Result<T, HalError>;

/// Failure reported by a bus or network transport.
#[derive(Error, Debug)]
pub enum TransportError {
    /// The bus rejected or failed a transaction with the device at `address`.
    #[error("I2C bus error at address 0x{address:02x}: {message}")]
    Bus {
        /// 7-bit device address.
        address: u8,
        /// Description from the underlying bus implementation.
        message: String,
    },

    /// Socket or file I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The peer did not answer within the allowed time.
    #[error("transport timed out after {0:?}")]
    Timeout(Duration),

    /// The peer answered with data that could not be decoded.
    #[error("malformed response: {0}")]
    Protocol(String),
}

/// Primary error type for the hardware abstraction layer.
#[derive(Error, Debug)]
pub enum HalError {
    /// Configuration failed validation. Carries every failure, grouped by parameter.
    #[error("configuration error: {0}")]
    Configuration(ValidationFailures),

    /// The underlying bus or network call failed.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// The device answered, but not with what was written or expected.
    #[error("protocol verification failed for device 0x{address:02x}: {message}")]
    ProtocolVerification {
        /// Device address on its bus.
        address: u8,
        /// What did not match.
        message: String,
    },

    /// Degenerate calibration input.
    #[error("calibration error: {0}")]
    Calibration(String),

    /// `measure()` on a pin that has no calibrator attached.
    #[error("pin {pin} is not calibrated")]
    NotCalibrated {
        /// Name of the pin.
        pin: String,
    },

    /// The driver's metadata does not list the requested capability.
    #[error("unsupported capability: {0}")]
    UnsupportedCapability(Capability),

    /// Channel index outside the driver's pin set.
    #[error("{driver} does not have channel {channel}")]
    InvalidChannel {
        /// Driver name from its metadata.
        driver: String,
        /// Requested channel number.
        channel: usize,
    },

    /// A value handed to a pin is outside the accepted range.
    #[error("invalid value {value} for pin {pin}: value should be within {min} to {max}")]
    OutOfRange {
        /// Name of the pin.
        pin: String,
        /// Rejected value.
        value: f64,
        /// Inclusive lower bound.
        min: f64,
        /// Inclusive upper bound.
        max: f64,
    },

    /// The driver was closed; a new one must be built through its factory.
    #[error("driver {0} is closed")]
    Closed(String),

    /// A factory was handed a transport it cannot use.
    #[error("driver {driver} requires a {expected} transport")]
    WrongTransport {
        /// Driver type of the factory.
        driver: String,
        /// Transport kind the factory needs.
        expected: &'static str,
    },
}

impl HalError {
    /// Whether the failure may clear up when the whole operation is repeated.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            HalError::Transport(_) | HalError::ProtocolVerification { .. }
        )
    }

    /// Per-parameter failures, when this is a configuration error.
    pub fn validation_failures(&self) -> Option<&ValidationFailures> {
        match self {
            HalError::Configuration(failures) => Some(failures),
            _ => None,
        }
    }
}

impl From<ValidationFailures> for HalError {
    fn from(failures: ValidationFailures) -> Self {
        HalError::Configuration(failures)
    }
}
