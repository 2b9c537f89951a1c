//! Driver and factory contracts.
//!
//! A [`Driver`] owns a fixed set of pins and exposes them filtered by [`Capability`]. Drivers
//! are built by a [`DriverFactory`], which validates configuration, takes the transport it
//! needs and returns a ready driver.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                 DeviceRegistry (iohal-hardware)              │
//! │  register_factory(Ads1x15Factory::ads1115())                 │
//! │  register_factory(Pca9685Factory::new())                     │
//! └──────────────────────────────────────────────────────────────┘
//!                               │ validate(config) / build(config, transport)
//!                               ▼
//! ┌──────────────────────────────────────────────────────────────┐
//! │                 Box<dyn Driver>                              │
//! │  pins(Capability::Pwm) / as_pwm()?.pwm_pin(3)?.set(50.0)     │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Lifecycle
//!
//! A driver is `Ready` once `build` returns and `Closed` after the first `close()`. Closing
//! again is a no-op. Every pin operation on a closed driver fails with
//! [`HalError::Closed`].

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::bus::I2cBus;
use crate::capability::{Capability, Metadata};
use crate::error::{HalError, Result};
use crate::network::Dialer;
use crate::parameter::{default_configuration, ConfigParameter, Configuration, ValidationFailures};
use crate::pin::{AnalogInputPin, DigitalInputPin, DigitalOutputPin, Pin, PwmPin};

// =============================================================================
// Driver
// =============================================================================

/// Observable driver state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DriverState {
    /// Built and usable.
    Ready,
    /// Closed; the transport has been released.
    Closed,
}

/// A constructed device.
pub trait Driver: Send + Sync {
    /// Static description and capability set.
    fn metadata(&self) -> &Metadata;

    /// All pins supporting `capability`.
    ///
    /// Fails with [`HalError::UnsupportedCapability`] if the metadata does not list it.
    fn pins(&self, capability: Capability) -> Result<Vec<&dyn Pin>>;

    /// Current lifecycle state.
    fn state(&self) -> DriverState;

    /// Release the transport. Idempotent.
    fn close(&self) -> Result<()>;

    /// Analog input view, if supported.
    fn as_analog_input(&self) -> Option<&dyn AnalogInputDriver> {
        None
    }

    /// Digital input view, if supported.
    fn as_digital_input(&self) -> Option<&dyn DigitalInputDriver> {
        None
    }

    /// Digital output view, if supported.
    fn as_digital_output(&self) -> Option<&dyn DigitalOutputDriver> {
        None
    }

    /// PWM view, if supported.
    fn as_pwm(&self) -> Option<&dyn PwmDriver> {
        None
    }
}

fn find_pin<'a, P: Pin + ?Sized>(
    driver: &Metadata,
    pins: Vec<&'a P>,
    number: usize,
) -> Result<&'a P> {
    pins.into_iter()
        .find(|p| p.number() == number)
        .ok_or_else(|| HalError::InvalidChannel {
            driver: driver.name().to_string(),
            channel: number,
        })
}

/// Driver with analog inputs.
pub trait AnalogInputDriver: Driver {
    /// Every analog input pin.
    fn analog_input_pins(&self) -> Vec<&dyn AnalogInputPin>;

    /// Analog input pin `number`, or [`HalError::InvalidChannel`].
    fn analog_input_pin(&self, number: usize) -> Result<&dyn AnalogInputPin> {
        find_pin(self.metadata(), self.analog_input_pins(), number)
    }
}

/// Driver with digital inputs.
pub trait DigitalInputDriver: Driver {
    /// Every digital input pin.
    fn digital_input_pins(&self) -> Vec<&dyn DigitalInputPin>;

    /// Digital input pin `number`, or [`HalError::InvalidChannel`].
    fn digital_input_pin(&self, number: usize) -> Result<&dyn DigitalInputPin> {
        find_pin(self.metadata(), self.digital_input_pins(), number)
    }
}

/// Driver with digital outputs.
pub trait DigitalOutputDriver: Driver {
    /// Every digital output pin.
    fn digital_output_pins(&self) -> Vec<&dyn DigitalOutputPin>;

    /// Digital output pin `number`, or [`HalError::InvalidChannel`].
    fn digital_output_pin(&self, number: usize) -> Result<&dyn DigitalOutputPin> {
        find_pin(self.metadata(), self.digital_output_pins(), number)
    }
}

/// Driver with PWM outputs.
pub trait PwmDriver: Driver {
    /// Every PWM pin.
    fn pwm_pins(&self) -> Vec<&dyn PwmPin>;

    /// PWM pin `number`, or [`HalError::InvalidChannel`].
    fn pwm_pin(&self, number: usize) -> Result<&dyn PwmPin> {
        find_pin(self.metadata(), self.pwm_pins(), number)
    }
}

/// Open/closed flag shared by a driver and its pins.
#[derive(Debug)]
pub struct Lifecycle {
    driver: String,
    closed: AtomicBool,
}

impl Lifecycle {
    /// Ready lifecycle for the driver named `driver`.
    pub fn new(driver: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            driver: driver.into(),
            closed: AtomicBool::new(false),
        })
    }

    /// Current state.
    pub fn state(&self) -> DriverState {
        if self.closed.load(Ordering::Acquire) {
            DriverState::Closed
        } else {
            DriverState::Ready
        }
    }

    /// Fail with [`HalError::Closed`] once closed.
    pub fn ensure_open(&self) -> Result<()> {
        match self.state() {
            DriverState::Ready => Ok(()),
            DriverState::Closed => Err(HalError::Closed(self.driver.clone())),
        }
    }

    /// Mark closed. Returns `true` only for the call that performed the transition.
    pub fn begin_close(&self) -> bool {
        !self.closed.swap(true, Ordering::AcqRel)
    }
}

// =============================================================================
// Transport
// =============================================================================

/// Kind of transport a factory consumes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportKind {
    /// Register-addressed I2C bus.
    I2c,
    /// Stream connections to a network address.
    Network,
    /// Nothing external (simulated devices).
    None,
}

impl TransportKind {
    /// Lowercase label.
    pub fn name(&self) -> &'static str {
        match self {
            TransportKind::I2c => "i2c",
            TransportKind::Network => "network",
            TransportKind::None => "none",
        }
    }
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Transport handed to [`DriverFactory::build`].
#[derive(Clone)]
pub enum Transport {
    /// Shared I2C bus.
    I2c(Arc<dyn I2cBus>),
    /// Network dialer.
    Network(Arc<dyn Dialer>),
    /// No transport.
    None,
}

impl Transport {
    /// Kind of this transport.
    pub fn kind(&self) -> TransportKind {
        match self {
            Transport::I2c(_) => TransportKind::I2c,
            Transport::Network(_) => TransportKind::Network,
            Transport::None => TransportKind::None,
        }
    }

    /// The I2C bus, or [`HalError::WrongTransport`].
    pub fn into_i2c(self, driver: &str) -> Result<Arc<dyn I2cBus>> {
        match self {
            Transport::I2c(bus) => Ok(bus),
            _ => Err(HalError::WrongTransport {
                driver: driver.to_string(),
                expected: TransportKind::I2c.name(),
            }),
        }
    }

    /// The dialer, or [`HalError::WrongTransport`].
    pub fn into_network(self, driver: &str) -> Result<Arc<dyn Dialer>> {
        match self {
            Transport::Network(dialer) => Ok(dialer),
            _ => Err(HalError::WrongTransport {
                driver: driver.to_string(),
                expected: TransportKind::Network.name(),
            }),
        }
    }
}

impl fmt::Debug for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Transport::{}", self.kind())
    }
}

// =============================================================================
// Factory
// =============================================================================

/// Builds drivers of one type.
///
/// Factories are plain values registered with a registry at startup. Static information
/// (`driver_type`, `metadata`, `parameters`) never depends on a built driver.
pub trait DriverFactory: Send + Sync + 'static {
    /// Unique identifier used in configuration files, e.g. `"ads1115"`.
    fn driver_type(&self) -> &'static str;

    /// Name, description and capabilities of the drivers this factory builds.
    fn metadata(&self) -> &Metadata;

    /// Accepted configuration keys in display order.
    fn parameters(&self) -> &[ConfigParameter];

    /// Transport [`build`](Self::build) expects.
    fn transport_kind(&self) -> TransportKind;

    /// Check `config` without touching hardware. Reports every failure at once.
    fn validate(&self, config: &Configuration) -> std::result::Result<(), ValidationFailures>;

    /// Validate `config`, initialize the device over `transport` and return a ready driver.
    ///
    /// Invalid configuration fails with [`HalError::Configuration`] before any I/O.
    fn build(&self, config: &Configuration, transport: Transport) -> Result<Box<dyn Driver>>;

    /// Configuration holding every parameter's default.
    fn default_configuration(&self) -> Configuration {
        default_configuration(self.parameters())
    }

    /// Serializable summary for listings.
    fn info(&self) -> FactoryInfo {
        FactoryInfo {
            driver_type: self.driver_type().to_string(),
            metadata: self.metadata().clone(),
            transport: self.transport_kind(),
            parameters: self.parameters().to_vec(),
        }
    }
}

/// Anything that accepts factories.
///
/// Each driver crate exposes `register_all(&impl FactoryRegistry)` so applications can pick
/// driver families without naming every factory.
pub trait FactoryRegistry {
    /// Register one factory.
    fn register_factory(&self, factory: Box<dyn DriverFactory>);
}

/// Factory summary.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FactoryInfo {
    /// Driver type identifier.
    pub driver_type: String,
    /// Metadata of built drivers.
    pub metadata: Metadata,
    /// Required transport.
    pub transport: TransportKind,
    /// Accepted parameters.
    pub parameters: Vec<ConfigParameter>,
}
