//! `iohal-core`
//!
//! Capability-based hardware abstraction: every device is a [`Driver`] owning a fixed set of
//! pins, and every pin implements the capability traits matching what it can do.
//!
//! ## Layers
//!
//! - **Transports**: [`I2cBus`] for register-addressed chips, [`Dialer`] for network devices
//! - **Drivers and pins**: [`Driver`] plus the per-capability views ([`AnalogInputDriver`],
//!   [`PwmDriver`], ...) and pin traits ([`AnalogInputPin`], [`PwmPin`], ...)
//! - **Factories**: [`DriverFactory`] validates a [`Configuration`] and builds a driver
//!
//! ## Key Types
//!
//! - [`Capability`] / [`Metadata`]: what a driver can do
//! - [`ConfigParameter`] / [`ParameterValidator`]: declared configuration and its validation
//! - [`Calibrator`]: raw reading → physical units
//! - [`HalError`]: the error taxonomy shared by every driver
//!
//! ## Example
//!
//! ```rust,no_run
//! use iohal_core::{AnalogInputDriver, AnalogInputPin, Capability, Driver, Pin, Result};
//!
//! fn dump_analog(driver: &dyn Driver) -> Result<()> {
//!     let Some(adc) = driver.as_analog_input() else {
//!         return Ok(());
//!     };
//!     for pin in adc.analog_input_pins() {
//!         println!("{} = {}", pin.name(), pin.read()?);
//!     }
//!     assert!(driver.metadata().has_capability(Capability::AnalogInput));
//!     Ok(())
//! }
//! ```

pub mod bus;
pub mod calibration;
pub mod capability;
pub mod driver;
pub mod error;
pub mod network;
pub mod parameter;
pub mod pin;

pub use bus::{EmbeddedHalBus, I2cBus, MockBus};
pub use calibration::{Calibrator, Measurement};
pub use capability::{Capability, Metadata};
pub use driver::{
    AnalogInputDriver, DigitalInputDriver, DigitalOutputDriver, Driver, DriverFactory,
    DriverState, FactoryInfo, FactoryRegistry, Lifecycle, PwmDriver, Transport, TransportKind,
};
pub use error::{HalError, Result, TransportError};
pub use network::{Connection, Dialer, MockDialer, TcpDialer};
pub use parameter::{
    ConfigParameter, Configuration, ParameterType, ParameterValidator, ValidationFailures,
};
pub use pin::{AnalogInputPin, CalibratorSlot, DigitalInputPin, DigitalOutputPin, Pin, PwmPin};
