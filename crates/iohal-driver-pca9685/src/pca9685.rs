//! PCA9685 factory, driver and channels.
//!
//! Every channel is both a [`PwmPin`] (duty cycle in percent) and a [`DigitalOutputPin`]
//! (`true` is 100 %, `false` is 0 %). A duty cycle maps to the off count
//! `round(value * 40.95)` with the on count fixed at 0, so 0 % and 100 % land on the
//! dedicated full-off / full-on encodings.

use parking_lot::Mutex;
use std::sync::Arc;

use iohal_core::driver::{
    DigitalOutputDriver, Driver, DriverFactory, DriverState, Lifecycle, PwmDriver,
};
use iohal_core::parameter::{ConfigParameter, Configuration, ParameterValidator};
use iohal_core::pin::check_duty_cycle;
use iohal_core::{
    Capability, DigitalOutputPin, Metadata, Pin, PwmPin, Result, Transport, TransportKind,
    ValidationFailures,
};
use tracing::{info, instrument, warn};

use crate::device::{Pca9685, CHANNELS, MAX_COUNT};

const ADDRESS_PARAM: &str = "Address";
const FREQUENCY_PARAM: &str = "Frequency";

/// Convert a duty cycle in `[0, 100]` to an off count.
pub fn duty_to_count(value: f64) -> u16 {
    let count = (value * f64::from(MAX_COUNT) / 100.0).round();
    count.clamp(0.0, f64::from(MAX_COUNT)) as u16
}

// =============================================================================
// Pca9685Factory - DriverFactory implementation
// =============================================================================

/// Validated configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pca9685Config {
    /// 7-bit I2C address.
    pub address: u8,
    /// Output frequency in Hz.
    pub frequency: u32,
}

impl Pca9685Config {
    /// Validate and convert loosely typed configuration.
    pub fn from_config(
        config: &Configuration,
        declared: &[ConfigParameter],
    ) -> std::result::Result<Self, ValidationFailures> {
        let mut v = ParameterValidator::new(config, declared);
        let address = v.integer(ADDRESS_PARAM, 1..=255);
        let frequency = v.integer(FREQUENCY_PARAM, 1..=1500);
        let failures = v.finish();

        match (address, frequency) {
            (Some(address), Some(frequency)) if failures.is_valid() => Ok(Self {
                address: address as u8,
                frequency: frequency as u32,
            }),
            _ => Err(failures),
        }
    }
}

/// Factory for PCA9685 drivers.
pub struct Pca9685Factory {
    metadata: Metadata,
    parameters: Vec<ConfigParameter>,
}

impl Pca9685Factory {
    /// Create the factory.
    pub fn new() -> Self {
        Self {
            metadata: Metadata::new(
                "pca9685",
                "Supports one PCA9685 chip",
                &[Capability::Pwm, Capability::DigitalOutput],
            ),
            parameters: vec![
                ConfigParameter::integer(ADDRESS_PARAM, 0, 0x40),
                ConfigParameter::integer(FREQUENCY_PARAM, 1, 150),
            ],
        }
    }
}

impl Default for Pca9685Factory {
    fn default() -> Self {
        Self::new()
    }
}

impl DriverFactory for Pca9685Factory {
    fn driver_type(&self) -> &'static str {
        "pca9685"
    }

    fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    fn parameters(&self) -> &[ConfigParameter] {
        &self.parameters
    }

    fn transport_kind(&self) -> TransportKind {
        TransportKind::I2c
    }

    fn validate(&self, config: &Configuration) -> std::result::Result<(), ValidationFailures> {
        Pca9685Config::from_config(config, &self.parameters).map(|_| ())
    }

    fn build(&self, config: &Configuration, transport: Transport) -> Result<Box<dyn Driver>> {
        let cfg = Pca9685Config::from_config(config, &self.parameters)?;
        let bus = transport.into_i2c(self.driver_type())?;
        let device = Pca9685::new(bus, cfg.address, cfg.frequency);
        let driver = Pca9685Driver::new(self.metadata.clone(), device)?;
        Ok(Box::new(driver))
    }
}

// =============================================================================
// Pca9685Driver
// =============================================================================

/// Constructed PCA9685 with its sixteen channels.
pub struct Pca9685Driver {
    metadata: Metadata,
    device: Arc<Pca9685>,
    channels: Vec<Pca9685Channel>,
    lifecycle: Arc<Lifecycle>,
}

impl Pca9685Driver {
    /// Wake the chip and create its channels.
    pub fn new(metadata: Metadata, device: Pca9685) -> Result<Self> {
        device.wake()?;

        let device = Arc::new(device);
        let lifecycle = Lifecycle::new(metadata.name());
        let channels = (0..CHANNELS)
            .map(|number| Pca9685Channel {
                device: Arc::clone(&device),
                number,
                name: number.to_string(),
                value: Mutex::new(0.0),
                lifecycle: Arc::clone(&lifecycle),
            })
            .collect();

        info!(
            address = device.address(),
            frequency = device.frequency(),
            "PCA9685 initialized"
        );

        Ok(Self {
            metadata,
            device,
            channels,
            lifecycle,
        })
    }

    /// Register-level chip handle.
    pub fn device(&self) -> &Pca9685 {
        &self.device
    }
}

impl Driver for Pca9685Driver {
    fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    fn pins(&self, capability: Capability) -> Result<Vec<&dyn Pin>> {
        self.metadata.require(capability)?;
        Ok(self.channels.iter().map(|c| c as &dyn Pin).collect())
    }

    fn state(&self) -> DriverState {
        self.lifecycle.state()
    }

    /// Force every output off, then put the chip to sleep.
    #[instrument(skip(self), fields(address = self.device.address()))]
    fn close(&self) -> Result<()> {
        if !self.lifecycle.begin_close() {
            return Ok(());
        }
        if let Err(e) = self.device.all_off() {
            warn!(error = %e, "not every PCA9685 output could be turned off");
        }
        if let Err(e) = self.device.sleep() {
            warn!(error = %e, "failed to put PCA9685 to sleep");
        }
        info!("PCA9685 closed");
        Ok(())
    }

    fn as_digital_output(&self) -> Option<&dyn DigitalOutputDriver> {
        Some(self)
    }

    fn as_pwm(&self) -> Option<&dyn PwmDriver> {
        Some(self)
    }
}

impl PwmDriver for Pca9685Driver {
    fn pwm_pins(&self) -> Vec<&dyn PwmPin> {
        self.channels.iter().map(|c| c as &dyn PwmPin).collect()
    }
}

impl DigitalOutputDriver for Pca9685Driver {
    fn digital_output_pins(&self) -> Vec<&dyn DigitalOutputPin> {
        self.channels
            .iter()
            .map(|c| c as &dyn DigitalOutputPin)
            .collect()
    }
}

// =============================================================================
// Pca9685Channel
// =============================================================================

/// One PWM output.
pub struct Pca9685Channel {
    device: Arc<Pca9685>,
    number: usize,
    name: String,
    value: Mutex<f64>,
    lifecycle: Arc<Lifecycle>,
}

impl Pin for Pca9685Channel {
    fn name(&self) -> &str {
        &self.name
    }

    fn number(&self) -> usize {
        self.number
    }
}

impl DigitalOutputPin for Pca9685Channel {
    fn write(&self, state: bool) -> Result<()> {
        self.set(if state { 100.0 } else { 0.0 })
    }

    fn last_state(&self) -> bool {
        *self.value.lock() == 100.0
    }
}

impl PwmPin for Pca9685Channel {
    fn set(&self, value: f64) -> Result<()> {
        self.lifecycle.ensure_open()?;
        check_duty_cycle(&self.name, value)?;

        // Held across the write so the stored value matches the chip.
        let mut current = self.value.lock();
        self.device.set_pwm(self.number, 0, duty_to_count(value))?;
        *current = value;
        Ok(())
    }

    fn value(&self) -> f64 {
        *self.value.lock()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duty_to_count() {
        assert_eq!(duty_to_count(0.0), 0);
        assert_eq!(duty_to_count(50.0), 2048);
        assert_eq!(duty_to_count(100.0), 4095);
        assert_eq!(duty_to_count(0.01), 0);
        assert_eq!(duty_to_count(99.99), 4095);
    }

    #[test]
    fn test_factory_driver_type() {
        let factory = Pca9685Factory::new();
        assert_eq!(factory.driver_type(), "pca9685");
        assert_eq!(factory.transport_kind(), TransportKind::I2c);
    }

    #[test]
    fn test_factory_capabilities() {
        let factory = Pca9685Factory::new();
        let meta = factory.metadata();
        assert!(meta.has_capability(Capability::Pwm));
        assert!(meta.has_capability(Capability::DigitalOutput));
        assert!(!meta.has_capability(Capability::AnalogInput));
    }

    #[test]
    fn test_factory_validate_config() {
        let factory = Pca9685Factory::new();

        let valid = toml::toml! {
            Address = 64.0
            Frequency = "200"
        };
        assert!(factory.validate(&valid).is_ok());

        let invalid = toml::toml! {
            Address = 64
            Frequency = 1501
        };
        let failures = factory.validate(&invalid).unwrap_err();
        assert_eq!(
            failures.get("Frequency").unwrap(),
            &["Frequency is out of range (1 - 1500). 1501 was received.".to_string()]
        );
        assert!(failures.get("Address").is_none());

        let missing = toml::toml! { Frequency = 150 };
        let failures = factory.validate(&missing).unwrap_err();
        assert_eq!(failures.len(), 1);
        assert!(failures.get("Address").is_some());
    }

    #[test]
    fn test_default_configuration_validates() {
        let factory = Pca9685Factory::new();
        assert!(factory.validate(&factory.default_configuration()).is_ok());
    }
}
