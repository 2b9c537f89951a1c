//! Simulated digital I/O device.
//!
//! Each channel is a loopback: reading returns the last level written, or the level injected
//! with [`MockDigitalDriver::set_input`].

use parking_lot::Mutex;
use std::sync::Arc;

use iohal_core::driver::{
    DigitalInputDriver, DigitalOutputDriver, Driver, DriverFactory, DriverState, Lifecycle,
};
use iohal_core::parameter::{ConfigParameter, Configuration, ParameterValidator};
use iohal_core::{
    Capability, DigitalInputPin, DigitalOutputPin, HalError, Metadata, Pin, Result, Transport,
    TransportKind, ValidationFailures,
};
use tracing::{debug, info};

const CHANNELS_PARAM: &str = "Channels";

const DRIVER_TYPE: &str = "mock-digital";

// =============================================================================
// MockDigitalFactory - DriverFactory implementation
// =============================================================================

/// Validated configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MockDigitalConfig {
    /// Number of channels, `1..=32`.
    pub channels: usize,
}

impl MockDigitalConfig {
    /// Validate and convert loosely typed configuration.
    pub fn from_config(
        config: &Configuration,
        declared: &[ConfigParameter],
    ) -> std::result::Result<Self, ValidationFailures> {
        let mut v = ParameterValidator::new(config, declared);
        let channels = v.integer(CHANNELS_PARAM, 1..=32);
        let failures = v.finish();

        match channels {
            Some(channels) if failures.is_valid() => Ok(Self {
                channels: channels as usize,
            }),
            _ => Err(failures),
        }
    }
}

/// Factory for `mock-digital` drivers.
pub struct MockDigitalFactory {
    metadata: Metadata,
    parameters: Vec<ConfigParameter>,
}

impl MockDigitalFactory {
    /// Create the factory.
    pub fn new() -> Self {
        Self {
            metadata: Metadata::new(
                DRIVER_TYPE,
                "Simulated digital inputs and outputs",
                &[Capability::DigitalInput, Capability::DigitalOutput],
            ),
            parameters: vec![ConfigParameter::integer(CHANNELS_PARAM, 0, 8)],
        }
    }
}

impl Default for MockDigitalFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl DriverFactory for MockDigitalFactory {
    fn driver_type(&self) -> &'static str {
        DRIVER_TYPE
    }

    fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    fn parameters(&self) -> &[ConfigParameter] {
        &self.parameters
    }

    fn transport_kind(&self) -> TransportKind {
        TransportKind::None
    }

    fn validate(&self, config: &Configuration) -> std::result::Result<(), ValidationFailures> {
        MockDigitalConfig::from_config(config, &self.parameters).map(|_| ())
    }

    fn build(&self, config: &Configuration, _transport: Transport) -> Result<Box<dyn Driver>> {
        let cfg = MockDigitalConfig::from_config(config, &self.parameters)?;
        Ok(Box::new(MockDigitalDriver::new(self.metadata.clone(), cfg)))
    }
}

// =============================================================================
// MockDigitalDriver
// =============================================================================

/// Simulated digital I/O device.
pub struct MockDigitalDriver {
    metadata: Metadata,
    channels: Vec<MockDigitalChannel>,
    lifecycle: Arc<Lifecycle>,
}

impl MockDigitalDriver {
    /// Build `config.channels` low channels.
    pub fn new(metadata: Metadata, config: MockDigitalConfig) -> Self {
        let lifecycle = Lifecycle::new(metadata.name());
        let channels = (0..config.channels)
            .map(|number| MockDigitalChannel {
                number,
                name: format!("D{number}"),
                level: Mutex::new(false),
                lifecycle: Arc::clone(&lifecycle),
            })
            .collect();

        info!(
            driver = metadata.name(),
            channels = config.channels,
            "mock digital device created"
        );

        Self {
            metadata,
            channels,
            lifecycle,
        }
    }

    /// Drive `channel` from outside, as a connected signal would.
    pub fn set_input(&self, channel: usize, level: bool) -> Result<()> {
        let pin = self
            .channels
            .get(channel)
            .ok_or_else(|| HalError::InvalidChannel {
                driver: self.metadata.name().to_string(),
                channel,
            })?;
        *pin.level.lock() = level;
        Ok(())
    }
}

impl Driver for MockDigitalDriver {
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

    fn close(&self) -> Result<()> {
        if self.lifecycle.begin_close() {
            debug!(driver = self.metadata.name(), "closed");
        }
        Ok(())
    }

    fn as_digital_input(&self) -> Option<&dyn DigitalInputDriver> {
        Some(self)
    }

    fn as_digital_output(&self) -> Option<&dyn DigitalOutputDriver> {
        Some(self)
    }
}

impl DigitalInputDriver for MockDigitalDriver {
    fn digital_input_pins(&self) -> Vec<&dyn DigitalInputPin> {
        self.channels
            .iter()
            .map(|c| c as &dyn DigitalInputPin)
            .collect()
    }
}

impl DigitalOutputDriver for MockDigitalDriver {
    fn digital_output_pins(&self) -> Vec<&dyn DigitalOutputPin> {
        self.channels
            .iter()
            .map(|c| c as &dyn DigitalOutputPin)
            .collect()
    }
}

// =============================================================================
// MockDigitalChannel
// =============================================================================

struct MockDigitalChannel {
    number: usize,
    name: String,
    level: Mutex<bool>,
    lifecycle: Arc<Lifecycle>,
}

impl Pin for MockDigitalChannel {
    fn name(&self) -> &str {
        &self.name
    }

    fn number(&self) -> usize {
        self.number
    }
}

impl DigitalInputPin for MockDigitalChannel {
    fn read(&self) -> Result<bool> {
        self.lifecycle.ensure_open()?;
        Ok(*self.level.lock())
    }
}

impl DigitalOutputPin for MockDigitalChannel {
    fn write(&self, state: bool) -> Result<()> {
        self.lifecycle.ensure_open()?;
        *self.level.lock() = state;
        Ok(())
    }

    fn last_state(&self) -> bool {
        *self.level.lock()
    }
}
