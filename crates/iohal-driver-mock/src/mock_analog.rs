//! Simulated analog input device.
//!
//! Every channel returns a raw value that starts at the configured `Value` and can be changed
//! with [`MockAnalogDriver::set_raw`]. With `Calibrated = false` the channels are built
//! without a calibrator, so [`AnalogInputPin::measure`] fails until one is supplied.

use parking_lot::Mutex;
use std::sync::Arc;

use iohal_core::driver::{AnalogInputDriver, Driver, DriverFactory, DriverState, Lifecycle};
use iohal_core::parameter::{ConfigParameter, Configuration, ParameterValidator};
use iohal_core::{
    AnalogInputPin, Calibrator, CalibratorSlot, Capability, HalError, Measurement, Metadata, Pin,
    Result, Transport, TransportKind, ValidationFailures,
};
use tracing::{debug, info};

const CHANNELS_PARAM: &str = "Channels";
const VALUE_PARAM: &str = "Value";
const CALIBRATED_PARAM: &str = "Calibrated";

const DRIVER_TYPE: &str = "mock-analog";

// =============================================================================
// MockAnalogFactory - DriverFactory implementation
// =============================================================================

/// Validated configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MockAnalogConfig {
    /// Number of channels, `1..=16`.
    pub channels: usize,
    /// Initial raw value of every channel.
    pub value: i64,
    /// Whether channels start with an identity calibrator.
    pub calibrated: bool,
}

impl MockAnalogConfig {
    /// Validate and convert loosely typed configuration.
    pub fn from_config(
        config: &Configuration,
        declared: &[ConfigParameter],
    ) -> std::result::Result<Self, ValidationFailures> {
        let mut v = ParameterValidator::new(config, declared);
        let channels = v.integer(CHANNELS_PARAM, 1..=16);
        let value = v.integer(VALUE_PARAM, i64::from(i32::MIN)..=i64::from(i32::MAX));
        let calibrated = v.boolean(CALIBRATED_PARAM);
        let failures = v.finish();

        match (channels, value, calibrated) {
            (Some(channels), Some(value), Some(calibrated)) if failures.is_valid() => Ok(Self {
                channels: channels as usize,
                value,
                calibrated,
            }),
            _ => Err(failures),
        }
    }
}

/// Factory for `mock-analog` drivers.
pub struct MockAnalogFactory {
    metadata: Metadata,
    parameters: Vec<ConfigParameter>,
}

impl MockAnalogFactory {
    /// Create the factory.
    pub fn new() -> Self {
        Self {
            metadata: Metadata::new(
                DRIVER_TYPE,
                "Simulated analog inputs",
                &[Capability::AnalogInput],
            ),
            parameters: vec![
                ConfigParameter::integer(CHANNELS_PARAM, 0, 4),
                ConfigParameter::integer(VALUE_PARAM, 1, 0),
                ConfigParameter::boolean(CALIBRATED_PARAM, 2, true),
            ],
        }
    }
}

impl Default for MockAnalogFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl DriverFactory for MockAnalogFactory {
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
        MockAnalogConfig::from_config(config, &self.parameters).map(|_| ())
    }

    fn build(&self, config: &Configuration, _transport: Transport) -> Result<Box<dyn Driver>> {
        let cfg = MockAnalogConfig::from_config(config, &self.parameters)?;
        Ok(Box::new(MockAnalogDriver::new(self.metadata.clone(), cfg)))
    }
}

// =============================================================================
// MockAnalogDriver
// =============================================================================

/// Simulated analog input device.
pub struct MockAnalogDriver {
    metadata: Metadata,
    channels: Vec<MockAnalogChannel>,
    lifecycle: Arc<Lifecycle>,
}

impl MockAnalogDriver {
    /// Build the channels described by `config`.
    pub fn new(metadata: Metadata, config: MockAnalogConfig) -> Self {
        let lifecycle = Lifecycle::new(metadata.name());
        let channels = (0..config.channels)
            .map(|number| MockAnalogChannel {
                number,
                name: format!("A{number}"),
                raw: Mutex::new(config.value as f64),
                calibrator: CalibratorSlot::new(config.calibrated.then(Calibrator::identity)),
                lifecycle: Arc::clone(&lifecycle),
            })
            .collect();

        info!(
            driver = metadata.name(),
            channels = config.channels,
            calibrated = config.calibrated,
            "mock analog device created"
        );

        Self {
            metadata,
            channels,
            lifecycle,
        }
    }

    /// Change the raw value `channel` reports.
    pub fn set_raw(&self, channel: usize, value: f64) -> Result<()> {
        let pin = self
            .channels
            .get(channel)
            .ok_or_else(|| HalError::InvalidChannel {
                driver: self.metadata.name().to_string(),
                channel,
            })?;
        *pin.raw.lock() = value;
        Ok(())
    }
}

impl Driver for MockAnalogDriver {
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

    fn as_analog_input(&self) -> Option<&dyn AnalogInputDriver> {
        Some(self)
    }
}

impl AnalogInputDriver for MockAnalogDriver {
    fn analog_input_pins(&self) -> Vec<&dyn AnalogInputPin> {
        self.channels
            .iter()
            .map(|c| c as &dyn AnalogInputPin)
            .collect()
    }
}

// =============================================================================
// MockAnalogChannel
// =============================================================================

struct MockAnalogChannel {
    number: usize,
    name: String,
    raw: Mutex<f64>,
    calibrator: CalibratorSlot,
    lifecycle: Arc<Lifecycle>,
}

impl Pin for MockAnalogChannel {
    fn name(&self) -> &str {
        &self.name
    }

    fn number(&self) -> usize {
        self.number
    }
}

impl AnalogInputPin for MockAnalogChannel {
    fn read(&self) -> Result<f64> {
        self.lifecycle.ensure_open()?;
        Ok(*self.raw.lock())
    }

    fn calibrator(&self) -> Option<Arc<Calibrator>> {
        self.calibrator.get()
    }

    fn calibrate(&self, points: &[Measurement]) -> Result<()> {
        self.calibrator.replace(points)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_test::traced_test;

    #[test]
    fn test_factory_metadata() {
        let factory = MockAnalogFactory::new();
        assert_eq!(factory.driver_type(), "mock-analog");
        assert_eq!(factory.transport_kind(), TransportKind::None);
        assert_eq!(factory.metadata().capabilities(), &[Capability::AnalogInput]);
        let names: Vec<_> = factory.parameters().iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, ["Channels", "Value", "Calibrated"]);
    }

    #[test]
    fn test_factory_validate_config() {
        let factory = MockAnalogFactory::new();
        assert!(factory.validate(&factory.default_configuration()).is_ok());

        let config = toml::toml! {
            Channels = 2.0
            Value = "17"
            Calibrated = "false"
        };
        let cfg = MockAnalogConfig::from_config(&config, factory.parameters()).unwrap();
        assert_eq!(
            cfg,
            MockAnalogConfig {
                channels: 2,
                value: 17,
                calibrated: false
            }
        );
    }

    #[test]
    fn test_factory_reports_every_failure() {
        let factory = MockAnalogFactory::new();
        let config = toml::toml! {
            Channels = 0
            Calibrated = 3
            Colour = "red"
        };
        let failures = factory.validate(&config).unwrap_err();
        assert_eq!(failures.len(), 4);
        assert!(failures.get("Channels").is_some());
        assert!(failures.get("Value").is_some());
        assert!(failures.get("Calibrated").is_some());
        assert!(failures.get("Colour").is_some());
    }

    #[traced_test]
    #[test]
    fn test_build_logs_creation() {
        let factory = MockAnalogFactory::new();
        let driver = factory
            .build(&factory.default_configuration(), Transport::None)
            .unwrap();
        assert_eq!(driver.pins(Capability::AnalogInput).unwrap().len(), 4);
        assert!(logs_contain("mock analog device created"));
    }
}
