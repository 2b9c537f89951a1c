//! TI ADS1015 / ADS1115 four-channel ADC.
//!
//! Each read is a single-shot conversion:
//!
//! 1. write the 16-bit config word (start, mux, gain, single-shot, 1600 SPS, comparator off)
//!    to the config register
//! 2. wait for the variant's conversion time
//! 3. read the config register back; it must echo what was written
//! 4. read the conversion register as a big-endian two's-complement `i16` and shift right
//!    arithmetically by the variant's resolution shift
//!
//! Another master can clobber the config register between steps 1 and 3, so the whole
//! sequence is attempted up to [`CONVERSION_ATTEMPTS`] times.
//!
//! # Concurrency
//!
//! The chip has one config register shared by all four inputs. Channels of one driver hold
//! a per-device lock for the whole sequence, so they may be read from several threads.
//! Nothing serializes two *drivers* built for the same address, or other processes on the
//! bus: callers must ensure each address has a single driver, or provide their own mutual
//! exclusion per address.
//!
//! # Example
//!
//! ```rust,ignore
//! use iohal_driver_ads1x15::Ads1x15Factory;
//!
//! registry.register_factory(Box::new(Ads1x15Factory::ads1115()));
//! ```

use parking_lot::Mutex;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use iohal_core::driver::{AnalogInputDriver, Driver, DriverFactory, DriverState, Lifecycle};
use iohal_core::parameter::{ConfigParameter, Configuration, ParameterValidator};
use iohal_core::{
    AnalogInputPin, Calibrator, CalibratorSlot, Capability, HalError, I2cBus, Measurement,
    Metadata, Pin, Result, Transport, TransportKind, ValidationFailures,
};
use tracing::{debug, info, instrument, warn};

/// Conversion register (read-only result).
pub const REG_CONVERSION: u8 = 0x00;
/// Config register.
pub const REG_CONFIG: u8 = 0x01;

/// Full conversion sequences attempted per read.
pub const CONVERSION_ATTEMPTS: usize = 4;

const CONFIG_OS_SINGLE: u16 = 0x8000;
const CONFIG_MODE_SINGLE: u16 = 0x0100;
const CONFIG_DATA_RATE_1600: u16 = 0x0080;
const CONFIG_COMPARATOR_QUEUE_NONE: u16 = 0x0003;

/// Single-ended mux selection for AIN0..AIN3.
const CHANNEL_MUX: [u16; 4] = [0x4000, 0x5000, 0x6000, 0x7000];

const ADDRESS_PARAM: &str = "Address";
const GAIN_PARAMS: [&str; 4] = ["Gain 1", "Gain 2", "Gain 3", "Gain 4"];

// =============================================================================
// Variant and gain
// =============================================================================

/// Chip variant. Determines resolution and conversion time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ads1x15Variant {
    /// 12-bit, result left-aligned in the 16-bit register.
    Ads1015,
    /// 16-bit.
    Ads1115,
}

impl Ads1x15Variant {
    /// Arithmetic right shift applied to the conversion register.
    pub fn shift(&self) -> u32 {
        match self {
            Ads1x15Variant::Ads1015 => 4,
            Ads1x15Variant::Ads1115 => 0,
        }
    }

    /// Wait between starting a conversion and reading it back.
    pub fn conversion_delay(&self) -> Duration {
        match self {
            Ads1x15Variant::Ads1015 => Duration::from_millis(1),
            Ads1x15Variant::Ads1115 => Duration::from_millis(9),
        }
    }

    fn driver_type(&self) -> &'static str {
        match self {
            Ads1x15Variant::Ads1015 => "ads1015",
            Ads1x15Variant::Ads1115 => "ads1115",
        }
    }

    fn metadata(&self) -> Metadata {
        let name = match self {
            Ads1x15Variant::Ads1015 => "ADS1015",
            Ads1x15Variant::Ads1115 => "ADS1115",
        };
        Metadata::new(
            name,
            format!("Supports {name} ADC"),
            &[Capability::AnalogInput],
        )
    }
}

/// Programmable gain amplifier setting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Gain {
    /// ±6.144 V
    TwoThirds,
    /// ±4.096 V
    One,
    /// ±2.048 V
    Two,
    /// ±1.024 V
    Four,
    /// ±0.512 V
    Eight,
    /// ±0.256 V
    Sixteen,
}

impl Gain {
    /// Accepted configuration labels.
    pub const LABELS: [&'static str; 6] = ["2/3", "1", "2", "4", "8", "16"];

    /// Parse a configuration label.
    pub fn from_label(label: &str) -> Option<Self> {
        match label {
            "2/3" => Some(Gain::TwoThirds),
            "1" => Some(Gain::One),
            "2" => Some(Gain::Two),
            "4" => Some(Gain::Four),
            "8" => Some(Gain::Eight),
            "16" => Some(Gain::Sixteen),
            _ => None,
        }
    }

    /// PGA bits of the config word.
    pub fn bits(&self) -> u16 {
        match self {
            Gain::TwoThirds => 0x0000,
            Gain::One => 0x0200,
            Gain::Two => 0x0400,
            Gain::Four => 0x0600,
            Gain::Eight => 0x0800,
            Gain::Sixteen => 0x0A00,
        }
    }
}

/// Config word starting a single-shot conversion of `channel` (0..=3) at `gain`.
pub fn config_word(channel: usize, gain: Gain) -> Result<u16> {
    let mux = CHANNEL_MUX
        .get(channel)
        .ok_or_else(|| HalError::InvalidChannel {
            driver: "ADS1x15".to_string(),
            channel,
        })?;
    Ok(CONFIG_OS_SINGLE
        | mux
        | gain.bits()
        | CONFIG_MODE_SINGLE
        | CONFIG_DATA_RATE_1600
        | CONFIG_COMPARATOR_QUEUE_NONE)
}

// =============================================================================
// Ads1x15Factory - DriverFactory implementation
// =============================================================================

/// Validated configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ads1x15Config {
    /// 7-bit I2C address.
    pub address: u8,
    /// Gain per channel.
    pub gains: [Gain; 4],
}

impl Ads1x15Config {
    /// Validate and convert loosely typed configuration.
    pub fn from_config(
        config: &Configuration,
        declared: &[ConfigParameter],
    ) -> std::result::Result<Self, ValidationFailures> {
        let mut v = ParameterValidator::new(config, declared);
        let address = v.integer(ADDRESS_PARAM, 1..=255);
        let gains = GAIN_PARAMS.map(|name| v.choice(name, &Gain::LABELS).and_then(Gain::from_label));
        let failures = v.finish();

        // Every accessor that returned None recorded a failure.
        match (address, gains) {
            (Some(address), [Some(g0), Some(g1), Some(g2), Some(g3)]) if failures.is_valid() => {
                Ok(Self {
                    address: address as u8,
                    gains: [g0, g1, g2, g3],
                })
            }
            _ => Err(failures),
        }
    }
}

/// Factory for one ADS1x15 variant.
pub struct Ads1x15Factory {
    variant: Ads1x15Variant,
    metadata: Metadata,
    parameters: Vec<ConfigParameter>,
}

impl Ads1x15Factory {
    /// Factory for `variant`.
    pub fn new(variant: Ads1x15Variant) -> Self {
        let mut parameters = vec![ConfigParameter::integer(ADDRESS_PARAM, 0, 0x48)];
        for (i, name) in GAIN_PARAMS.iter().enumerate() {
            parameters.push(ConfigParameter::string(*name, i + 1, "2/3"));
        }
        Self {
            variant,
            metadata: variant.metadata(),
            parameters,
        }
    }

    /// ADS1015 factory.
    pub fn ads1015() -> Self {
        Self::new(Ads1x15Variant::Ads1015)
    }

    /// ADS1115 factory.
    pub fn ads1115() -> Self {
        Self::new(Ads1x15Variant::Ads1115)
    }
}

impl DriverFactory for Ads1x15Factory {
    fn driver_type(&self) -> &'static str {
        self.variant.driver_type()
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
        Ads1x15Config::from_config(config, &self.parameters).map(|_| ())
    }

    fn build(&self, config: &Configuration, transport: Transport) -> Result<Box<dyn Driver>> {
        let cfg = Ads1x15Config::from_config(config, &self.parameters)?;
        let bus = transport.into_i2c(self.driver_type())?;
        let driver = Ads1x15Driver::new(self.variant, self.metadata.clone(), bus, cfg)?;
        Ok(Box::new(driver))
    }
}

// =============================================================================
// Ads1x15Driver
// =============================================================================

/// Constructed ADS1x15 with its four single-ended channels.
pub struct Ads1x15Driver {
    metadata: Metadata,
    address: u8,
    channels: Vec<Ads1x15Channel>,
    lifecycle: Arc<Lifecycle>,
}

impl Ads1x15Driver {
    /// Probe the chip by reading its config register and create the channels.
    pub fn new(
        variant: Ads1x15Variant,
        metadata: Metadata,
        bus: Arc<dyn I2cBus>,
        config: Ads1x15Config,
    ) -> Result<Self> {
        let address = config.address;
        let mut current = [0u8; 2];
        bus.read_register(address, REG_CONFIG, &mut current)?;

        let lifecycle = Lifecycle::new(metadata.name());
        let sequence = Arc::new(Mutex::new(()));
        let channels = config
            .gains
            .iter()
            .enumerate()
            .map(|(number, gain)| {
                Ok(Ads1x15Channel {
                    bus: Arc::clone(&bus),
                    address,
                    number,
                    name: number.to_string(),
                    config: config_word(number, *gain)?,
                    variant,
                    sequence: Arc::clone(&sequence),
                    calibrator: CalibratorSlot::identity(),
                    lifecycle: Arc::clone(&lifecycle),
                })
            })
            .collect::<Result<Vec<_>>>()?;

        info!(
            driver = metadata.name(),
            address,
            config = u16::from_be_bytes(current),
            "ADS1x15 initialized"
        );

        Ok(Self {
            metadata,
            address,
            channels,
            lifecycle,
        })
    }

    /// I2C address.
    pub fn address(&self) -> u8 {
        self.address
    }
}

impl Driver for Ads1x15Driver {
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
            debug!(driver = self.metadata.name(), address = self.address, "closed");
        }
        Ok(())
    }

    fn as_analog_input(&self) -> Option<&dyn AnalogInputDriver> {
        Some(self)
    }
}

impl AnalogInputDriver for Ads1x15Driver {
    fn analog_input_pins(&self) -> Vec<&dyn AnalogInputPin> {
        self.channels
            .iter()
            .map(|c| c as &dyn AnalogInputPin)
            .collect()
    }
}

// =============================================================================
// Ads1x15Channel
// =============================================================================

/// One single-ended input.
pub struct Ads1x15Channel {
    bus: Arc<dyn I2cBus>,
    address: u8,
    number: usize,
    name: String,
    config: u16,
    variant: Ads1x15Variant,
    // Held from config write to conversion read.
    sequence: Arc<Mutex<()>>,
    calibrator: CalibratorSlot,
    lifecycle: Arc<Lifecycle>,
}

impl Ads1x15Channel {
    /// Config word written for every conversion on this channel.
    pub fn config_word(&self) -> u16 {
        self.config
    }

    fn convert(&self) -> Result<i16> {
        let _sequence = self.sequence.lock();
        let written = self.config.to_be_bytes();
        self.bus
            .write_register(self.address, REG_CONFIG, &written)?;

        thread::sleep(self.variant.conversion_delay());

        let mut echo = [0u8; 2];
        self.bus
            .read_register(self.address, REG_CONFIG, &mut echo)?;
        if echo != written {
            return Err(HalError::ProtocolVerification {
                address: self.address,
                message: format!(
                    "config mismatch: wrote 0x{:04x}, read back 0x{:04x}",
                    self.config,
                    u16::from_be_bytes(echo)
                ),
            });
        }

        let mut data = [0u8; 2];
        self.bus
            .read_register(self.address, REG_CONVERSION, &mut data)?;
        Ok(i16::from_be_bytes(data) >> self.variant.shift())
    }
}

impl Pin for Ads1x15Channel {
    fn name(&self) -> &str {
        &self.name
    }

    fn number(&self) -> usize {
        self.number
    }
}

impl AnalogInputPin for Ads1x15Channel {
    /// Run one conversion, retrying transient failures.
    ///
    /// Safe to call concurrently on channels of the same driver. Assumes no other driver or
    /// process addresses this chip while the sequence runs.
    #[instrument(skip(self), fields(address = self.address, channel = self.number))]
    fn read(&self) -> Result<f64> {
        self.lifecycle.ensure_open()?;

        let mut attempt = 1;
        loop {
            match self.convert() {
                Ok(raw) => {
                    debug!(raw, attempt, "conversion complete");
                    return Ok(f64::from(raw));
                }
                Err(e) if e.is_transient() && attempt < CONVERSION_ATTEMPTS => {
                    debug!(attempt, error = %e, "conversion failed, retrying");
                    attempt += 1;
                }
                Err(e) => {
                    warn!(attempts = attempt, error = %e, "conversion failed");
                    return Err(e);
                }
            }
        }
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
    use iohal_core::MockBus;
    use tracing_test::traced_test;

    #[test]
    fn test_config_word() {
        assert_eq!(config_word(0, Gain::TwoThirds).unwrap(), 0xC183);
        assert_eq!(config_word(1, Gain::One).unwrap(), 0xD383);
        assert_eq!(config_word(3, Gain::Sixteen).unwrap(), 0xFB83);
        assert!(matches!(
            config_word(5, Gain::One),
            Err(HalError::InvalidChannel { channel: 5, .. })
        ));
    }

    #[test]
    fn test_factory_driver_type() {
        assert_eq!(Ads1x15Factory::ads1015().driver_type(), "ads1015");
        assert_eq!(Ads1x15Factory::ads1115().driver_type(), "ads1115");
        assert_eq!(Ads1x15Factory::ads1115().metadata().name(), "ADS1115");
    }

    #[test]
    fn test_factory_parameters() {
        let factory = Ads1x15Factory::ads1015();
        let params = factory.parameters();
        assert_eq!(params.len(), 5);
        assert_eq!(params[0].name, "Address");
        assert_eq!(params[0].default, toml::Value::Integer(0x48));
        assert_eq!(params[4].name, "Gain 4");
        assert_eq!(params[4].order, 4);
    }

    #[test]
    fn test_factory_validate_config() {
        let factory = Ads1x15Factory::ads1115();

        let valid = toml::toml! {
            Address = 72
            "Gain 1" = "2/3"
            "Gain 2" = "1"
            "Gain 3" = "2"
            "Gain 4" = 4
        };
        assert!(factory.validate(&valid).is_ok());

        let invalid = toml::toml! {
            Address = 0
            "Gain 1" = "3"
            "Gain 2" = "1"
            "Gain 3" = "2"
        };
        let failures = factory.validate(&invalid).unwrap_err();
        assert_eq!(failures.len(), 3);
        assert!(failures.get("Address").is_some());
        assert!(failures.get("Gain 1").is_some());
        assert!(failures.get("Gain 4").is_some());
        assert!(failures.get("Gain 2").is_none());
    }

    #[test]
    #[traced_test]
    fn test_exhausted_retries_logged() {
        let bus = Arc::new(MockBus::new());
        let config = Ads1x15Config {
            address: 0x48,
            gains: [Gain::One; 4],
        };
        let variant = Ads1x15Variant::Ads1015;
        let driver = Ads1x15Driver::new(variant, variant.metadata(), bus, config).unwrap();

        assert!(driver.channels[2].read().is_err());
        assert!(logs_contain("conversion failed"));
    }

    #[test]
    fn test_variant_timing() {
        assert_eq!(Ads1x15Variant::Ads1015.shift(), 4);
        assert_eq!(Ads1x15Variant::Ads1115.shift(), 0);
        assert!(Ads1x15Variant::Ads1115.conversion_delay() > Ads1x15Variant::Ads1015.conversion_delay());
    }
}
