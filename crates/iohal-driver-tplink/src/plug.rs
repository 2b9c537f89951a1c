//! HS1xx plug factory and driver.
//!
//! A plug is a single outlet exposed as pin 0. HS103 only switches; HS110 also reports load
//! current through its energy meter, exposed as an analog input on the same pin.

use parking_lot::Mutex;
use std::sync::Arc;

use iohal_core::driver::{
    AnalogInputDriver, DigitalOutputDriver, Driver, DriverFactory, DriverState, Lifecycle,
};
use iohal_core::parameter::{ConfigParameter, Configuration, ParameterValidator};
use iohal_core::{
    AnalogInputPin, Calibrator, CalibratorSlot, Capability, DigitalOutputPin, Measurement,
    Metadata, Pin, Result, Transport, TransportKind, ValidationFailures,
};
use tracing::info;

use crate::protocol::{PlugClient, Realtime, SysInfo};

const ADDRESS_PARAM: &str = "Address";

/// Supported plug models.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlugModel {
    /// Switch only.
    Hs103,
    /// Switch with energy meter.
    Hs110,
}

impl PlugModel {
    fn driver_type(&self) -> &'static str {
        match self {
            PlugModel::Hs103 => "tplink-hs103",
            PlugModel::Hs110 => "tplink-hs110",
        }
    }

    fn metadata(&self) -> Metadata {
        match self {
            PlugModel::Hs103 => Metadata::new(
                "tplink-hs103",
                "tplink hs103 series smart plug driver",
                &[Capability::DigitalOutput],
            ),
            PlugModel::Hs110 => Metadata::new(
                "tplink-hs110",
                "tplink hs110 series smart plug driver with current monitoring",
                &[Capability::DigitalOutput, Capability::AnalogInput],
            ),
        }
    }
}

// =============================================================================
// PlugFactory - DriverFactory implementation
// =============================================================================

/// Validated configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlugConfig {
    /// `host:port` of the plug.
    pub address: String,
}

impl PlugConfig {
    /// Validate and convert loosely typed configuration.
    pub fn from_config(
        config: &Configuration,
        declared: &[ConfigParameter],
    ) -> std::result::Result<Self, ValidationFailures> {
        let mut v = ParameterValidator::new(config, declared);
        let address = v.string(ADDRESS_PARAM);
        if let Some(addr) = &address {
            if !has_port(addr) {
                v.fail(
                    ADDRESS_PARAM,
                    format!("{ADDRESS_PARAM} must be host:port. {addr} was received."),
                );
            }
        }
        let failures = v.finish();

        match address {
            Some(address) if failures.is_valid() => Ok(Self { address }),
            _ => Err(failures),
        }
    }
}

fn has_port(address: &str) -> bool {
    address
        .rsplit_once(':')
        .is_some_and(|(host, port)| !host.is_empty() && port.parse::<u16>().is_ok())
}

/// Factory for one plug model.
pub struct PlugFactory {
    model: PlugModel,
    metadata: Metadata,
    parameters: Vec<ConfigParameter>,
}

impl PlugFactory {
    /// Factory for `model`.
    pub fn new(model: PlugModel) -> Self {
        Self {
            model,
            metadata: model.metadata(),
            parameters: vec![ConfigParameter::string(
                ADDRESS_PARAM,
                0,
                "192.168.1.11:9999",
            )],
        }
    }

    /// HS103 factory.
    pub fn hs103() -> Self {
        Self::new(PlugModel::Hs103)
    }

    /// HS110 factory.
    pub fn hs110() -> Self {
        Self::new(PlugModel::Hs110)
    }
}

impl DriverFactory for PlugFactory {
    fn driver_type(&self) -> &'static str {
        self.model.driver_type()
    }

    fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    fn parameters(&self) -> &[ConfigParameter] {
        &self.parameters
    }

    fn transport_kind(&self) -> TransportKind {
        TransportKind::Network
    }

    fn validate(&self, config: &Configuration) -> std::result::Result<(), ValidationFailures> {
        PlugConfig::from_config(config, &self.parameters).map(|_| ())
    }

    fn build(&self, config: &Configuration, transport: Transport) -> Result<Box<dyn Driver>> {
        let cfg = PlugConfig::from_config(config, &self.parameters)?;
        let dialer = transport.into_network(self.driver_type())?;
        let client = PlugClient::new(dialer, cfg.address);
        info!(driver = self.driver_type(), address = client.address(), "plug configured");
        Ok(Box::new(PlugDriver::new(self.metadata.clone(), client)))
    }
}

// =============================================================================
// PlugDriver
// =============================================================================

/// One smart plug.
pub struct PlugDriver {
    metadata: Metadata,
    outlet: Outlet,
    lifecycle: Arc<Lifecycle>,
}

impl PlugDriver {
    /// Driver talking to the plug behind `client`. Performs no I/O.
    pub fn new(metadata: Metadata, client: PlugClient) -> Self {
        let lifecycle = Lifecycle::new(metadata.name());
        let outlet = Outlet {
            client,
            name: metadata.name().to_string(),
            state: Mutex::new(false),
            calibrator: CalibratorSlot::identity(),
            lifecycle: Arc::clone(&lifecycle),
        };
        Self {
            metadata,
            outlet,
            lifecycle,
        }
    }

    /// Query device information.
    pub fn info(&self) -> Result<SysInfo> {
        self.lifecycle.ensure_open()?;
        self.outlet.client.sysinfo()
    }

    /// Query the energy meter. Only HS110-class plugs answer.
    pub fn realtime(&self) -> Result<Realtime> {
        self.metadata.require(Capability::AnalogInput)?;
        self.lifecycle.ensure_open()?;
        self.outlet.client.realtime()
    }
}

impl Driver for PlugDriver {
    fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    fn pins(&self, capability: Capability) -> Result<Vec<&dyn Pin>> {
        self.metadata.require(capability)?;
        Ok(vec![&self.outlet as &dyn Pin])
    }

    fn state(&self) -> DriverState {
        self.lifecycle.state()
    }

    fn close(&self) -> Result<()> {
        self.lifecycle.begin_close();
        Ok(())
    }

    fn as_analog_input(&self) -> Option<&dyn AnalogInputDriver> {
        if self.metadata.has_capability(Capability::AnalogInput) {
            Some(self)
        } else {
            None
        }
    }

    fn as_digital_output(&self) -> Option<&dyn DigitalOutputDriver> {
        Some(self)
    }
}

impl DigitalOutputDriver for PlugDriver {
    fn digital_output_pins(&self) -> Vec<&dyn DigitalOutputPin> {
        vec![&self.outlet as &dyn DigitalOutputPin]
    }
}

impl AnalogInputDriver for PlugDriver {
    fn analog_input_pins(&self) -> Vec<&dyn AnalogInputPin> {
        if self.metadata.has_capability(Capability::AnalogInput) {
            vec![&self.outlet as &dyn AnalogInputPin]
        } else {
            Vec::new()
        }
    }
}

// =============================================================================
// Outlet
// =============================================================================

struct Outlet {
    client: PlugClient,
    name: String,
    state: Mutex<bool>,
    calibrator: CalibratorSlot,
    lifecycle: Arc<Lifecycle>,
}

impl Pin for Outlet {
    fn name(&self) -> &str {
        &self.name
    }

    fn number(&self) -> usize {
        0
    }
}

impl DigitalOutputPin for Outlet {
    fn write(&self, state: bool) -> Result<()> {
        self.lifecycle.ensure_open()?;
        let mut current = self.state.lock();
        self.client.set_relay(state)?;
        *current = state;
        Ok(())
    }

    fn last_state(&self) -> bool {
        *self.state.lock()
    }
}

impl AnalogInputPin for Outlet {
    fn read(&self) -> Result<f64> {
        self.lifecycle.ensure_open()?;
        Ok(self.client.realtime()?.current)
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
    use iohal_core::MockDialer;
    use tracing_test::traced_test;

    #[test]
    fn test_factory_driver_type() {
        assert_eq!(PlugFactory::hs103().driver_type(), "tplink-hs103");
        assert_eq!(PlugFactory::hs110().driver_type(), "tplink-hs110");
        assert_eq!(PlugFactory::hs110().transport_kind(), TransportKind::Network);
    }

    #[test]
    fn test_factory_capabilities() {
        let hs103 = PlugFactory::hs103();
        assert_eq!(hs103.metadata().capabilities(), &[Capability::DigitalOutput]);
        let hs110 = PlugFactory::hs110();
        assert!(hs110.metadata().has_capability(Capability::AnalogInput));
    }

    #[test]
    fn test_factory_validate_config() {
        let factory = PlugFactory::hs103();
        assert!(factory.validate(&factory.default_configuration()).is_ok());

        let failures = factory
            .validate(&toml::toml! { Address = "192.168.1.11" })
            .unwrap_err();
        assert_eq!(
            failures.get("Address").unwrap(),
            &["Address must be host:port. 192.168.1.11 was received.".to_string()]
        );

        let failures = factory.validate(&toml::toml! { Address = 9999 }).unwrap_err();
        assert!(failures.get("Address").unwrap()[0].contains("is not a string"));
    }

    #[test]
    #[traced_test]
    fn test_build_does_no_io() {
        let dialer = MockDialer::new();
        let factory = PlugFactory::hs110();
        let driver = factory
            .build(
                &toml::toml! { Address = "192.168.1.11:9999" },
                Transport::Network(Arc::new(dialer.clone())),
            )
            .unwrap();

        assert_eq!(driver.state(), DriverState::Ready);
        assert!(dialer.sessions().is_empty());
        assert!(logs_contain("plug configured"));
    }

    #[test]
    fn test_has_port() {
        assert!(has_port("plug.local:9999"));
        assert!(has_port("[::1]:9999"));
        assert!(!has_port(":9999"));
        assert!(!has_port("plug.local:http"));
    }
}
