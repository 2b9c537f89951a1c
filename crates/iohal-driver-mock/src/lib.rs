//! Simulated devices for iohal.
//!
//! Every capability has a hardware-free driver here, so registries, configuration files and
//! the CLI can be exercised without a bus.
//!
//! # Available Drivers
//!
//! - `mock-analog` - [`MockAnalogFactory`]: analog inputs returning a settable raw value,
//!   optionally without a calibrator
//! - `mock-digital` - [`MockDigitalFactory`]: digital pins that read back what was written
//!
//! # Usage
//!
//! ```rust,ignore
//! use iohal_driver_mock::register_all;
//!
//! register_all(&registry);
//! ```

mod mock_analog;
mod mock_digital;

pub use mock_analog::{MockAnalogConfig, MockAnalogDriver, MockAnalogFactory};
pub use mock_digital::{MockDigitalConfig, MockDigitalDriver, MockDigitalFactory};

use iohal_core::FactoryRegistry;

/// Register all mock driver factories with a device registry.
///
/// # Example
///
/// ```rust,ignore
/// use iohal_driver_mock::register_all;
///
/// let registry = DeviceRegistry::new();
/// register_all(&registry);
/// ```
pub fn register_all(registry: &impl FactoryRegistry) {
    registry.register_factory(Box::new(MockAnalogFactory::new()));
    registry.register_factory(Box::new(MockDigitalFactory::new()));
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[test]
    fn test_register_all() {
        struct Recorder(Mutex<Vec<&'static str>>);
        impl FactoryRegistry for Recorder {
            fn register_factory(&self, factory: Box<dyn iohal_core::DriverFactory>) {
                self.0.lock().push(factory.driver_type());
            }
        }

        let registry = Recorder(Mutex::new(Vec::new()));
        register_all(&registry);
        assert_eq!(*registry.0.lock(), vec!["mock-analog", "mock-digital"]);
    }
}
