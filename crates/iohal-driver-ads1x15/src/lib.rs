//! Texas Instruments ADS1x15 ADC drivers for iohal.
//!
//! This crate provides factories for:
//! - ADS1015 (12-bit, 4 channels)
//! - ADS1115 (16-bit, 4 channels)
//!
//! # Usage
//!
//! Register the factories with your device registry:
//!
//! ```rust,ignore
//! use iohal_driver_ads1x15::register_all;
//!
//! register_all(&registry);
//! ```

mod ads1x15;

pub use ads1x15::{
    config_word, Ads1x15Channel, Ads1x15Config, Ads1x15Driver, Ads1x15Factory, Ads1x15Variant,
    Gain, CONVERSION_ATTEMPTS, REG_CONFIG, REG_CONVERSION,
};

use iohal_core::FactoryRegistry;

/// Register every factory in this crate.
pub fn register_all(registry: &impl FactoryRegistry) {
    registry.register_factory(Box::new(Ads1x15Factory::ads1015()));
    registry.register_factory(Box::new(Ads1x15Factory::ads1115()));
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
        assert_eq!(*registry.0.lock(), vec!["ads1015", "ads1115"]);
    }
}
