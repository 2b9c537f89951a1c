//! TP-Link Kasa smart plug drivers for iohal.
//!
//! This crate provides factories for:
//! - HS103 (relay)
//! - HS110 (relay with energy meter)
//!
//! Plugs are reached over TCP port 9999 through a [`iohal_core::Dialer`].
//!
//! # Usage
//!
//! ```rust,ignore
//! use iohal_driver_tplink::register_all;
//!
//! register_all(&registry);
//! ```

mod plug;
pub mod protocol;

pub use plug::{PlugConfig, PlugDriver, PlugFactory, PlugModel};
pub use protocol::{PlugClient, Realtime, SysInfo};

use iohal_core::FactoryRegistry;

/// Register every factory in this crate.
pub fn register_all(registry: &impl FactoryRegistry) {
    registry.register_factory(Box::new(PlugFactory::hs103()));
    registry.register_factory(Box::new(PlugFactory::hs110()));
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
        assert_eq!(*registry.0.lock(), vec!["tplink-hs103", "tplink-hs110"]);
    }
}
