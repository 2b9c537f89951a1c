//! Transports for configuration-driven device creation.
//!
//! Factories never open buses themselves. When devices come from a hardware file, a
//! [`TransportProvider`] supplies the transport each factory asks for.

use dashmap::DashMap;
use std::sync::Arc;

use iohal_core::{MockBus, MockDialer, Result, Transport, TransportKind};

use crate::config::DeviceConfig;

/// Supplies transports by kind.
pub trait TransportProvider: Send + Sync {
    /// Transport of `kind` for `device`.
    fn transport(&self, kind: TransportKind, device: &DeviceConfig) -> Result<Transport>;
}

/// In-memory transports: one [`MockBus`] per bus number and a shared [`MockDialer`].
#[derive(Debug, Default)]
pub struct MockTransports {
    buses: DashMap<u8, Arc<MockBus>>,
    dialer: MockDialer,
}

impl MockTransports {
    /// No buses opened yet.
    pub fn new() -> Self {
        Self::default()
    }

    /// Bus `number`, created on first use.
    pub fn i2c(&self, number: u8) -> Arc<MockBus> {
        Arc::clone(
            self.buses
                .entry(number)
                .or_insert_with(|| Arc::new(MockBus::new()))
                .value(),
        )
    }

    /// Shared dialer.
    pub fn dialer(&self) -> MockDialer {
        self.dialer.clone()
    }
}

impl TransportProvider for MockTransports {
    fn transport(&self, kind: TransportKind, device: &DeviceConfig) -> Result<Transport> {
        Ok(match kind {
            TransportKind::I2c => Transport::I2c(self.i2c(device.i2c_bus)),
            TransportKind::Network => Transport::Network(Arc::new(self.dialer())),
            TransportKind::None => Transport::None,
        })
    }
}
