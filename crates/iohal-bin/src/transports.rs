//! Real transports: Linux I2C through rppal and plain TCP.

use dashmap::DashMap;
use std::io;
use std::sync::Arc;

use iohal_core::{I2cBus, Result, TcpDialer, Transport, TransportError, TransportKind};
use iohal_hardware::{DeviceConfig, TransportProvider};
use tracing::debug;

/// Opens `/dev/i2c-N` on first use and shares it between devices.
#[derive(Default)]
pub struct SystemTransports {
    buses: DashMap<u8, Arc<dyn I2cBus>>,
}

impl SystemTransports {
    pub fn new() -> Self {
        Self::default()
    }

    fn i2c(&self, number: u8) -> Result<Arc<dyn I2cBus>> {
        if let Some(bus) = self.buses.get(&number) {
            return Ok(Arc::clone(bus.value()));
        }
        let bus = open_i2c(number)?;
        debug!(bus = number, "opened I2C bus");
        self.buses.insert(number, Arc::clone(&bus));
        Ok(bus)
    }
}

impl TransportProvider for SystemTransports {
    fn transport(&self, kind: TransportKind, device: &DeviceConfig) -> Result<Transport> {
        Ok(match kind {
            TransportKind::I2c => Transport::I2c(self.i2c(device.i2c_bus)?),
            TransportKind::Network => Transport::Network(Arc::new(TcpDialer)),
            TransportKind::None => Transport::None,
        })
    }
}

#[cfg(feature = "rpi")]
fn open_i2c(number: u8) -> Result<Arc<dyn I2cBus>> {
    use iohal_core::EmbeddedHalBus;

    let bus = rppal::i2c::I2c::with_bus(number)
        .map_err(|e| TransportError::Io(io::Error::other(format!("/dev/i2c-{number}: {e}"))))?;
    Ok(Arc::new(EmbeddedHalBus::new(bus)))
}

#[cfg(not(feature = "rpi"))]
fn open_i2c(number: u8) -> Result<Arc<dyn I2cBus>> {
    Err(TransportError::Io(io::Error::new(
        io::ErrorKind::Unsupported,
        format!("cannot open /dev/i2c-{number}: built without the `rpi` feature, use --mock"),
    ))
    .into())
}
