//! Register-addressed I2C bus abstraction.
//!
//! Protocol drivers talk to chips through [`I2cBus`]. The trait takes `&self` so one bus can
//! be shared by every channel of every device on it. Implementations serialize single
//! transactions only; a driver whose protocol spans several transactions must hold its own
//! lock across them. Two implementations ship here:
//!
//! - [`EmbeddedHalBus`] wraps any `embedded_hal::i2c::I2c` (Linux i2cdev, rppal, ...).
//! - [`MockBus`] scripts reads and records writes for tests and dry runs.

use parking_lot::Mutex;
use std::collections::VecDeque;

use crate::error::TransportError;

/// Register-level access to an I2C bus.
///
/// Each method is one atomic bus transaction. No ordering is guaranteed between calls made
/// from different threads.
pub trait I2cBus: Send + Sync {
    /// Write `data` to `register` of the device at `address` in one transaction.
    fn write_register(&self, address: u8, register: u8, data: &[u8])
        -> Result<(), TransportError>;

    /// Select `register` and read `buf.len()` bytes from it.
    fn read_register(&self, address: u8, register: u8, buf: &mut [u8])
        -> Result<(), TransportError>;

    /// Raw write without a register prefix.
    fn write_bytes(&self, address: u8, data: &[u8]) -> Result<(), TransportError>;

    /// Raw read without selecting a register.
    fn read_bytes(&self, address: u8, buf: &mut [u8]) -> Result<(), TransportError>;
}

// =============================================================================
// embedded-hal adapter
// =============================================================================

/// [`I2cBus`] over an `embedded_hal` 1.0 bus.
pub struct EmbeddedHalBus<T> {
    inner: Mutex<T>,
}

impl<T> EmbeddedHalBus<T> {
    /// Take ownership of an embedded-hal bus.
    pub fn new(bus: T) -> Self {
        Self {
            inner: Mutex::new(bus),
        }
    }

    /// Give the underlying bus back.
    pub fn into_inner(self) -> T {
        self.inner.into_inner()
    }
}

fn bus_error<E: embedded_hal::i2c::Error>(address: u8, err: E) -> TransportError {
    TransportError::Bus {
        address,
        message: err.kind().to_string(),
    }
}

impl<T> I2cBus for EmbeddedHalBus<T>
where
    T: embedded_hal::i2c::I2c + Send,
{
    fn write_register(
        &self,
        address: u8,
        register: u8,
        data: &[u8],
    ) -> Result<(), TransportError> {
        let mut frame = Vec::with_capacity(data.len() + 1);
        frame.push(register);
        frame.extend_from_slice(data);
        self.inner
            .lock()
            .write(address, &frame)
            .map_err(|e| bus_error(address, e))
    }

    fn read_register(
        &self,
        address: u8,
        register: u8,
        buf: &mut [u8],
    ) -> Result<(), TransportError> {
        self.inner
            .lock()
            .write_read(address, &[register], buf)
            .map_err(|e| bus_error(address, e))
    }

    fn write_bytes(&self, address: u8, data: &[u8]) -> Result<(), TransportError> {
        self.inner
            .lock()
            .write(address, data)
            .map_err(|e| bus_error(address, e))
    }

    fn read_bytes(&self, address: u8, buf: &mut [u8]) -> Result<(), TransportError> {
        self.inner
            .lock()
            .read(address, buf)
            .map_err(|e| bus_error(address, e))
    }
}

// =============================================================================
// Mock bus
// =============================================================================

/// A write seen by [`MockBus`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BusWrite {
    /// Device address.
    pub address: u8,
    /// Register, or `None` for a raw write.
    pub register: Option<u8>,
    /// Payload.
    pub data: Vec<u8>,
}

/// A read served by [`MockBus`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BusRead {
    /// Device address.
    pub address: u8,
    /// Register, or `None` for a raw read.
    pub register: Option<u8>,
    /// Bytes requested.
    pub len: usize,
}

#[derive(Debug, Default)]
struct MockState {
    queued: VecDeque<u8>,
    writes: Vec<BusWrite>,
    reads: Vec<BusRead>,
    failing_reads: usize,
    failing_writes: usize,
}

/// In-memory bus.
///
/// Reads pop bytes from a FIFO queue and zero-fill once it runs dry. Every transaction is
/// logged. Failures can be injected for the next N reads or writes.
#[derive(Debug, Default)]
pub struct MockBus {
    state: Mutex<MockState>,
}

impl MockBus {
    /// Empty bus: every read returns zeros.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append bytes to the read queue.
    pub fn queue_read(&self, bytes: &[u8]) {
        self.state.lock().queued.extend(bytes.iter().copied());
    }

    /// Bytes still queued.
    pub fn pending_reads(&self) -> usize {
        self.state.lock().queued.len()
    }

    /// Fail the next `count` reads with a bus error.
    pub fn fail_next_reads(&self, count: usize) {
        self.state.lock().failing_reads = count;
    }

    /// Fail the next `count` writes with a bus error.
    pub fn fail_next_writes(&self, count: usize) {
        self.state.lock().failing_writes = count;
    }

    /// Writes so far, oldest first.
    pub fn writes(&self) -> Vec<BusWrite> {
        self.state.lock().writes.clone()
    }

    /// Reads so far, oldest first.
    pub fn reads(&self) -> Vec<BusRead> {
        self.state.lock().reads.clone()
    }

    /// Forget logged transactions. Queued reads are kept.
    pub fn clear_log(&self) {
        let mut state = self.state.lock();
        state.writes.clear();
        state.reads.clear();
    }

    fn record_write(
        &self,
        address: u8,
        register: Option<u8>,
        data: &[u8],
    ) -> Result<(), TransportError> {
        let mut state = self.state.lock();
        if state.failing_writes > 0 {
            state.failing_writes -= 1;
            return Err(injected(address));
        }
        state.writes.push(BusWrite {
            address,
            register,
            data: data.to_vec(),
        });
        Ok(())
    }

    fn serve_read(
        &self,
        address: u8,
        register: Option<u8>,
        buf: &mut [u8],
    ) -> Result<(), TransportError> {
        let mut state = self.state.lock();
        if state.failing_reads > 0 {
            state.failing_reads -= 1;
            return Err(injected(address));
        }
        for byte in buf.iter_mut() {
            *byte = state.queued.pop_front().unwrap_or(0);
        }
        state.reads.push(BusRead {
            address,
            register,
            len: buf.len(),
        });
        Ok(())
    }
}

fn injected(address: u8) -> TransportError {
    TransportError::Bus {
        address,
        message: "injected failure".to_string(),
    }
}

impl I2cBus for MockBus {
    fn write_register(
        &self,
        address: u8,
        register: u8,
        data: &[u8],
    ) -> Result<(), TransportError> {
        self.record_write(address, Some(register), data)
    }

    fn read_register(
        &self,
        address: u8,
        register: u8,
        buf: &mut [u8],
    ) -> Result<(), TransportError> {
        self.serve_read(address, Some(register), buf)
    }

    fn write_bytes(&self, address: u8, data: &[u8]) -> Result<(), TransportError> {
        self.record_write(address, None, data)
    }

    fn read_bytes(&self, address: u8, buf: &mut [u8]) -> Result<(), TransportError> {
        self.serve_read(address, None, buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use embedded_hal::i2c::{ErrorKind, ErrorType, NoAcknowledgeSource, Operation};

    #[test]
    fn test_mock_reads_queue_then_zero_fill() {
        let bus = MockBus::new();
        bus.queue_read(&[0xC1, 0x83, 0x6F]);

        let mut buf = [0u8; 2];
        bus.read_register(0x48, 0x01, &mut buf).unwrap();
        assert_eq!(buf, [0xC1, 0x83]);

        bus.read_register(0x48, 0x00, &mut buf).unwrap();
        assert_eq!(buf, [0x6F, 0x00]);
        assert_eq!(bus.pending_reads(), 0);

        assert_eq!(
            bus.reads(),
            vec![
                BusRead { address: 0x48, register: Some(0x01), len: 2 },
                BusRead { address: 0x48, register: Some(0x00), len: 2 },
            ]
        );
    }

    #[test]
    fn test_mock_records_writes() {
        let bus = MockBus::new();
        bus.write_register(0x40, 0xFE, &[0x1E]).unwrap();
        bus.write_bytes(0x40, &[0x06]).unwrap();

        assert_eq!(
            bus.writes(),
            vec![
                BusWrite { address: 0x40, register: Some(0xFE), data: vec![0x1E] },
                BusWrite { address: 0x40, register: None, data: vec![0x06] },
            ]
        );

        bus.clear_log();
        assert!(bus.writes().is_empty());
    }

    #[test]
    fn test_mock_injected_failures() {
        let bus = MockBus::new();
        bus.fail_next_writes(1);
        bus.fail_next_reads(2);

        assert!(bus.write_register(0x40, 0x00, &[0x01]).is_err());
        assert!(bus.write_register(0x40, 0x00, &[0x01]).is_ok());

        let mut buf = [0u8; 1];
        assert!(bus.read_register(0x40, 0x00, &mut buf).is_err());
        assert!(bus.read_register(0x40, 0x00, &mut buf).is_err());
        assert!(bus.read_register(0x40, 0x00, &mut buf).is_ok());
        assert_eq!(bus.writes().len(), 1);
    }

    #[derive(Debug)]
    struct Nack;

    impl embedded_hal::i2c::Error for Nack {
        fn kind(&self) -> ErrorKind {
            ErrorKind::NoAcknowledge(NoAcknowledgeSource::Address)
        }
    }

    #[derive(Default)]
    struct Recorder {
        frames: Vec<(u8, Vec<u8>)>,
        nack: bool,
    }

    impl ErrorType for Recorder {
        type Error = Nack;
    }

    impl embedded_hal::i2c::I2c for Recorder {
        fn transaction(
            &mut self,
            address: u8,
            operations: &mut [Operation<'_>],
        ) -> Result<(), Self::Error> {
            if self.nack {
                return Err(Nack);
            }
            for op in operations {
                match op {
                    Operation::Write(data) => self.frames.push((address, data.to_vec())),
                    Operation::Read(buf) => buf.fill(0xAA),
                }
            }
            Ok(())
        }
    }

    #[test]
    fn test_embedded_hal_register_write_is_one_frame() {
        let bus = EmbeddedHalBus::new(Recorder::default());
        bus.write_register(0x40, 0x06, &[0x00, 0x00, 0x00, 0x10])
            .unwrap();

        let mut buf = [0u8; 2];
        bus.read_register(0x48, 0x00, &mut buf).unwrap();
        assert_eq!(buf, [0xAA, 0xAA]);

        let recorder = bus.into_inner();
        assert_eq!(
            recorder.frames,
            vec![
                (0x40, vec![0x06, 0x00, 0x00, 0x00, 0x10]),
                (0x48, vec![0x00]),
            ]
        );
    }

    #[test]
    fn test_embedded_hal_error_mapping() {
        let bus = EmbeddedHalBus::new(Recorder {
            nack: true,
            ..Default::default()
        });
        let err = bus.write_bytes(0x40, &[0x00]).unwrap_err();
        assert!(matches!(err, TransportError::Bus { address: 0x40, .. }));
    }
}
