//! Pin traits, one per capability.
//!
//! A pin is one addressable channel of a driver. Every pin has an identity ([`Pin`]) and
//! implements the capability traits matching what the hardware can do. Pins take `&self`
//! and are `Send + Sync`.
//!
//! Multi-transaction sequences (write, wait, read back) are only serialized within one
//! driver. Callers must not build two drivers for the same device, and must provide their
//! own mutual exclusion if another process shares the bus address.

use parking_lot::RwLock;
use std::sync::Arc;

use crate::calibration::{Calibrator, Measurement};
use crate::error::{HalError, Result};

/// Identity shared by every pin.
pub trait Pin: Send + Sync {
    /// Display name, unique within its driver.
    fn name(&self) -> &str;

    /// Channel number, unique within its driver.
    fn number(&self) -> usize;
}

/// Pin that reads a numeric value.
pub trait AnalogInputPin: Pin {
    /// Raw reading in device units.
    fn read(&self) -> Result<f64>;

    /// Attached calibrator, or `None` when the pin was built without one.
    fn calibrator(&self) -> Option<Arc<Calibrator>>;

    /// Replace the calibrator. The old one stays in place if `points` are rejected.
    fn calibrate(&self, points: &[Measurement]) -> Result<()>;

    /// Calibrated reading.
    ///
    /// Fails with [`HalError::NotCalibrated`] when no calibrator is attached. An identity
    /// calibrator is attached, so it passes the raw reading through.
    fn measure(&self) -> Result<f64> {
        let calibrator = self.calibrator().ok_or_else(|| HalError::NotCalibrated {
            pin: self.name().to_string(),
        })?;
        let raw = self.read()?;
        Ok(calibrator.calibrate(raw))
    }
}

/// Pin that reads an on/off level.
pub trait DigitalInputPin: Pin {
    /// Current level.
    fn read(&self) -> Result<bool>;
}

/// Pin that drives an on/off level.
pub trait DigitalOutputPin: Pin {
    /// Drive the output.
    fn write(&self, state: bool) -> Result<()>;

    /// Last state successfully written.
    fn last_state(&self) -> bool;
}

/// Pin that drives a duty cycle in percent, `[0, 100]`.
///
/// `write(true)` is full on and `write(false)` is full off.
pub trait PwmPin: DigitalOutputPin {
    /// Set the duty cycle. Values outside `[0, 100]` fail with [`HalError::OutOfRange`] and
    /// leave the pin untouched.
    fn set(&self, value: f64) -> Result<()>;

    /// Last duty cycle successfully set.
    fn value(&self) -> f64;
}

/// Replaceable calibrator storage for analog pins.
#[derive(Debug, Default)]
pub struct CalibratorSlot {
    inner: RwLock<Option<Arc<Calibrator>>>,
}

impl CalibratorSlot {
    /// Slot holding `calibrator`, or empty for an uncalibrated pin.
    pub fn new(calibrator: Option<Calibrator>) -> Self {
        Self {
            inner: RwLock::new(calibrator.map(Arc::new)),
        }
    }

    /// Slot holding the identity calibrator.
    pub fn identity() -> Self {
        Self::new(Some(Calibrator::identity()))
    }

    /// Current calibrator.
    pub fn get(&self) -> Option<Arc<Calibrator>> {
        self.inner.read().clone()
    }

    /// Validate `points` and swap in the resulting calibrator.
    pub fn replace(&self, points: &[Measurement]) -> Result<()> {
        let calibrator = Calibrator::new(points)?;
        *self.inner.write() = Some(Arc::new(calibrator));
        Ok(())
    }
}

/// Check a duty cycle against `[0, 100]`.
pub fn check_duty_cycle(pin: &str, value: f64) -> Result<()> {
    if (0.0..=100.0).contains(&value) {
        Ok(())
    } else {
        Err(HalError::OutOfRange {
            pin: pin.to_string(),
            value,
            min: 0.0,
            max: 100.0,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Fixed {
        reads: AtomicUsize,
        slot: CalibratorSlot,
    }

    impl Pin for Fixed {
        fn name(&self) -> &str {
            "fixed"
        }
        fn number(&self) -> usize {
            0
        }
    }

    impl AnalogInputPin for Fixed {
        fn read(&self) -> Result<f64> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            Ok(1000.0)
        }
        fn calibrator(&self) -> Option<Arc<Calibrator>> {
            self.slot.get()
        }
        fn calibrate(&self, points: &[Measurement]) -> Result<()> {
            self.slot.replace(points)
        }
    }

    #[test]
    fn test_measure_without_calibrator() {
        let pin = Fixed {
            reads: AtomicUsize::new(0),
            slot: CalibratorSlot::new(None),
        };
        assert!(matches!(pin.measure(), Err(HalError::NotCalibrated { pin }) if pin == "fixed"));
        assert_eq!(pin.reads.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_measure_identity_passes_through() {
        let pin = Fixed {
            reads: AtomicUsize::new(0),
            slot: CalibratorSlot::identity(),
        };
        assert_eq!(pin.measure().unwrap(), 1000.0);
    }

    #[test]
    fn test_failed_recalibration_keeps_previous() {
        let pin = Fixed {
            reads: AtomicUsize::new(0),
            slot: CalibratorSlot::identity(),
        };
        pin.calibrate(&[Measurement::new(4.0, 1000.0), Measurement::new(7.0, 2000.0)])
            .unwrap();
        assert!((pin.measure().unwrap() - 4.0).abs() < 1e-9);

        let err = pin
            .calibrate(&[Measurement::new(1.0, 5.0), Measurement::new(2.0, 5.0)])
            .unwrap_err();
        assert!(matches!(err, HalError::Calibration(_)));
        assert!((pin.measure().unwrap() - 4.0).abs() < 1e-9);
    }

    #[test]
    fn test_check_duty_cycle() {
        assert!(check_duty_cycle("0", 0.0).is_ok());
        assert!(check_duty_cycle("0", 100.0).is_ok());
        assert!(matches!(
            check_duty_cycle("0", 150.0),
            Err(HalError::OutOfRange { value, .. }) if value == 150.0
        ));
        assert!(check_duty_cycle("0", -1.0).is_err());
        assert!(check_duty_cycle("0", f64::NAN).is_err());
    }
}
