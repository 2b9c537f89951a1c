//! Register-level PCA9685 access.
//!
//! Each output has a 4-byte register block `ON_L, ON_H, OFF_L, OFF_H` starting at
//! `0x06 + 4 * channel`. Counts are 12-bit positions within the 4096-step period. Bit 4 of
//! `ON_H` forces the output fully on; bit 4 of `OFF_H` forces it fully off. Blocks are
//! always written in a single transaction so the chip never latches half an update.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use iohal_core::{HalError, I2cBus, Result};
use tracing::{debug, instrument, warn};

/// Internal oscillator frequency.
pub const CLOCK_HZ: f64 = 25_000_000.0;
/// Counter steps per PWM period.
pub const STEPS: f64 = 4096.0;
/// Largest 12-bit count.
pub const MAX_COUNT: u16 = 4095;
/// Outputs per chip.
pub const CHANNELS: usize = 16;

/// MODE1 register.
pub const REG_MODE1: u8 = 0x00;
/// First register of channel 0's block.
pub const REG_LED0_ON_L: u8 = 0x06;
/// PRE_SCALE register.
pub const REG_PRESCALE: u8 = 0xFE;

const MODE1_RESTART: u8 = 0x80;
const MODE1_AUTO_INCREMENT: u8 = 0x20;
const MODE1_SLEEP: u8 = 0x10;

const PRESCALE_MIN: u8 = 3;
const PRESCALE_MAX: u8 = 255;

/// Oscillator start-up time after leaving sleep.
const OSCILLATOR_SETTLE: Duration = Duration::from_micros(500);

/// Block forcing an output fully off.
pub const FULL_OFF: [u8; 4] = [0x00, 0x00, 0x00, 0x10];
/// Block forcing an output fully on.
pub const FULL_ON: [u8; 4] = [0x00, 0x10, 0x00, 0x00];

/// Prescaler for `frequency_hz`: `round(25 MHz / (4096 * f)) - 1`, clamped to 3..=255.
pub fn prescale(frequency_hz: u32) -> u8 {
    let exact = (CLOCK_HZ / (STEPS * f64::from(frequency_hz.max(1)))).round() - 1.0;
    if exact < f64::from(PRESCALE_MIN) {
        warn!(frequency_hz, prescale = exact, "prescale below chip minimum, clamping");
        PRESCALE_MIN
    } else if exact > f64::from(PRESCALE_MAX) {
        warn!(frequency_hz, prescale = exact, "prescale above chip maximum, clamping");
        PRESCALE_MAX
    } else {
        exact as u8
    }
}

/// Register block for an `(on, off)` pair.
///
/// `off` is clamped to 4095. `off == 0` yields [`FULL_OFF`] and `off == 4095` yields
/// [`FULL_ON`]; neither is emitted as a one-step pulse.
pub fn pwm_block(on: u16, off: u16) -> [u8; 4] {
    let off = off.min(MAX_COUNT);
    if off == 0 {
        return FULL_OFF;
    }
    if off == MAX_COUNT {
        return FULL_ON;
    }
    let on = on & MAX_COUNT;
    let [on_h, on_l] = on.to_be_bytes();
    let [off_h, off_l] = off.to_be_bytes();
    [on_l, on_h, off_l, off_h]
}

/// Register address of `channel`'s block.
pub fn block_register(channel: usize) -> u8 {
    REG_LED0_ON_L + 4 * (channel as u8)
}

/// One PCA9685 chip.
pub struct Pca9685 {
    bus: Arc<dyn I2cBus>,
    address: u8,
    frequency: u32,
}

impl Pca9685 {
    /// Chip at `address` that will run at `frequency` Hz once woken.
    pub fn new(bus: Arc<dyn I2cBus>, address: u8, frequency: u32) -> Self {
        Self {
            bus,
            address,
            frequency,
        }
    }

    /// I2C address.
    pub fn address(&self) -> u8 {
        self.address
    }

    /// Configured output frequency in Hz.
    pub fn frequency(&self) -> u32 {
        self.frequency
    }

    fn mode1(&self) -> Result<u8> {
        let mut mode1 = [0u8; 1];
        self.bus.read_register(self.address, REG_MODE1, &mut mode1)?;
        Ok(mode1[0])
    }

    fn write(&self, register: u8, data: &[u8]) -> Result<()> {
        self.bus.write_register(self.address, register, data)?;
        Ok(())
    }

    /// Leave sleep, program the prescaler and enable register auto-increment.
    #[instrument(skip(self), fields(address = self.address, frequency = self.frequency))]
    pub fn wake(&self) -> Result<()> {
        let mode1 = self.mode1()?;

        if mode1 & MODE1_RESTART != 0 {
            let awake = mode1 & !MODE1_SLEEP;
            self.write(REG_MODE1, &[awake])?;
            thread::sleep(OSCILLATOR_SETTLE);
            self.write(REG_MODE1, &[awake | MODE1_RESTART])?;
            debug!(mode1, "restarted");
        } else if mode1 & MODE1_SLEEP != 0 {
            self.write(REG_MODE1, &[mode1 & !MODE1_SLEEP])?;
            thread::sleep(OSCILLATOR_SETTLE);
            debug!(mode1, "woke from sleep");
        }

        let prescale = prescale(self.frequency);
        self.write(REG_PRESCALE, &[prescale])?;
        self.write(REG_MODE1, &[MODE1_AUTO_INCREMENT])?;
        debug!(prescale, "awake");
        Ok(())
    }

    /// Enter low-power sleep. Outputs stop; register contents are kept.
    pub fn sleep(&self) -> Result<()> {
        let mode1 = self.mode1()?;
        self.write(REG_MODE1, &[(mode1 & !MODE1_RESTART) | MODE1_SLEEP])
    }

    /// Program `channel`'s on/off counts in one block write.
    pub fn set_pwm(&self, channel: usize, on: u16, off: u16) -> Result<()> {
        if channel >= CHANNELS {
            return Err(HalError::InvalidChannel {
                driver: "pca9685".to_string(),
                channel,
            });
        }
        let block = pwm_block(on, off);
        debug!(address = self.address, channel, on, off, ?block, "set pwm");
        self.write(block_register(channel), &block)
    }

    /// Force every output fully off.
    ///
    /// Every block is attempted even if earlier ones fail. Returns the first failure.
    pub fn all_off(&self) -> Result<()> {
        let mut first = None;
        for channel in 0..CHANNELS {
            if let Err(e) = self.write(block_register(channel), &FULL_OFF) {
                warn!(address = self.address, channel, error = %e, "failed to turn output off");
                first.get_or_insert(e);
            }
        }
        first.map_or(Ok(()), Err)
    }
}
