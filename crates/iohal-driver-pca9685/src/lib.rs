//! NXP PCA9685 PWM controller driver for iohal.
//!
//! - [`Pca9685`]: register-level chip access (wake, sleep, per-channel PWM blocks)
//! - [`Pca9685Factory`]: builds a [`Pca9685Driver`] exposing sixteen PWM / digital output pins
//!
//! # Usage
//!
//! ```rust,ignore
//! use iohal_driver_pca9685::register_all;
//!
//! register_all(&registry);
//! ```

pub mod device;
mod pca9685;

pub use device::{pwm_block, prescale, Pca9685, CHANNELS, FULL_OFF, FULL_ON};
pub use pca9685::{duty_to_count, Pca9685Channel, Pca9685Config, Pca9685Driver, Pca9685Factory};

use iohal_core::FactoryRegistry;

/// Register every factory in this crate.
pub fn register_all(registry: &impl FactoryRegistry) {
    registry.register_factory(Box::new(Pca9685Factory::new()));
}
