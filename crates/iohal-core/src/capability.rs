//! Capabilities and descriptive metadata.
//!
//! A [`Capability`] names one functional role a device can play. Drivers advertise the set
//! they support through [`Metadata`], and callers discover support with
//! [`Metadata::has_capability`] instead of inspecting concrete driver types.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{HalError, Result};

/// Functional role a pin or driver may support.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    /// Reads a numeric value (ADC channel, sensor).
    AnalogInput,
    /// Reads an on/off level.
    DigitalInput,
    /// Drives an on/off level (relay, smart plug).
    DigitalOutput,
    /// Drives a duty cycle in percent.
    Pwm,
}

impl Capability {
    /// Every capability, in declaration order.
    pub const ALL: [Capability; 4] = [
        Capability::AnalogInput,
        Capability::DigitalInput,
        Capability::DigitalOutput,
        Capability::Pwm,
    ];

    /// Human-readable name
    pub fn name(&self) -> &'static str {
        match self {
            Self::AnalogInput => "Analog Input",
            Self::DigitalInput => "Digital Input",
            Self::DigitalOutput => "Digital Output",
            Self::Pwm => "PWM",
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Name, description and capability set of a driver or driver family.
///
/// Metadata is a value type. It is built once per factory and copied into each driver the
/// factory constructs; nothing mutates it afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metadata {
    name: String,
    description: String,
    capabilities: Vec<Capability>,
}

impl Metadata {
    /// Create metadata. Duplicate capabilities are collapsed, order is preserved.
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        capabilities: &[Capability],
    ) -> Self {
        let mut caps: Vec<Capability> = Vec::with_capacity(capabilities.len());
        for cap in capabilities {
            if !caps.contains(cap) {
                caps.push(*cap);
            }
        }
        Self {
            name: name.into(),
            description: description.into(),
            capabilities: caps,
        }
    }

    /// Short device family name, e.g. `ADS1115`.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// One-line description.
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Supported capabilities, in the order the driver declared them.
    pub fn capabilities(&self) -> &[Capability] {
        &self.capabilities
    }

    /// True iff `capability` is in the capability set.
    pub fn has_capability(&self, capability: Capability) -> bool {
        self.capabilities.contains(&capability)
    }

    /// Fail with [`HalError::UnsupportedCapability`] unless `capability` is supported.
    pub fn require(&self, capability: Capability) -> Result<()> {
        if self.has_capability(capability) {
            Ok(())
        } else {
            Err(HalError::UnsupportedCapability(capability))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capability_name() {
        assert_eq!(Capability::AnalogInput.name(), "Analog Input");
        assert_eq!(Capability::Pwm.to_string(), "PWM");
    }

    #[test]
    fn test_capability_serde() {
        let json = serde_json::to_string(&Capability::DigitalOutput).unwrap();
        assert_eq!(json, "\"digital_output\"");

        let cap: Capability = serde_json::from_str("\"analog_input\"").unwrap();
        assert_eq!(cap, Capability::AnalogInput);
    }

    #[test]
    fn test_has_capability() {
        let meta = Metadata::new(
            "pca9685",
            "Supports one PCA9685 chip",
            &[Capability::Pwm, Capability::DigitalOutput, Capability::Pwm],
        );
        assert_eq!(
            meta.capabilities(),
            &[Capability::Pwm, Capability::DigitalOutput]
        );
        assert!(meta.has_capability(Capability::Pwm));
        assert!(meta.has_capability(Capability::DigitalOutput));
        assert!(!meta.has_capability(Capability::AnalogInput));
        assert!(!meta.has_capability(Capability::DigitalInput));
    }

    #[test]
    fn test_require_unsupported() {
        let meta = Metadata::new("ADS1015", "Supports ADS1015 ADC", &[Capability::AnalogInput]);
        assert!(meta.require(Capability::AnalogInput).is_ok());
        assert!(matches!(
            meta.require(Capability::DigitalOutput),
            Err(HalError::UnsupportedCapability(Capability::DigitalOutput))
        ));
    }
}
