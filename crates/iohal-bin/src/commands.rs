//! Subcommand implementations.

use anyhow::{anyhow, bail, Context, Result};
use std::path::Path;
use std::sync::Arc;

use iohal_core::{
    AnalogInputDriver, AnalogInputPin, Capability, DigitalInputDriver, DigitalInputPin,
    DigitalOutputDriver, DigitalOutputPin, Driver, PwmDriver, PwmPin,
};
use iohal_hardware::{
    register_builtin_factories, DeviceRegistry, HardwareConfig, MockTransports, TransportProvider,
};
use tracing::info;

use crate::transports::SystemTransports;

/// Registry holding every builtin factory.
pub fn registry() -> DeviceRegistry {
    let registry = DeviceRegistry::new();
    register_builtin_factories(&registry);
    registry
}

pub fn factories(registry: &DeviceRegistry, json: bool) -> Result<()> {
    let infos = registry.list_factory_info();
    if json {
        println!("{}", serde_json::to_string_pretty(&infos)?);
        return Ok(());
    }

    println!("{:<14} {:<9} CAPABILITIES", "DRIVER", "TRANSPORT");
    for info in infos {
        let capabilities: Vec<&str> = info
            .metadata
            .capabilities()
            .iter()
            .map(Capability::name)
            .collect();
        println!(
            "{:<14} {:<9} {}",
            info.driver_type,
            info.transport.name(),
            capabilities.join(", ")
        );
    }
    Ok(())
}

pub fn describe(registry: &DeviceRegistry, driver: &str, json: bool) -> Result<()> {
    let info = registry.factory_info(driver).ok_or_else(|| {
        anyhow!(
            "unknown driver type '{driver}'. Available: {}",
            registry.list_factories().join(", ")
        )
    })?;
    if json {
        println!("{}", serde_json::to_string_pretty(&info)?);
        return Ok(());
    }

    println!("{} - {}", info.metadata.name(), info.metadata.description());
    println!("transport: {}", info.transport);
    let capabilities: Vec<&str> = info
        .metadata
        .capabilities()
        .iter()
        .map(Capability::name)
        .collect();
    println!("capabilities: {}", capabilities.join(", "));
    println!("parameters:");
    let mut parameters = info.parameters;
    parameters.sort_by_key(|p| p.order);
    for parameter in parameters {
        println!(
            "  {:<12} {:<8} default {}",
            parameter.name,
            parameter.kind.to_string(),
            parameter.default
        );
    }
    Ok(())
}

pub fn validate(registry: &DeviceRegistry, file: &Path) -> Result<()> {
    let config = HardwareConfig::from_file(file)
        .with_context(|| format!("failed to load {}", file.display()))?;
    let failures = registry.validate_config(&config);

    for device in &config.devices {
        match failures.iter().find(|f| f.device_id == device.id) {
            Some(failure) => println!("✗ {} ({}): {}", device.id, device.driver, failure.error),
            None => println!("✓ {} ({})", device.id, device.driver),
        }
    }

    if failures.is_empty() {
        Ok(())
    } else {
        bail!(
            "{} of {} device(s) failed validation",
            failures.len(),
            config.devices.len()
        )
    }
}

/// Build the one device `id` from the hardware file.
pub fn open_device(
    registry: &DeviceRegistry,
    file: &Path,
    mock: bool,
    id: &str,
) -> Result<Arc<dyn Driver>> {
    let config = HardwareConfig::from_file(file)
        .with_context(|| format!("failed to load {}", file.display()))?;
    let device = config
        .device(id)
        .ok_or_else(|| anyhow!("no device '{id}' in {}", file.display()))?;
    let kind = registry
        .factory_info(&device.driver)
        .map(|info| info.transport)
        .ok_or_else(|| anyhow!("unknown driver type '{}'", device.driver))?;

    let transports: Box<dyn TransportProvider> = if mock || config.mock {
        info!("using in-memory transports");
        Box::new(MockTransports::new())
    } else {
        Box::new(SystemTransports::new())
    };
    let transport = transports
        .transport(kind, device)
        .with_context(|| format!("failed to open {kind} transport for '{id}'"))?;

    registry
        .create_device(&device.id, &device.driver, &device.config, transport)
        .with_context(|| format!("failed to create device '{id}'"))
}

pub fn read(driver: &dyn Driver, pin: usize, raw: bool) -> Result<()> {
    if let Some(analog) = driver.as_analog_input() {
        let pin = analog.analog_input_pin(pin)?;
        let value = if raw { pin.read()? } else { pin.measure()? };
        println!("{value}");
        return Ok(());
    }
    if let Some(digital) = driver.as_digital_input() {
        let level = digital.digital_input_pin(pin)?.read()?;
        println!("{}", if level { "on" } else { "off" });
        return Ok(());
    }
    bail!("{} has no readable pins", driver.metadata().name())
}

pub fn write(driver: &dyn Driver, pin: usize, state: bool) -> Result<()> {
    let output = driver
        .as_digital_output()
        .ok_or_else(|| anyhow!("{} has no digital outputs", driver.metadata().name()))?;
    output.digital_output_pin(pin)?.write(state)?;
    Ok(())
}

pub fn set(driver: &dyn Driver, pin: usize, duty: f64) -> Result<()> {
    let pwm = driver
        .as_pwm()
        .ok_or_else(|| anyhow!("{} has no PWM outputs", driver.metadata().name()))?;
    pwm.pwm_pin(pin)?.set(duty)?;
    Ok(())
}

/// Parse an on/off level.
pub fn parse_level(text: &str) -> Result<bool, String> {
    match text.to_ascii_lowercase().as_str() {
        "on" | "true" | "1" | "high" => Ok(true),
        "off" | "false" | "0" | "low" => Ok(false),
        other => Err(format!("expected on/off, got '{other}'")),
    }
}
