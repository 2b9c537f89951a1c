//! Plug drivers against an in-memory dialer.

use std::sync::Arc;

use iohal_core::{
    AnalogInputDriver, AnalogInputPin, Capability, Configuration, DigitalOutputDriver,
    DigitalOutputPin, Driver, DriverFactory, DriverState, HalError, MockBus, MockDialer,
    Transport, TransportError,
};
use iohal_driver_tplink::protocol::{decrypt, frame};
use iohal_driver_tplink::{PlugClient, PlugDriver, PlugFactory};

fn params() -> Configuration {
    toml::toml! { Address = "10.0.0.7:9999" }
}

fn build(factory: &PlugFactory) -> (MockDialer, Box<dyn Driver>) {
    let dialer = MockDialer::new();
    let driver = factory
        .build(&params(), Transport::Network(Arc::new(dialer.clone())))
        .unwrap();
    (dialer, driver)
}

fn sent_json(bytes: &[u8]) -> serde_json::Value {
    let len = u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as usize;
    assert_eq!(len, bytes.len() - 4);
    serde_json::from_slice(&decrypt(&bytes[4..])).unwrap()
}

#[test]
fn build_performs_no_io() {
    let (dialer, driver) = build(&PlugFactory::hs103());
    assert!(dialer.sessions().is_empty());
    assert_eq!(driver.metadata().name(), "tplink-hs103");
}

#[test]
fn build_requires_network_transport() {
    let err = PlugFactory::hs103()
        .build(&params(), Transport::I2c(Arc::new(MockBus::new())))
        .err()
        .unwrap();
    assert!(matches!(err, HalError::WrongTransport { expected: "network", .. }));
}

#[test]
fn write_sends_relay_command() {
    let (dialer, driver) = build(&PlugFactory::hs103());
    let out = driver
        .as_digital_output()
        .unwrap()
        .digital_output_pin(0)
        .unwrap();

    out.write(true).unwrap();
    assert!(out.last_state());
    out.write(false).unwrap();
    assert!(!out.last_state());

    let sessions = dialer.sessions();
    assert_eq!(sessions.len(), 2);
    assert_eq!(sessions[0].0, "10.0.0.7:9999");
    assert_eq!(
        sent_json(&sessions[0].1),
        serde_json::json!({"system": {"set_relay_state": {"state": 1}}})
    );
    assert_eq!(
        sent_json(&sessions[1].1),
        serde_json::json!({"system": {"set_relay_state": {"state": 0}}})
    );
}

#[test]
fn failed_write_keeps_last_state() {
    let (dialer, driver) = build(&PlugFactory::hs103());
    let out = driver
        .as_digital_output()
        .unwrap()
        .digital_output_pin(0)
        .unwrap();

    dialer.fail_next_dials(1);
    let err = out.write(true).unwrap_err();
    assert!(matches!(err, HalError::Transport(TransportError::Timeout(_))));
    assert!(!out.last_state());
}

#[test]
fn hs103_has_no_analog_input() {
    let (_dialer, driver) = build(&PlugFactory::hs103());
    assert_eq!(driver.pins(Capability::DigitalOutput).unwrap().len(), 1);
    assert!(matches!(
        driver.pins(Capability::AnalogInput),
        Err(HalError::UnsupportedCapability(Capability::AnalogInput))
    ));
    assert!(driver.as_analog_input().is_none());
    assert!(matches!(
        driver.as_digital_output().unwrap().digital_output_pin(1),
        Err(HalError::InvalidChannel { channel: 1, .. })
    ));
}

#[test]
fn hs110_reads_current() {
    let (dialer, driver) = build(&PlugFactory::hs110());
    dialer.queue_response(frame(
        br#"{"emeter":{"get_realtime":{"current":0.42,"voltage":230.1,"power":96.6,"total":1.2,"err_code":0}}}"#,
    ));

    let pin = driver.as_analog_input().unwrap().analog_input_pin(0).unwrap();
    assert_eq!(pin.measure().unwrap(), 0.42);
    assert_eq!(
        sent_json(&dialer.sessions()[0].1),
        serde_json::json!({"emeter": {"get_realtime": {}}})
    );
}

#[test]
fn truncated_reply_is_an_error() {
    let (dialer, driver) = build(&PlugFactory::hs110());
    dialer.queue_response(vec![0, 0, 0, 50, 0xD0]);

    let pin = driver.as_analog_input().unwrap().analog_input_pin(0).unwrap();
    assert!(matches!(pin.read(), Err(HalError::Transport(_))));
}

#[test]
fn info_parses_sysinfo() {
    let dialer = MockDialer::new();
    dialer.queue_response(frame(
        br#"{"system":{"get_sysinfo":{"alias":"return pump","model":"HS103(US)","relay_state":1,"rssi":-61}}}"#,
    ));
    let factory = PlugFactory::hs103();
    let driver = PlugDriver::new(
        factory.metadata().clone(),
        PlugClient::new(Arc::new(dialer.clone()), "10.0.0.7:9999"),
    );

    let info = driver.info().unwrap();
    assert_eq!(info.alias, "return pump");
    assert_eq!(info.model, "HS103(US)");
    assert_eq!(info.relay_state, 1);
    assert_eq!(info.rssi, -61.0);
    assert!(matches!(
        driver.realtime(),
        Err(HalError::UnsupportedCapability(Capability::AnalogInput))
    ));
}

#[test]
fn close_twice_is_ok() {
    let (dialer, driver) = build(&PlugFactory::hs103());
    driver.close().unwrap();
    driver.close().unwrap();
    assert_eq!(driver.state(), DriverState::Closed);

    let out = driver
        .as_digital_output()
        .unwrap()
        .digital_output_pin(0)
        .unwrap();
    assert!(matches!(out.write(true), Err(HalError::Closed(_))));
    assert!(dialer.sessions().is_empty());
}
