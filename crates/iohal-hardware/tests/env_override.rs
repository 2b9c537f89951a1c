//! Environment overrides. Kept in its own test binary because it mutates the process
//! environment.

use iohal_hardware::HardwareConfig;

#[test]
fn iohal_mock_overrides_file() {
    let text = r#"
        mock = false

        [[devices]]
        id = "io"
        driver = "mock-digital"
    "#;
    assert!(!HardwareConfig::from_toml_str(text).unwrap().mock);

    std::env::set_var("IOHAL_MOCK", "true");
    let config = HardwareConfig::from_toml_str(text).unwrap();
    std::env::remove_var("IOHAL_MOCK");

    assert!(config.mock);
    assert_eq!(config.devices.len(), 1);
}
