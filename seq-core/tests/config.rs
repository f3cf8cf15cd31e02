use seq_core::{ConfigError, InstrumentConfig};

fn full_ports_toml() -> String {
    r#"
        [ports]
        x = "/dev/ttyUSB0"
        y = "/dev/ttyUSB1"
        fpgacmd = "/dev/ttyUSB2"
        fpgaresp = "/dev/ttyUSB3"
        laser_g = "/dev/ttyUSB4"
        laser_r = "/dev/ttyUSB5"
        valve_a1 = "/dev/ttyUSB6"
        valve_a2 = "/dev/ttyUSB7"
        valve_b1 = "/dev/ttyUSB8"
        valve_b2 = "/dev/ttyUSB9"
    "#
    .to_string()
}

#[test]
fn parses_minimal_config_with_defaults() {
    let cfg = InstrumentConfig::from_str(&full_ports_toml()).expect("should parse");
    assert_eq!(cfg.camera_poll_interval_ms, 10);
    assert_eq!(cfg.channel_deadline_ms, 5_000);
    assert_eq!(cfg.fpga_min_spacing_ms, 10);
    assert_eq!(cfg.ports.get("x").unwrap(), "/dev/ttyUSB0");
}

#[test]
fn overrides_tunables() {
    let mut toml = full_ports_toml();
    toml.push_str("camera_poll_interval_ms = 25\nfpga_min_spacing_ms = 50\n");
    let cfg = InstrumentConfig::from_str(&toml).expect("should parse");
    assert_eq!(cfg.camera_poll_interval().as_millis(), 25);
    assert_eq!(cfg.fpga_min_spacing().as_millis(), 50);
}

#[test]
fn rejects_missing_required_port() {
    let toml = r#"
        [ports]
        x = "/dev/ttyUSB0"
    "#;
    let err = InstrumentConfig::from_str(toml).unwrap_err();
    assert!(matches!(err, ConfigError::MissingPort("y") | ConfigError::MissingPort(_)));
}

#[test]
fn rejects_unknown_field() {
    let mut toml = full_ports_toml();
    toml.push_str("not_a_real_field = 1\n");
    let err = InstrumentConfig::from_str(&toml).unwrap_err();
    assert!(matches!(err, ConfigError::Parse(_)));
}
