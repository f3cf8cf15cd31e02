//! Instrument configuration (component I): the logical serial-port mapping
//! and instrument-wide tunables, loaded once before any channel is opened.

use std::collections::HashMap;
use std::time::Duration;

use serde::Deserialize;

use crate::error::ConfigError;

fn default_camera_poll_interval_ms() -> u64 {
    10
}

fn default_channel_deadline_ms() -> u64 {
    5_000
}

fn default_fpga_min_spacing_ms() -> u64 {
    10
}

/// Logical serial port names every rig must map to an OS device path.
pub const REQUIRED_PORTS: &[&str] = &[
    "x",
    "y",
    "fpgacmd",
    "fpgaresp",
    "laser_g",
    "laser_r",
    "valve_a1",
    "valve_a2",
    "valve_b1",
    "valve_b2",
];

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InstrumentConfig {
    pub ports: HashMap<String, String>,

    #[serde(default = "default_camera_poll_interval_ms")]
    pub camera_poll_interval_ms: u64,

    #[serde(default = "default_channel_deadline_ms")]
    pub channel_deadline_ms: u64,

    #[serde(default = "default_fpga_min_spacing_ms")]
    pub fpga_min_spacing_ms: u64,
}

impl InstrumentConfig {
    pub fn from_str(contents: &str) -> Result<Self, ConfigError> {
        let cfg: InstrumentConfig = toml::from_str(contents)?;
        cfg.check_required_ports()?;
        Ok(cfg)
    }

    pub fn from_path(path: impl AsRef<std::path::Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_str(&contents)
    }

    fn check_required_ports(&self) -> Result<(), ConfigError> {
        for name in REQUIRED_PORTS {
            if !self.ports.contains_key(*name) {
                return Err(ConfigError::MissingPort(name));
            }
        }
        Ok(())
    }

    pub fn camera_poll_interval(&self) -> Duration {
        Duration::from_millis(self.camera_poll_interval_ms)
    }

    pub fn channel_deadline(&self) -> Duration {
        Duration::from_millis(self.channel_deadline_ms)
    }

    pub fn fpga_min_spacing(&self) -> Duration {
        Duration::from_millis(self.fpga_min_spacing_ms)
    }
}
