//! Per-camera constants and data (component F, the non-worker half: the
//! worker itself lives in [`crate::camera::pair`]).

pub const IMG_WIDTH: usize = 4096;
pub const BUNDLE_HEIGHT: usize = 128;
pub const TDI_EXPOSURE_TIME_S: f64 = 0.002568533333333333;
pub const AREA_EXPOSURE_TIME_S: f64 = 0.005025378;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorMode {
    Area,
    Line,
    Tdi,
    PartialArea,
    FocusSweep,
}

impl SensorMode {
    /// Vendor-defined numeric code for `sensor_mode`.
    pub fn code(self) -> f64 {
        match self {
            SensorMode::Area => 1.0,
            SensorMode::Line => 2.0,
            SensorMode::Tdi => 4.0,
            SensorMode::PartialArea => 3.0,
            SensorMode::FocusSweep => 5.0,
        }
    }
}
