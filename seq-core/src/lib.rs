//! Coordinated control core for the instrument: valves, motion axes, optics,
//! the camera pair, and the imaging orchestrator, wired together by
//! [`instrument::Instrument`].

pub mod camera;
pub mod config;
pub mod error;
pub mod instrument;
pub mod motion;
pub mod optics;
pub mod orchestrator;
pub mod tdi;
pub mod valve;

pub use config::InstrumentConfig;
pub use error::{ConfigError, Error};
pub use instrument::Instrument;
pub use orchestrator::{Orchestrator, StateSnapshot};
