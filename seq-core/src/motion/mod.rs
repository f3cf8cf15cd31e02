//! Motion axes (component D): X/Y stages, the Z-tilt trio, and the
//! Z-objective.

pub mod axis;
pub mod objective;
pub mod tilt;

pub use axis::Axis;
pub use objective::{AfArmGuard, Objective};
pub use tilt::TiltStage;
