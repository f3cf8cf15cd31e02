//! The camera pair (component F) and the driver backend abstraction
//! (component K).

pub mod backend;
pub mod device;
pub mod mock;
pub mod pair;

pub use backend::{CaptureMode, DcamBackend, RealDcam};
pub use device::{SensorMode, AREA_EXPOSURE_TIME_S, BUNDLE_HEIGHT, IMG_WIDTH, TDI_EXPOSURE_TIME_S};
pub use mock::MockDcam;
pub use pair::{CameraPair, CHANNEL_REMAP};
