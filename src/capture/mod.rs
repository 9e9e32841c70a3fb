pub mod config;
pub mod frame;
pub mod sensor;
pub mod test_pattern;
#[cfg(feature = "v4l2")]
pub mod v4l2;

pub use config::{CaptureConfig, Resolution, SensorControls, SensorMode};
pub use frame::{Frame, FrameMetadata};
pub use sensor::{FrameSink, SensorDriver};
pub use test_pattern::TestPatternSensor;
#[cfg(feature = "v4l2")]
pub use v4l2::V4l2Sensor;
