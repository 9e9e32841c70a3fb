//! Sensor driver capability surface consumed by the capture pipeline

use std::sync::Arc;

use bytes::Bytes;

use crate::capture::config::SensorMode;
use crate::error::Result;

/// Invoked once per encoded frame, from the driver's capture thread
pub type FrameSink = Arc<dyn Fn(Bytes) + Send + Sync>;

/// Camera sensor plus its JPEG encoder
///
/// Calls may block on hardware I/O; the pipeline only ever issues them
/// from a blocking worker while holding its reconfiguration lock.
pub trait SensorDriver: Send + 'static {
    /// Human-readable name for logging
    fn name(&self) -> &str;

    /// Apply resolution, frame rate and controls. Encoding must be stopped.
    fn configure(&mut self, mode: &SensorMode) -> Result<()>;

    /// Begin producing frames, handing each one to `sink`
    fn start_encoding(&mut self, quality: u8, sink: FrameSink) -> Result<()>;

    /// Stop producing frames. After this returns `sink` is never invoked again.
    fn stop_encoding(&mut self) -> Result<()>;
}
