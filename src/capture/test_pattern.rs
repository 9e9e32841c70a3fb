//! Software sensor that renders a moving gradient and JPEG-encodes it

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use bytes::Bytes;
use image::codecs::jpeg::JpegEncoder;
use image::ExtendedColorType;
use tracing::{debug, info, warn};

use crate::capture::config::SensorMode;
use crate::capture::sensor::{FrameSink, SensorDriver};
use crate::error::{Error, Result};

/// Sensor that needs no hardware. Used by default and in tests.
#[derive(Default)]
pub struct TestPatternSensor {
    mode: Option<SensorMode>,
    worker: Option<Worker>,
}

struct Worker {
    stop: Arc<AtomicBool>,
    handle: JoinHandle<()>,
}

impl TestPatternSensor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_encoding(&self) -> bool {
        self.worker.is_some()
    }
}

impl SensorDriver for TestPatternSensor {
    fn name(&self) -> &str {
        "test-pattern"
    }

    fn configure(&mut self, mode: &SensorMode) -> Result<()> {
        if self.worker.is_some() {
            return Err(Error::hardware("cannot configure while encoding"));
        }
        debug!("Test pattern configured: {} @ {}fps", mode.resolution, mode.frame_rate);
        self.mode = Some(*mode);
        Ok(())
    }

    fn start_encoding(&mut self, quality: u8, sink: FrameSink) -> Result<()> {
        let mode = self
            .mode
            .ok_or_else(|| Error::hardware("sensor not configured"))?;
        if self.worker.is_some() {
            return Err(Error::hardware("encoder already running"));
        }

        let stop = Arc::new(AtomicBool::new(false));
        let worker_stop = stop.clone();
        let handle = thread::Builder::new()
            .name("test-pattern".into())
            .spawn(move || run(mode, quality, sink, worker_stop))
            .map_err(Error::hardware)?;

        info!(
            "Test pattern encoding started: {} @ {}fps q={}",
            mode.resolution, mode.frame_rate, quality
        );
        self.worker = Some(Worker { stop, handle });
        Ok(())
    }

    fn stop_encoding(&mut self) -> Result<()> {
        let Some(worker) = self.worker.take() else {
            return Ok(());
        };
        worker.stop.store(true, Ordering::Release);
        worker.handle.thread().unpark();
        worker
            .handle
            .join()
            .map_err(|_| Error::hardware("test pattern thread panicked"))?;
        debug!("Test pattern encoding stopped");
        Ok(())
    }
}

impl Drop for TestPatternSensor {
    fn drop(&mut self) {
        let _ = self.stop_encoding();
    }
}

fn run(mode: SensorMode, quality: u8, sink: FrameSink, stop: Arc<AtomicBool>) {
    let period = Duration::from_micros(u64::from(mode.controls.frame_duration_limits_us.0));
    let mut next = Instant::now();
    let mut tick: u32 = 0;

    while !stop.load(Ordering::Acquire) {
        match render(&mode, quality, tick) {
            Ok(jpeg) => sink(jpeg),
            Err(e) => warn!("Test pattern encode failed: {}", e),
        }
        tick = tick.wrapping_add(1);

        // Pace to the configured frame rate; unpark on stop cuts the wait short
        next += period;
        let now = Instant::now();
        if next > now {
            thread::park_timeout(next - now);
        } else {
            next = now;
        }
    }
}

/// Render one gradient frame, brightness scaled by analogue gain
fn render(mode: &SensorMode, quality: u8, tick: u32) -> Result<Bytes> {
    let width = mode.resolution.width;
    let height = mode.resolution.height;
    let gain = (mode.controls.analogue_gain / 4.0).clamp(0.25, 1.0);
    let shift = tick.wrapping_mul(4);

    let mut rgb = Vec::with_capacity((width * height * 3) as usize);
    for y in 0..height {
        for x in 0..width {
            let r = (x.wrapping_add(shift) % 256) as f32;
            let g = (y.wrapping_add(shift / 2) % 256) as f32;
            rgb.push((r * gain) as u8);
            rgb.push((g * gain) as u8);
            rgb.push((128.0 * gain) as u8);
        }
    }

    let mut out = Vec::new();
    JpegEncoder::new_with_quality(&mut out, quality)
        .encode(&rgb, width, height, ExtendedColorType::Rgb8)
        .map_err(Error::hardware)?;
    Ok(Bytes::from(out))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::config::{CaptureConfig, Resolution};
    use std::sync::Mutex;

    fn small_mode(frame_rate: u32) -> SensorMode {
        CaptureConfig {
            resolution: Resolution::new(32, 24),
            frame_rate,
            ..Default::default()
        }
        .sensor_mode()
    }

    #[test]
    fn renders_decodable_jpeg() {
        let jpeg = render(&small_mode(15), 70, 3).unwrap();
        assert_eq!(&jpeg[..2], &[0xFF, 0xD8]);
        assert_eq!(&jpeg[jpeg.len() - 2..], &[0xFF, 0xD9]);
    }

    #[test]
    fn refuses_to_start_unconfigured() {
        let mut sensor = TestPatternSensor::new();
        let sink: FrameSink = Arc::new(|_| {});
        assert!(matches!(
            sensor.start_encoding(70, sink),
            Err(Error::HardwareFault(_))
        ));
    }

    #[test]
    fn no_frames_after_stop_returns() {
        let frames = Arc::new(Mutex::new(0usize));
        let counter = frames.clone();
        let sink: FrameSink = Arc::new(move |_| *counter.lock().unwrap() += 1);

        let mut sensor = TestPatternSensor::new();
        sensor.configure(&small_mode(30)).unwrap();
        sensor.start_encoding(50, sink).unwrap();
        thread::sleep(Duration::from_millis(150));
        sensor.stop_encoding().unwrap();

        let produced = *frames.lock().unwrap();
        assert!(produced > 0);
        thread::sleep(Duration::from_millis(100));
        assert_eq!(*frames.lock().unwrap(), produced);
        assert!(!sensor.is_encoding());
    }
}
