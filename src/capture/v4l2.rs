//! V4L2 MJPEG sensor backend

use std::io::{self, ErrorKind};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use bytes::Bytes;
use tracing::{debug, info, instrument, warn};
use v4l::buffer::Type;
use v4l::capability::Flags as CapFlags;
use v4l::io::traits::CaptureStream;
use v4l::prelude::MmapStream;
use v4l::video::capture::Parameters;
use v4l::video::Capture;
use v4l::{Device, FourCC};

use crate::capture::config::SensorMode;
use crate::capture::sensor::{FrameSink, SensorDriver};
use crate::error::{Error, Result};

const BUFFER_COUNT: u32 = 4;
/// Longest a dequeue may block before the stop flag is checked again
const DEQUEUE_TIMEOUT: Duration = Duration::from_millis(500);

/// Camera exposed through V4L2 that can emit MJPEG directly
pub struct V4l2Sensor {
    path: String,
    mode: Option<SensorMode>,
    worker: Option<Worker>,
}

struct Worker {
    stop: Arc<AtomicBool>,
    handle: JoinHandle<()>,
}

impl V4l2Sensor {
    /// Open the device once to verify it can capture
    pub fn new(path: impl Into<String>) -> Result<Self> {
        let path = path.into();
        info!("Initializing V4L2 sensor: {}", path);

        let device = Device::with_path(&path).map_err(Error::hardware)?;
        let caps = device.query_caps().map_err(Error::hardware)?;
        info!("Device: {} ({})", caps.card, caps.driver);

        if !caps.capabilities.contains(CapFlags::VIDEO_CAPTURE) {
            return Err(Error::hardware(format!(
                "{} doesn't support video capture",
                path
            )));
        }

        Ok(Self {
            path,
            mode: None,
            worker: None,
        })
    }
}

/// Open the device and apply format and frame interval
fn open_configured(path: &str, mode: &SensorMode) -> Result<Device> {
    let device = Device::with_path(path).map_err(Error::hardware)?;

    let mut fmt = device.format().map_err(Error::hardware)?;
    fmt.width = mode.resolution.width;
    fmt.height = mode.resolution.height;
    fmt.fourcc = FourCC::new(b"MJPG");
    let applied = device.set_format(&fmt).map_err(Error::hardware)?;

    if applied.fourcc != FourCC::new(b"MJPG") {
        return Err(Error::hardware(format!("{} does not offer MJPEG", path)));
    }
    if applied.width != mode.resolution.width || applied.height != mode.resolution.height {
        return Err(Error::hardware(format!(
            "{} rejected {}, offered {}x{}",
            path, mode.resolution, applied.width, applied.height
        )));
    }

    device
        .set_params(&Parameters::with_fps(mode.frame_rate))
        .map_err(Error::hardware)?;

    Ok(device)
}

impl SensorDriver for V4l2Sensor {
    fn name(&self) -> &str {
        &self.path
    }

    #[instrument(skip(self))]
    fn configure(&mut self, mode: &SensorMode) -> Result<()> {
        if self.worker.is_some() {
            return Err(Error::hardware("cannot configure while encoding"));
        }
        // Open now so a bad mode fails here rather than on the capture thread
        open_configured(&self.path, mode)?;
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
        // Compression happens on the device; the requested level is advisory
        debug!("V4L2 JPEG quality {} is device-determined", quality);

        let stop = Arc::new(AtomicBool::new(false));
        let worker_stop = stop.clone();
        let path = self.path.clone();
        let (ready_tx, ready_rx) = mpsc::channel::<Result<()>>();

        let handle = thread::Builder::new()
            .name("v4l2-capture".into())
            .spawn(move || {
                let device = match open_configured(&path, &mode) {
                    Ok(device) => device,
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };
                let mut stream =
                    match MmapStream::with_buffers(&device, Type::VideoCapture, BUFFER_COUNT) {
                        Ok(stream) => stream,
                        Err(e) => {
                            let _ = ready_tx.send(Err(Error::hardware(e)));
                            return;
                        }
                    };
                stream.set_timeout(DEQUEUE_TIMEOUT);
                let _ = ready_tx.send(Ok(()));

                while !worker_stop.load(Ordering::Acquire) {
                    match stream.next() {
                        Ok((buf, meta)) => {
                            let used = (meta.bytesused as usize).min(buf.len());
                            sink(Bytes::copy_from_slice(&buf[..used]));
                        }
                        Err(e) if !ends_capture(&e) => {
                            debug!("No frame from {} within {:?}: {}", path, DEQUEUE_TIMEOUT, e);
                        }
                        Err(e) => {
                            warn!("V4L2 dequeue failed: {}", e);
                            break;
                        }
                    }
                }
            })
            .map_err(Error::hardware)?;

        match ready_rx.recv() {
            Ok(Ok(())) => {
                info!(
                    "Capture stream started with {} buffers: {} @ {}fps",
                    BUFFER_COUNT, mode.resolution, mode.frame_rate
                );
                self.worker = Some(Worker { stop, handle });
                Ok(())
            }
            Ok(Err(e)) => {
                let _ = handle.join();
                Err(e)
            }
            Err(_) => {
                let _ = handle.join();
                Err(Error::hardware("capture thread exited during startup"))
            }
        }
    }

    fn stop_encoding(&mut self) -> Result<()> {
        let Some(worker) = self.worker.take() else {
            return Ok(());
        };
        worker.stop.store(true, Ordering::Release);
        // A dequeue gives up after DEQUEUE_TIMEOUT, so the join is bounded
        worker
            .handle
            .join()
            .map_err(|_| Error::hardware("capture thread panicked"))?;
        debug!("V4L2 capture stopped");
        Ok(())
    }
}

/// Whether a failed dequeue should stop the capture thread. Timeouts and
/// interrupted waits only mean no frame arrived yet.
fn ends_capture(e: &io::Error) -> bool {
    !matches!(e.kind(), ErrorKind::TimedOut | ErrorKind::Interrupted)
}

impl Drop for V4l2Sensor {
    fn drop(&mut self) {
        let _ = self.stop_encoding();
    }
}
