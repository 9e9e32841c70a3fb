use tracing::info;
use v4l::{capability::Flags, video::Capture, Device, FourCC};

use crate::error::{Error, Result};

/// Find the first capture device that can emit MJPEG
pub fn auto_detect_device() -> Result<String> {
    use std::path::Path;

    info!("Auto-detecting capture devices...");

    for i in 0..10 {
        let path = format!("/dev/video{}", i);
        if !Path::new(&path).exists() {
            continue;
        }

        if let Ok(dev) = Device::with_path(&path) {
            if let Ok(caps) = dev.query_caps() {
                if !caps.capabilities.contains(Flags::VIDEO_CAPTURE) {
                    continue;
                }
                if let Ok(formats) = dev.enum_formats() {
                    if formats.iter().any(|fmt| fmt.fourcc == FourCC::new(b"MJPG")) {
                        info!("Found MJPEG device: {} - {}", path, caps.card);
                        return Ok(path);
                    }
                }
            }
        }
    }

    Err(Error::hardware("No MJPEG capture device found"))
}
