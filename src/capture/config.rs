//! Capture configuration and the sensor controls derived from it

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

pub const MIN_FRAME_RATE: u32 = 1;
pub const MAX_FRAME_RATE: u32 = 30;
pub const MIN_QUALITY: u8 = 1;
pub const MAX_QUALITY: u8 = 100;
pub const MIN_ISO: u32 = 100;
pub const MAX_ISO: u32 = 1600;
pub const MAX_DIMENSION: u32 = 4096;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

impl std::fmt::Display for Resolution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Complete capture configuration, replaced wholesale on every change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptureConfig {
    pub resolution: Resolution,
    pub frame_rate: u32,
    pub iso: u32,
    pub jpeg_quality: u8,
    pub enabled: bool,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            resolution: Resolution::new(640, 480),
            frame_rate: 15,
            iso: 400,
            jpeg_quality: 70,
            enabled: true,
        }
    }
}

impl CaptureConfig {
    pub fn validate(&self) -> Result<()> {
        let Resolution { width, height } = self.resolution;
        if width == 0 || height == 0 || width > MAX_DIMENSION || height > MAX_DIMENSION {
            return Err(Error::invalid(
                "resolution",
                format!("{} outside 1..={} per side", self.resolution, MAX_DIMENSION),
            ));
        }
        if !(MIN_FRAME_RATE..=MAX_FRAME_RATE).contains(&self.frame_rate) {
            return Err(Error::invalid(
                "framerate",
                format!(
                    "{} outside {}..={}",
                    self.frame_rate, MIN_FRAME_RATE, MAX_FRAME_RATE
                ),
            ));
        }
        if !(MIN_QUALITY..=MAX_QUALITY).contains(&self.jpeg_quality) {
            return Err(Error::invalid(
                "quality",
                format!(
                    "{} outside {}..={}",
                    self.jpeg_quality, MIN_QUALITY, MAX_QUALITY
                ),
            ));
        }
        if !(MIN_ISO..=MAX_ISO).contains(&self.iso) {
            return Err(Error::invalid(
                "iso",
                format!("{} outside {}..={}", self.iso, MIN_ISO, MAX_ISO),
            ));
        }
        Ok(())
    }

    /// Frame period in microseconds
    pub fn frame_duration_us(&self) -> u32 {
        1_000_000 / self.frame_rate.max(1)
    }

    /// Sensor mode for this configuration
    pub fn sensor_mode(&self) -> SensorMode {
        let frame_us = self.frame_duration_us();
        SensorMode {
            resolution: self.resolution,
            frame_rate: self.frame_rate,
            controls: SensorControls {
                analogue_gain: self.iso as f32 / 100.0,
                exposure_time_us: frame_us,
                frame_duration_limits_us: (frame_us, frame_us),
                auto_exposure: true,
                auto_white_balance: true,
            },
        }
    }
}

/// What the sensor driver is asked to configure before encoding starts
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SensorMode {
    pub resolution: Resolution,
    pub frame_rate: u32,
    pub controls: SensorControls,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SensorControls {
    pub analogue_gain: f32,
    pub exposure_time_us: u32,
    pub frame_duration_limits_us: (u32, u32),
    pub auto_exposure: bool,
    pub auto_white_balance: bool,
}
