//! User-adjustable settings: the persisted record and its controller

pub mod controller;
pub mod store;
pub mod value;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::warn;

use crate::capture::config::{
    CaptureConfig, Resolution, MAX_FRAME_RATE, MAX_ISO, MAX_QUALITY, MIN_FRAME_RATE, MIN_ISO,
    MIN_QUALITY,
};
use crate::error::Result;
use crate::lighting::{schedule, LightingConfig, Rgb};

pub use controller::{ApplyOutcome, Fault, Rejection, SettingsController};
pub use store::{JsonFileStore, MemoryStore, SettingsStore};

/// Which part of the system a setting feeds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettingGroup {
    Capture,
    Lighting,
    Schedule,
}

/// Every user setting, keyed on the wire by its field name
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SettingsRecord {
    pub iso: u32,
    pub framerate: u32,
    #[serde(with = "value::resolution_csv")]
    pub resolution: Resolution,
    pub quality: u8,
    pub led_color: Rgb,
    pub led_brightness: u8,
    pub camera_on: bool,
    pub led_on: bool,
    pub led_on_time: String,
    pub led_off_time: String,
    pub schedule_enabled: bool,
}

impl Default for SettingsRecord {
    fn default() -> Self {
        Self {
            iso: 400,
            framerate: 15,
            resolution: Resolution::new(640, 480),
            quality: 70,
            led_color: Rgb::WHITE,
            led_brightness: 255,
            camera_on: true,
            led_on: false,
            led_on_time: "18:00".into(),
            led_off_time: "06:00".into(),
            schedule_enabled: false,
        }
    }
}

impl SettingsRecord {
    /// Rebuild a record from stored values. Each field goes through the
    /// same validation as an update; a bad value keeps its default.
    pub fn from_stored(values: &Map<String, Value>) -> Self {
        let mut record = Self::default();
        for (key, value) in values {
            if let Err(e) = record.merge(key, value) {
                warn!("Stored setting ignored, using default: {}", e);
            }
        }
        record
    }

    /// Validate `value` for `key` and store it.
    ///
    /// Returns the group the key belongs to, or `None` for unknown keys,
    /// which are left untouched.
    pub fn merge(&mut self, key: &str, value: &Value) -> Result<Option<SettingGroup>> {
        let group = match key {
            "iso" => {
                self.iso = value::ranged(key, value, MIN_ISO, MAX_ISO)?;
                SettingGroup::Capture
            }
            "framerate" => {
                self.framerate = value::ranged(key, value, MIN_FRAME_RATE, MAX_FRAME_RATE)?;
                SettingGroup::Capture
            }
            "resolution" => {
                self.resolution = value::parse_resolution(value::string(key, value)?)?;
                SettingGroup::Capture
            }
            "quality" => {
                self.quality =
                    value::ranged(key, value, MIN_QUALITY.into(), MAX_QUALITY.into())? as u8;
                SettingGroup::Capture
            }
            "camera_on" => {
                self.camera_on = value::boolean(key, value)?;
                SettingGroup::Capture
            }
            "led_color" => {
                self.led_color = Rgb::parse_hex(value::string(key, value)?)?;
                SettingGroup::Lighting
            }
            "led_brightness" => {
                self.led_brightness = value::ranged(key, value, 0, 255)? as u8;
                SettingGroup::Lighting
            }
            "led_on" => {
                self.led_on = value::boolean(key, value)?;
                SettingGroup::Lighting
            }
            "led_on_time" | "led_off_time" => {
                let time = value::string(key, value)?;
                schedule::parse_time(key, time)?;
                if key == "led_on_time" {
                    self.led_on_time = time.to_string();
                } else {
                    self.led_off_time = time.to_string();
                }
                SettingGroup::Schedule
            }
            "schedule_enabled" => {
                self.schedule_enabled = value::boolean(key, value)?;
                SettingGroup::Schedule
            }
            _ => return Ok(None),
        };
        Ok(Some(group))
    }

    pub fn capture_config(&self) -> CaptureConfig {
        CaptureConfig {
            resolution: self.resolution,
            frame_rate: self.framerate,
            iso: self.iso,
            jpeg_quality: self.quality,
            enabled: self.camera_on,
        }
    }

    pub fn lighting_config(&self) -> LightingConfig {
        LightingConfig {
            enabled: self.led_on,
            color: self.led_color,
            brightness: self.led_brightness,
            schedule_enabled: self.schedule_enabled,
            on_time: self.led_on_time.clone(),
            off_time: self.led_off_time.clone(),
        }
    }
}
