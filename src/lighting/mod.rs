pub mod actuator;
pub mod schedule;
pub mod strip;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

pub use actuator::LightingActuator;
pub use strip::{SimulatedStrip, StripDriver, StripHandle};

/// 24-bit colour, serialized as `#RRGGBB`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const OFF: Rgb = Rgb::new(0, 0, 0);
    pub const WHITE: Rgb = Rgb::new(255, 255, 255);

    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    pub fn parse_hex(s: &str) -> Result<Self> {
        let hex = s.strip_prefix('#').unwrap_or(s);
        if hex.len() != 6 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(Error::invalid("led_color", format!("`{}` is not #RRGGBB", s)));
        }
        let channel = |i: usize| {
            u8::from_str_radix(&hex[i..i + 2], 16)
                .map_err(|e| Error::invalid("led_color", e.to_string()))
        };
        Ok(Self::new(channel(0)?, channel(2)?, channel(4)?))
    }

    pub fn to_hex(self) -> String {
        format!("#{:02X}{:02X}{:02X}", self.r, self.g, self.b)
    }
}

impl TryFrom<String> for Rgb {
    type Error = Error;

    fn try_from(s: String) -> Result<Self> {
        Self::parse_hex(&s)
    }
}

impl From<Rgb> for String {
    fn from(rgb: Rgb) -> Self {
        rgb.to_hex()
    }
}

/// Light strip state plus the day/night schedule, replaced wholesale
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LightingConfig {
    pub enabled: bool,
    pub color: Rgb,
    pub brightness: u8,
    pub schedule_enabled: bool,
    pub on_time: String,
    pub off_time: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_and_formats_hex_colors() {
        assert_eq!(Rgb::parse_hex("#FF8000").unwrap(), Rgb::new(255, 128, 0));
        assert_eq!(Rgb::parse_hex("00ff7f").unwrap(), Rgb::new(0, 255, 127));
        assert_eq!(Rgb::new(1, 2, 171).to_hex(), "#0102AB");

        for bad in ["#FFF", "#GGGGGG", "", "#FF80001"] {
            assert!(Rgb::parse_hex(bad).is_err(), "{bad}");
        }
    }

    #[test]
    fn serializes_as_hex_string() {
        let json = serde_json::to_string(&Rgb::new(16, 32, 48)).unwrap();
        assert_eq!(json, "\"#102030\"");
        let back: Rgb = serde_json::from_str(&json).unwrap();
        assert_eq!(back, Rgb::new(16, 32, 48));
    }
}
