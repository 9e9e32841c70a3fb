//! Drives the light strip from a lighting config

use std::sync::Mutex;

use tracing::{info, warn};

use crate::error::{Error, Result};
use crate::lighting::{LightingConfig, Rgb, StripDriver};

/// Serializes every strip update; each apply ends in exactly one `show`
pub struct LightingActuator {
    strip: Mutex<Strip>,
}

struct Strip {
    driver: Box<dyn StripDriver>,
    // What the LEDs display after the last successful show, if known
    shown: Option<Output>,
}

/// Pixel colour plus brightness, when it is written
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Output {
    color: Rgb,
    brightness: Option<u8>,
}

impl Output {
    const OFF: Output = Output {
        color: Rgb::OFF,
        brightness: None,
    };

    fn of(config: &LightingConfig) -> Self {
        if config.enabled {
            Output {
                color: config.color,
                brightness: Some(config.brightness),
            }
        } else {
            Output::OFF
        }
    }
}

impl LightingActuator {
    pub fn new(strip: Box<dyn StripDriver>) -> Self {
        Self {
            strip: Mutex::new(Strip {
                driver: strip,
                shown: None,
            }),
        }
    }

    /// Fill the strip with the configured colour and brightness, or blank it
    pub fn apply(&self, config: &LightingConfig) -> Result<()> {
        self.fill(Output::of(config))
    }

    /// Blank every pixel. Brightness is left alone so the next `apply`
    /// restores the exact previous look.
    pub fn off(&self) -> Result<()> {
        self.fill(Output::OFF)?;
        info!("Light strip off");
        Ok(())
    }

    /// Whether the strip already displays `config`. False after a failed
    /// show or before the first one.
    pub fn is_showing(&self, config: &LightingConfig) -> bool {
        self.strip
            .lock()
            .map(|strip| strip.shown == Some(Output::of(config)))
            .unwrap_or(false)
    }

    fn fill(&self, output: Output) -> Result<()> {
        let mut strip = self
            .strip
            .lock()
            .map_err(|_| Error::hardware("strip lock poisoned"))?;
        let Strip { driver, shown } = &mut *strip;

        for index in 0..driver.len() {
            driver.set_pixel(index, output.color);
        }
        if let Some(level) = output.brightness {
            driver.set_brightness(level);
        }
        match driver.show() {
            Ok(()) => {
                *shown = Some(output);
                Ok(())
            }
            Err(e) => {
                warn!("Strip update skipped: {}", e);
                *shown = None;
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lighting::SimulatedStrip;

    fn config(enabled: bool) -> LightingConfig {
        LightingConfig {
            enabled,
            color: Rgb::new(10, 200, 30),
            brightness: 90,
            schedule_enabled: false,
            on_time: "18:00".into(),
            off_time: "06:00".into(),
        }
    }

    #[test]
    fn apply_fills_every_pixel_in_one_show() {
        let strip = SimulatedStrip::new(8);
        let handle = strip.handle();
        let actuator = LightingActuator::new(Box::new(strip));

        actuator.apply(&config(true)).unwrap();
        assert_eq!(handle.shows(), 1);
        assert!(handle.visible().iter().all(|p| *p == Rgb::new(10, 200, 30)));
        assert_eq!(handle.visible_brightness(), 90);
    }

    #[test]
    fn off_then_on_restores_previous_look() {
        let strip = SimulatedStrip::new(4);
        let handle = strip.handle();
        let actuator = LightingActuator::new(Box::new(strip));

        actuator.apply(&config(true)).unwrap();
        let before = (handle.visible(), handle.visible_brightness());

        actuator.apply(&config(false)).unwrap();
        assert!(handle.visible().iter().all(|p| *p == Rgb::OFF));

        actuator.apply(&config(true)).unwrap();
        assert_eq!((handle.visible(), handle.visible_brightness()), before);

        // Idempotent
        actuator.apply(&config(true)).unwrap();
        assert_eq!((handle.visible(), handle.visible_brightness()), before);
    }

    #[test]
    fn failed_show_leaves_visible_state_untouched() {
        let strip = SimulatedStrip::new(4);
        let handle = strip.handle();
        let actuator = LightingActuator::new(Box::new(strip));

        handle.set_faulty(true);
        assert!(matches!(
            actuator.apply(&config(true)),
            Err(Error::HardwareFault(_))
        ));
        assert!(handle.visible().iter().all(|p| *p == Rgb::OFF));

        handle.set_faulty(false);
        actuator.apply(&config(true)).unwrap();
        assert_eq!(handle.visible()[0], Rgb::new(10, 200, 30));
    }

    #[test]
    fn tracks_what_the_strip_displays() {
        let strip = SimulatedStrip::new(4);
        let handle = strip.handle();
        let actuator = LightingActuator::new(Box::new(strip));
        assert!(!actuator.is_showing(&config(false)));

        actuator.apply(&config(true)).unwrap();
        assert!(actuator.is_showing(&config(true)));
        assert!(!actuator.is_showing(&config(false)));

        handle.set_faulty(true);
        actuator.apply(&config(false)).unwrap_err();
        assert!(!actuator.is_showing(&config(true)));
        assert!(!actuator.is_showing(&config(false)));

        handle.set_faulty(false);
        actuator.off().unwrap();
        assert!(actuator.is_showing(&config(false)));
    }
}
