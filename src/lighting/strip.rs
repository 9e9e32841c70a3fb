//! Addressable LED strip driver surface

use std::sync::{Arc, Mutex, MutexGuard};

use tracing::debug;

use crate::error::{Error, Result};
use crate::lighting::Rgb;

/// Buffered strip: pixel and brightness writes become visible on `show`
pub trait StripDriver: Send + 'static {
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn set_pixel(&mut self, index: usize, color: Rgb);

    fn set_brightness(&mut self, level: u8);

    /// Push the buffered state to the LEDs in one update
    fn show(&mut self) -> Result<()>;
}

#[derive(Debug, Default)]
struct StripState {
    pending: Vec<Rgb>,
    pending_brightness: u8,
    visible: Vec<Rgb>,
    visible_brightness: u8,
    shows: u64,
    faulty: bool,
}

/// Shared view into a [`SimulatedStrip`]
#[derive(Clone, Default)]
pub struct StripHandle(Arc<Mutex<StripState>>);

impl StripHandle {
    fn state(&self) -> MutexGuard<'_, StripState> {
        self.0.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Pixels as of the last successful `show`
    pub fn visible(&self) -> Vec<Rgb> {
        self.state().visible.clone()
    }

    pub fn visible_brightness(&self) -> u8 {
        self.state().visible_brightness
    }

    pub fn shows(&self) -> u64 {
        self.state().shows
    }

    /// Make subsequent `show` calls fail, as a disconnected strip would
    pub fn set_faulty(&self, faulty: bool) {
        self.state().faulty = faulty;
    }
}

/// In-memory strip used when no LED hardware is attached
pub struct SimulatedStrip {
    handle: StripHandle,
    len: usize,
}

impl SimulatedStrip {
    pub fn new(len: usize) -> Self {
        let handle = StripHandle::default();
        {
            let mut state = handle.state();
            state.pending = vec![Rgb::OFF; len];
            state.visible = vec![Rgb::OFF; len];
            state.pending_brightness = 255;
            state.visible_brightness = 255;
        }
        Self { handle, len }
    }

    pub fn handle(&self) -> StripHandle {
        self.handle.clone()
    }
}

impl StripDriver for SimulatedStrip {
    fn len(&self) -> usize {
        self.len
    }

    fn set_pixel(&mut self, index: usize, color: Rgb) {
        if let Some(pixel) = self.handle.state().pending.get_mut(index) {
            *pixel = color;
        }
    }

    fn set_brightness(&mut self, level: u8) {
        self.handle.state().pending_brightness = level;
    }

    fn show(&mut self) -> Result<()> {
        let mut state = self.handle.state();
        if state.faulty {
            return Err(Error::hardware("strip not responding"));
        }
        state.visible = state.pending.clone();
        state.visible_brightness = state.pending_brightness;
        state.shows += 1;
        debug!(
            "Strip show #{}: {} pixels, first {:?} @ {}",
            state.shows,
            self.len,
            state.visible.first(),
            state.visible_brightness
        );
        Ok(())
    }
}
