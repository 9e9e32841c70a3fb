//! Hot-reconfigurable capture pipeline feeding the frame slot

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use arc_swap::ArcSwap;
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{error, info, instrument, warn};

use crate::capture::{CaptureConfig, FrameSink, SensorDriver};
use crate::error::{Error, Result};
use crate::pipeline::FrameSlot;

/// Lifecycle of the capture pipeline
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", content = "config", rename_all = "snake_case")]
pub enum PipelineState {
    Uninitialized,
    Running(CaptureConfig),
    Reconfiguring,
    Stopped,
}

/// Owns the sensor and turns its output into published frames
///
/// Every start, stop and reconfiguration runs under one FIFO lock, so
/// concurrent callers are applied one at a time in arrival order.
pub struct CapturePipeline {
    slot: FrameSlot,
    core: Arc<Mutex<Core>>,
    state: Arc<ArcSwap<PipelineState>>,
}

struct Core {
    sensor: Box<dyn SensorDriver>,
    active: Option<Active>,
    shut_down: bool,
    state: Arc<ArcSwap<PipelineState>>,
}

struct Active {
    config: CaptureConfig,
    // Cleared before the encoder is stopped so a late frame is dropped
    gate: Arc<AtomicBool>,
}

impl CapturePipeline {
    pub fn new(sensor: Box<dyn SensorDriver>, slot: FrameSlot) -> Self {
        let state = Arc::new(ArcSwap::from_pointee(PipelineState::Uninitialized));
        Self {
            slot,
            core: Arc::new(Mutex::new(Core {
                sensor,
                active: None,
                shut_down: false,
                state: state.clone(),
            })),
            state,
        }
    }

    pub fn slot(&self) -> &FrameSlot {
        &self.slot
    }

    /// Snapshot of the current lifecycle state
    pub fn state(&self) -> PipelineState {
        self.state.load().as_ref().clone()
    }

    /// Configuration the encoder is currently running with
    pub fn running_config(&self) -> Option<CaptureConfig> {
        match self.state() {
            PipelineState::Running(config) => Some(config),
            _ => None,
        }
    }

    /// Whether the pipeline is already doing what `config` asks for. A
    /// disabled config is satisfied by any stopped pipeline.
    pub fn satisfies(&self, config: &CaptureConfig) -> bool {
        match self.state() {
            PipelineState::Running(running) => running == *config,
            PipelineState::Stopped => !config.enabled,
            PipelineState::Uninitialized | PipelineState::Reconfiguring => false,
        }
    }

    /// Initial start. Failure here leaves the pipeline uninitialized and is
    /// meant to abort the process.
    #[instrument(skip(self))]
    pub async fn start(&self, config: CaptureConfig) -> Result<()> {
        config.validate()?;
        self.exclusive(move |core, slot| {
            core.ensure_open()?;
            core.halt();
            if config.enabled {
                core.launch(config, slot)?;
                core.set_state(PipelineState::Running(config));
            } else {
                core.sensor.configure(&config.sensor_mode())?;
                core.set_state(PipelineState::Stopped);
            }
            info!("Capture pipeline started via {}", core.sensor.name());
            Ok(())
        })
        .await?
    }

    /// Stop, apply `config`, restart. On a sensor failure the previous
    /// configuration is restored and the error returned.
    #[instrument(skip(self))]
    pub async fn reconfigure(&self, config: CaptureConfig) -> Result<()> {
        config.validate()?;
        let result = self
            .exclusive(move |core, slot| {
                core.ensure_open()?;
                core.reconfigure(config, slot)
            })
            .await?;
        metrics::counter!("aquacam_reconfigurations_total").increment(1);
        result
    }

    /// Halt production. The slot keeps its last frame.
    pub async fn stop(&self) -> Result<()> {
        self.exclusive(|core, _| {
            core.halt();
            core.set_state(PipelineState::Stopped);
        })
        .await
    }

    /// Stop for good; later start/reconfigure calls fail
    pub async fn shutdown(&self) -> Result<()> {
        self.exclusive(|core, _| {
            core.halt();
            core.shut_down = true;
            core.set_state(PipelineState::Stopped);
            info!("Capture pipeline shut down");
        })
        .await
    }

    /// Run `f` on a blocking worker while holding the pipeline lock
    async fn exclusive<R, F>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&mut Core, &FrameSlot) -> R + Send + 'static,
        R: Send + 'static,
    {
        let mut core = self.core.clone().lock_owned().await;
        let slot = self.slot.clone();
        tokio::task::spawn_blocking(move || f(&mut core, &slot))
            .await
            .map_err(|e| Error::hardware(format!("sensor task failed: {}", e)))
    }
}

impl Core {
    fn set_state(&self, state: PipelineState) {
        self.state.store(Arc::new(state));
    }

    fn ensure_open(&self) -> Result<()> {
        if self.shut_down {
            Err(Error::PipelineStopped)
        } else {
            Ok(())
        }
    }

    /// Configure the sensor and start encoding into the slot
    fn launch(&mut self, config: CaptureConfig, slot: &FrameSlot) -> Result<()> {
        self.sensor.configure(&config.sensor_mode())?;

        let gate = Arc::new(AtomicBool::new(true));
        let sink: FrameSink = {
            let gate = gate.clone();
            let slot = slot.clone();
            let (width, height) = (config.resolution.width, config.resolution.height);
            Arc::new(move |data| {
                if gate.load(Ordering::Acquire) {
                    slot.publish(data, width, height);
                }
            })
        };

        self.sensor.start_encoding(config.jpeg_quality, sink)?;
        self.active = Some(Active { config, gate });
        Ok(())
    }

    /// Stop encoding if running. A failing stop still leaves nothing active.
    fn halt(&mut self) {
        let Some(active) = self.active.take() else {
            return;
        };
        active.gate.store(false, Ordering::Release);
        if let Err(e) = self.sensor.stop_encoding() {
            warn!("Encoder did not stop cleanly: {}", e);
        }
    }

    fn reconfigure(&mut self, config: CaptureConfig, slot: &FrameSlot) -> Result<()> {
        let previous = self.active.as_ref().map(|active| active.config);
        self.set_state(PipelineState::Reconfiguring);
        self.halt();

        if !config.enabled {
            info!("Capture disabled");
            self.set_state(PipelineState::Stopped);
            return Ok(());
        }

        match self.launch(config, slot) {
            Ok(()) => {
                info!(
                    "Capture reconfigured: {} @ {}fps q={} iso={}",
                    config.resolution, config.frame_rate, config.jpeg_quality, config.iso
                );
                self.set_state(PipelineState::Running(config));
                Ok(())
            }
            Err(e) => {
                warn!("Reconfiguration failed, rolling back: {}", e);
                self.halt();
                self.rollback(previous, slot);
                Err(e)
            }
        }
    }

    fn rollback(&mut self, previous: Option<CaptureConfig>, slot: &FrameSlot) {
        let Some(previous) = previous else {
            self.set_state(PipelineState::Stopped);
            return;
        };
        match self.launch(previous, slot) {
            Ok(()) => self.set_state(PipelineState::Running(previous)),
            Err(e) => {
                error!("Rollback to previous capture config failed: {}", e);
                self.set_state(PipelineState::Stopped);
            }
        }
    }
}
