//! Single writer of the settings record

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use arc_swap::ArcSwap;
use serde::Serialize;
use serde_json::{Map, Value};
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

use crate::capture::CaptureConfig;
use crate::error::Error;
use crate::lighting::{LightingActuator, LightingConfig};
use crate::pipeline::CapturePipeline;
use crate::settings::{SettingGroup, SettingsRecord, SettingsStore};

/// A key whose value failed validation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Rejection {
    pub key: String,
    pub reason: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FaultKind {
    Persistence,
    Hardware,
}

/// A side effect that failed after the merge succeeded
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Fault {
    pub kind: FaultKind,
    pub message: String,
}

/// Per-key result of one `apply`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ApplyOutcome {
    pub applied: Vec<String>,
    pub ignored: Vec<String>,
    pub rejected: Vec<Rejection>,
    pub faults: Vec<Fault>,
}

impl ApplyOutcome {
    pub fn is_success(&self) -> bool {
        self.rejected.is_empty() && self.faults.is_empty()
    }

    pub fn rejected_key(&self, key: &str) -> Option<&Rejection> {
        self.rejected.iter().find(|r| r.key == key)
    }

    fn fault(&mut self, kind: FaultKind, error: &Error) {
        self.faults.push(Fault {
            kind,
            message: error.to_string(),
        });
    }
}

/// Validates updates, merges them, persists, and pushes the result to the
/// capture pipeline and light strip. Updates are applied one at a time in
/// arrival order; readers always see a complete record.
pub struct SettingsController {
    current: ArcSwap<SettingsRecord>,
    write: Mutex<()>,
    store: Box<dyn SettingsStore>,
    // Set while the stored record lags the current one
    unsaved: AtomicBool,
    pipeline: Arc<CapturePipeline>,
    lighting: Arc<LightingActuator>,
}

impl SettingsController {
    pub fn new(
        initial: SettingsRecord,
        store: Box<dyn SettingsStore>,
        pipeline: Arc<CapturePipeline>,
        lighting: Arc<LightingActuator>,
    ) -> Self {
        Self {
            current: ArcSwap::from_pointee(initial),
            write: Mutex::new(()),
            store,
            unsaved: AtomicBool::new(false),
            pipeline,
            lighting,
        }
    }

    /// Immutable snapshot of the current record
    pub fn snapshot(&self) -> Arc<SettingsRecord> {
        self.current.load_full()
    }

    pub fn capture_config(&self) -> CaptureConfig {
        self.current.load().capture_config()
    }

    pub fn lighting_config(&self) -> LightingConfig {
        self.current.load().lighting_config()
    }

    pub fn pipeline(&self) -> &Arc<CapturePipeline> {
        &self.pipeline
    }

    /// Push the current lighting state to the strip
    pub fn refresh_lighting(&self) -> crate::Result<()> {
        self.lighting.apply(&self.lighting_config())
    }

    /// Merge every valid, recognised key of `update`.
    ///
    /// Invalid keys are rejected individually; the rest still apply. A
    /// persistence or hardware failure is reported in the outcome without
    /// undoing the merge.
    #[instrument(skip_all, fields(keys = update.len()))]
    pub async fn apply(&self, update: &Map<String, Value>) -> ApplyOutcome {
        let _write = self.write.lock().await;
        let before = self.current.load_full();
        let mut next = SettingsRecord::clone(&before);
        let mut outcome = ApplyOutcome::default();

        for (key, value) in update {
            match next.merge(key, value) {
                Ok(Some(group)) => {
                    debug!("Merged {} = {} ({:?})", key, value, group);
                    outcome.applied.push(key.clone());
                }
                Ok(None) => outcome.ignored.push(key.clone()),
                Err(e) => {
                    let reason = match e {
                        Error::InvalidConfig { reason, .. } => reason,
                        other => other.to_string(),
                    };
                    warn!("Rejected setting {}: {}", key, reason);
                    metrics::counter!("aquacam_settings_rejected_total").increment(1);
                    outcome.rejected.push(Rejection {
                        key: key.clone(),
                        reason,
                    });
                }
            }
        }

        // Compare against what the hardware is doing, not the previous
        // record: a fault earlier may have left them apart
        let capture = next.capture_config();
        let capture_stale = !self.pipeline.satisfies(&capture);
        let lighting = next.lighting_config();
        let lighting_stale = !self.lighting.is_showing(&lighting);

        let unsaved = self.unsaved.load(Ordering::Relaxed);

        if next == *before && !unsaved && !capture_stale && !lighting_stale {
            return outcome;
        }

        if next != *before {
            self.current.store(Arc::new(next.clone()));
        }
        if next != *before || unsaved {
            match self.store.save(&next) {
                Ok(()) => self.unsaved.store(false, Ordering::Relaxed),
                Err(e) => {
                    warn!("{}", e);
                    self.unsaved.store(true, Ordering::Relaxed);
                    outcome.fault(FaultKind::Persistence, &e);
                }
            }
        }

        if capture_stale {
            if let Err(e) = self.pipeline.reconfigure(capture).await {
                warn!("Capture reconfiguration failed: {}", e);
                outcome.fault(FaultKind::Hardware, &e);
            }
        }

        if lighting_stale {
            if let Err(e) = self.lighting.apply(&lighting) {
                outcome.fault(FaultKind::Hardware, &e);
            }
        }

        info!(
            "Settings updated: applied {:?}, rejected {}",
            outcome.applied,
            outcome.rejected.len()
        );
        outcome
    }

    /// Convenience for a single key, used by the schedule evaluator
    pub async fn apply_one(&self, key: &str, value: Value) -> ApplyOutcome {
        let mut update = Map::new();
        update.insert(key.to_string(), value);
        self.apply(&update).await
    }
}
