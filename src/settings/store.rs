//! Persistence for the settings record

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde_json::{Map, Value};
use tracing::{info, warn};

use crate::error::{Error, Result};
use crate::settings::SettingsRecord;

pub trait SettingsStore: Send + Sync {
    /// Stored record, or defaults when nothing has been saved yet
    fn load(&self) -> Result<SettingsRecord>;

    fn save(&self, record: &SettingsRecord) -> Result<()>;
}

/// Pretty-printed JSON file, replaced atomically on every save
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SettingsStore for JsonFileStore {
    fn load(&self) -> Result<SettingsRecord> {
        match std::fs::read(&self.path) {
            Ok(bytes) => match serde_json::from_slice::<Map<String, Value>>(&bytes) {
                Ok(values) => {
                    info!("Loaded settings from {}", self.path.display());
                    Ok(SettingsRecord::from_stored(&values))
                }
                Err(e) => {
                    warn!(
                        "Ignoring unreadable settings file {}: {}",
                        self.path.display(),
                        e
                    );
                    Ok(SettingsRecord::default())
                }
            },
            Err(e) if e.kind() == ErrorKind::NotFound => {
                let record = SettingsRecord::default();
                info!("No settings at {}, writing defaults", self.path.display());
                if let Err(e) = self.save(&record) {
                    warn!("{}", e);
                }
                Ok(record)
            }
            Err(e) => Err(Error::PersistenceFault(format!(
                "{}: {}",
                self.path.display(),
                e
            ))),
        }
    }

    fn save(&self, record: &SettingsRecord) -> Result<()> {
        let fault = |e: &dyn std::fmt::Display| {
            Error::PersistenceFault(format!("{}: {}", self.path.display(), e))
        };
        let json = serde_json::to_vec_pretty(record).map_err(|e| fault(&e))?;
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, json).map_err(|e| fault(&e))?;
        std::fs::rename(&tmp, &self.path).map_err(|e| fault(&e))
    }
}

/// Keeps the record in memory only
#[derive(Default)]
pub struct MemoryStore {
    record: Mutex<Option<SettingsRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_record(record: SettingsRecord) -> Self {
        Self {
            record: Mutex::new(Some(record)),
        }
    }
}

impl SettingsStore for MemoryStore {
    fn load(&self) -> Result<SettingsRecord> {
        let record = self
            .record
            .lock()
            .map_err(|_| Error::PersistenceFault("store lock poisoned".into()))?;
        Ok(record.clone().unwrap_or_default())
    }

    fn save(&self, record: &SettingsRecord) -> Result<()> {
        *self
            .record
            .lock()
            .map_err(|_| Error::PersistenceFault("store lock poisoned".into()))? =
            Some(record.clone());
        Ok(())
    }
}
