//! Error taxonomy shared by the capture, streaming, settings and lighting paths

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// A setting value was malformed or outside its allowed range
    #[error("invalid value for `{field}`: {reason}")]
    InvalidConfig { field: String, reason: String },

    /// A sensor or strip driver call failed
    #[error("hardware fault: {0}")]
    HardwareFault(String),

    /// The viewer's output stopped accepting bytes
    #[error("viewer disconnected: {0}")]
    ViewerDisconnected(#[source] std::io::Error),

    /// Settings could not be written to the store
    #[error("failed to persist settings: {0}")]
    PersistenceFault(String),

    /// The HTTP listener could not be opened
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: std::net::SocketAddr,
        #[source]
        source: std::io::Error,
    },

    /// The capture pipeline was shut down
    #[error("capture pipeline stopped")]
    PipelineStopped,

    #[error(transparent)]
    Config(#[from] config::ConfigError),
}

impl Error {
    pub fn invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            field: field.into(),
            reason: reason.into(),
        }
    }

    pub fn hardware(reason: impl std::fmt::Display) -> Self {
        Self::HardwareFault(reason.to_string())
    }
}
