//! Error types for thumbnail generation.

use crate::domain::thumbnail::Stage;
use std::io;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ThumbError {
    /// Bad URL or disallowed host. Never retried.
    #[error("{0}")]
    InvalidInput(#[from] InputError),

    #[error("failed to get video duration: {cause}")]
    ProbeFailed { cause: String },

    #[error("failed to get snapshot {index} at {timestamp:.3}s: {cause}")]
    CaptureFailed {
        index: usize,
        timestamp: f64,
        cause: String,
    },

    #[error("failed to create gif: {cause}")]
    AssembleFailed { cause: String },

    #[error("cancelled")]
    Cancelled,

    /// Seen by followers when the run they waited on failed.
    #[error("leader run failed: {0}")]
    LeaderFailed(String),

    #[error(transparent)]
    Io(#[from] io::Error),
}

impl ThumbError {
    /// Pipeline stage the error belongs to, if it came from one.
    pub fn stage(&self) -> Option<Stage> {
        match self {
            ThumbError::ProbeFailed { .. } => Some(Stage::Probe),
            ThumbError::CaptureFailed { .. } => Some(Stage::Capture),
            ThumbError::AssembleFailed { .. } => Some(Stage::Assemble),
            _ => None,
        }
    }
}

/// Why a source URL was refused before any work started.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InputError {
    #[error("invalid url: {0}")]
    BadUrl(String),

    #[error("host not allowed: {0}")]
    HostNotAllowed(String),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config not found")]
    NotFound,

    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("failed to unmarshal config JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid config value for '{field}': {message}")]
    Invalid { field: &'static str, message: String },
}
