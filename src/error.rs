//! Error types shared across the crate.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while loading or validating a [`SceneConfig`](crate::SceneConfig).
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("malformed config: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid config field `{field}`: {reason}")]
    Invalid { field: &'static str, reason: String },
}

impl ConfigError {
    pub(crate) fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            field,
            reason: reason.into(),
        }
    }
}

/// Errors raised while writing speed records.
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("sink i/o failed: {0}")]
    Io(#[from] io::Error),

    #[error("csv write failed: {0}")]
    Csv(#[from] csv::Error),
}

/// Errors that end a pipeline run.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("frame rate must be positive and finite, got {0}")]
    InvalidFrameRate(f64),

    #[error("detector failed on frame {frame}: {source}")]
    Detector {
        frame: u64,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error(transparent)]
    Sink(#[from] SinkError),

    #[error("pipeline already drained")]
    Drained,
}

/// Errors raised while reading a recorded detection log.
#[derive(Debug, Error)]
pub enum ReplayError {
    #[error("failed to read detection log: {0}")]
    Io(#[from] io::Error),

    #[error("malformed detection log line {line}: {source}")]
    Parse {
        line: usize,
        #[source]
        source: serde_json::Error,
    },
}
