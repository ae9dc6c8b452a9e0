//! Error types for infomap-core.

use thiserror::Error;

/// Result type for infomap-core operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in infomap-core.
#[derive(Debug, Error)]
pub enum Error {
    /// A `submit` argument had the wrong shape.
    #[error("invalid {parameter}: {reason}")]
    InvalidInput {
        /// Name of the malformed parameter (`network`, `args` or `files`).
        parameter: &'static str,
        reason: String,
    },

    /// A worker sent a message the orchestrator does not understand.
    #[error("protocol violation: {0}")]
    Protocol(String),

    /// IPC communication error with a worker.
    #[error("IPC error: {0}")]
    Ipc(String),

    /// The isolated worker could not be started.
    #[error("failed to start worker: {0}")]
    WorkerStart(String),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Deserialization error.
    #[error("deserialization error: {0}")]
    Deserialization(String),

    /// The clustering engine failed.
    #[error("engine error: {0}")]
    Engine(String),

    /// Invalid configuration value.
    #[error("configuration error: {0}")]
    Config(String),

    /// No async runtime available.
    #[error("runtime error: {0}")]
    Runtime(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    pub(crate) fn invalid(parameter: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidInput {
            parameter,
            reason: reason.into(),
        }
    }

    /// Render the error with a recovery hint, for CLI display.
    pub fn with_hint(&self) -> String {
        let hint = match self {
            Self::WorkerStart(_) => Some(
                "Set INFOMAP_WORKER_PATH or pass --worker with the path to the infomap-worker binary.",
            ),
            Self::Config(_) => Some(
                "Check the INFOMAP_* environment variables and command-line flags.",
            ),
            Self::Protocol(_) => Some(
                "The worker binary does not match this orchestrator version. Rebuild both.",
            ),
            Self::Engine(_) => Some(
                "Check that INFOMAP_ENGINE_PATH points at a shared library exporting `infomap_execute`.",
            ),
            _ => None,
        };

        match hint {
            Some(hint) => format!("{}\n  hint: {}", self, hint),
            None => self.to_string(),
        }
    }
}
