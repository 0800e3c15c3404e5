use thiserror::Error;

use crate::logging::LoggingError;
use crate::runtime::shared_state::SharedStateError;

/// Unified result type for the stage runtime crate.
pub type Result<T> = std::result::Result<T, AppError>;

/// Errors surfaced by the orchestrator and its collaborators.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("an application instance is already active")]
    SingletonActive,
    #[error("display `{0}` is already registered")]
    DuplicateDisplay(String),
    #[error("option `{0}` cannot be defined after options were finalized")]
    OptionsFinalized(String),
    #[error("option `{name}` is invalid: {reason}")]
    InvalidOption { name: String, reason: String },
    #[error("plugin `{plugin}` failed: {message}")]
    Plugin { plugin: String, message: String },
    #[error("callback failed: {0}")]
    Callback(String),
    #[error("shared state error: {0}")]
    Shared(#[from] SharedStateError),
    #[error("logging error: {0}")]
    Logging(#[from] LoggingError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl AppError {
    /// Convenience constructor for hook failures raised by plugins.
    pub fn plugin(plugin: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Plugin {
            plugin: plugin.into(),
            message: message.into(),
        }
    }
}
