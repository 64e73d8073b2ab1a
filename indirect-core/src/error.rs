//! Error types for indirect-core.

use thiserror::Error;

/// Result type alias for reduction operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error types for reduction operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Invalid or inconsistent input parameter, detected before any computation.
    #[error("invalid {parameter}: {message}")]
    Configuration { parameter: String, message: String },

    /// Input data that cannot be reduced (degenerate axis, empty range, ...).
    #[error("data error: {0}")]
    Data(String),

    /// Reduction path that is reserved but has no implementation.
    #[error("not yet supported: {0}")]
    Unsupported(String),

    /// Two workspaces that must be compatible are not.
    #[error("shape mismatch in {operation}: {detail}")]
    ShapeMismatch {
        operation: &'static str,
        detail: String,
    },

    /// A workspace expected in a run context is absent.
    #[error("workspace {0} does not exist")]
    MissingWorkspace(String),

    /// The same run number was registered twice in one store.
    #[error("run {0} is already registered")]
    DuplicateRun(String),

    /// Failure reported by a loading/saving collaborator.
    #[error("backend error: {0}")]
    Backend(String),

    /// File I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Builds a configuration error for the named parameter.
    pub fn configuration(parameter: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Configuration {
            parameter: parameter.into(),
            message: message.into(),
        }
    }

    /// Returns the offending parameter name for configuration errors.
    #[must_use]
    pub fn parameter(&self) -> Option<&str> {
        match self {
            Self::Configuration { parameter, .. } => Some(parameter),
            _ => None,
        }
    }
}
