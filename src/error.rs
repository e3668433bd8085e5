// src/error.rs

//! Error types for recipe loading and step execution

use thiserror::Error;

/// Errors produced while loading or applying a recipe
///
/// Every error is fatal: the executor stops at the first one and reports it
/// wrapped in [`Error::ExecutionError`] together with the failing step index.
#[derive(Error, Debug)]
pub enum Error {
    /// Malformed or invalid recipe document
    #[error("Parse error: {0}")]
    ParseError(String),

    /// Source or key server could not be reached
    #[error("Network error: {0}")]
    NetworkError(String),

    /// Key import or signature trust failure
    #[error("Trust error: {0}")]
    TrustError(String),

    /// One or more packages could not be resolved by the package manager
    #[error("Unable to resolve package(s): {}", .0.join(", "))]
    ResolutionError(Vec<String>),

    /// A step failed; carries the step index and the underlying cause
    #[error("Step {index} ({step}) failed: {source}")]
    ExecutionError {
        index: usize,
        step: String,
        #[source]
        source: Box<Error>,
    },

    /// Step requires a privilege context that is not active
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// External command exited unsuccessfully
    #[error("Command failed: {0}")]
    CommandFailed(String),

    /// Referenced user, file or tool does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Downloaded content does not match the declared checksum
    #[error("Checksum mismatch for {path}: expected {expected}, got {actual}")]
    ChecksumMismatch {
        path: String,
        expected: String,
        actual: String,
    },

    /// Failed to set up a component (HTTP client, keyring, ...)
    #[error("Initialization error: {0}")]
    InitError(String),

    /// I/O failure with context
    #[error("I/O error: {0}")]
    IoError(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Wrap an error as the failure of the step at `index`
    pub fn at_step(self, index: usize, step: impl Into<String>) -> Self {
        Error::ExecutionError {
            index,
            step: step.into(),
            source: Box::new(self),
        }
    }

    /// Index of the failing step, if this is an execution error
    pub fn step_index(&self) -> Option<usize> {
        match self {
            Error::ExecutionError { index, .. } => Some(*index),
            _ => None,
        }
    }

    /// The innermost cause (unwraps nested execution errors)
    pub fn root_cause(&self) -> &Error {
        match self {
            Error::ExecutionError { source, .. } => source.root_cause(),
            other => other,
        }
    }
}

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, Error>;
