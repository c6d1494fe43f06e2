//! Failure taxonomy for one relay cycle.

use std::time::Duration;
use thiserror::Error;

/// Why collaborator output could not be turned into a result set.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("output was empty")]
    Empty,
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("expected a JSON array of records, found {found}")]
    NotAnArray { found: &'static str },
    #[error("element {index} is not a record (found {found})")]
    NotARecord { index: usize, found: &'static str },
}

#[derive(Debug, Error)]
pub enum RelayError {
    #[error("failed to start collaborator `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("collaborator output is not a valid result set: {0}")]
    Parse(#[from] ParseError),
    #[error("collaborator exited with {status} and produced no usable output: {cause}")]
    ExitFailure {
        status: String,
        exit_code: Option<i32>,
        #[source]
        cause: ParseError,
    },
    #[error("collaborator output exceeded {limit} bytes")]
    OutputTooLarge { limit: usize },
    #[error("collaborator timed out after {timeout:?}")]
    Timeout { timeout: Duration },
    #[error("request cancelled")]
    Cancelled,
    #[error("i/o error while relaying collaborator output: {0}")]
    Io(#[from] std::io::Error),
    #[error("relay task failed: {0}")]
    Task(String),
}

impl RelayError {
    /// Short label for status lines.
    pub fn kind(&self) -> &'static str {
        match self {
            RelayError::Spawn { .. } => "Spawn failure",
            RelayError::Parse(_) => "Parse failure",
            RelayError::ExitFailure { .. } => "Collaborator failed",
            RelayError::OutputTooLarge { .. } => "Output too large",
            RelayError::Timeout { .. } => "Timed out",
            RelayError::Cancelled => "Cancelled",
            RelayError::Io(_) => "I/O error",
            RelayError::Task(_) => "Internal error",
        }
    }
}
