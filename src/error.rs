//! Error types shared across the planner core.

use std::fmt;
use std::io;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug)]
pub enum Error {
    /// The caller supplied something the core cannot act on
    /// (unknown city, malformed polygon, contradictory constraints).
    InvalidInput(String),
    /// Requested customers, run, or export file does not exist.
    NotFound(String),
    /// The external matrix service could not be reached.
    Unavailable(String),
    /// Hard routing constraints admit no solution.
    Infeasible(String),
    /// The call deadline expired before a result was produced.
    Timeout(String),
    /// Unexpected internal failure; the message is safe to surface.
    Internal(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::InvalidInput(msg) => write!(f, "invalid input: {}", msg),
            Error::NotFound(msg) => write!(f, "not found: {}", msg),
            Error::Unavailable(msg) => write!(f, "matrix service unavailable: {}", msg),
            Error::Infeasible(msg) => write!(f, "infeasible: {}", msg),
            Error::Timeout(msg) => write!(f, "deadline exceeded: {}", msg),
            Error::Internal(msg) => write!(f, "internal error: {}", msg),
        }
    }
}

impl std::error::Error for Error {}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        // io::Error Display carries no caller paths, so it is safe to surface.
        Error::Internal(format!("storage failure: {}", err))
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        Error::Unavailable(err.to_string())
    }
}

impl From<csv::Error> for Error {
    fn from(err: csv::Error) -> Self {
        Error::Internal(format!("tabular data failure: {}", err))
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Internal(format!("serialization failure: {}", err))
    }
}
