use std::fmt;
use std::io;

/// Unified error type for pressure-lab operations
#[derive(Debug)]
pub enum Error {
    /// I/O error from the reporter or the inspection endpoint
    Io(io::Error),

    /// Configuration value out of range
    InvalidConfig(String),

    /// The contended resource is closing and refuses new holders
    ResourceClosed,

    /// A spawned task panicked or was aborted
    TaskFailed(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Io(e) => write!(f, "IO error: {}", e),
            Error::InvalidConfig(msg) => write!(f, "Invalid configuration: {}", msg),
            Error::ResourceClosed => write!(f, "Resource closed"),
            Error::TaskFailed(msg) => write!(f, "Task failed: {}", msg),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Error::Io(e)
    }
}

impl From<tokio::task::JoinError> for Error {
    fn from(e: tokio::task::JoinError) -> Self {
        Error::TaskFailed(e.to_string())
    }
}

/// Result type alias for pressure-lab operations
pub type Result<T> = std::result::Result<T, Error>;
