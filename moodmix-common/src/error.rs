//! Common error types for moodmix

use thiserror::Error;

/// Common result type for moodmix operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error taxonomy shared by the recommendation pipeline
///
/// Build-phase errors (`Data`, `Config`, `Io`) are fatal at startup.
/// Query-phase errors (`NotFound`, `InvalidArgument`) are scoped to a
/// single request.
#[derive(Error, Debug)]
pub enum Error {
    /// Source dataset is unreadable, malformed, or empty after cleaning
    #[error("Data error: {0}")]
    Data(String),

    /// Requested track not present in the dataset or index
    #[error("Not found: {0}")]
    NotFound(String),

    /// Malformed k/limit/vector shape or other bad caller input
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Internal error (e.g. a background build task panicked)
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// True for errors that only affect the current request
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Error::NotFound(_) | Error::InvalidArgument(_))
    }
}
