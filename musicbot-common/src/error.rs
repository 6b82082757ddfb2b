//! Common error types for musicbot

use thiserror::Error;

/// Common result type for musicbot operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types across musicbot actors
#[derive(Error, Debug)]
pub enum Error {
    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// External player transport failure
    #[error("Player error: {0}")]
    Player(String),

    /// Subprocess invocation failure (downloader, tag tool)
    #[error("Subprocess error: {0}")]
    Subprocess(String),

    /// Requested resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid user input or request parameter
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}
