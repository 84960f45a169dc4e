//! uAgent client error types

use thiserror::Error;

/// uAgent client error type
#[derive(Error, Debug)]
pub enum Error {
    /// Caller input rejected before any I/O
    #[error("{0}")]
    Validation(String),

    /// Bridge agent executable not found on any candidate path
    #[error("Bridge agent not found: {0}")]
    NotFound(String),

    /// Bridge process was spawned but never became ready
    #[error(
        "Bridge agent failed to start automatically.\n\
         Please start it manually: python bridge_agent.py\n\
         Or check if Python and required packages are installed."
    )]
    StartupTimeout,

    /// Bridge process could not be launched
    #[error("Failed to spawn bridge agent: {0}")]
    Spawn(String),

    /// Auto-start was disabled by an earlier startup failure
    #[error("{0}")]
    Unavailable(String),

    /// Query failure raised by `ask`
    #[error("{0}")]
    Query(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// TOML parse error
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// HTTP error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl Error {
    /// Whether this error was raised by input validation
    pub fn is_validation(&self) -> bool {
        matches!(self, Error::Validation(_))
    }
}

/// Result type alias for uAgent client operations
pub type Result<T> = std::result::Result<T, Error>;
