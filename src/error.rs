use std::io;
use thiserror::Error;

/// Custom error type for netpulse
#[derive(Error, Debug)]
pub enum NetpulseError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Invalid target: {0}")]
    InvalidTarget(String),

    #[error("Engine error: {0}")]
    Engine(String),
}

/// Result type alias for netpulse
pub type Result<T> = std::result::Result<T, NetpulseError>;

impl NetpulseError {
    /// Create a config error
    pub fn config<S: Into<String>>(msg: S) -> Self {
        NetpulseError::Config(msg.into())
    }

    /// Create an invalid target error
    pub fn invalid_target<S: Into<String>>(msg: S) -> Self {
        NetpulseError::InvalidTarget(msg.into())
    }

    pub fn engine<S: Into<String>>(msg: S) -> Self {
        NetpulseError::Engine(msg.into())
    }
}
