use std::io;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("I/O error: {0}")]
    IoError(#[from] io::Error),
    #[error("Configuration error: {0}")]
    ConfigError(String),
    #[error("Source control error: {0}")]
    SourceControlError(String),
    #[error("Validation error: {0}")]
    ValidationError(String),
    #[error("Bridge shut down: {0}")]
    Shutdown(String),
}
