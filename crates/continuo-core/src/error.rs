//! Error types for continuo

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("Malformed MIDI: {0}")]
    MalformedMidi(String),
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, CoreError>;
