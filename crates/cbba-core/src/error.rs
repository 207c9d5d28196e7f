use thiserror::Error;

use crate::config::ConfigError;

/// Reasons a wire frame is rejected before it reaches a mailbox.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("frame must be {expected} bytes, got {actual}")]
    WrongLength { expected: usize, actual: usize },

    #[error("field `{field}` is not ASCII")]
    NotAscii { field: &'static str },

    #[error("field `{field}` is not numeric: {value:?}")]
    NotNumeric { field: &'static str, value: String },

    #[error("field `{field}` is out of range: {value}")]
    OutOfRange { field: &'static str, value: String },
}

#[derive(Error, Debug)]
pub enum CbbaError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),

    #[error("Task source error: {0}")]
    TaskSource(String),

    #[error("Invalid operation: {0}")]
    InvalidOperation(String),
}

pub type Result<T> = std::result::Result<T, CbbaError>;
