use std::num::{ParseFloatError, ParseIntError};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RemuxError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("bit reader ran out of data")]
    OutOfData,

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("codec error: {0}")]
    Codec(String),

    #[error("parser error: {0}")]
    Parser(String),

    #[error("invalid data: {0}")]
    InvalidData(String),

    #[error("unsupported: {0}")]
    Unsupported(String),

    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("precondition failed: {0}")]
    Precondition(String),

    #[error("parse int error: {0}")]
    ParseInt(#[from] ParseIntError),

    #[error("parse float error: {0}")]
    ParseFloat(#[from] ParseFloatError),
}

pub type Result<T> = std::result::Result<T, RemuxError>;

/// Category reported to listeners through `on_error`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The container or a table inside it could not be understood.
    FormatError,
    /// The container uses a layout this crate does not handle.
    FormatUnsupported,
    /// An elementary stream uses an unsupported bitstream configuration.
    CodecUnsupported,
}

impl RemuxError {
    /// Maps an internal parse failure onto the category surfaced to listeners.
    pub fn kind(&self) -> ErrorKind {
        match self {
            RemuxError::UnsupportedFormat(_) => ErrorKind::FormatUnsupported,
            RemuxError::Unsupported(_) => ErrorKind::CodecUnsupported,
            RemuxError::Codec(_) => ErrorKind::CodecUnsupported,
            _ => ErrorKind::FormatError,
        }
    }
}
