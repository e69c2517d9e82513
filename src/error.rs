//! Centralized error types for attachspool.

use std::path::PathBuf;
use thiserror::Error;

use crate::codec::decoder::Base64Error;
use crate::version::ExchangeVersion;

/// All errors produced by the attachspool library.
#[derive(Error, Debug)]
pub enum SpoolError {
    /// I/O error with the associated file path.
    #[error("I/O error on '{path}': {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// A required value is missing or an object is in the wrong state.
    #[error("Validation failed: {0}")]
    Validation(String),

    /// A property was accessed against a server version that does not support it.
    #[error("Property '{property}' requires {required} or later (requested version is {actual})")]
    UnsupportedVersion {
        property: &'static str,
        required: ExchangeVersion,
        actual: ExchangeVersion,
    },

    /// A binary field could not be read from the document.
    #[error("Error reading base64 content of '{field}': {source}")]
    Deserialization {
        field: &'static str,
        source: CodecError,
    },

    /// A binary field could not be written to the document.
    #[error("Unable to write base64 encoded element '{field}': {source}")]
    Serialization {
        field: &'static str,
        source: CodecError,
    },

    /// Reader/writer failure outside a binary field.
    #[error(transparent)]
    Codec(#[from] CodecError),
}

/// Failures of the streaming codec and the document reader/writer it drives.
#[derive(Error, Debug)]
pub enum CodecError {
    /// Malformed base64 input.
    #[error(transparent)]
    Base64(#[from] Base64Error),

    /// Spool, temp file or transport I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed or unexpected markup.
    #[error("XML error: {0}")]
    Xml(String),

    /// The caller cancelled the operation.
    #[error("Operation cancelled")]
    Cancelled,
}

/// Convenience alias for `Result<T, SpoolError>`.
pub type Result<T> = std::result::Result<T, SpoolError>;

impl SpoolError {
    /// Create an `Io` variant from a path and an `io::Error`.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

impl CodecError {
    /// Wrap any displayable XML-layer error.
    pub fn xml(err: impl std::fmt::Display) -> Self {
        Self::Xml(err.to_string())
    }
}
