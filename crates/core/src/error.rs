//! Error types for the core domain.

use crate::format::{Format, SpecVersion};
use thiserror::Error;

/// Core domain error type.
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid serial number: {0}")]
    InvalidSerialNumber(String),

    #[error("invalid CDX URN: {0}")]
    InvalidUrn(String),

    #[error("invalid specification version: {0}")]
    InvalidSpecVersion(String),

    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("unsupported media type: {0}")]
    UnsupportedMediaType(String),

    #[error("{format} encoding does not support specification version {spec_version}")]
    UnsupportedCombination {
        format: Format,
        spec_version: SpecVersion,
    },

    #[error("no acceptable media type: {0}")]
    NotAcceptable(String),

    #[error("cannot downgrade from {from} to {to}")]
    Downgrade { from: SpecVersion, to: SpecVersion },

    #[error("failed to decode {format} document: {message}")]
    Decode { format: Format, message: String },

    #[error("failed to encode {format} document: {message}")]
    Encode { format: Format, message: String },
}

impl Error {
    pub(crate) fn decode(format: Format, err: impl std::fmt::Display) -> Self {
        Self::Decode {
            format,
            message: err.to_string(),
        }
    }

    pub(crate) fn encode(format: Format, err: impl std::fmt::Display) -> Self {
        Self::Encode {
            format,
            message: err.to_string(),
        }
    }
}

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, Error>;
