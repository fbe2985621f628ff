//! Service error types.

use bomrepo_storage::StorageError;

/// Errors surfaced by the repository service and background jobs.
///
/// A create-only conflict is not an error at this boundary; see
/// [`crate::repo::StoreOutcome`].
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("invalid identifier: {0}")]
    InvalidIdentifier(String),

    #[error("unacceptable media type: {0}")]
    UnacceptableMediaType(String),

    #[error("invalid search: {0}")]
    InvalidSearch(String),

    #[error("malformed document: {0}")]
    Codec(String),

    #[error("storage error: {0}")]
    Backend(#[source] StorageError),

    #[error("operation cancelled")]
    Cancelled,
}

impl ServiceError {
    /// Get the error code for this error.
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidIdentifier(_) => "invalid_identifier",
            Self::UnacceptableMediaType(_) => "unacceptable_media_type",
            Self::InvalidSearch(_) => "invalid_search",
            Self::Codec(_) => "malformed_document",
            Self::Backend(_) => "backend_failure",
            Self::Cancelled => "cancelled",
        }
    }

    /// Whether the caller, rather than the backend, is at fault.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidIdentifier(_)
                | Self::UnacceptableMediaType(_)
                | Self::InvalidSearch(_)
                | Self::Codec(_)
        )
    }
}

impl From<StorageError> for ServiceError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::Cancelled => Self::Cancelled,
            other => Self::Backend(other),
        }
    }
}

impl From<bomrepo_core::Error> for ServiceError {
    fn from(err: bomrepo_core::Error) -> Self {
        use bomrepo_core::Error;

        match err {
            Error::InvalidSerialNumber(_) | Error::InvalidUrn(_) => {
                Self::InvalidIdentifier(err.to_string())
            }
            Error::InvalidSpecVersion(_)
            | Error::UnsupportedFormat(_)
            | Error::UnsupportedMediaType(_)
            | Error::UnsupportedCombination { .. }
            | Error::NotAcceptable(_)
            | Error::Downgrade { .. } => Self::UnacceptableMediaType(err.to_string()),
            Error::Decode { .. } | Error::Encode { .. } => Self::Codec(err.to_string()),
        }
    }
}

/// Result type for service operations.
pub type ServiceResult<T> = std::result::Result<T, ServiceError>;

#[cfg(test)]
mod tests {
    use super::*;
    use bomrepo_core::{Format, SpecVersion};

    #[test]
    fn storage_cancellation_is_not_a_backend_failure() {
        assert!(matches!(
            ServiceError::from(StorageError::Cancelled),
            ServiceError::Cancelled
        ));
        let err = ServiceError::from(StorageError::NotFound("k".to_string()));
        assert_eq!(err.code(), "backend_failure");
        assert!(!err.is_client_error());
    }

    #[test]
    fn core_errors_map_to_client_errors() {
        let err = ServiceError::from(bomrepo_core::Error::InvalidSerialNumber("x".to_string()));
        assert!(matches!(err, ServiceError::InvalidIdentifier(_)));

        let err = ServiceError::from(bomrepo_core::Error::UnsupportedCombination {
            format: Format::Protobuf,
            spec_version: SpecVersion::V1_0,
        });
        assert!(matches!(err, ServiceError::UnacceptableMediaType(_)));
        assert!(err.is_client_error());
    }
}
