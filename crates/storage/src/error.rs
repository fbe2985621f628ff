//! Storage error types.

use thiserror::Error;

/// Storage operation errors.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("document not found: {0}")]
    NotFound(String),

    #[error("document already exists: {0}")]
    AlreadyExists(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("S3 error: {0}")]
    S3(#[from] Box<dyn std::error::Error + Send + Sync>),

    #[error("invalid key: {0}")]
    InvalidKey(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("corrupt storage record {key}: {message}")]
    Corrupt { key: String, message: String },

    #[error("unsupported storage layout version {found} (this build supports {supported})")]
    UnsupportedLayout { found: u32, supported: u32 },

    #[error("bulk delete failed for {} keys", failed.len())]
    BatchDelete { failed: Vec<String> },

    #[error("operation cancelled")]
    Cancelled,
}

impl StorageError {
    /// Whether this is the create-only conflict signal.
    pub fn is_already_exists(&self) -> bool {
        matches!(self, StorageError::AlreadyExists(_))
    }
}

/// Result type for storage operations.
pub type StorageResult<T> = std::result::Result<T, StorageError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn batch_delete_reports_failure_count() {
        let err = StorageError::BatchDelete {
            failed: vec!["a".to_string(), "b".to_string()],
        };
        assert_eq!(err.to_string(), "bulk delete failed for 2 keys");
    }

    #[test]
    fn only_conflicts_are_already_exists() {
        assert!(StorageError::AlreadyExists("k".to_string()).is_already_exists());
        assert!(!StorageError::NotFound("k".to_string()).is_already_exists());
        assert!(!StorageError::Cancelled.is_already_exists());
    }
}
