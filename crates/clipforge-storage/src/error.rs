//! Storage error types.

use std::path::PathBuf;
use thiserror::Error;

use clipforge_models::ErrorKind;

pub type StorageResult<T> = Result<T, StorageError>;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Upload exceeds the {limit} byte ceiling")]
    QuotaExceeded { limit: u64 },

    #[error("Output already exists: {0}")]
    Collision(PathBuf),

    #[error("Not found: {0}")]
    NotFound(PathBuf),

    #[error("Unsupported file extension: {0}")]
    UnsupportedExtension(String),
}

impl StorageError {
    /// Map into the API-facing taxonomy.
    pub fn kind(&self) -> ErrorKind {
        match self {
            StorageError::Io(_) | StorageError::Collision(_) => ErrorKind::IoFault,
            StorageError::QuotaExceeded { .. } => ErrorKind::QuotaExceeded,
            StorageError::NotFound(_) => ErrorKind::NotFound,
            StorageError::UnsupportedExtension(_) => ErrorKind::InvalidSpec,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_mapping() {
        assert_eq!(
            StorageError::QuotaExceeded { limit: 500 }.kind(),
            ErrorKind::QuotaExceeded
        );
        assert_eq!(
            StorageError::Collision(PathBuf::from("/out")).kind(),
            ErrorKind::IoFault
        );
        assert_eq!(
            StorageError::UnsupportedExtension(".txt".into()).kind(),
            ErrorKind::InvalidSpec
        );
    }
}
