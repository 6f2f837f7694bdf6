use std::io;

use thiserror::Error;

/// Failures reported by a [`BlobService`](crate::BlobService) implementation.
///
/// The backend never inspects or retries these; they reach the caller as-is
/// through [`StorageError::Service`].
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("blob `{container}/{blob}` not found")]
    BlobNotFound { container: String, blob: String },
    #[error("container `{0}` not found")]
    ContainerNotFound(String),
    #[error("invalid block list: {0}")]
    InvalidBlockList(String),
    #[error("authentication failed: {0}")]
    Authentication(String),
    #[error("request throttled by the blob service")]
    Throttled,
    #[error("blob service transport error: {0}")]
    Io(#[from] io::Error),
}

impl ServiceError {
    pub fn blob_not_found(container: &str, blob: &str) -> Self {
        Self::BlobNotFound {
            container: container.to_string(),
            blob: blob.to_string(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::BlobNotFound { .. } | Self::ContainerNotFound(_))
    }
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error(transparent)]
    Service(#[from] ServiceError),
    #[error("invalid open mode `{0}`")]
    InvalidMode(String),
    #[error("blob handle opened for {mode} does not support {operation}")]
    Unsupported {
        mode: &'static str,
        operation: &'static str,
    },
    #[error("blob handle for `{0}` failed earlier; nothing was committed")]
    Poisoned(String),
    #[error("invalid storage configuration: {0}")]
    Config(String),
    #[error("storage I/O error: {0}")]
    Io(#[from] io::Error),
}

impl StorageError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Service(err) if err.is_not_found())
    }
}

impl From<StorageError> for io::Error {
    fn from(value: StorageError) -> Self {
        match value {
            StorageError::Io(err) => err,
            StorageError::Unsupported { .. } => io::Error::new(io::ErrorKind::Unsupported, value),
            err if err.is_not_found() => io::Error::new(io::ErrorKind::NotFound, err),
            err => io::Error::other(err),
        }
    }
}
