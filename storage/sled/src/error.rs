use changelane_core::error::StoreError;
use changelane_proto::RecordId;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SledStoreError {
    #[error("Storage error: {0}")]
    StorageError(#[from] sled::Error),
    #[error("Envelope error: {0}")]
    EnvelopeError(#[from] serde_json::Error),
    #[error("Artifact name is not UTF-8: {0}")]
    Utf8Error(#[from] std::string::FromUtf8Error),
    #[error("Blocking task failed: {0}")]
    TaskError(#[from] tokio::task::JoinError),
}

impl From<SledStoreError> for StoreError {
    fn from(err: SledStoreError) -> Self {
        match err {
            // I/O trouble may clear up; anything else sled reports is not worth repeating
            SledStoreError::StorageError(sled::Error::Io(e)) => StoreError::transient(e),
            other => StoreError::backend(other),
        }
    }
}

pub fn sled_error(err: sled::Error) -> StoreError { SledStoreError::StorageError(err).into() }

pub fn corrupt(id: &RecordId, err: serde_json::Error) -> StoreError { StoreError::corrupt(id, err) }
