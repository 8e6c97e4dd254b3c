use std::sync::Arc;

use async_trait::async_trait;
use changelane_proto::{RecordId, VersionToken, VersionedRecord, WriterIdentity};

use crate::error::StoreError;

/// Read-with-version and conditional-write-with-version against a document store.
///
/// Implementations must report a stale `expected` token as [`StoreError::VersionConflict`] and
/// must return a token on every successful write that differs from the one it was called with.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn load(&self, id: &RecordId) -> Result<(VersionedRecord, VersionToken), StoreError>;

    /// Write `record` only if the stored revision is still `expected`.
    /// `writer` is attached to the write so change notifications can name their producer.
    async fn write_if_version(
        &self,
        id: &RecordId,
        record: &VersionedRecord,
        expected: VersionToken,
        writer: &WriterIdentity,
    ) -> Result<VersionToken, StoreError>;

    /// First write of a record; fails with [`StoreError::AlreadyExists`] if anything is stored under `id`
    async fn create(&self, id: &RecordId, record: &VersionedRecord, writer: &WriterIdentity) -> Result<VersionToken, StoreError>;
}

/// Flat, append-mostly namespace of named blobs (webhook artifacts)
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Names of every artifact starting with `prefix`, in lexical order
    async fn list(&self, prefix: &str) -> Result<Vec<String>, StoreError>;

    async fn put(&self, name: &str, contents: &[u8]) -> Result<(), StoreError>;

    async fn get(&self, name: &str) -> Result<Option<Vec<u8>>, StoreError>;
}

#[async_trait]
impl<T: DocumentStore + ?Sized> DocumentStore for Arc<T> {
    async fn load(&self, id: &RecordId) -> Result<(VersionedRecord, VersionToken), StoreError> { (**self).load(id).await }

    async fn write_if_version(
        &self,
        id: &RecordId,
        record: &VersionedRecord,
        expected: VersionToken,
        writer: &WriterIdentity,
    ) -> Result<VersionToken, StoreError> {
        (**self).write_if_version(id, record, expected, writer).await
    }

    async fn create(&self, id: &RecordId, record: &VersionedRecord, writer: &WriterIdentity) -> Result<VersionToken, StoreError> {
        (**self).create(id, record, writer).await
    }
}

#[async_trait]
impl<T: ArtifactStore + ?Sized> ArtifactStore for Arc<T> {
    async fn list(&self, prefix: &str) -> Result<Vec<String>, StoreError> { (**self).list(prefix).await }

    async fn put(&self, name: &str, contents: &[u8]) -> Result<(), StoreError> { (**self).put(name, contents).await }

    async fn get(&self, name: &str) -> Result<Option<Vec<u8>>, StoreError> { (**self).get(name).await }
}
