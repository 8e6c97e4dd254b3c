use std::{path::PathBuf, sync::Arc};

use async_trait::async_trait;
use changelane_core::{
    error::StoreError,
    storage::{ArtifactStore, DocumentStore},
};
use changelane_proto::{RecordId, VersionToken, VersionedRecord, WriterIdentity};
use sled::Config;
use tokio::task;
use tracing::debug;

use crate::{
    database::{Database, Envelope},
    error::{corrupt, sled_error, SledStoreError},
};

/// Durable store backed by a local sled database.
///
/// Conditional writes compare the stored envelope bytes, so a write only lands if nothing
/// replaced the revision the caller loaded.
#[derive(Clone)]
pub struct SledStore {
    database: Arc<Database>,
}

impl SledStore {
    pub fn with_homedir_folder(folder_name: &str) -> anyhow::Result<Self> {
        let dir = dirs::home_dir().ok_or_else(|| anyhow::anyhow!("Failed to get home directory"))?.join(folder_name);

        Self::with_path(dir)
    }

    pub fn with_path(path: PathBuf) -> anyhow::Result<Self> {
        std::fs::create_dir_all(&path)?;
        let db = sled::open(path.join("sled"))?;
        Ok(Self { database: Arc::new(Database::open(db)?) })
    }

    pub fn new() -> anyhow::Result<Self> { Self::with_homedir_folder(".changelane") }

    pub fn new_test() -> anyhow::Result<Self> {
        let db = Config::new().temporary(true).flush_every_ms(None).open()?;
        Ok(Self { database: Arc::new(Database::open(db)?) })
    }

    /// Who wrote the current revision of `id`, if it exists
    pub async fn last_writer(&self, id: &RecordId) -> Result<Option<WriterIdentity>, StoreError> {
        let me = self.clone();
        let id = id.clone();
        task::spawn_blocking(move || me.get_envelope_blocking(&id).map(|found| found.map(|(envelope, _)| envelope.writer)))
            .await
            .map_err(SledStoreError::from)?
    }

    pub async fn flush(&self) -> Result<(), StoreError> {
        self.database.db.flush_async().await.map_err(sled_error)?;
        Ok(())
    }

    fn get_envelope_blocking(&self, id: &RecordId) -> Result<Option<(Envelope, sled::IVec)>, StoreError> {
        match self.database.records_tree.get(id.as_str().as_bytes()).map_err(sled_error)? {
            Some(bytes) => {
                let envelope = Envelope::decode(&bytes).map_err(|err| corrupt(id, err))?;
                Ok(Some((envelope, bytes)))
            }
            None => Ok(None),
        }
    }

    fn load_blocking(&self, id: RecordId) -> Result<(VersionedRecord, VersionToken), StoreError> {
        let (envelope, _) = self.get_envelope_blocking(&id)?.ok_or(StoreError::NotFound(id))?;
        Ok((envelope.record, envelope.version))
    }

    fn write_if_version_blocking(
        &self,
        id: RecordId,
        record: VersionedRecord,
        expected: VersionToken,
        writer: WriterIdentity,
    ) -> Result<VersionToken, StoreError> {
        let Some((current, current_bytes)) = self.get_envelope_blocking(&id)? else {
            return Err(StoreError::NotFound(id));
        };
        if current.version != expected {
            debug!("SledStore conflict on {}: expected {:#}, found {:#}", id, expected, current.version);
            return Err(StoreError::VersionConflict(id));
        }

        let version = VersionToken::generate();
        let envelope = Envelope { version: version.clone(), writer, record };
        let bytes = envelope.encode().map_err(SledStoreError::from)?;

        // Atomically replace only the exact revision we compared against
        match self.database.records_tree.compare_and_swap(id.as_str().as_bytes(), Some(current_bytes), Some(bytes)).map_err(sled_error)? {
            Ok(()) => Ok(version),
            Err(_) => {
                debug!("SledStore lost compare-and-swap on {}", id);
                Err(StoreError::VersionConflict(id))
            }
        }
    }

    fn create_blocking(&self, id: RecordId, record: VersionedRecord, writer: WriterIdentity) -> Result<VersionToken, StoreError> {
        let version = VersionToken::generate();
        let envelope = Envelope { version: version.clone(), writer, record };
        let bytes = envelope.encode().map_err(SledStoreError::from)?;

        // Atomically insert only if key doesn't exist (expected = None)
        match self.database.records_tree.compare_and_swap(id.as_str().as_bytes(), None::<&[u8]>, Some(bytes)).map_err(sled_error)? {
            Ok(()) => Ok(version),
            Err(_) => Err(StoreError::AlreadyExists(id)),
        }
    }

    fn list_blocking(&self, prefix: String) -> Result<Vec<String>, StoreError> {
        let mut names = Vec::new();
        for item in self.database.artifacts_tree.scan_prefix(prefix.as_bytes()) {
            let (key, _) = item.map_err(sled_error)?;
            names.push(String::from_utf8(key.to_vec()).map_err(SledStoreError::from)?);
        }
        Ok(names)
    }
}

#[async_trait]
impl DocumentStore for SledStore {
    // each trait method hands off to its blocking counterpart
    async fn load(&self, id: &RecordId) -> Result<(VersionedRecord, VersionToken), StoreError> {
        let me = self.clone();
        let id = id.clone();
        task::spawn_blocking(move || me.load_blocking(id)).await.map_err(SledStoreError::from)?
    }

    async fn write_if_version(
        &self,
        id: &RecordId,
        record: &VersionedRecord,
        expected: VersionToken,
        writer: &WriterIdentity,
    ) -> Result<VersionToken, StoreError> {
        let me = self.clone();
        let (id, record, writer) = (id.clone(), record.clone(), writer.clone());
        task::spawn_blocking(move || me.write_if_version_blocking(id, record, expected, writer)).await.map_err(SledStoreError::from)?
    }

    async fn create(&self, id: &RecordId, record: &VersionedRecord, writer: &WriterIdentity) -> Result<VersionToken, StoreError> {
        let me = self.clone();
        let (id, record, writer) = (id.clone(), record.clone(), writer.clone());
        task::spawn_blocking(move || me.create_blocking(id, record, writer)).await.map_err(SledStoreError::from)?
    }
}

#[async_trait]
impl ArtifactStore for SledStore {
    async fn list(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        let me = self.clone();
        let prefix = prefix.to_owned();
        task::spawn_blocking(move || me.list_blocking(prefix)).await.map_err(SledStoreError::from)?
    }

    async fn put(&self, name: &str, contents: &[u8]) -> Result<(), StoreError> {
        let me = self.clone();
        let (name, contents) = (name.to_owned(), contents.to_vec());
        task::spawn_blocking(move || me.database.artifacts_tree.insert(name.as_bytes(), contents).map(|_| ()).map_err(sled_error))
            .await
            .map_err(SledStoreError::from)?
    }

    async fn get(&self, name: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let me = self.clone();
        let name = name.to_owned();
        task::spawn_blocking(move || me.database.artifacts_tree.get(name.as_bytes()).map(|v| v.map(|v| v.to_vec())).map_err(sled_error))
            .await
            .map_err(SledStoreError::from)?
    }
}
