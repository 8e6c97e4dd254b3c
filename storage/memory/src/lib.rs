//! Document and artifact store held in process memory.
//!
//! Records are kept in their encoded JSON form so loads go through the same decoding a remote
//! store would. Every successful record write is announced on a broadcast channel as a
//! [`ChangeNotification`] carrying the writer identity, which lets tests and single-process
//! deployments wire the self-event filter to real write traffic.

use std::{
    collections::BTreeMap,
    sync::{
        atomic::{AtomicU64, Ordering},
        Mutex,
    },
};

use async_trait::async_trait;
use changelane_core::{
    error::StoreError,
    storage::{ArtifactStore, DocumentStore},
};
use changelane_proto::{ChangeNotification, RecordId, VersionToken, VersionedRecord, WriterIdentity};
use tokio::sync::broadcast;
use tracing::debug;

pub const CREATED_EVENT: &str = "ObjectCreated:Put";
pub const UPDATED_EVENT: &str = "ObjectUpdated:Put";

const NOTIFICATION_CAPACITY: usize = 1024;

struct StoredRecord {
    version: VersionToken,
    encoded: Vec<u8>,
}

pub struct MemoryStore {
    records: Mutex<BTreeMap<RecordId, StoredRecord>>,
    artifacts: Mutex<BTreeMap<String, Vec<u8>>>,
    notifications: broadcast::Sender<ChangeNotification>,
    loads: AtomicU64,
    writes: AtomicU64,
}

impl Default for MemoryStore {
    fn default() -> Self { Self::new() }
}

impl MemoryStore {
    pub fn new() -> Self {
        let (notifications, _rx) = broadcast::channel(NOTIFICATION_CAPACITY);
        Self {
            records: Mutex::new(BTreeMap::new()),
            artifacts: Mutex::new(BTreeMap::new()),
            notifications,
            loads: AtomicU64::new(0),
            writes: AtomicU64::new(0),
        }
    }

    /// Receive a notification for every record write made after this call
    pub fn subscribe(&self) -> broadcast::Receiver<ChangeNotification> { self.notifications.subscribe() }

    /// Loads attempted, including ones that failed
    pub fn load_count(&self) -> u64 { self.loads.load(Ordering::SeqCst) }

    /// Successful record writes (creates and conditional writes)
    pub fn write_count(&self) -> u64 { self.writes.load(Ordering::SeqCst) }

    pub fn artifact_names(&self) -> Vec<String> { self.artifacts.lock().unwrap().keys().cloned().collect() }

    pub fn current_version(&self, id: &RecordId) -> Option<VersionToken> { self.records.lock().unwrap().get(id).map(|r| r.version.clone()) }

    fn announce(&self, id: &RecordId, event_name: &str, writer: &WriterIdentity) {
        self.writes.fetch_add(1, Ordering::SeqCst);
        let notification = ChangeNotification::for_write(id, event_name, writer).with_object_key(object_key(id));
        // nobody listening is fine
        let _ = self.notifications.send(notification);
    }
}

fn object_key(id: &RecordId) -> String { format!("records/{}.json", id) }

fn encode(record: &VersionedRecord) -> Result<Vec<u8>, StoreError> { record.to_json().map_err(StoreError::backend) }

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn load(&self, id: &RecordId) -> Result<(VersionedRecord, VersionToken), StoreError> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        let records = self.records.lock().unwrap();
        let stored = records.get(id).ok_or_else(|| StoreError::NotFound(id.clone()))?;
        let record = VersionedRecord::from_json(&stored.encoded).map_err(|err| StoreError::corrupt(id, err))?;
        Ok((record, stored.version.clone()))
    }

    async fn write_if_version(
        &self,
        id: &RecordId,
        record: &VersionedRecord,
        expected: VersionToken,
        writer: &WriterIdentity,
    ) -> Result<VersionToken, StoreError> {
        let encoded = encode(record)?;
        let version = {
            let mut records = self.records.lock().unwrap();
            let stored = records.get_mut(id).ok_or_else(|| StoreError::NotFound(id.clone()))?;
            if stored.version != expected {
                debug!("MemoryStore conflict on {}: expected {:#}, found {:#}", id, expected, stored.version);
                return Err(StoreError::VersionConflict(id.clone()));
            }
            let version = VersionToken::generate();
            *stored = StoredRecord { version: version.clone(), encoded };
            version
        };
        self.announce(id, UPDATED_EVENT, writer);
        Ok(version)
    }

    async fn create(&self, id: &RecordId, record: &VersionedRecord, writer: &WriterIdentity) -> Result<VersionToken, StoreError> {
        let encoded = encode(record)?;
        let version = {
            let mut records = self.records.lock().unwrap();
            if records.contains_key(id) {
                return Err(StoreError::AlreadyExists(id.clone()));
            }
            let version = VersionToken::generate();
            records.insert(id.clone(), StoredRecord { version: version.clone(), encoded });
            version
        };
        self.announce(id, CREATED_EVENT, writer);
        Ok(version)
    }
}

#[async_trait]
impl ArtifactStore for MemoryStore {
    async fn list(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        let artifacts = self.artifacts.lock().unwrap();
        Ok(artifacts.range(prefix.to_owned()..).map(|(name, _)| name).take_while(|name| name.starts_with(prefix)).cloned().collect())
    }

    async fn put(&self, name: &str, contents: &[u8]) -> Result<(), StoreError> {
        self.artifacts.lock().unwrap().insert(name.to_owned(), contents.to_vec());
        Ok(())
    }

    async fn get(&self, name: &str) -> Result<Option<Vec<u8>>, StoreError> { Ok(self.artifacts.lock().unwrap().get(name).cloned()) }
}
