use std::sync::{
    atomic::{AtomicU32, Ordering},
    Mutex,
};

use async_trait::async_trait;
use changelane_core::{error::StoreError, storage::DocumentStore, UpdateConfig};
use changelane_proto::{Modification, RecordId, VersionToken, VersionedRecord, WriterIdentity};
use rand::Rng;
use serde_json::json;
use tokio::time::Instant;
use tracing::Level;

// Initialize tracing for tests
#[ctor::ctor]
fn init_tracing() {
    let level = std::env::var("LOG_LEVEL").ok().and_then(|level| level.parse().ok()).unwrap_or(Level::INFO);
    tracing_subscriber::fmt().with_max_level(level).with_test_writer().init();
}

#[allow(unused)]
pub fn record_id(id: &str) -> RecordId { RecordId::new(id).unwrap() }

#[allow(unused)]
pub fn draft(id: &str) -> VersionedRecord {
    VersionedRecord::new(record_id(id), json!({"title": "Upgrade edge firewalls", "window": "sat 02:00-04:00", "tenant": "acme"}))
}

/// Create `id` as the portal would and return the first version token
#[allow(unused)]
pub async fn seed(store: &impl DocumentStore, id: &str) -> VersionToken {
    let record = draft(id);
    store.create(&record.id, &record, &WriterIdentity::Frontend).await.unwrap()
}

/// Deterministic timing: no jitter, no overall deadline
#[allow(unused)]
pub fn exact_config() -> UpdateConfig { UpdateConfig::default().without_jitter().with_overall_timeout(None) }

/// Yields to the scheduler a random number of times before every store call, so that updaters
/// running on one thread interleave between their load and their write
#[allow(unused)]
pub struct Yielding<S>(pub S);

#[allow(unused)]
impl<S> Yielding<S> {
    async fn shuffle() {
        let yields = rand::thread_rng().gen_range(0..4);
        for _ in 0..yields {
            tokio::task::yield_now().await;
        }
    }
}

#[async_trait]
impl<S: DocumentStore> DocumentStore for Yielding<S> {
    async fn load(&self, id: &RecordId) -> Result<(VersionedRecord, VersionToken), StoreError> {
        Self::shuffle().await;
        self.0.load(id).await
    }

    async fn write_if_version(
        &self,
        id: &RecordId,
        record: &VersionedRecord,
        expected: VersionToken,
        writer: &WriterIdentity,
    ) -> Result<VersionToken, StoreError> {
        Self::shuffle().await;
        self.0.write_if_version(id, record, expected, writer).await
    }

    async fn create(&self, id: &RecordId, record: &VersionedRecord, writer: &WriterIdentity) -> Result<VersionToken, StoreError> {
        self.0.create(id, record, writer).await
    }
}

/// A rival writer that lands its own entry between each load and the following write made
/// through this wrapper, for as many rounds as it is given
#[allow(unused)]
pub struct Contended<S> {
    inner: S,
    rival: WriterIdentity,
    rounds: AtomicU32,
    loads: Mutex<Vec<Instant>>,
}

#[allow(unused)]
impl<S: DocumentStore> Contended<S> {
    pub fn always(inner: S) -> Self { Self::rounds(inner, u32::MAX) }

    pub fn rounds(inner: S, rounds: u32) -> Self {
        Self { inner, rival: WriterIdentity::user("rival").unwrap(), rounds: AtomicU32::new(rounds), loads: Mutex::new(Vec::new()) }
    }

    pub fn inner(&self) -> &S { &self.inner }

    /// When each load arrived, in order
    pub fn load_times(&self) -> Vec<Instant> { self.loads.lock().unwrap().clone() }

    pub fn load_count(&self) -> usize { self.loads.lock().unwrap().len() }

    async fn interfere(&self, id: &RecordId) -> Result<(), StoreError> {
        let take = self.rounds.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1));
        if take.is_err() {
            return Ok(());
        }
        let (mut current, token) = self.inner.load(id).await?;
        current.record(self.rival.clone(), Modification::Updated).map_err(StoreError::backend)?;
        self.inner.write_if_version(id, &current, token, &self.rival).await?;
        Ok(())
    }
}

#[async_trait]
impl<S: DocumentStore> DocumentStore for Contended<S> {
    async fn load(&self, id: &RecordId) -> Result<(VersionedRecord, VersionToken), StoreError> {
        self.loads.lock().unwrap().push(Instant::now());
        self.inner.load(id).await
    }

    async fn write_if_version(
        &self,
        id: &RecordId,
        record: &VersionedRecord,
        expected: VersionToken,
        writer: &WriterIdentity,
    ) -> Result<VersionToken, StoreError> {
        self.interfere(id).await?;
        self.inner.write_if_version(id, record, expected, writer).await
    }

    async fn create(&self, id: &RecordId, record: &VersionedRecord, writer: &WriterIdentity) -> Result<VersionToken, StoreError> {
        self.inner.create(id, record, writer).await
    }
}

/// Fails the next `failures` loads and writes with a transient error
#[allow(unused)]
pub struct Flaky<S> {
    inner: S,
    failures: AtomicU32,
}

#[allow(unused)]
impl<S> Flaky<S> {
    pub fn new(inner: S, failures: u32) -> Self { Self { inner, failures: AtomicU32::new(failures) } }

    fn trip(&self) -> Result<(), StoreError> {
        match self.failures.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1)) {
            Ok(_) => Err(StoreError::transient("503 slow down")),
            Err(_) => Ok(()),
        }
    }
}

#[async_trait]
impl<S: DocumentStore> DocumentStore for Flaky<S> {
    async fn load(&self, id: &RecordId) -> Result<(VersionedRecord, VersionToken), StoreError> {
        self.trip()?;
        self.inner.load(id).await
    }

    async fn write_if_version(
        &self,
        id: &RecordId,
        record: &VersionedRecord,
        expected: VersionToken,
        writer: &WriterIdentity,
    ) -> Result<VersionToken, StoreError> {
        self.trip()?;
        self.inner.write_if_version(id, record, expected, writer).await
    }

    async fn create(&self, id: &RecordId, record: &VersionedRecord, writer: &WriterIdentity) -> Result<VersionToken, StoreError> {
        self.inner.create(id, record, writer).await
    }
}

/// Kinds in the log, oldest first
#[allow(unused)]
pub fn kinds(record: &VersionedRecord) -> Vec<String> { record.modifications().iter().map(|entry| entry.kind().to_owned()).collect() }
