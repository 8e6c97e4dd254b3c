//! Optimistic read-modify-write of a [`VersionedRecord`].
//!
//! Every attempt loads the record fresh, re-applies the mutation to what it loaded and writes
//! conditionally on the token from that same load. Concurrent appends from different writers
//! therefore merge instead of overwriting each other; a lost race costs one reload.

use changelane_proto::{Modification, RecordError, RecordId, VersionToken, VersionedRecord, WriterIdentity};
use tracing::{debug, warn};

use crate::{
    cancel::Cancellation,
    config::UpdateConfig,
    error::{CancelReason, StoreError, UpdateError},
    storage::DocumentStore,
};

/// A successfully written revision
#[derive(Debug, Clone)]
pub struct Updated {
    pub record: VersionedRecord,
    pub version: VersionToken,
    /// Tries used, including the successful one
    pub attempts: u32,
}

pub struct Updater<S> {
    store: S,
    writer: WriterIdentity,
    config: UpdateConfig,
}

impl<S: DocumentStore> Updater<S> {
    pub fn new(store: S, writer: WriterIdentity) -> Self { Self { store, writer, config: UpdateConfig::default() } }

    pub fn with_config(mut self, config: UpdateConfig) -> Self {
        self.config = config;
        self
    }

    pub fn writer(&self) -> &WriterIdentity { &self.writer }

    pub fn config(&self) -> &UpdateConfig { &self.config }

    pub fn store(&self) -> &S { &self.store }

    /// First write of a record. New records start with an empty modification log.
    pub async fn create(&self, record: VersionedRecord, cancel: &Cancellation) -> Result<Updated, UpdateError> {
        if !record.modifications().is_empty() {
            return Err(RecordError::Refused("new records start with an empty modification log".into()).into());
        }
        let cancel = self.overall(cancel);
        let id = record.id.clone();
        match cancel.run(self.store.create(&id, &record, &self.writer)).await {
            Ok(Ok(version)) => {
                debug!("Updater({}) created {} at {:#}", self.writer, id, version);
                Ok(Updated { record, version, attempts: 1 })
            }
            Ok(Err(err)) => Err(err.into()),
            Err(reason) => Err(self.cancelled(&id, reason, 1)),
        }
    }

    /// Append one entry authored by this updater's writer, stamped at the time of each attempt
    pub async fn append(&self, id: &RecordId, modification: Modification, cancel: &Cancellation) -> Result<Updated, UpdateError> {
        let writer = self.writer.clone();
        self.update(
            id,
            move |mut record| {
                record.record(writer.clone(), modification.clone())?;
                Ok(record)
            },
            cancel,
        )
        .await
    }

    /// Apply `mutate` under optimistic concurrency control.
    ///
    /// `mutate` receives the freshly loaded record on every attempt and must only append to its
    /// modification log; it may be called several times and should have no side effects.
    pub async fn update<F>(&self, id: &RecordId, mutate: F, cancel: &Cancellation) -> Result<Updated, UpdateError>
    where F: Fn(VersionedRecord) -> Result<VersionedRecord, RecordError> {
        let cancel = self.overall(cancel);
        let tries = self.config.max_retries.saturating_add(1);

        for attempt in 1..=tries {
            let (current, token) = match cancel.run(self.store.load(id)).await {
                Ok(Ok(loaded)) => loaded,
                Ok(Err(err)) if err.is_retryable() => {
                    debug!("Updater({}) load of {} failed on attempt {}/{}: {}", self.writer, id, attempt, tries, err);
                    self.pause(id, attempt, tries, &cancel).await?;
                    continue;
                }
                Ok(Err(err)) => return Err(err.into()),
                Err(reason) => return Err(self.cancelled(id, reason, attempt)),
            };

            let candidate = mutate(current.clone())?;
            let Some(appended) = candidate.appended_since(&current) else {
                return Err(UpdateError::LogRewritten(id.clone()));
            };
            debug!("Updater({}) appending {} entries to {} on attempt {}/{}", self.writer, appended.len(), id, attempt, tries);

            // the token is moved into the write; a retry always reloads for a new one
            match cancel.run(self.store.write_if_version(id, &candidate, token, &self.writer)).await {
                Ok(Ok(version)) => {
                    debug!("Updater({}) wrote {} at {:#} on attempt {}/{}", self.writer, id, version, attempt, tries);
                    return Ok(Updated { record: candidate, version, attempts: attempt });
                }
                Ok(Err(err)) if err.is_retryable() => {
                    match &err {
                        StoreError::VersionConflict(_) => {
                            debug!("Updater({}) lost the race for {} on attempt {}/{}", self.writer, id, attempt, tries)
                        }
                        other => debug!("Updater({}) write of {} failed on attempt {}/{}: {}", self.writer, id, attempt, tries, other),
                    }
                    self.pause(id, attempt, tries, &cancel).await?;
                }
                Ok(Err(err)) => return Err(err.into()),
                Err(reason) => return Err(self.cancelled(id, reason, attempt)),
            }
        }

        warn!("Updater({}) gave up on {} after {} attempts", self.writer, id, tries);
        Err(UpdateError::ConcurrencyExhausted { id: id.clone(), attempts: tries })
    }

    /// Backoff between a failed attempt and the next load. Nothing follows the final attempt.
    async fn pause(&self, id: &RecordId, attempt: u32, tries: u32, cancel: &Cancellation) -> Result<(), UpdateError> {
        if attempt >= tries {
            return Ok(());
        }
        let delay = self.config.backoff.jittered(attempt);
        debug!("Updater({}) retrying {} in {:?}", self.writer, id, delay);
        cancel.run(tokio::time::sleep(delay)).await.map_err(|reason| self.cancelled(id, reason, attempt))
    }

    fn overall(&self, cancel: &Cancellation) -> Cancellation {
        match self.config.overall_timeout {
            Some(timeout) => cancel.clone().with_timeout(timeout),
            None => cancel.clone(),
        }
    }

    fn cancelled(&self, id: &RecordId, reason: CancelReason, attempts: u32) -> UpdateError {
        warn!("Updater({}) update of {} {} after {} attempts", self.writer, id, reason, attempts);
        UpdateError::Cancelled { id: id.clone(), reason, attempts }
    }
}
