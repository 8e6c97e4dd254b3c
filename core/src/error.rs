//! Error types for store access, record updates and webhook ingestion.
//!
//! Store outcomes are a closed enum so that callers branch on conflict vs transient vs fatal
//! without inspecting messages.

use changelane_proto::{DecodeError, RecordError, RecordId};
use thiserror::Error;

type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Outcome of a failed store operation
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("record not found: {0}")]
    NotFound(RecordId),

    #[error("record already exists: {0}")]
    AlreadyExists(RecordId),

    /// The expected version token no longer matches the stored revision
    #[error("version conflict on {0}")]
    VersionConflict(RecordId),

    /// Connectivity or throttling; the same request may succeed later
    #[error("transient store error: {0}")]
    Transient(BoxError),

    #[error("stored document {id} could not be decoded: {source}")]
    Corrupt { id: RecordId, source: BoxError },

    #[error("backend error: {0}")]
    Backend(BoxError),
}

impl StoreError {
    pub fn transient(err: impl Into<BoxError>) -> Self { StoreError::Transient(err.into()) }

    pub fn backend(err: impl Into<BoxError>) -> Self { StoreError::Backend(err.into()) }

    pub fn corrupt(id: &RecordId, err: impl Into<BoxError>) -> Self { StoreError::Corrupt { id: id.clone(), source: err.into() } }

    /// Conflicts and transient failures are worth another attempt; nothing else is
    pub fn is_retryable(&self) -> bool { matches!(self, StoreError::VersionConflict(_) | StoreError::Transient(_)) }
}

/// Why an update stopped before its write was confirmed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelReason {
    /// The caller's cancellation signal fired
    Signal,
    /// The overall deadline elapsed
    Deadline,
}

impl std::fmt::Display for CancelReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CancelReason::Signal => write!(f, "cancelled by caller"),
            CancelReason::Deadline => write!(f, "deadline exceeded"),
        }
    }
}

/// Error type for [`crate::update::Updater`] operations
#[derive(Debug, Error)]
pub enum UpdateError {
    #[error("record not found: {0}")]
    NotFound(RecordId),

    #[error("record already exists: {0}")]
    AlreadyExists(RecordId),

    /// Every attempt lost a race (or hit a transient failure)
    #[error("gave up updating {id} after {attempts} attempts")]
    ConcurrencyExhausted { id: RecordId, attempts: u32 },

    #[error("update of {id} {reason} after {attempts} attempts")]
    Cancelled { id: RecordId, reason: CancelReason, attempts: u32 },

    /// The mutation refused to produce a candidate
    #[error("mutation rejected: {0}")]
    Rejected(#[from] RecordError),

    /// The mutation removed or reordered existing log entries
    #[error("mutation of {0} rewrote the modification log")]
    LogRewritten(RecordId),

    #[error("store error: {0}")]
    Store(StoreError),
}

impl UpdateError {
    /// Message suitable for the person whose edit failed
    pub fn user_message(&self) -> &'static str {
        match self {
            UpdateError::ConcurrencyExhausted { .. } => "your change could not be saved, please retry",
            UpdateError::Cancelled { .. } => "saving your change took too long, please retry",
            UpdateError::NotFound(_) => "this item no longer exists",
            UpdateError::AlreadyExists(_) => "this item already exists",
            UpdateError::Rejected(_) | UpdateError::LogRewritten(_) => "this change is not allowed",
            UpdateError::Store(_) => "your change could not be saved",
        }
    }
}

impl From<StoreError> for UpdateError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(id) => UpdateError::NotFound(id),
            StoreError::AlreadyExists(id) => UpdateError::AlreadyExists(id),
            other => UpdateError::Store(other),
        }
    }
}

/// Infrastructure failure while ingesting; rejected deliveries are an outcome, not an error
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("artifact store error: {0}")]
    Store(#[from] StoreError),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{var} is not a valid {expected}: {value:?}")]
    Invalid { var: &'static str, expected: &'static str, value: String },

    #[error("{var}: {source}")]
    Component { var: &'static str, source: DecodeError },
}
