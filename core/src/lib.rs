pub mod backoff;
pub mod cancel;
pub mod config;
pub mod error;
pub mod filter;
pub mod ingest;
pub mod storage;
pub mod update;

pub use backoff::Backoff;
pub use cancel::Cancellation;
pub use config::{FilterConfig, IngestConfig, UpdateConfig};
pub use error::{CancelReason, ConfigError, IngestError, StoreError, UpdateError};
pub use filter::{FilterDecision, SelfEventFilter};
pub use ingest::{HmacSha256Verifier, IngestOutcome, Ingestor, RejectReason, WebhookDelivery, WebhookVerifier};
pub use storage::{ArtifactStore, DocumentStore};
pub use update::{Updated, Updater};

pub use changelane_proto as proto;
