//! At-most-once persistence of externally delivered events (form-submission webhooks).
//!
//! Deliveries are authenticated, then deduplicated by listing the artifacts already stored for
//! `(tenant, logical_id)` and looking for one whose name carries the sender's event id.
//! Listing and writing are separate store calls, so two concurrent deliveries of the same event
//! can both miss each other and both write. Sequential redeliveries never duplicate.

use std::sync::Arc;

use chrono::Utc;
use changelane_proto::DedupKey;
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;
use thiserror::Error;
use tracing::{info, warn};

use crate::{config::IngestConfig, error::IngestError, storage::ArtifactStore};

/// Target for authentication failures, kept apart from ordinary validation noise
pub const SECURITY_TARGET: &str = "changelane::security";

const SIGNATURE_PREFIX: &str = "sha256=";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SignatureError {
    #[error("signature missing")]
    Missing,
    #[error("signature is not valid hex")]
    Malformed,
    #[error("signature does not match payload")]
    Mismatch,
}

/// Authenticates a delivery before anything else looks at it
pub trait WebhookVerifier: Send + Sync {
    fn verify(&self, payload: &[u8], signature: Option<&str>) -> Result<(), SignatureError>;
}

/// Hex-encoded HMAC-SHA256 over the raw payload, optionally prefixed with `sha256=`
pub struct HmacSha256Verifier {
    secret: Vec<u8>,
}

impl HmacSha256Verifier {
    pub fn new(secret: impl Into<Vec<u8>>) -> Self { Self { secret: secret.into() } }

    fn mac(&self) -> Hmac<Sha256> {
        // HMAC accepts keys of any length
        <Hmac<Sha256> as Mac>::new_from_slice(&self.secret).unwrap_or_else(|_| unreachable!())
    }

    /// The signature a sender sharing this secret attaches to `payload`
    pub fn sign(&self, payload: &[u8]) -> String {
        let mut mac = self.mac();
        mac.update(payload);
        hex::encode(mac.finalize().into_bytes())
    }
}

impl std::fmt::Debug for HmacSha256Verifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result { write!(f, "HmacSha256Verifier(<redacted>)") }
}

impl WebhookVerifier for HmacSha256Verifier {
    fn verify(&self, payload: &[u8], signature: Option<&str>) -> Result<(), SignatureError> {
        let signature = signature.map(str::trim).filter(|s| !s.is_empty()).ok_or(SignatureError::Missing)?;
        let signature = signature.strip_prefix(SIGNATURE_PREFIX).unwrap_or(signature);
        let expected = hex::decode(signature).map_err(|_| SignatureError::Malformed)?;
        let mut mac = self.mac();
        mac.update(payload);
        // constant time comparison
        mac.verify_slice(&expected).map_err(|_| SignatureError::Mismatch)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RejectReason {
    MissingSignature,
    InvalidSignature,
    /// Authentic but unusable: bad identifiers or an unparseable body
    Malformed(String),
}

impl RejectReason {
    pub fn is_security_relevant(&self) -> bool { matches!(self, RejectReason::MissingSignature | RejectReason::InvalidSignature) }
}

impl From<SignatureError> for RejectReason {
    fn from(err: SignatureError) -> Self {
        match err {
            SignatureError::Missing => RejectReason::MissingSignature,
            SignatureError::Malformed | SignatureError::Mismatch => RejectReason::InvalidSignature,
        }
    }
}

impl std::fmt::Display for RejectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RejectReason::MissingSignature => write!(f, "missing signature"),
            RejectReason::InvalidSignature => write!(f, "invalid signature"),
            RejectReason::Malformed(why) => write!(f, "malformed delivery: {}", why),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestOutcome {
    Stored { artifact: String },
    /// A previous delivery of the same event was already persisted; nothing was written
    AlreadyStored { artifact: String },
    Rejected(RejectReason),
}

/// One delivery as received from the sender
#[derive(Debug, Clone)]
pub struct WebhookDelivery {
    pub tenant: String,
    pub logical_id: String,
    /// Sender-assigned, stable across redeliveries
    pub event_id: String,
    pub payload: Vec<u8>,
    pub signature: Option<String>,
}

#[derive(Deserialize)]
struct FormCallback {
    event_id: String,
    form_response: FormResponse,
}

#[derive(Deserialize)]
struct FormResponse {
    hidden: HiddenFields,
}

#[derive(Deserialize)]
struct HiddenFields {
    #[serde(alias = "customer_code")]
    tenant: String,
    #[serde(alias = "object_id", alias = "change_id")]
    record_id: String,
}

pub struct Ingestor<A> {
    artifacts: A,
    verifier: Arc<dyn WebhookVerifier>,
    config: IngestConfig,
}

impl<A: ArtifactStore> Ingestor<A> {
    pub fn new(artifacts: A, verifier: Arc<dyn WebhookVerifier>) -> Self { Self { artifacts, verifier, config: IngestConfig::default() } }

    pub fn with_config(mut self, config: IngestConfig) -> Self {
        self.config = config;
        self
    }

    pub fn artifacts(&self) -> &A { &self.artifacts }

    pub async fn ingest(&self, delivery: &WebhookDelivery) -> Result<IngestOutcome, IngestError> {
        if let Err(err) = self.verifier.verify(&delivery.payload, delivery.signature.as_deref()) {
            return Ok(self.reject_unauthenticated(err, &format!("{:?}/{:?}#{:?}", delivery.tenant, delivery.logical_id, delivery.event_id)));
        }
        self.store_once(&delivery.tenant, &delivery.logical_id, &delivery.event_id, &delivery.payload).await
    }

    /// Ingest a raw form-submission callback; identifiers come from the body's hidden fields
    pub async fn ingest_callback(&self, body: &[u8], signature: Option<&str>) -> Result<IngestOutcome, IngestError> {
        if let Err(err) = self.verifier.verify(body, signature) {
            return Ok(self.reject_unauthenticated(err, &format!("callback of {} bytes", body.len())));
        }
        let callback: FormCallback = match serde_json::from_slice(body) {
            Ok(callback) => callback,
            Err(err) => return Ok(self.reject_malformed("callback", err.to_string())),
        };
        let hidden = callback.form_response.hidden;
        self.store_once(&hidden.tenant, &hidden.record_id, &callback.event_id, body).await
    }

    async fn store_once(&self, tenant: &str, logical_id: &str, event_id: &str, payload: &[u8]) -> Result<IngestOutcome, IngestError> {
        let key = match DedupKey::new(tenant, logical_id, event_id) {
            Ok(key) => key,
            Err(err) => return Ok(self.reject_malformed(&format!("{:?}/{:?}#{:?}", tenant, logical_id, event_id), err.to_string())),
        };
        let root = self.config.namespace_root.as_str();

        let existing = self.artifacts.list(&key.prefix(root)).await?;
        if let Some(artifact) = existing.into_iter().find(|name| key.matches_artifact(root, name)) {
            info!("Ingestor({}) already stored {} as {}", root, key, artifact);
            return Ok(IngestOutcome::AlreadyStored { artifact });
        }

        let artifact = key.artifact_name(root, Utc::now());
        self.artifacts.put(&artifact, payload).await?;
        info!("Ingestor({}) stored {} as {}", root, key, artifact);
        Ok(IngestOutcome::Stored { artifact })
    }

    fn reject_unauthenticated(&self, err: SignatureError, what: &str) -> IngestOutcome {
        let reason = RejectReason::from(err.clone());
        warn!(target: SECURITY_TARGET, "Ingestor({}) rejected {}: {} ({})", self.config.namespace_root, what, reason, err);
        IngestOutcome::Rejected(reason)
    }

    fn reject_malformed(&self, what: &str, why: String) -> IngestOutcome {
        warn!("Ingestor({}) rejected {}: {}", self.config.namespace_root, what, why);
        IngestOutcome::Rejected(RejectReason::Malformed(why))
    }
}
