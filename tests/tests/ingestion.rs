mod common;

use std::sync::Arc;

use anyhow::Result;
use changelane_core::{storage::ArtifactStore, HmacSha256Verifier, IngestConfig, IngestOutcome, Ingestor, RejectReason, WebhookDelivery};
use changelane_storage_memory::MemoryStore;
use changelane_storage_sled::SledStore;
use serde_json::json;

const SECRET: &str = "typeform-signing-secret";

fn verifier() -> Arc<HmacSha256Verifier> { Arc::new(HmacSha256Verifier::new(SECRET)) }

fn signed(tenant: &str, logical_id: &str, event_id: &str) -> WebhookDelivery {
    let payload = serde_json::to_vec(&json!({"event_id": event_id, "answers": [{"field": "impact", "text": "none observed"}]})).unwrap();
    let signature = HmacSha256Verifier::new(SECRET).sign(&payload);
    WebhookDelivery { tenant: tenant.into(), logical_id: logical_id.into(), event_id: event_id.into(), payload, signature: Some(format!("sha256={signature}")) }
}

#[tokio::test]
async fn redelivery_stores_one_artifact() -> Result<()> {
    let store = Arc::new(MemoryStore::new());
    let ingestor = Ingestor::new(store.clone(), verifier());
    let delivery = signed("acme", "chg-1", "evt-42");

    let first = ingestor.ingest(&delivery).await?;
    let IngestOutcome::Stored { artifact } = first else { panic!("expected Stored, got {first:?}") };
    let second = ingestor.ingest(&delivery).await?;
    assert_eq!(second, IngestOutcome::AlreadyStored { artifact: artifact.clone() });

    assert_eq!(store.artifact_names(), vec![artifact.clone()]);
    assert_eq!(store.get(&artifact).await?, Some(delivery.payload.clone()));
    Ok(())
}

#[tokio::test]
async fn similar_event_ids_are_distinct() -> Result<()> {
    let store = Arc::new(MemoryStore::new());
    let ingestor = Ingestor::new(store.clone(), verifier());

    for event_id in ["evt-42", "evt-4", "evt-421"] {
        let outcome = ingestor.ingest(&signed("acme", "chg-1", event_id)).await?;
        assert!(matches!(outcome, IngestOutcome::Stored { .. }), "{event_id}: {outcome:?}");
    }
    // same event for a different record is a different artifact too
    assert!(matches!(ingestor.ingest(&signed("acme", "chg-2", "evt-42")).await?, IngestOutcome::Stored { .. }));
    assert!(matches!(ingestor.ingest(&signed("globex", "chg-1", "evt-42")).await?, IngestOutcome::Stored { .. }));
    assert_eq!(store.artifact_names().len(), 5);
    Ok(())
}

#[tokio::test]
async fn forged_deliveries_are_rejected_before_any_store_access() -> Result<()> {
    let store = Arc::new(MemoryStore::new());
    let ingestor = Ingestor::new(store.clone(), verifier());

    let mut unsigned = signed("acme", "chg-1", "evt-1");
    unsigned.signature = None;
    assert_eq!(ingestor.ingest(&unsigned).await?, IngestOutcome::Rejected(RejectReason::MissingSignature));

    let mut wrong_key = signed("acme", "chg-1", "evt-1");
    wrong_key.signature = Some(HmacSha256Verifier::new("guessed").sign(&wrong_key.payload));
    assert_eq!(ingestor.ingest(&wrong_key).await?, IngestOutcome::Rejected(RejectReason::InvalidSignature));

    // a bad signature wins over bad identifiers
    let mut both = signed("acme", "chg 1", "evt-1");
    both.signature = Some("00".into());
    assert_eq!(ingestor.ingest(&both).await?, IngestOutcome::Rejected(RejectReason::InvalidSignature));

    assert!(store.artifact_names().is_empty());
    Ok(())
}

#[tokio::test]
async fn malformed_identifiers_are_not_security_events() -> Result<()> {
    let store = Arc::new(MemoryStore::new());
    let ingestor = Ingestor::new(store.clone(), verifier());

    for (tenant, logical_id, event_id) in [("", "chg-1", "evt-1"), ("acme", "../chg-1", "evt-1"), ("acme", "chg-1", "evt 1")] {
        let outcome = ingestor.ingest(&signed(tenant, logical_id, event_id)).await?;
        let IngestOutcome::Rejected(reason) = outcome else { panic!("expected Rejected, got {outcome:?}") };
        assert!(matches!(reason, RejectReason::Malformed(_)));
        assert!(!reason.is_security_relevant());
    }
    assert!(store.artifact_names().is_empty());
    Ok(())
}

#[tokio::test]
async fn callbacks_are_deduplicated_on_sled() -> Result<()> {
    let store = SledStore::new_test()?;
    let ingestor = Ingestor::new(store.clone(), verifier()).with_config(IngestConfig::default().with_namespace_root("webhooks/forms"));
    let body = serde_json::to_vec(&json!({
        "event_id": "01J0ZQ4S8Y1V",
        "form_response": {"hidden": {"customer_code": "acme", "object_id": "chg-9"}, "answers": []}
    }))?;
    let signature = HmacSha256Verifier::new(SECRET).sign(&body);

    let first = ingestor.ingest_callback(&body, Some(&signature)).await?;
    let IngestOutcome::Stored { artifact } = first else { panic!("expected Stored, got {first:?}") };
    assert!(artifact.starts_with("webhooks/forms/acme/chg-9/"));
    assert!(artifact.ends_with("_01J0ZQ4S8Y1V.json"));

    assert_eq!(ingestor.ingest_callback(&body, Some(&signature)).await?, IngestOutcome::AlreadyStored { artifact: artifact.clone() });
    assert_eq!(store.list("webhooks/forms/acme/chg-9/").await?, vec![artifact]);

    let incomplete = serde_json::to_vec(&json!({"event_id": "01J0ZQ4S8Y1W", "form_response": {"hidden": {"customer_code": "acme"}}}))?;
    let signature = HmacSha256Verifier::new(SECRET).sign(&incomplete);
    assert!(matches!(ingestor.ingest_callback(&incomplete, Some(&signature)).await?, IngestOutcome::Rejected(RejectReason::Malformed(_))));
    Ok(())
}
