mod common;

use std::sync::Arc;

use anyhow::Result;
use changelane_core::{storage::DocumentStore, Cancellation, UpdateError, Updater};
use changelane_proto::{MeetingReference, Modification, RecordError, VersionedRecord, WriterIdentity};
use changelane_storage_memory::MemoryStore;
use changelane_storage_sled::SledStore;
use common::*;
use serde_json::json;

/// A log written by a newer portal, with an entry kind this build does not know
fn newer_log() -> Result<VersionedRecord> {
    Ok(serde_json::from_value(json!({
        "id": "chg-1",
        "body": {"title": "Decommission legacy VPN"},
        "modifications": [
            {"timestamp": "2024-05-01T09:00:00Z", "actor_id": "frontend", "kind": "created"},
            {"kind": "escalated", "actor_id": "user:noc-lead", "timestamp": "2024-05-01T09:30:00Z", "severity": {"level": 2, "pager": true}},
            {"timestamp": "2024-05-01T10:00:00Z", "actor_id": "user:cab-chair", "kind": "approved", "comment": "ok with conditions"}
        ]
    }))?)
}

async fn round_trip(store: impl DocumentStore) -> Result<()> {
    let record = newer_log()?;
    store.create(&record.id, &VersionedRecord::new(record.id.clone(), record.body.clone()), &WriterIdentity::Frontend).await?;
    let updater = Updater::new(store, WriterIdentity::BackendSystem).with_config(exact_config());

    let seeded = record.clone();
    updater
        .update(
            &record.id,
            move |mut current| {
                for entry in seeded.modifications() {
                    current.append(entry.clone())?;
                }
                Ok(current)
            },
            &Cancellation::new(),
        )
        .await?;
    updater.append(&record.id, Modification::Completed, &Cancellation::new()).await?;

    let (stored, _) = updater.store().load(&record.id).await?;
    assert_eq!(kinds(&stored), vec!["created", "escalated", "approved", "completed"]);
    assert_eq!(stored.modifications()[..3], record.modifications()[..]);

    let escalated = serde_json::to_string(&stored.modifications()[1])?;
    assert_eq!(escalated, r#"{"kind":"escalated","actor_id":"user:noc-lead","timestamp":"2024-05-01T09:30:00Z","severity":{"level":2,"pager":true}}"#);

    let approved = serde_json::to_value(&stored.modifications()[2])?;
    assert_eq!(approved["comment"], "ok with conditions");
    Ok(())
}

#[tokio::test]
async fn unknown_kinds_survive_memory_round_trips() -> Result<()> { round_trip(MemoryStore::new()).await }

#[tokio::test]
async fn unknown_kinds_survive_sled_round_trips() -> Result<()> { round_trip(SledStore::new_test()?).await }

#[tokio::test]
async fn deleted_records_accept_nothing_more() -> Result<()> {
    let store = Arc::new(MemoryStore::new());
    seed(&store, "chg-2").await;
    let updater = Updater::new(store.clone(), WriterIdentity::user("owner").unwrap()).with_config(exact_config());

    updater.append(&record_id("chg-2"), Modification::Deleted, &Cancellation::new()).await?;
    let err = updater.append(&record_id("chg-2"), Modification::Updated, &Cancellation::new()).await.unwrap_err();
    assert!(matches!(err, UpdateError::Rejected(RecordError::Terminal(_))), "{err:?}");
    assert_eq!(err.user_message(), "this change is not allowed");
    // rejected before writing
    assert_eq!(store.write_count(), 2);
    Ok(())
}

#[tokio::test]
async fn meetings_must_not_end_before_they_start() -> Result<()> {
    let store = Arc::new(MemoryStore::new());
    seed(&store, "chg-3").await;
    let updater = Updater::new(store.clone(), WriterIdentity::BackendSystem).with_config(exact_config());

    let start = chrono::Utc::now();
    let meeting = MeetingReference { external_id: "mtg-1".into(), join_url: "https://meet.example.com/mtg-1".into(), start, end: start - chrono::Duration::minutes(5) };
    let err = updater.append(&record_id("chg-3"), Modification::Scheduled { meeting }, &Cancellation::new()).await.unwrap_err();
    assert!(matches!(err, UpdateError::Rejected(RecordError::InvalidMeetingWindow)), "{err:?}");
    Ok(())
}

#[tokio::test]
async fn display_order_is_newest_first() -> Result<()> {
    let record = newer_log()?;
    let newest_first: Vec<&str> = record.modifications_newest_first().map(|entry| entry.kind()).collect();
    assert_eq!(newest_first, vec!["approved", "escalated", "created"]);
    assert_eq!(record.last_modification().map(|entry| entry.kind()), Some("approved"));
    Ok(())
}

#[tokio::test]
async fn malformed_writers_cannot_poison_a_record() -> Result<()> {
    let store = Arc::new(MemoryStore::new());
    seed(&store, "chg-4").await;

    let careless = Updater::new(store.clone(), WriterIdentity::User("alice smith".into())).with_config(exact_config());
    let err = careless.append(&record_id("chg-4"), Modification::Approved, &Cancellation::new()).await.unwrap_err();
    assert!(matches!(err, UpdateError::Rejected(RecordError::InvalidActor { .. })), "{err:?}");

    let backend = Updater::new(store.clone(), WriterIdentity::BackendSystem).with_config(exact_config());
    let updated = backend.append(&record_id("chg-4"), Modification::Completed, &Cancellation::new()).await?;
    assert_eq!(kinds(&updated.record), vec!["completed"]);
    Ok(())
}

#[tokio::test]
async fn stored_entries_with_bad_actors_stay_loadable() -> Result<()> {
    let store = SledStore::new_test()?;
    let record: VersionedRecord = serde_json::from_value(json!({
        "id": "chg-5",
        "body": {},
        "modifications": [
            {"timestamp": "2024-05-01T09:00:00Z", "actor_id": "user:alice smith", "kind": "approved"}
        ]
    }))?;
    store.create(&record.id, &VersionedRecord::new(record.id.clone(), json!({})), &WriterIdentity::Frontend).await?;
    let updater = Updater::new(store, WriterIdentity::BackendSystem).with_config(exact_config());
    let seeded = record.clone();
    updater
        .update(
            &record.id,
            move |mut current| {
                for entry in seeded.modifications() {
                    current.append(entry.clone())?;
                }
                Ok(current)
            },
            &Cancellation::new(),
        )
        .await?;

    let updated = updater.append(&record.id, Modification::Completed, &Cancellation::new()).await?;
    assert_eq!(kinds(&updated.record), vec!["approved", "completed"]);
    assert_eq!(updated.record.modifications()[0], record.modifications()[0]);
    Ok(())
}
