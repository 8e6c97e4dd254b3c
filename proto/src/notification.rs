use serde::{Deserialize, Serialize};

use crate::{id::RecordId, writer::WriterIdentity};

/// A change notification as delivered by the queue transport.
///
/// `writer_identity` is kept raw so that a missing or malformed value reaches the self-event
/// filter instead of failing decoding.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeNotification {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub record_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub object_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub writer_identity: Option<String>,
}

impl ChangeNotification {
    /// The notification a store emits after a successful write
    pub fn for_write(record_id: &RecordId, event_name: &str, writer: &WriterIdentity) -> Self {
        Self {
            record_id: Some(record_id.to_string()),
            object_key: None,
            event_name: Some(event_name.to_owned()),
            writer_identity: Some(writer.to_string()),
        }
    }

    pub fn with_object_key(mut self, key: impl Into<String>) -> Self {
        self.object_key = Some(key.into());
        self
    }
}

impl std::fmt::Display for ChangeNotification {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "ChangeNotification(record {} key {} event {} writer {})",
            self.record_id.as_deref().unwrap_or("-"),
            self.object_key.as_deref().unwrap_or("-"),
            self.event_name.as_deref().unwrap_or("-"),
            self.writer_identity.as_deref().unwrap_or("-"),
        )
    }
}
