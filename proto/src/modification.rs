use chrono::{DateTime, Utc};
use serde::{de::Error as _, Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};
use tracing::debug;

use crate::writer::WriterIdentity;

/// Every `kind` this build knows how to interpret
pub const KNOWN_KINDS: &[&str] = &["created", "updated", "submitted", "approved", "scheduled", "cancelled", "completed", "deleted"];

/// An external meeting attached to a change
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MeetingReference {
    pub external_id: String,
    pub join_url: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl MeetingReference {
    pub fn is_well_formed(&self) -> bool { self.end >= self.start }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Modification {
    Created,
    Updated,
    Submitted,
    /// The entry's `actor_id` is the approver
    Approved,
    Scheduled {
        meeting: MeetingReference,
    },
    Cancelled,
    Completed,
    /// Terminal. Nothing may be appended after it.
    Deleted,
}

impl Modification {
    pub fn kind(&self) -> &'static str {
        match self {
            Modification::Created => "created",
            Modification::Updated => "updated",
            Modification::Submitted => "submitted",
            Modification::Approved => "approved",
            Modification::Scheduled { .. } => "scheduled",
            Modification::Cancelled => "cancelled",
            Modification::Completed => "completed",
            Modification::Deleted => "deleted",
        }
    }

    pub fn is_terminal(&self) -> bool { matches!(self, Modification::Deleted) }
}

/// A decoded entry of a known kind.
///
/// Fields the entry carries beyond the ones interpreted here are kept in `extra` and written
/// back with it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KnownEntry {
    pub timestamp: DateTime<Utc>,
    pub actor_id: WriterIdentity,
    pub modification: Modification,
    pub extra: Map<String, Value>,
}

#[derive(Deserialize)]
struct KnownFields {
    timestamp: DateTime<Utc>,
    actor_id: WriterIdentity,
    #[serde(flatten)]
    modification: Modification,
}

#[derive(Serialize)]
struct KnownFieldsRef<'a> {
    timestamp: &'a DateTime<Utc>,
    actor_id: &'a WriterIdentity,
    #[serde(flatten)]
    modification: &'a Modification,
}

impl KnownEntry {
    pub fn new(timestamp: DateTime<Utc>, actor_id: WriterIdentity, modification: Modification) -> Self {
        Self { timestamp, actor_id, modification, extra: Map::new() }
    }

    fn interpreted(&self) -> Result<Map<String, Value>, serde_json::Error> {
        let fields = KnownFieldsRef { timestamp: &self.timestamp, actor_id: &self.actor_id, modification: &self.modification };
        match serde_json::to_value(fields)? {
            Value::Object(map) => Ok(map),
            _ => Err(serde::de::Error::custom("entry did not encode as an object")),
        }
    }

    /// Splits a raw entry into the interpreted fields and everything else, keeping the
    /// original order of the leftovers
    pub fn from_raw(raw: Map<String, Value>) -> Result<Self, serde_json::Error> {
        let KnownFields { timestamp, actor_id, modification } = serde_json::from_value(Value::Object(raw.clone()))?;
        let mut entry = Self::new(timestamp, actor_id, modification);
        let interpreted = entry.interpreted()?;
        entry.extra = raw.into_iter().filter(|(key, _)| !interpreted.contains_key(key)).collect();
        Ok(entry)
    }

    pub fn to_raw(&self) -> Result<Map<String, Value>, serde_json::Error> {
        let mut map = self.interpreted()?;
        for (key, value) in &self.extra {
            if !map.contains_key(key) {
                map.insert(key.clone(), value.clone());
            }
        }
        Ok(map)
    }
}

impl Serialize for KnownEntry {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_raw().map_err(<S::Error as serde::ser::Error>::custom)?.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for KnownEntry {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = Map::<String, Value>::deserialize(deserializer)?;
        KnownEntry::from_raw(raw).map_err(D::Error::custom)
    }
}

/// One element of a record's modification log.
///
/// Entries with a `kind` outside [`KNOWN_KINDS`], or whose `actor_id` does not parse, are kept as
/// the raw JSON object they were read as, and written back unchanged.
#[derive(Debug, Clone, PartialEq)]
pub enum ModificationEntry {
    Known(KnownEntry),
    Unrecognized(Map<String, Value>),
}

impl ModificationEntry {
    pub fn new(actor_id: WriterIdentity, modification: Modification) -> Self { Self::at(Utc::now(), actor_id, modification) }

    pub fn at(timestamp: DateTime<Utc>, actor_id: WriterIdentity, modification: Modification) -> Self {
        ModificationEntry::Known(KnownEntry::new(timestamp, actor_id, modification))
    }

    pub fn kind(&self) -> &str {
        match self {
            ModificationEntry::Known(entry) => entry.modification.kind(),
            ModificationEntry::Unrecognized(raw) => raw.get("kind").and_then(Value::as_str).unwrap_or_default(),
        }
    }

    /// Best effort for unrecognized entries: `None` if their timestamp does not parse
    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        match self {
            ModificationEntry::Known(entry) => Some(entry.timestamp),
            ModificationEntry::Unrecognized(raw) => raw.get("timestamp").and_then(|v| serde_json::from_value(v.clone()).ok()),
        }
    }

    pub fn actor_id(&self) -> Option<WriterIdentity> {
        match self {
            ModificationEntry::Known(entry) => Some(entry.actor_id.clone()),
            ModificationEntry::Unrecognized(raw) => raw.get("actor_id").and_then(Value::as_str).and_then(|s| WriterIdentity::parse(s).ok()),
        }
    }

    pub fn known(&self) -> Option<&KnownEntry> {
        match self {
            ModificationEntry::Known(entry) => Some(entry),
            ModificationEntry::Unrecognized(_) => None,
        }
    }

    /// Decided by `kind` alone, so a `deleted` entry stays terminal even when it could not be interpreted
    pub fn is_terminal(&self) -> bool { self.kind() == Modification::Deleted.kind() }
}

impl Serialize for ModificationEntry {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            ModificationEntry::Known(entry) => entry.serialize(serializer),
            ModificationEntry::Unrecognized(raw) => raw.serialize(serializer),
        }
    }
}

impl<'de> Deserialize<'de> for ModificationEntry {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = Map::<String, Value>::deserialize(deserializer)?;
        let kind = raw.get("kind").and_then(Value::as_str).ok_or_else(|| D::Error::missing_field("kind"))?;
        if !KNOWN_KINDS.contains(&kind) {
            return Ok(ModificationEntry::Unrecognized(raw));
        }
        if let Some(Err(err)) = raw.get("actor_id").and_then(Value::as_str).map(WriterIdentity::parse) {
            debug!("keeping {} entry uninterpreted, its actor_id does not parse: {}", kind, err);
            return Ok(ModificationEntry::Unrecognized(raw));
        }
        KnownEntry::from_raw(raw).map(ModificationEntry::Known).map_err(D::Error::custom)
    }
}

impl std::fmt::Display for ModificationEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ModificationEntry::Known(entry) => write!(f, "{} by {} at {}", entry.modification.kind(), entry.actor_id, entry.timestamp.to_rfc3339()),
            ModificationEntry::Unrecognized(_) => write!(f, "{} (uninterpreted)", self.kind()),
        }
    }
}
