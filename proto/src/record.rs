use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::{
    error::RecordError,
    id::RecordId,
    modification::{Modification, ModificationEntry},
    writer::WriterIdentity,
};

/// A change or announcement document together with its append-only modification log.
///
/// The log is stored oldest-first and can only grow through [`VersionedRecord::append`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VersionedRecord {
    pub id: RecordId,
    /// Domain payload (title, status, free-form fields). Not interpreted here.
    #[serde(default)]
    pub body: Value,
    #[serde(default)]
    modifications: Vec<ModificationEntry>,
}

impl VersionedRecord {
    pub fn new(id: RecordId, body: Value) -> Self { Self { id, body, modifications: Vec::new() } }

    pub fn modifications(&self) -> &[ModificationEntry] { &self.modifications }

    /// Display order
    pub fn modifications_newest_first(&self) -> impl Iterator<Item = &ModificationEntry> { self.modifications.iter().rev() }

    pub fn last_modification(&self) -> Option<&ModificationEntry> { self.modifications.last() }

    pub fn is_terminal(&self) -> bool { self.modifications.iter().any(ModificationEntry::is_terminal) }

    pub fn append(&mut self, entry: ModificationEntry) -> Result<(), RecordError> {
        if self.is_terminal() {
            return Err(RecordError::Terminal(self.id.to_string()));
        }
        if let Some(known) = entry.known() {
            // the actor must parse back from its wire form
            known.actor_id.validate().map_err(|err| RecordError::InvalidActor { actor: known.actor_id.to_string(), reason: err.to_string() })?;
            if let Modification::Scheduled { meeting } = &known.modification {
                if !meeting.is_well_formed() {
                    return Err(RecordError::InvalidMeetingWindow);
                }
            }
        }
        if let (Some(last), Some(next)) = (self.last_modification().and_then(ModificationEntry::timestamp), entry.timestamp()) {
            if next < last {
                // never reorder; writers with skewed clocks still get their entry recorded
                warn!("VersionedRecord({}) appending {} dated before the previous entry ({})", self.id, entry, last.to_rfc3339());
            }
        }
        self.modifications.push(entry);
        Ok(())
    }

    /// Shorthand for appending a freshly timestamped entry
    pub fn record(&mut self, actor_id: WriterIdentity, modification: Modification) -> Result<(), RecordError> {
        self.append(ModificationEntry::new(actor_id, modification))
    }

    /// True when `earlier`'s log is a prefix of this record's log
    pub fn extends(&self, earlier: &VersionedRecord) -> bool {
        self.id == earlier.id && self.modifications.starts_with(&earlier.modifications)
    }

    /// Entries appended since `earlier`, if this record extends it
    pub fn appended_since<'a>(&'a self, earlier: &VersionedRecord) -> Option<&'a [ModificationEntry]> {
        self.extends(earlier).then(|| &self.modifications[earlier.modifications.len()..])
    }

    pub fn to_json(&self) -> Result<Vec<u8>, serde_json::Error> { serde_json::to_vec(self) }

    pub fn from_json(bytes: &[u8]) -> Result<Self, serde_json::Error> { serde_json::from_slice(bytes) }
}

impl std::fmt::Display for VersionedRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "VersionedRecord({} modifications {})", self.id, self.modifications.len())
    }
}
