use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Opaque marker of "the record as of a specific read".
///
/// Obtained from a load and moved into the next conditional write. Two tokens compare equal
/// only if they describe the same stored revision.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VersionToken(String);

impl VersionToken {
    /// A fresh token for a new revision
    pub fn generate() -> Self { VersionToken(Ulid::new().to_string()) }

    /// Wrap a token handed out by a backing store (an ETag, a version id, ...)
    pub fn from_store(raw: impl Into<String>) -> Self { VersionToken(raw.into()) }

    pub fn as_str(&self) -> &str { &self.0 }
}

impl std::fmt::Display for VersionToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // tokens are long; the alternate form keeps log lines short
        if f.alternate() {
            let start = self.0.char_indices().rev().nth(5).map(|(i, _)| i).unwrap_or(0);
            write!(f, "{}", &self.0[start..])
        } else {
            write!(f, "{}", self.0)
        }
    }
}
