use serde::{Deserialize, Serialize};

use crate::error::DecodeError;

pub const MAX_COMPONENT_LEN: usize = 256;

/// Checks that a value can be used as a single segment of a storage key.
pub fn validate_component(value: &str) -> Result<(), DecodeError> {
    if value.is_empty() {
        return Err(DecodeError::Empty);
    }
    if value.len() > MAX_COMPONENT_LEN {
        return Err(DecodeError::TooLong { max: MAX_COMPONENT_LEN });
    }
    if value == "." || value == ".." {
        return Err(DecodeError::RelativeSegment);
    }
    if let Some(c) = value.chars().find(|c| *c == '/' || c.is_whitespace() || c.is_control()) {
        return Err(DecodeError::InvalidCharacter(c));
    }
    Ok(())
}

/// Stable logical key of a change or announcement record
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RecordId(String);

impl RecordId {
    pub fn new(id: impl Into<String>) -> Result<Self, DecodeError> {
        let id = id.into();
        validate_component(&id)?;
        Ok(RecordId(id))
    }

    pub fn as_str(&self) -> &str { &self.0 }
}

impl TryFrom<String> for RecordId {
    type Error = DecodeError;
    fn try_from(id: String) -> Result<Self, Self::Error> { Self::new(id) }
}

impl TryFrom<&str> for RecordId {
    type Error = DecodeError;
    fn try_from(id: &str) -> Result<Self, Self::Error> { Self::new(id) }
}

impl From<RecordId> for String {
    fn from(id: RecordId) -> Self { id.0 }
}

impl AsRef<str> for RecordId {
    fn as_ref(&self) -> &str { &self.0 }
}

impl PartialEq<str> for RecordId {
    fn eq(&self, other: &str) -> bool { self.0 == other }
}

impl std::fmt::Display for RecordId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result { write!(f, "{}", self.0) }
}
