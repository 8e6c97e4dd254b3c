use chrono::{DateTime, Utc};

use crate::{error::DecodeError, id::validate_component};

pub const ARTIFACT_EXTENSION: &str = ".json";

/// Identifies the persisted effect of one externally delivered event
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DedupKey {
    tenant: String,
    logical_id: String,
    external_event_id: String,
}

impl DedupKey {
    pub fn new(tenant: &str, logical_id: &str, external_event_id: &str) -> Result<Self, DecodeError> {
        validate_component(tenant)?;
        validate_component(logical_id)?;
        validate_component(external_event_id)?;
        Ok(Self { tenant: tenant.to_owned(), logical_id: logical_id.to_owned(), external_event_id: external_event_id.to_owned() })
    }

    pub fn tenant(&self) -> &str { &self.tenant }

    pub fn logical_id(&self) -> &str { &self.logical_id }

    pub fn external_event_id(&self) -> &str { &self.external_event_id }

    /// Namespace every artifact for this `(tenant, logical_id)` lives under
    pub fn prefix(&self, root: &str) -> String {
        let root = root.trim_end_matches('/');
        if root.is_empty() {
            format!("{}/{}/", self.tenant, self.logical_id)
        } else {
            format!("{}/{}/{}/", root, self.tenant, self.logical_id)
        }
    }

    pub fn artifact_name(&self, root: &str, at: DateTime<Utc>) -> String {
        format!("{}{}_{}{}", self.prefix(root), at.format("%Y%m%dT%H%M%S%.3fZ"), self.external_event_id, ARTIFACT_EXTENSION)
    }

    /// Whether `name` is an artifact written for this exact external event
    pub fn matches_artifact(&self, root: &str, name: &str) -> bool {
        let Some(leaf) = name.strip_prefix(&self.prefix(root)) else {
            return false;
        };
        let Some(stem) = leaf.strip_suffix(ARTIFACT_EXTENSION) else {
            return false;
        };
        match stem.split_once('_') {
            Some((_timestamp, event_id)) => event_id == self.external_event_id,
            None => false,
        }
    }
}

impl std::fmt::Display for DedupKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}#{}", self.tenant, self.logical_id, self.external_event_id)
    }
}
