use changelane_proto::{VersionToken, VersionedRecord, WriterIdentity};
use serde::{Deserialize, Serialize};
use sled::Db;

pub const RECORDS_TREE: &str = "records";
pub const ARTIFACTS_TREE: &str = "artifacts";

pub struct Database {
    pub db: Db,
    pub(crate) records_tree: sled::Tree,
    pub(crate) artifacts_tree: sled::Tree,
}

impl Database {
    pub fn open(db: Db) -> anyhow::Result<Self> {
        let records_tree = db.open_tree(RECORDS_TREE)?; // one envelope per record id
        let artifacts_tree = db.open_tree(ARTIFACTS_TREE)?; // webhook payloads keyed by artifact name
        Ok(Self { db, records_tree, artifacts_tree })
    }
}

/// What is stored under a record id: the record plus the revision it represents and who wrote it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    pub version: VersionToken,
    pub writer: WriterIdentity,
    pub record: VersionedRecord,
}

impl Envelope {
    pub fn encode(&self) -> Result<Vec<u8>, serde_json::Error> { serde_json::to_vec(self) }

    pub fn decode(bytes: &[u8]) -> Result<Self, serde_json::Error> { serde_json::from_slice(bytes) }
}
