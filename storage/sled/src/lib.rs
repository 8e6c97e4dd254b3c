mod database;
mod engine;
mod error;

pub use database::{Envelope, ARTIFACTS_TREE, RECORDS_TREE};
pub use engine::SledStore;
pub use error::SledStoreError;
