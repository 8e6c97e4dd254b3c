pub mod dedup;
pub mod error;
pub mod id;
pub mod modification;
pub mod notification;
pub mod record;
pub mod version;
pub mod writer;

pub use dedup::*;
pub use error::*;
pub use id::*;
pub use modification::*;
pub use notification::*;
pub use record::*;
pub use version::*;
pub use writer::*;
