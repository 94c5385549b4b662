//! Persistence interfaces and the file-backed default implementation.
//!
//! The relational/document database and the fast key-value store are
//! external collaborators; [`TutorStore`] and [`KvStore`] are their seams.
//! [`FileStore`] persists each table as a JSON document under the configured
//! state path and is the default (and test) implementation.

mod file;
mod kv;
mod rows;
mod traits;

pub use file::FileStore;
pub use kv::{KvStore, MemoryKv};
pub use rows::{
    AnalysisStatus, FolderRow, InteractionLogRow, MessageRow, SessionRow, SnapshotRow,
};
pub use traits::TutorStore;
