//! Persistence for proving parameters and fold records.
//!
//! Two repositories live here:
//! - the Parameter Store, holding large immutable parameter blobs as chunks
//! - the Fold Record Store, the single source of truth for each category's
//!   accumulated proof
//!
//! Both are traits so tests can substitute [`MemoryStore`] for the durable
//! [`SqliteStore`].

pub mod chunk_storage;
pub mod chunks;
pub mod fold_records;
pub mod memory;
pub mod sqlite;

#[cfg(test)]
mod proptests;

pub use chunk_storage::{import_parameters, ParameterStats, ParameterStore, StorageError};
pub use chunks::{
    reassemble, split_parameters, ParameterChunk, ParameterManifest, DEFAULT_CHUNK_SIZE,
};
pub use fold_records::{Category, FoldRecord, FoldRecordStore, FoldSummary};
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;
