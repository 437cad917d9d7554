//! Parameter Store
//!
//! Persistent repository for large, immutable proving parameters, stored as
//! indexed chunks keyed by `(purpose, index)`.
//!
//! ## Storage Model
//!
//! - **Chunks**: written once at import, overwritten only by re-import
//! - **Manifest**: optional per-purpose record of chunk count and digest
//! - **Reconstruction**: ordered concatenation, see [`reassemble`]
//!
//! The store does not cache reconstructed blobs. Callers load parameters once
//! and keep the result.

use super::chunks::{reassemble, split_parameters, ParameterChunk, ParameterManifest};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    /// The underlying medium failed (StorageFault)
    #[error("Storage fault: {0}")]
    Fault(String),

    #[error("Incomplete parameters for '{purpose}': missing or out-of-range chunks {missing:?}")]
    IncompleteParameters { purpose: String, missing: Vec<u32> },

    #[error("Parameter digest mismatch for '{purpose}'")]
    CorruptParameters { purpose: String },

    /// Optimistic-concurrency collision on a fold record
    #[error("Conflict on {category}: expected {expected} folds, found {actual}")]
    Conflict {
        category: super::Category,
        expected: u64,
        actual: u64,
    },

    #[error("Invalid record: {0}")]
    InvalidRecord(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl From<sqlx::Error> for StorageError {
    fn from(e: sqlx::Error) -> Self {
        StorageError::Fault(e.to_string())
    }
}

/// Parameter store trait for abstracting storage backends.
///
/// This trait allows different implementations:
/// - **SQLite**: Durable on-disk storage
/// - **Memory**: In-memory storage for testing
#[async_trait]
pub trait ParameterStore: Send + Sync {
    /// Store a chunk, replacing any existing chunk at the same index.
    ///
    /// Concurrent writes to the same index are last-write-wins.
    async fn put_chunk(
        &self,
        purpose: &str,
        index: u32,
        bytes: &[u8],
    ) -> Result<(), StorageError>;

    /// All chunks stored for a purpose, in any order.
    async fn chunks(&self, purpose: &str) -> Result<Vec<ParameterChunk>, StorageError>;

    /// Record the manifest for a purpose.
    async fn put_manifest(&self, manifest: &ParameterManifest) -> Result<(), StorageError>;

    /// The manifest for a purpose, if one was recorded.
    async fn manifest(&self, purpose: &str) -> Result<Option<ParameterManifest>, StorageError>;

    /// Remove every chunk and the manifest stored for a purpose.
    async fn clear_chunks(&self, purpose: &str) -> Result<(), StorageError>;

    /// Replace everything stored for a purpose with `chunks` and `manifest`.
    ///
    /// Backends that support transactions override this so a reader never
    /// observes a mix of old and new chunks.
    async fn replace_parameters(
        &self,
        manifest: &ParameterManifest,
        chunks: &[ParameterChunk],
    ) -> Result<(), StorageError> {
        self.clear_chunks(&manifest.purpose).await?;
        for chunk in chunks {
            self.put_chunk(&manifest.purpose, chunk.index, &chunk.bytes)
                .await?;
        }
        self.put_manifest(manifest).await
    }

    /// Rebuild the full parameter blob for a purpose.
    ///
    /// # Errors
    ///
    /// - `IncompleteParameters`: indices missing or out of range
    /// - `CorruptParameters`: digest does not match the manifest
    /// - `Fault`: underlying medium failure
    async fn reconstruct(&self, purpose: &str) -> Result<Vec<u8>, StorageError> {
        let chunks = self.chunks(purpose).await?;
        let manifest = self.manifest(purpose).await?;
        reassemble(purpose, &chunks, manifest.as_ref())
    }

    /// List chunk indices stored for a purpose, ascending.
    async fn list_indices(&self, purpose: &str) -> Result<Vec<u32>, StorageError> {
        let mut indices: Vec<u32> = self.chunks(purpose).await?.iter().map(|c| c.index).collect();
        indices.sort_unstable();
        Ok(indices)
    }

    /// Get storage statistics.
    async fn stats(&self, purpose: &str) -> Result<ParameterStats, StorageError> {
        let chunks = self.chunks(purpose).await?;
        let manifest = self.manifest(purpose).await?;
        Ok(ParameterStats {
            chunks: chunks.len(),
            bytes: chunks.iter().map(|c| c.bytes.len() as u64).sum(),
            expected_chunks: manifest.map(|m| m.total_chunks),
        })
    }
}

/// Parameter statistics for status display
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParameterStats {
    /// Number of stored chunks
    pub chunks: usize,

    /// Total stored bytes
    pub bytes: u64,

    /// Chunk count from the manifest, if any
    pub expected_chunks: Option<u32>,
}

/// Split a parameter blob and persist it with its manifest.
///
/// Chunks left over from an earlier, larger import are removed.
pub async fn import_parameters(
    store: &dyn ParameterStore,
    purpose: &str,
    blob: &[u8],
    chunk_size: usize,
) -> Result<ParameterManifest, StorageError> {
    let chunks = split_parameters(blob, chunk_size);
    let manifest = ParameterManifest::describe(purpose, blob, chunks.len() as u32);
    store.replace_parameters(&manifest, &chunks).await?;

    tracing::info!(
        purpose,
        chunks = chunks.len(),
        bytes = blob.len(),
        digest = %manifest.digest_hex(),
        "imported parameters"
    );

    Ok(manifest)
}
