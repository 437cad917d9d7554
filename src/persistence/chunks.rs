//! Parameter chunking and reassembly.
//!
//! Proving parameters are large, immutable blobs. They are stored as a
//! sequence of indexed chunks and rebuilt by concatenating the chunks in
//! index order before the proof engine loads them.
//!
//! ## Design
//!
//! - **Chunk Size**: configurable, 10MB by default
//! - **Ordering**: reassembly sorts by index, never by arrival order
//! - **Completeness**: any gap in the index sequence fails reassembly
//! - **Integrity**: an optional manifest pins the chunk count and the
//!   SHA-256 of the full blob

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::chunk_storage::StorageError;

/// Default chunk size for parameter import: 10MB
pub const DEFAULT_CHUNK_SIZE: usize = 10 * 1024 * 1024;

/// A single chunk of a parameter blob.
///
/// Chunks are immutable once written. The full blob is the concatenation of
/// all chunks of a purpose ordered by `index`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParameterChunk {
    /// Chunk index (0-based, for reassembly ordering)
    pub index: u32,

    /// Raw chunk bytes
    pub bytes: Vec<u8>,
}

impl ParameterChunk {
    pub fn new(index: u32, bytes: Vec<u8>) -> Self {
        Self { index, bytes }
    }
}

/// Describes a complete parameter blob.
///
/// Written once at import time. When present, reconstruction requires
/// exactly `total_chunks` chunks and a matching digest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParameterManifest {
    /// Key prefix the chunks are stored under
    pub purpose: String,

    /// Number of chunks making up the blob
    pub total_chunks: u32,

    /// SHA-256 of the reassembled blob
    pub sha256: [u8; 32],
}

impl ParameterManifest {
    /// Build a manifest describing `blob` split into `total_chunks` chunks.
    pub fn describe(purpose: &str, blob: &[u8], total_chunks: u32) -> Self {
        Self {
            purpose: purpose.to_string(),
            total_chunks,
            sha256: digest(blob),
        }
    }

    /// Hex form of the digest, for display.
    pub fn digest_hex(&self) -> String {
        hex::encode(self.sha256)
    }
}

/// SHA-256 of a byte blob.
pub fn digest(bytes: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hasher.finalize().into()
}

/// Split a parameter blob into chunks of at most `chunk_size` bytes.
///
/// An empty blob yields no chunks. A zero `chunk_size` is treated as
/// [`DEFAULT_CHUNK_SIZE`].
pub fn split_parameters(blob: &[u8], chunk_size: usize) -> Vec<ParameterChunk> {
    let chunk_size = if chunk_size == 0 {
        DEFAULT_CHUNK_SIZE
    } else {
        chunk_size
    };

    blob.chunks(chunk_size)
        .enumerate()
        .map(|(index, data)| ParameterChunk::new(index as u32, data.to_vec()))
        .collect()
}

/// Concatenate chunks into the full parameter blob.
///
/// # Flow
///
/// 1. Sort chunks by index
/// 2. Verify the indices form `0..n` with no gaps or duplicates
/// 3. If a manifest is given, verify `n == total_chunks` and that no index
///    lies at or beyond `total_chunks`
/// 4. Concatenate chunk bytes
/// 5. If a manifest is given, verify the SHA-256 of the result
///
/// # Errors
///
/// - `IncompleteParameters`: empty set, gap, duplicate or out-of-range index
/// - `CorruptParameters`: digest mismatch against the manifest
pub fn reassemble(
    purpose: &str,
    chunks: &[ParameterChunk],
    manifest: Option<&ParameterManifest>,
) -> Result<Vec<u8>, StorageError> {
    let mut sorted: Vec<&ParameterChunk> = chunks.iter().collect();
    sorted.sort_by_key(|c| c.index);

    let expected = match manifest {
        Some(m) => m.total_chunks,
        None => sorted.last().map(|c| c.index + 1).unwrap_or(0),
    };

    if sorted.is_empty() || expected == 0 {
        return Err(StorageError::IncompleteParameters {
            purpose: purpose.to_string(),
            missing: vec![0],
        });
    }

    if let Some(out_of_range) = sorted.iter().find(|c| c.index >= expected) {
        return Err(StorageError::IncompleteParameters {
            purpose: purpose.to_string(),
            missing: vec![out_of_range.index],
        });
    }

    let present: Vec<u32> = sorted.iter().map(|c| c.index).collect();
    let missing: Vec<u32> = (0..expected)
        .filter(|i| present.binary_search(i).is_err())
        .collect();
    if !missing.is_empty() || present.len() != expected as usize {
        return Err(StorageError::IncompleteParameters {
            purpose: purpose.to_string(),
            missing,
        });
    }

    let total_len = sorted.iter().map(|c| c.bytes.len()).sum();
    let mut blob = Vec::with_capacity(total_len);
    for chunk in sorted {
        blob.extend_from_slice(&chunk.bytes);
    }

    if let Some(m) = manifest {
        if digest(&blob) != m.sha256 {
            return Err(StorageError::CorruptParameters {
                purpose: purpose.to_string(),
            });
        }
    }

    Ok(blob)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunks(indices: &[u32]) -> Vec<ParameterChunk> {
        indices
            .iter()
            .map(|&i| ParameterChunk::new(i, vec![i as u8; 4]))
            .collect()
    }

    #[test]
    fn test_split_exact_and_remainder() {
        let blob: Vec<u8> = (0..10).collect();
        let parts = split_parameters(&blob, 4);

        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0].bytes, vec![0, 1, 2, 3]);
        assert_eq!(parts[2].bytes, vec![8, 9]);
        assert_eq!(parts[2].index, 2);
    }

    #[test]
    fn test_split_empty_blob_yields_no_chunks() {
        assert!(split_parameters(&[], 4).is_empty());
    }

    #[test]
    fn test_reassemble_ignores_arrival_order() {
        let mut parts = split_parameters(b"hello parameters", 3);
        parts.reverse();

        let blob = reassemble("membership", &parts, None).unwrap();
        assert_eq!(blob, b"hello parameters");
    }

    #[test]
    fn test_reassemble_gap_reports_missing_index() {
        let result = reassemble("membership", &chunks(&[0, 2]), None);

        match result {
            Err(StorageError::IncompleteParameters { missing, .. }) => {
                assert_eq!(missing, vec![1]);
            }
            other => panic!("expected IncompleteParameters, got {:?}", other),
        }
    }

    #[test]
    fn test_reassemble_empty_is_incomplete() {
        assert!(matches!(
            reassemble("membership", &[], None),
            Err(StorageError::IncompleteParameters { .. })
        ));
    }

    #[test]
    fn test_reassemble_missing_first_chunk() {
        assert!(matches!(
            reassemble("membership", &chunks(&[1, 2]), None),
            Err(StorageError::IncompleteParameters { .. })
        ));
    }

    #[test]
    fn test_manifest_rejects_out_of_range_index() {
        let parts = chunks(&[0, 1, 2]);
        let manifest = ParameterManifest {
            purpose: "membership".to_string(),
            total_chunks: 2,
            sha256: [0u8; 32],
        };

        match reassemble("membership", &parts, Some(&manifest)) {
            Err(StorageError::IncompleteParameters { missing, .. }) => {
                assert_eq!(missing, vec![2]);
            }
            other => panic!("expected IncompleteParameters, got {:?}", other),
        }
    }

    #[test]
    fn test_manifest_detects_missing_tail() {
        let blob = vec![7u8; 12];
        let mut parts = split_parameters(&blob, 4);
        let manifest = ParameterManifest::describe("membership", &blob, parts.len() as u32);
        parts.pop();

        match reassemble("membership", &parts, Some(&manifest)) {
            Err(StorageError::IncompleteParameters { missing, .. }) => {
                assert_eq!(missing, vec![2]);
            }
            other => panic!("expected IncompleteParameters, got {:?}", other),
        }
    }

    #[test]
    fn test_manifest_digest_mismatch() {
        let blob = vec![7u8; 12];
        let mut parts = split_parameters(&blob, 4);
        let manifest = ParameterManifest::describe("membership", &blob, parts.len() as u32);
        parts[1].bytes[0] ^= 0xff;

        assert!(matches!(
            reassemble("membership", &parts, Some(&manifest)),
            Err(StorageError::CorruptParameters { .. })
        ));
    }

    #[test]
    fn test_duplicate_index_is_incomplete() {
        let parts = chunks(&[0, 1, 1]);
        assert!(matches!(
            reassemble("membership", &parts, None),
            Err(StorageError::IncompleteParameters { .. })
        ));
    }
}
