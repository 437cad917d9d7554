//! CBOR serialization for proofs and attestations.
//!
//! - Use CBOR via `ciborium` (NOT JSON or bincode)
//! - Deterministic serialization, so identical inputs give identical proofs
//! - Schema evolution with #[serde(default)]

use serde::{de::DeserializeOwned, Serialize};
use std::path::Path;
use thiserror::Error;

/// Serialization errors.
#[derive(Debug, Error)]
pub enum SerializationError {
    /// CBOR encoding failed.
    #[error("CBOR encoding failed: {0}")]
    Encode(String),

    /// CBOR decoding failed.
    #[error("CBOR decoding failed: {0}")]
    Decode(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Serialize to CBOR bytes.
pub fn to_cbor<T: Serialize>(value: &T) -> Result<Vec<u8>, SerializationError> {
    let mut bytes = Vec::new();
    ciborium::into_writer(value, &mut bytes)
        .map_err(|e| SerializationError::Encode(format!("{:?}", e)))?;
    Ok(bytes)
}

/// Deserialize from CBOR bytes.
pub fn from_cbor<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, SerializationError> {
    ciborium::from_reader(bytes).map_err(|e| SerializationError::Decode(format!("{:?}", e)))
}

/// Write a value to a file as CBOR.
pub fn write_cbor_file<T: Serialize>(path: &Path, value: &T) -> Result<(), SerializationError> {
    let bytes = to_cbor(value)?;
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    std::fs::write(path, bytes)?;
    Ok(())
}

/// Read a CBOR-encoded value from a file.
pub fn read_cbor_file<T: DeserializeOwned>(path: &Path) -> Result<T, SerializationError> {
    let bytes = std::fs::read(path)?;
    from_cbor(&bytes)
}
