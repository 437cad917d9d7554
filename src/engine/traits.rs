//! Trait abstraction for the proof folding engine.
//!
//! The engine's arithmetic (curve, circuit, recursion) is an external
//! capability. This crate only orchestrates it through the five operations
//! of [`ProofEngine`], treating proofs and parameters as opaque bytes.
//!
//! Engine calls are synchronous and potentially slow; they are only ever
//! invoked from worker threads (see [`crate::worker`]).

use crate::persistence::Category;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// A single unit of evidence eligible for folding into a category.
///
/// Transient: consumed by a successful fold and never persisted on its own.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attestation {
    pub category: Category,

    /// Opaque signature-proof material, interpreted only by the engine
    pub payload: Vec<u8>,
}

impl Attestation {
    pub fn new(category: Category, payload: Vec<u8>) -> Self {
        Self { category, payload }
    }
}

impl fmt::Debug for Attestation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Attestation")
            .field("category", &self.category)
            .field("payload_len", &self.payload.len())
            .finish()
    }
}

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

/// Proof engine errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    /// Parameters could not be loaded.
    #[error("Engine initialization failed: {0}")]
    InitFault(String),

    /// Internal engine failure.
    #[error("Engine fault: {0}")]
    Fault(String),

    /// The attestation is cryptographically invalid for the category.
    #[error("Fold rejected: {0}")]
    FoldRejected(String),

    /// Structurally invalid proof bytes.
    #[error("Malformed proof: {0}")]
    MalformedProof(String),
}

/// Handle to loaded engine parameters.
///
/// Cheap to clone. Carries the SHA-256 of the parameter blob it was loaded
/// from, plus the engine's own opaque state.
#[derive(Clone)]
pub struct EngineHandle {
    params_digest: [u8; 32],
    state: Arc<dyn Any + Send + Sync>,
}

impl EngineHandle {
    pub fn new<T: Any + Send + Sync>(params_digest: [u8; 32], state: T) -> Self {
        Self {
            params_digest,
            state: Arc::new(state),
        }
    }

    /// SHA-256 of the parameters this handle was loaded from.
    pub fn params_digest(&self) -> &[u8; 32] {
        &self.params_digest
    }

    /// Borrow the engine-specific state.
    ///
    /// Fails with `EngineError::Fault` if the handle came from a different
    /// engine implementation.
    pub fn state<T: Any>(&self) -> EngineResult<&T> {
        self.state
            .downcast_ref::<T>()
            .ok_or_else(|| EngineError::Fault("handle belongs to another engine".to_string()))
    }
}

impl fmt::Debug for EngineHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EngineHandle")
            .field("params_digest", &hex::encode(self.params_digest))
            .finish()
    }
}

/// The external folding/verification capability.
///
/// Any implementation (native library, subprocess, remote service) can sit
/// behind this trait without the controller changing.
pub trait ProofEngine: Send + Sync {
    /// Load proving parameters. One-time and potentially expensive.
    ///
    /// Fails with `InitFault` on malformed parameters.
    fn load_parameters(&self, params: &[u8]) -> EngineResult<EngineHandle>;

    /// Fold one attestation into the accumulated proof.
    ///
    /// Deterministic for identical inputs. `prior` must be exactly the proof
    /// produced by the previous fold of the same category; the engine does not
    /// track ordering itself.
    fn fold(
        &self,
        handle: &EngineHandle,
        prior: Option<&[u8]>,
        attestation: &Attestation,
    ) -> EngineResult<Vec<u8>>;

    /// Irreversibly obfuscate an accumulated proof. May be randomized.
    fn finalize(&self, handle: &EngineHandle, proof: &[u8]) -> EngineResult<Vec<u8>>;

    /// Expand a compact stored proof into the form `verify` expects.
    fn decompress(&self, handle: &EngineHandle, compact: &[u8]) -> EngineResult<Vec<u8>>;

    /// Check a canonical proof against the claimed fold count, category and
    /// finalization flag.
    ///
    /// Returns `Ok(false)` for a well-formed but invalid proof; `MalformedProof`
    /// only for structurally invalid input.
    fn verify(
        &self,
        handle: &EngineHandle,
        proof: &[u8],
        num_folds: u64,
        category: Category,
        finalized: bool,
    ) -> EngineResult<bool>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handle_state_downcast() {
        let handle = EngineHandle::new([7u8; 32], 42u32);
        assert_eq!(*handle.state::<u32>().unwrap(), 42);
        assert!(matches!(handle.state::<String>(), Err(EngineError::Fault(_))));
    }

    #[test]
    fn test_handle_clone_shares_state() {
        let handle = EngineHandle::new([1u8; 32], String::from("params"));
        let clone = handle.clone();
        assert_eq!(clone.params_digest(), handle.params_digest());
        assert_eq!(clone.state::<String>().unwrap(), "params");
    }

    #[test]
    fn test_attestation_debug_hides_payload() {
        let attestation = Attestation::new(Category::Talk, vec![0xAB; 64]);
        let debug = format!("{:?}", attestation);
        assert!(debug.contains("payload_len: 64"));
        assert!(!debug.contains("171"));
    }
}
