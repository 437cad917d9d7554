//! Errors surfaced by the fold controller.

use crate::engine::EngineError;
use crate::persistence::{Category, StorageError};
use crate::worker::WorkerError;
use std::time::Duration;
use thiserror::Error;

/// Result type for controller operations.
pub type FoldResult<T> = Result<T, FoldError>;

/// Controller errors.
///
/// Everything except `Conflict` is surfaced verbatim to the caller.
/// `Conflict` is retried internally and becomes `FoldContention` once the
/// retry budget is spent.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FoldError {
    #[error("Storage fault: {0}")]
    StorageFault(String),

    #[error("Incomplete parameters for '{purpose}': missing or out-of-range chunks {missing:?}")]
    IncompleteParameters { purpose: String, missing: Vec<u32> },

    #[error("Parameter digest mismatch for '{purpose}'")]
    CorruptParameters { purpose: String },

    #[error("Invalid record: {0}")]
    InvalidRecord(String),

    #[error("Engine initialization failed: {0}")]
    EngineInitFault(String),

    #[error("Engine fault: {0}")]
    EngineFault(String),

    #[error("Fold rejected: {0}")]
    FoldRejected(String),

    #[error("Malformed proof: {0}")]
    MalformedProof(String),

    /// Optimistic-concurrency collision; internal to the controller.
    #[error("Conflict on {category}: expected {expected} folds, found {actual}")]
    Conflict {
        category: Category,
        expected: u64,
        actual: u64,
    },

    #[error("Gave up on {category} after {attempts} conflicting attempts")]
    FoldContention { category: Category, attempts: u32 },

    #[error("{0} is already finalized")]
    AlreadyFinalized(Category),

    #[error("{0} has no folds to finalize")]
    NothingToFinalize(Category),

    #[error("{0} has no proof to verify")]
    NothingToVerify(Category),

    #[error("Operation timed out after {0:?}")]
    Timeout(Duration),

    /// The worker bridge could not run the job (cancelled, shut down, panicked).
    #[error("Worker unavailable: {0}")]
    WorkerUnavailable(String),
}

impl FoldError {
    /// Whether this is an optimistic-concurrency collision.
    pub fn is_conflict(&self) -> bool {
        matches!(self, FoldError::Conflict { .. })
    }

    /// Whether the caller may reasonably retry the same request later.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            FoldError::StorageFault(_)
                | FoldError::EngineFault(_)
                | FoldError::FoldContention { .. }
                | FoldError::Timeout(_)
                | FoldError::WorkerUnavailable(_)
        )
    }

    /// Whether the caller's intent is already satisfied.
    ///
    /// A finalize request against a finalized category has nothing left to do.
    pub fn is_idempotent_success(&self) -> bool {
        matches!(self, FoldError::AlreadyFinalized(_))
    }

    /// Short message suitable for end users.
    pub fn user_message(&self) -> &'static str {
        match self {
            FoldError::FoldRejected(_) => "Invalid attestation",
            FoldError::AlreadyFinalized(_) => "Proof already finalized",
            FoldError::NothingToFinalize(_) => "Nothing to finalize yet",
            FoldError::NothingToVerify(_) => "No proof to verify yet",
            FoldError::IncompleteParameters { .. } | FoldError::CorruptParameters { .. } => {
                "Proving parameters are not fully downloaded"
            }
            FoldError::MalformedProof(_) | FoldError::InvalidRecord(_) => {
                "Stored proof is corrupted"
            }
            FoldError::EngineInitFault(_) => "Proving parameters could not be loaded",
            FoldError::StorageFault(_)
            | FoldError::EngineFault(_)
            | FoldError::Conflict { .. }
            | FoldError::FoldContention { .. }
            | FoldError::Timeout(_)
            | FoldError::WorkerUnavailable(_) => "Temporary failure, please retry",
        }
    }
}

impl From<StorageError> for FoldError {
    fn from(e: StorageError) -> Self {
        match e {
            StorageError::Fault(msg) => FoldError::StorageFault(msg),
            StorageError::IoError(io) => FoldError::StorageFault(io.to_string()),
            StorageError::IncompleteParameters { purpose, missing } => {
                FoldError::IncompleteParameters { purpose, missing }
            }
            StorageError::CorruptParameters { purpose } => FoldError::CorruptParameters { purpose },
            StorageError::Conflict {
                category,
                expected,
                actual,
            } => FoldError::Conflict {
                category,
                expected,
                actual,
            },
            StorageError::InvalidRecord(msg) => FoldError::InvalidRecord(msg),
        }
    }
}

impl From<EngineError> for FoldError {
    fn from(e: EngineError) -> Self {
        match e {
            EngineError::InitFault(msg) => FoldError::EngineInitFault(msg),
            EngineError::Fault(msg) => FoldError::EngineFault(msg),
            EngineError::FoldRejected(msg) => FoldError::FoldRejected(msg),
            EngineError::MalformedProof(msg) => FoldError::MalformedProof(msg),
        }
    }
}

impl From<WorkerError> for FoldError {
    fn from(e: WorkerError) -> Self {
        match e {
            WorkerError::Engine(engine) => engine.into(),
            other => FoldError::WorkerUnavailable(other.to_string()),
        }
    }
}
