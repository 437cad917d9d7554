//! Jobs executed by the worker bridge.

use crate::engine::{Attestation, EngineError, EngineHandle, ProofEngine};
use crate::persistence::Category;
use std::fmt;
use thiserror::Error;

/// One proof engine operation bound to its arguments.
#[derive(Clone)]
pub enum Job {
    /// Load parameters and produce an engine handle.
    Load { params: Vec<u8> },

    /// Fold an attestation into `prior` (absent for the first fold).
    Fold {
        handle: EngineHandle,
        prior: Option<Vec<u8>>,
        attestation: Attestation,
    },

    /// Obfuscate an accumulated proof.
    Finalize { handle: EngineHandle, proof: Vec<u8> },

    /// Expand a stored proof to canonical form.
    Decompress { handle: EngineHandle, compact: Vec<u8> },

    /// Verify a canonical proof.
    Verify {
        handle: EngineHandle,
        proof: Vec<u8>,
        num_folds: u64,
        category: Category,
        finalized: bool,
    },
}

impl Job {
    /// Short operation name for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Job::Load { .. } => "load",
            Job::Fold { .. } => "fold",
            Job::Finalize { .. } => "finalize",
            Job::Decompress { .. } => "decompress",
            Job::Verify { .. } => "verify",
        }
    }

    /// Category the job belongs to, if any.
    pub fn category(&self) -> Option<Category> {
        match self {
            Job::Fold { attestation, .. } => Some(attestation.category),
            Job::Verify { category, .. } => Some(*category),
            _ => None,
        }
    }

    /// Run the job against an engine. Blocks the calling thread.
    pub(crate) fn run(self, engine: &dyn ProofEngine) -> Result<JobOutput, EngineError> {
        match self {
            Job::Load { params } => engine.load_parameters(&params).map(JobOutput::Loaded),
            Job::Fold {
                handle,
                prior,
                attestation,
            } => engine
                .fold(&handle, prior.as_deref(), &attestation)
                .map(JobOutput::Proof),
            Job::Finalize { handle, proof } => {
                engine.finalize(&handle, &proof).map(JobOutput::Proof)
            }
            Job::Decompress { handle, compact } => {
                engine.decompress(&handle, &compact).map(JobOutput::Proof)
            }
            Job::Verify {
                handle,
                proof,
                num_folds,
                category,
                finalized,
            } => engine
                .verify(&handle, &proof, num_folds, category, finalized)
                .map(JobOutput::Verified),
        }
    }
}

impl fmt::Debug for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Job")
            .field("kind", &self.kind())
            .field("category", &self.category())
            .finish()
    }
}

/// Result of a completed job.
#[derive(Debug, Clone)]
pub enum JobOutput {
    Loaded(EngineHandle),
    Proof(Vec<u8>),
    Verified(bool),
}

impl JobOutput {
    pub fn into_handle(self) -> Result<EngineHandle, WorkerError> {
        match self {
            JobOutput::Loaded(handle) => Ok(handle),
            _ => Err(WorkerError::UnexpectedOutput("handle")),
        }
    }

    pub fn into_proof(self) -> Result<Vec<u8>, WorkerError> {
        match self {
            JobOutput::Proof(proof) => Ok(proof),
            _ => Err(WorkerError::UnexpectedOutput("proof")),
        }
    }

    pub fn into_verified(self) -> Result<bool, WorkerError> {
        match self {
            JobOutput::Verified(valid) => Ok(valid),
            _ => Err(WorkerError::UnexpectedOutput("verification result")),
        }
    }
}

/// Worker bridge errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WorkerError {
    #[error(transparent)]
    Engine(#[from] EngineError),

    /// The job was cancelled before it started.
    #[error("Job cancelled before start")]
    Cancelled,

    /// The bridge stopped accepting or running jobs.
    #[error("Worker bridge shut down")]
    Shutdown,

    /// The job's worker thread panicked.
    #[error("Worker thread panicked: {0}")]
    Panicked(String),

    #[error("Job produced an unexpected output (wanted {0})")]
    UnexpectedOutput(&'static str),
}
