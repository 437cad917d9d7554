//! Per-category fold state machine.
//!
//! ## States
//!
//! | State | Condition | Fold | Finalize | Verify |
//! |-------|-----------|------|----------|--------|
//! | **EMPTY** | `num_folds == 0` | ALLOWED | `NothingToFinalize` | `NothingToVerify` |
//! | **ACCUMULATING** | `num_folds > 0`, not finalized | ALLOWED | ALLOWED | ALLOWED |
//! | **FINALIZED** | finalized | `AlreadyFinalized` | `AlreadyFinalized` | ALLOWED |
//!
//! Finalization is one-way: no transition leaves FINALIZED.

use super::error::FoldError;
use crate::persistence::{Category, FoldRecord, FoldSummary};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle state of one category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FoldState {
    /// No attestation folded yet.
    Empty,

    /// At least one fold, still accepting more.
    Accumulating,

    /// Obfuscated; no further folds accepted.
    Finalized,
}

impl FoldState {
    pub fn of(summary: &FoldSummary) -> Self {
        if summary.finalized {
            FoldState::Finalized
        } else if summary.num_folds == 0 {
            FoldState::Empty
        } else {
            FoldState::Accumulating
        }
    }

    pub fn of_record(record: &FoldRecord) -> Self {
        Self::of(&record.summary())
    }

    /// Check that a fold may be applied in this state.
    pub fn check_fold(&self, category: Category) -> Result<(), FoldError> {
        match self {
            FoldState::Empty | FoldState::Accumulating => Ok(()),
            FoldState::Finalized => Err(FoldError::AlreadyFinalized(category)),
        }
    }

    /// Check that the category may be finalized in this state.
    pub fn check_finalize(&self, category: Category) -> Result<(), FoldError> {
        match self {
            FoldState::Accumulating => Ok(()),
            FoldState::Empty => Err(FoldError::NothingToFinalize(category)),
            FoldState::Finalized => Err(FoldError::AlreadyFinalized(category)),
        }
    }

    /// Check that there is a proof to verify.
    pub fn check_verify(&self, category: Category) -> Result<(), FoldError> {
        match self {
            FoldState::Accumulating | FoldState::Finalized => Ok(()),
            FoldState::Empty => Err(FoldError::NothingToVerify(category)),
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            FoldState::Empty => "No attestations folded yet",
            FoldState::Accumulating => "Accumulating attestations - can fold more or finalize",
            FoldState::Finalized => "Finalized - proof is sealed and can only be verified",
        }
    }
}

impl fmt::Display for FoldState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FoldState::Empty => write!(f, "empty"),
            FoldState::Accumulating => write!(f, "accumulating"),
            FoldState::Finalized => write!(f, "finalized"),
        }
    }
}
