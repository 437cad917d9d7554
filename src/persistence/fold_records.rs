//! Fold Record Store
//!
//! The single source of truth for each category's accumulated proof. The only
//! mutation primitive is [`FoldRecordStore::compare_and_set`], which replaces a
//! record only if its stored fold count still matches what the writer read.

use super::chunk_storage::StorageError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// An independent proof lineage.
///
/// Categories never mix proofs: each owns its own fold count and
/// finalization state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Category {
    Talk,
    Speaker,
    Attendee,
}

impl Category {
    /// Every category, in a stable order.
    pub const ALL: [Category; 3] = [Category::Talk, Category::Speaker, Category::Attendee];

    /// Stable storage key.
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Talk => "talk",
            Category::Speaker => "speaker",
            Category::Attendee => "attendee",
        }
    }

    /// Single-byte tag used in proof transcripts.
    pub fn tag(&self) -> u8 {
        match self {
            Category::Talk => 0,
            Category::Speaker => 1,
            Category::Attendee => 2,
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Category::Talk => write!(f, "Talk"),
            Category::Speaker => write!(f, "Speaker"),
            Category::Attendee => write!(f, "Attendee"),
        }
    }
}

impl FromStr for Category {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "talk" => Ok(Category::Talk),
            "speaker" => Ok(Category::Speaker),
            "attendee" => Ok(Category::Attendee),
            other => Err(format!(
                "Unknown category '{}' (expected talk, speaker or attendee)",
                other
            )),
        }
    }
}

/// Persisted state of one category's fold lineage.
///
/// Invariants:
/// - `num_folds == 0` if and only if `proof_bytes` is absent
/// - once `finalized`, neither `proof_bytes` nor `num_folds` changes again
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FoldRecord {
    pub category: Category,

    /// Accumulated proof in the engine's compact form
    pub proof_bytes: Option<Vec<u8>>,

    /// Number of attestations folded into `proof_bytes`
    pub num_folds: u64,

    /// Whether the proof has been finalized (obfuscated)
    pub finalized: bool,
}

impl FoldRecord {
    /// The implicit record of a category that has never been folded.
    pub fn empty(category: Category) -> Self {
        Self {
            category,
            proof_bytes: None,
            num_folds: 0,
            finalized: false,
        }
    }

    /// The record after folding one more attestation into this one.
    pub fn folded(&self, proof: Vec<u8>) -> Self {
        Self {
            category: self.category,
            proof_bytes: Some(proof),
            num_folds: self.num_folds + 1,
            finalized: false,
        }
    }

    /// The record after finalizing this one.
    pub fn finalized_with(&self, proof: Vec<u8>) -> Self {
        Self {
            category: self.category,
            proof_bytes: Some(proof),
            num_folds: self.num_folds,
            finalized: true,
        }
    }

    /// Check the record invariants.
    pub fn validate(&self) -> Result<(), StorageError> {
        match (self.num_folds, &self.proof_bytes) {
            (0, Some(_)) => Err(StorageError::InvalidRecord(format!(
                "{}: proof present with zero folds",
                self.category
            ))),
            (n, None) if n > 0 => Err(StorageError::InvalidRecord(format!(
                "{}: {} folds without a proof",
                self.category, n
            ))),
            (0, None) if self.finalized => Err(StorageError::InvalidRecord(format!(
                "{}: finalized without a proof",
                self.category
            ))),
            _ => Ok(()),
        }
    }

    pub fn summary(&self) -> FoldSummary {
        FoldSummary {
            category: self.category,
            num_folds: self.num_folds,
            finalized: self.finalized,
        }
    }
}

/// Snapshot of a category's fold count and finalization flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FoldSummary {
    pub category: Category,
    pub num_folds: u64,
    pub finalized: bool,
}

impl FoldSummary {
    pub fn empty(category: Category) -> Self {
        FoldRecord::empty(category).summary()
    }
}

/// Fold record store trait for abstracting storage backends.
#[async_trait]
pub trait FoldRecordStore: Send + Sync {
    /// Current record for a category; the empty record if none was written.
    async fn get(&self, category: Category) -> Result<FoldRecord, StorageError>;

    /// Atomically replace the record if its stored fold count equals
    /// `expected_num_folds` and it is not finalized.
    ///
    /// # Errors
    ///
    /// - `Conflict`: the stored record changed since it was read
    /// - `InvalidRecord`: `record` violates the record invariants
    /// - `Fault`: underlying medium failure
    async fn compare_and_set(
        &self,
        category: Category,
        expected_num_folds: u64,
        record: FoldRecord,
    ) -> Result<(), StorageError>;

    /// Records for every category.
    async fn all(&self) -> Result<Vec<FoldRecord>, StorageError> {
        let mut records = Vec::with_capacity(Category::ALL.len());
        for category in Category::ALL {
            records.push(self.get(category).await?);
        }
        Ok(records)
    }
}

/// Shared precondition checks for `compare_and_set` implementations.
pub(crate) fn check_write(
    category: Category,
    expected_num_folds: u64,
    current: &FoldRecord,
    record: &FoldRecord,
) -> Result<(), StorageError> {
    if record.category != category {
        return Err(StorageError::InvalidRecord(format!(
            "record for {} written under {}",
            record.category, category
        )));
    }
    record.validate()?;

    if current.num_folds != expected_num_folds || current.finalized {
        return Err(StorageError::Conflict {
            category,
            expected: expected_num_folds,
            actual: current.num_folds,
        });
    }
    Ok(())
}
