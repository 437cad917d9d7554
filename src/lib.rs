//! Foldvault - Local Accumulator of Folded Membership Proofs
//!
//! Ingests one attestation at a time, folds each into a single running proof
//! per category, and later finalizes (obfuscates) and re-verifies it.
//!
//! Key principles:
//! - The fold record store is the source of truth; every write is a
//!   compare-and-set on the fold count
//! - Folds for one category are applied in acceptance order, never reordered
//! - Finalization is one-way
//! - Cryptographic work never runs on the caller's task
//!
//! ## Layout
//! - [`persistence`]: parameter chunks and fold records (SQLite, in-memory)
//! - [`engine`]: the proof engine capability and its reference implementation
//! - [`worker`]: background execution of engine jobs
//! - [`controller`]: the fold/finalize/verify state machine

pub mod config;
pub mod controller;
pub mod engine;
pub mod persistence;
pub mod serialization;
pub mod worker;

pub use controller::{BatchOutcome, FoldController, FoldError, FoldResult, FoldState, VerifyReport};
pub use engine::{Attestation, ProofEngine};
pub use persistence::{Category, FoldRecord, FoldSummary};
