//! Proof Engine Adapter
//!
//! Thin boundary around the external folding/verification capability. The
//! adapter owns nothing beyond a loaded-parameters handle; ordering and
//! persistence are the controller's job.
//!
//! ## Implementations
//! - [`HashChainEngine`]: SHA-256 transcript reference engine
//! - [`ScriptedEngine`]: fault-injecting wrapper for tests

pub mod hash_chain;
pub mod mock;
pub mod traits;

pub use hash_chain::{HashChainEngine, PARAMS_MAGIC};
pub use mock::{EngineOp, ScriptedEngine};
pub use traits::{Attestation, EngineError, EngineHandle, EngineResult, ProofEngine};
