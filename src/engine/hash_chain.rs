//! Reference proof engine based on a SHA-256 transcript.
//!
//! This engine gives the accumulator a concrete, runnable backend with the
//! same observable contract as a real folding scheme:
//!
//! - **Fold**: `acc' = SHA256(FOLD || params || category || acc || n+1 || H(payload))`,
//!   so the result depends on every prior attestation and their order
//! - **Finalize**: `acc' = SHA256(FINALIZE || acc || r)` for a fresh random `r`
//!   that is discarded, so the fold trace cannot be recovered
//! - **Seal**: every proof carries an HMAC-SHA256 over all of its fields,
//!   keyed from the parameters; `verify` checks it
//!
//! It is not zero-knowledge. Production deployments plug a real folding
//! engine in behind [`ProofEngine`].
//!
//! ## Formats
//!
//! ```text
//! parameters  = MAGIC || seed[32] || filler[..]
//! attestation = CBOR { message, tag = HMAC(attest_key, category || message) }
//! compact     = CBOR ProofBody
//! canonical   = CBOR { params_digest, body: ProofBody }
//! ```

use super::traits::{Attestation, EngineError, EngineHandle, EngineResult, ProofEngine};
use crate::persistence::chunks::digest;
use crate::persistence::Category;
use crate::serialization::{from_cbor, to_cbor};
use hkdf::Hkdf;
use rand::RngCore;
use ring::hmac;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use zeroize::Zeroizing;

/// Header every parameter blob for this engine starts with.
pub const PARAMS_MAGIC: &[u8] = b"foldvault-hashchain-params-v1";

/// Length of the secret seed following the header.
const SEED_LEN: usize = 32;

const PROOF_VERSION: u8 = 1;

const ATTEST_CONTEXT: &[u8] = b"foldvault-hashchain-v1-attestation";
const SEAL_CONTEXT: &[u8] = b"foldvault-hashchain-v1-seal";

const GENESIS_DOMAIN: &[u8] = b"GENESIS";
const FOLD_DOMAIN: &[u8] = b"FOLD";
const FINALIZE_DOMAIN: &[u8] = b"FINALIZE";

/// Keys derived from loaded parameters.
struct HashChainState {
    attest_key: hmac::Key,
    seal_key: hmac::Key,
}

/// Signed payload carried inside an [`Attestation`].
#[derive(Debug, Clone, Serialize, Deserialize)]
struct AttestationPayload {
    message: Vec<u8>,
    tag: Vec<u8>,
}

/// Compact (stored) proof form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct ProofBody {
    version: u8,
    category: Category,
    num_folds: u64,
    accumulator: [u8; 32],
    finalized: bool,
    seal: Vec<u8>,
}

/// Canonical (verifiable) proof form, bound to a parameter set.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct CanonicalProof {
    params_digest: [u8; 32],
    body: ProofBody,
}

/// SHA-256 transcript accumulator engine.
#[derive(Debug, Clone, Copy, Default)]
pub struct HashChainEngine;

impl HashChainEngine {
    pub fn new() -> Self {
        Self
    }

    /// Generate a fresh parameter blob of at least `size` bytes.
    ///
    /// The filler after the seed stands in for the bulk of real proving
    /// parameters; it is derived from the seed so the blob is self-consistent.
    pub fn generate_parameters(size: usize) -> Vec<u8> {
        let mut seed = [0u8; SEED_LEN];
        rand::thread_rng().fill_bytes(&mut seed);
        Self::parameters_from_seed(&seed, size)
    }

    /// Deterministic parameter blob from a seed (for tests and fixtures).
    pub fn parameters_from_seed(seed: &[u8; SEED_LEN], size: usize) -> Vec<u8> {
        let header_len = PARAMS_MAGIC.len() + SEED_LEN;
        let mut blob = Vec::with_capacity(size.max(header_len));
        blob.extend_from_slice(PARAMS_MAGIC);
        blob.extend_from_slice(seed);

        let mut block = digest(seed);
        while blob.len() < size {
            blob.extend_from_slice(&block);
            block = digest(&block);
        }
        blob.truncate(size.max(header_len));
        blob
    }

    /// Produce a valid attestation for `message` under loaded parameters.
    pub fn issue_attestation(
        &self,
        handle: &EngineHandle,
        category: Category,
        message: &[u8],
    ) -> EngineResult<Attestation> {
        let state = handle.state::<HashChainState>()?;
        let tag = hmac::sign(&state.attest_key, &attestation_input(category, message));
        let payload = AttestationPayload {
            message: message.to_vec(),
            tag: tag.as_ref().to_vec(),
        };
        let bytes = to_cbor(&payload).map_err(|e| EngineError::Fault(e.to_string()))?;
        Ok(Attestation::new(category, bytes))
    }

    fn seal(state: &HashChainState, body: &ProofBody) -> Vec<u8> {
        hmac::sign(&state.seal_key, &seal_input(body))
            .as_ref()
            .to_vec()
    }

    fn seal_valid(state: &HashChainState, body: &ProofBody) -> bool {
        hmac::verify(&state.seal_key, &seal_input(body), &body.seal).is_ok()
    }

    fn encode_body(body: &ProofBody) -> EngineResult<Vec<u8>> {
        to_cbor(body).map_err(|e| EngineError::Fault(e.to_string()))
    }
}

fn derive_key(ikm: &[u8], context: &[u8]) -> EngineResult<Zeroizing<[u8; 32]>> {
    let hk = Hkdf::<Sha256>::new(Some(PARAMS_MAGIC), ikm);
    let mut okm = Zeroizing::new([0u8; 32]);
    hk.expand(context, &mut okm[..])
        .map_err(|e| EngineError::InitFault(format!("Key derivation failed: {}", e)))?;
    Ok(okm)
}

fn attestation_input(category: Category, message: &[u8]) -> Vec<u8> {
    let mut input = Vec::with_capacity(message.len() + 1);
    input.push(category.tag());
    input.extend_from_slice(message);
    input
}

fn seal_input(body: &ProofBody) -> Vec<u8> {
    let mut input = Vec::with_capacity(32 + 8 + 3);
    input.push(body.version);
    input.push(body.category.tag());
    input.extend_from_slice(&body.num_folds.to_le_bytes());
    input.extend_from_slice(&body.accumulator);
    input.push(body.finalized as u8);
    input
}

fn genesis(params_digest: &[u8; 32], category: Category) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(GENESIS_DOMAIN);
    hasher.update(params_digest);
    hasher.update([category.tag()]);
    hasher.finalize().into()
}

impl ProofEngine for HashChainEngine {
    fn load_parameters(&self, params: &[u8]) -> EngineResult<EngineHandle> {
        if params.len() < PARAMS_MAGIC.len() + SEED_LEN || !params.starts_with(PARAMS_MAGIC) {
            return Err(EngineError::InitFault(
                "parameters do not carry the hash-chain header".to_string(),
            ));
        }

        let params_digest = digest(params);
        let seed = &params[PARAMS_MAGIC.len()..PARAMS_MAGIC.len() + SEED_LEN];

        let mut ikm = Zeroizing::new(Vec::with_capacity(SEED_LEN + 32));
        ikm.extend_from_slice(seed);
        ikm.extend_from_slice(&params_digest);

        let attest_bytes = derive_key(&ikm, ATTEST_CONTEXT)?;
        let seal_bytes = derive_key(&ikm, SEAL_CONTEXT)?;

        let state = HashChainState {
            attest_key: hmac::Key::new(hmac::HMAC_SHA256, &attest_bytes[..]),
            seal_key: hmac::Key::new(hmac::HMAC_SHA256, &seal_bytes[..]),
        };

        Ok(EngineHandle::new(params_digest, state))
    }

    fn fold(
        &self,
        handle: &EngineHandle,
        prior: Option<&[u8]>,
        attestation: &Attestation,
    ) -> EngineResult<Vec<u8>> {
        let state = handle.state::<HashChainState>()?;
        let category = attestation.category;

        let payload: AttestationPayload = from_cbor(&attestation.payload)
            .map_err(|e| EngineError::FoldRejected(format!("undecodable attestation: {}", e)))?;
        hmac::verify(
            &state.attest_key,
            &attestation_input(category, &payload.message),
            &payload.tag,
        )
        .map_err(|_| EngineError::FoldRejected(format!("bad attestation tag for {}", category)))?;

        let (accumulator, num_folds) = match prior {
            None => (genesis(handle.params_digest(), category), 0),
            Some(bytes) => {
                let body: ProofBody = from_cbor(bytes)
                    .map_err(|e| EngineError::Fault(format!("prior proof undecodable: {}", e)))?;
                if !Self::seal_valid(state, &body) {
                    return Err(EngineError::Fault("prior proof seal invalid".to_string()));
                }
                if body.category != category {
                    return Err(EngineError::Fault(format!(
                        "prior proof belongs to {}, not {}",
                        body.category, category
                    )));
                }
                if body.finalized {
                    return Err(EngineError::Fault("prior proof is finalized".to_string()));
                }
                (body.accumulator, body.num_folds)
            }
        };

        let next_folds = num_folds + 1;
        let mut hasher = Sha256::new();
        hasher.update(FOLD_DOMAIN);
        hasher.update(handle.params_digest());
        hasher.update([category.tag()]);
        hasher.update(accumulator);
        hasher.update(next_folds.to_le_bytes());
        hasher.update(digest(&attestation.payload));

        let mut body = ProofBody {
            version: PROOF_VERSION,
            category,
            num_folds: next_folds,
            accumulator: hasher.finalize().into(),
            finalized: false,
            seal: Vec::new(),
        };
        body.seal = Self::seal(state, &body);

        Self::encode_body(&body)
    }

    fn finalize(&self, handle: &EngineHandle, proof: &[u8]) -> EngineResult<Vec<u8>> {
        let state = handle.state::<HashChainState>()?;
        let body: ProofBody = from_cbor(proof)
            .map_err(|e| EngineError::MalformedProof(format!("undecodable proof: {}", e)))?;

        if !Self::seal_valid(state, &body) {
            return Err(EngineError::Fault("proof seal invalid".to_string()));
        }
        if body.finalized {
            return Err(EngineError::Fault("proof is already finalized".to_string()));
        }
        if body.num_folds == 0 {
            return Err(EngineError::Fault("cannot finalize an empty proof".to_string()));
        }

        let mut blinding = Zeroizing::new([0u8; 32]);
        rand::thread_rng().fill_bytes(&mut blinding[..]);

        let mut hasher = Sha256::new();
        hasher.update(FINALIZE_DOMAIN);
        hasher.update(body.accumulator);
        hasher.update(&blinding[..]);

        let mut finalized = ProofBody {
            version: PROOF_VERSION,
            category: body.category,
            num_folds: body.num_folds,
            accumulator: hasher.finalize().into(),
            finalized: true,
            seal: Vec::new(),
        };
        finalized.seal = Self::seal(state, &finalized);

        Self::encode_body(&finalized)
    }

    fn decompress(&self, handle: &EngineHandle, compact: &[u8]) -> EngineResult<Vec<u8>> {
        let body: ProofBody = from_cbor(compact)
            .map_err(|e| EngineError::MalformedProof(format!("undecodable proof: {}", e)))?;
        if body.version != PROOF_VERSION {
            return Err(EngineError::MalformedProof(format!(
                "unsupported proof version {}",
                body.version
            )));
        }

        let canonical = CanonicalProof {
            params_digest: *handle.params_digest(),
            body,
        };
        to_cbor(&canonical).map_err(|e| EngineError::Fault(e.to_string()))
    }

    fn verify(
        &self,
        handle: &EngineHandle,
        proof: &[u8],
        num_folds: u64,
        category: Category,
        finalized: bool,
    ) -> EngineResult<bool> {
        let state = handle.state::<HashChainState>()?;
        let canonical: CanonicalProof = from_cbor(proof)
            .map_err(|e| EngineError::MalformedProof(format!("undecodable proof: {}", e)))?;
        let body = &canonical.body;

        Ok(&canonical.params_digest == handle.params_digest()
            && body.version == PROOF_VERSION
            && Self::seal_valid(state, body)
            && body.category == category
            && body.num_folds == num_folds
            && body.finalized == finalized)
    }
}
