//! Scripted proof engine for testing.
//!
//! Wraps a real engine and lets tests inject faults, slow operations down,
//! and observe how often each operation ran.

use super::traits::*;
use crate::persistence::Category;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Engine operation selector for scripted faults.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EngineOp {
    Load,
    Fold,
    Finalize,
    Decompress,
    Verify,
}

/// Mock engine that delegates to an inner engine.
#[derive(Clone)]
pub struct ScriptedEngine<E> {
    inner: E,
    state: Arc<Mutex<ScriptState>>,
    fold_calls: Arc<AtomicUsize>,
    load_calls: Arc<AtomicUsize>,
    in_flight: Arc<AtomicUsize>,
    max_in_flight: Arc<AtomicUsize>,
}

#[derive(Default)]
struct ScriptState {
    faults: VecDeque<(EngineOp, EngineError)>,
    delay: Option<Duration>,
}

impl<E: ProofEngine> ScriptedEngine<E> {
    pub fn new(inner: E) -> Self {
        Self {
            inner,
            state: Arc::new(Mutex::new(ScriptState::default())),
            fold_calls: Arc::new(AtomicUsize::new(0)),
            load_calls: Arc::new(AtomicUsize::new(0)),
            in_flight: Arc::new(AtomicUsize::new(0)),
            max_in_flight: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Access the wrapped engine.
    pub fn inner(&self) -> &E {
        &self.inner
    }

    /// Fail the next call of `op` with `error`. Faults queue in order.
    pub fn fail_next(&self, op: EngineOp, error: EngineError) {
        if let Ok(mut state) = self.state.lock() {
            state.faults.push_back((op, error));
        }
    }

    /// Sleep this long inside every operation.
    pub fn set_delay(&self, delay: Option<Duration>) {
        if let Ok(mut state) = self.state.lock() {
            state.delay = delay;
        }
    }

    /// Number of fold calls that reached the engine.
    pub fn fold_calls(&self) -> usize {
        self.fold_calls.load(Ordering::SeqCst)
    }

    /// Number of parameter loads that reached the engine.
    pub fn load_calls(&self) -> usize {
        self.load_calls.load(Ordering::SeqCst)
    }

    /// Highest number of operations observed running at once.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn enter(&self, op: EngineOp) -> EngineResult<InFlight<'_>> {
        let (fault, delay) = match self.state.lock() {
            Ok(mut state) => {
                let position = state.faults.iter().position(|(o, _)| *o == op);
                let fault = position.and_then(|i| state.faults.remove(i)).map(|(_, e)| e);
                (fault, state.delay)
            }
            Err(_) => (None, None),
        };

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        let guard = InFlight(&self.in_flight);

        if let Some(delay) = delay {
            std::thread::sleep(delay);
        }
        match fault {
            Some(error) => Err(error),
            None => Ok(guard),
        }
    }
}

struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl<E: ProofEngine> ProofEngine for ScriptedEngine<E> {
    fn load_parameters(&self, params: &[u8]) -> EngineResult<EngineHandle> {
        self.load_calls.fetch_add(1, Ordering::SeqCst);
        let _guard = self.enter(EngineOp::Load)?;
        self.inner.load_parameters(params)
    }

    fn fold(
        &self,
        handle: &EngineHandle,
        prior: Option<&[u8]>,
        attestation: &Attestation,
    ) -> EngineResult<Vec<u8>> {
        self.fold_calls.fetch_add(1, Ordering::SeqCst);
        let _guard = self.enter(EngineOp::Fold)?;
        self.inner.fold(handle, prior, attestation)
    }

    fn finalize(&self, handle: &EngineHandle, proof: &[u8]) -> EngineResult<Vec<u8>> {
        let _guard = self.enter(EngineOp::Finalize)?;
        self.inner.finalize(handle, proof)
    }

    fn decompress(&self, handle: &EngineHandle, compact: &[u8]) -> EngineResult<Vec<u8>> {
        let _guard = self.enter(EngineOp::Decompress)?;
        self.inner.decompress(handle, compact)
    }

    fn verify(
        &self,
        handle: &EngineHandle,
        proof: &[u8],
        num_folds: u64,
        category: Category,
        finalized: bool,
    ) -> EngineResult<bool> {
        let _guard = self.enter(EngineOp::Verify)?;
        self.inner.verify(handle, proof, num_folds, category, finalized)
    }
}
