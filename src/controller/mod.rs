//! Fold Controller
//!
//! Drives the attestation → fold → finalize → verify lifecycle for every
//! category and owns the ordering guarantees:
//!
//! - **Lanes**: one FIFO lock per category; at most one fold, finalize or
//!   verify runs per category, in the order callers were accepted
//! - **Optimistic concurrency**: every write goes through
//!   [`FoldRecordStore::compare_and_set`]; a `Conflict` re-reads and re-folds
//!   up to `max_fold_attempts` times, then surfaces `FoldContention`
//! - **Timeouts**: an accepted operation runs in its own task, so a caller
//!   that stops waiting never leaves a half-applied write behind
//! - **Parameters**: reconstructed and loaded once, on first use
//!
//! The store is the source of truth. The controller keeps only a read-through
//! cache of summaries for [`FoldController::status`].

pub mod error;
pub mod retry;
pub mod state;

pub use error::{FoldError, FoldResult};
pub use retry::{retry_with_backoff, RetryPolicy};
pub use state::FoldState;

use crate::config::{duration_format, option_duration_format, FolderConfig};
use crate::engine::{Attestation, EngineHandle, HashChainEngine};
use crate::persistence::{
    Category, FoldRecord, FoldRecordStore, FoldSummary, ParameterStore, SqliteStore,
};
use crate::worker::{Job, WorkerBridge};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::sync::{Mutex, OnceCell};

/// Fold controller configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControllerConfig {
    /// Parameter Store key the proving parameters are stored under
    #[serde(default = "default_parameter_purpose")]
    pub parameter_purpose: String,

    /// Attempts per operation before `Conflict` becomes `FoldContention`
    #[serde(default = "default_max_fold_attempts")]
    pub max_fold_attempts: u32,

    /// Backoff before the first retry, doubled per attempt
    #[serde(default = "default_retry_backoff", with = "duration_format")]
    pub retry_backoff: Duration,

    /// Cap on a single retry backoff
    #[serde(default = "default_max_retry_backoff", with = "duration_format")]
    pub max_retry_backoff: Duration,

    /// Caller-side limit on one operation (none = wait forever)
    #[serde(
        default,
        with = "option_duration_format",
        skip_serializing_if = "Option::is_none"
    )]
    pub operation_timeout: Option<Duration>,
}

fn default_parameter_purpose() -> String {
    "membership".to_string()
}

fn default_max_fold_attempts() -> u32 {
    5
}

fn default_retry_backoff() -> Duration {
    Duration::from_millis(10)
}

fn default_max_retry_backoff() -> Duration {
    Duration::from_secs(1)
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            parameter_purpose: default_parameter_purpose(),
            max_fold_attempts: default_max_fold_attempts(),
            retry_backoff: default_retry_backoff(),
            max_retry_backoff: default_max_retry_backoff(),
            operation_timeout: None,
        }
    }
}

impl ControllerConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_fold_attempts.max(1),
            initial_backoff: self.retry_backoff,
            max_backoff: self.max_retry_backoff.max(self.retry_backoff),
        }
    }
}

/// Outcome of folding a batch of attestations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchOutcome {
    /// Attestations folded before the batch stopped
    pub folded: usize,

    /// Category summary after the last successful fold
    pub summary: FoldSummary,

    /// The failure that stopped the batch, if any
    pub error: Option<FoldError>,
}

impl BatchOutcome {
    pub fn is_complete(&self) -> bool {
        self.error.is_none()
    }
}

/// Result of verifying a category's stored proof.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifyReport {
    pub valid: bool,

    /// The fold count and finalization flag the proof was checked against
    pub summary: FoldSummary,
}

/// Orchestrates folds, finalization and verification per category.
///
/// Cheap to clone; clones share lanes, cache and the loaded parameters.
#[derive(Clone)]
pub struct FoldController {
    inner: Arc<Inner>,
}

struct Inner {
    parameters: Arc<dyn ParameterStore>,
    records: Arc<dyn FoldRecordStore>,
    worker: WorkerBridge,
    config: ControllerConfig,
    handle: OnceCell<EngineHandle>,
    lanes: HashMap<Category, Arc<Mutex<()>>>,
    cache: RwLock<HashMap<Category, FoldSummary>>,
}

impl FoldController {
    pub fn new(
        parameters: Arc<dyn ParameterStore>,
        records: Arc<dyn FoldRecordStore>,
        worker: WorkerBridge,
        config: ControllerConfig,
    ) -> Self {
        let lanes = Category::ALL
            .iter()
            .map(|category| (*category, Arc::new(Mutex::new(()))))
            .collect();

        Self {
            inner: Arc::new(Inner {
                parameters,
                records,
                worker,
                config,
                handle: OnceCell::new(),
                lanes,
                cache: RwLock::new(HashMap::new()),
            }),
        }
    }

    /// Build a controller over the SQLite store and reference engine named by
    /// `config`.
    pub async fn open(config: &FolderConfig) -> FoldResult<Self> {
        let store = Arc::new(SqliteStore::open(&config.storage.database_path).await?);
        let worker = WorkerBridge::new(Arc::new(HashChainEngine::new()), config.worker.clone());

        tracing::info!(
            database = %config.storage.database_path.display(),
            purpose = %config.controller.parameter_purpose,
            "fold controller opened"
        );

        Ok(Self::new(
            store.clone(),
            store,
            worker,
            config.controller.clone(),
        ))
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.inner.config
    }

    /// Fold one attestation into `category`'s proof.
    ///
    /// # Errors
    ///
    /// - `FoldRejected`: invalid attestation, or one issued for another category
    /// - `AlreadyFinalized`: the category no longer accepts folds
    /// - `FoldContention`: every attempt lost a compare-and-set race
    /// - `Timeout`: the caller stopped waiting (the fold may still land)
    pub async fn fold(
        &self,
        category: Category,
        attestation: Attestation,
    ) -> FoldResult<FoldSummary> {
        check_attestation_category(category, &attestation)?;

        self.run_in_lane(category, "fold", move |inner| async move {
            inner.fold_locked(category, &attestation).await
        })
        .await
    }

    /// Fold a batch in order, holding the category's lane for the whole batch.
    ///
    /// Stops at the first failure; attestations after it are not folded.
    pub async fn fold_all(
        &self,
        category: Category,
        attestations: Vec<Attestation>,
    ) -> FoldResult<BatchOutcome> {
        self.run_in_lane(category, "fold_all", move |inner| async move {
            let mut summary = inner.records.get(category).await?.summary();
            let mut folded = 0;

            for attestation in &attestations {
                let result = match check_attestation_category(category, attestation) {
                    Ok(()) => inner.fold_locked(category, attestation).await,
                    Err(e) => Err(e),
                };
                match result {
                    Ok(next) => {
                        summary = next;
                        folded += 1;
                    }
                    Err(error) => {
                        tracing::warn!(
                            category = %category,
                            folded,
                            remaining = attestations.len() - folded,
                            error = %error,
                            "batch stopped"
                        );
                        return Ok(BatchOutcome {
                            folded,
                            summary,
                            error: Some(error),
                        });
                    }
                }
            }

            Ok(BatchOutcome {
                folded,
                summary,
                error: None,
            })
        })
        .await
    }

    /// Irreversibly finalize `category`'s proof.
    ///
    /// # Errors
    ///
    /// - `NothingToFinalize`: no folds yet
    /// - `AlreadyFinalized`: finalized earlier (the stored proof is untouched)
    pub async fn finalize(&self, category: Category) -> FoldResult<FoldSummary> {
        self.run_in_lane(category, "finalize", move |inner| async move {
            inner.finalize_locked(category).await
        })
        .await
    }

    /// Decompress and verify `category`'s stored proof.
    pub async fn verify(&self, category: Category) -> FoldResult<bool> {
        Ok(self.verify_category(category).await?.valid)
    }

    /// Verify and report the snapshot the proof was checked against.
    pub async fn verify_category(&self, category: Category) -> FoldResult<VerifyReport> {
        self.run_in_lane(category, "verify", move |inner| async move {
            inner.verify_locked(category).await
        })
        .await
    }

    /// Verify every category that holds a proof.
    ///
    /// Each category gets its own result; a failure in one does not stop the
    /// others. Fails only if the records cannot be listed.
    pub async fn verify_all(&self) -> FoldResult<Vec<(Category, FoldResult<VerifyReport>)>> {
        let mut reports = Vec::new();
        for record in self.inner.records.all().await? {
            if record.num_folds == 0 {
                continue;
            }
            let result = self.verify_category(record.category).await;
            if let Err(e) = &result {
                tracing::warn!(category = %record.category, error = %e, "verification failed");
            }
            reports.push((record.category, result));
        }
        Ok(reports)
    }

    /// Current summary for `category`. Never fails.
    ///
    /// Falls back to the last known summary (or the zero state) when the
    /// store cannot be read.
    pub async fn status(&self, category: Category) -> FoldSummary {
        match self.inner.records.get(category).await {
            Ok(record) => {
                let summary = record.summary();
                self.inner.remember(summary);
                summary
            }
            Err(e) => {
                tracing::warn!(category = %category, error = %e, "status read failed, using cached summary");
                self.cached_status(category)
            }
        }
    }

    /// Last summary this controller observed, without touching the store.
    pub fn cached_status(&self, category: Category) -> FoldSummary {
        self.inner.cached(category)
    }

    pub async fn state(&self, category: Category) -> FoldResult<FoldState> {
        let record = self.inner.records.get(category).await?;
        Ok(FoldState::of_record(&record))
    }

    /// Loaded engine parameters, reconstructing and loading them on first use.
    pub async fn engine_handle(&self) -> FoldResult<EngineHandle> {
        self.inner.engine_handle().await
    }

    /// Stop the worker bridge. Operations started afterwards fail with
    /// `WorkerUnavailable`.
    pub fn shutdown(&self) {
        self.inner.worker.shutdown();
    }

    async fn run_in_lane<T, F, Fut>(
        &self,
        category: Category,
        operation: &'static str,
        f: F,
    ) -> FoldResult<T>
    where
        F: FnOnce(Arc<Inner>) -> Fut + Send + 'static,
        Fut: Future<Output = FoldResult<T>> + Send + 'static,
        T: Send + 'static,
    {
        let lane = self.inner.lane(category)?;
        let inner = self.inner.clone();

        let accepted = async move {
            let guard = lane.lock_owned().await;
            tracing::debug!(category = %category, operation, "lane acquired");

            let task = tokio::spawn(async move {
                let _guard = guard;
                f(inner).await
            });
            task.await.map_err(|e| {
                FoldError::WorkerUnavailable(format!("{} task failed: {}", operation, e))
            })?
        };

        match self.inner.config.operation_timeout {
            Some(limit) => match tokio::time::timeout(limit, accepted).await {
                Ok(result) => result,
                Err(_) => {
                    tracing::warn!(
                        category = %category,
                        operation,
                        timeout_ms = limit.as_millis() as u64,
                        "operation timed out"
                    );
                    Err(FoldError::Timeout(limit))
                }
            },
            None => accepted.await,
        }
    }
}

impl Inner {
    fn lane(&self, category: Category) -> FoldResult<Arc<Mutex<()>>> {
        self.lanes
            .get(&category)
            .cloned()
            .ok_or_else(|| FoldError::InvalidRecord(format!("no lane for {}", category)))
    }

    fn remember(&self, summary: FoldSummary) {
        if let Ok(mut cache) = self.cache.write() {
            cache.insert(summary.category, summary);
        }
    }

    fn cached(&self, category: Category) -> FoldSummary {
        self.cache
            .read()
            .ok()
            .and_then(|cache| cache.get(&category).copied())
            .unwrap_or_else(|| FoldSummary::empty(category))
    }

    async fn engine_handle(&self) -> FoldResult<EngineHandle> {
        let handle = self
            .handle
            .get_or_try_init(|| async {
                let purpose = &self.config.parameter_purpose;
                let params = self.parameters.reconstruct(purpose).await?;
                let bytes = params.len();
                let handle = self.worker.submit(Job::Load { params }).await?.into_handle()?;

                tracing::info!(
                    purpose = %purpose,
                    bytes,
                    digest = %hex::encode(handle.params_digest()),
                    "proving parameters loaded"
                );
                Ok::<_, FoldError>(handle)
            })
            .await?;
        Ok(handle.clone())
    }

    /// Retry `attempt` on `Conflict`, mapping an exhausted budget to
    /// `FoldContention`.
    async fn with_conflict_retry<T, F, Fut>(&self, category: Category, attempt: F) -> FoldResult<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = FoldResult<T>>,
    {
        let policy = self.config.retry_policy();
        match retry_with_backoff(&policy, attempt, FoldError::is_conflict).await {
            Err(FoldError::Conflict { .. }) => {
                tracing::warn!(
                    category = %category,
                    attempts = policy.max_attempts,
                    "giving up after repeated conflicts"
                );
                Err(FoldError::FoldContention {
                    category,
                    attempts: policy.max_attempts,
                })
            }
            other => other,
        }
    }

    async fn fold_locked(
        &self,
        category: Category,
        attestation: &Attestation,
    ) -> FoldResult<FoldSummary> {
        self.with_conflict_retry(category, |attempt| self.try_fold(category, attestation, attempt))
            .await
    }

    async fn try_fold(
        &self,
        category: Category,
        attestation: &Attestation,
        attempt: u32,
    ) -> FoldResult<FoldSummary> {
        let current = self.records.get(category).await?;
        FoldState::of_record(&current).check_fold(category)?;

        let handle = self.engine_handle().await?;
        let proof = self
            .worker
            .submit(Job::Fold {
                handle,
                prior: current.proof_bytes.clone(),
                attestation: attestation.clone(),
            })
            .await?
            .into_proof()?;

        let next = current.folded(proof);
        self.commit(&current, next, attempt, "attestation folded")
            .await
    }

    async fn finalize_locked(&self, category: Category) -> FoldResult<FoldSummary> {
        self.with_conflict_retry(category, |attempt| self.try_finalize(category, attempt))
            .await
    }

    async fn try_finalize(&self, category: Category, attempt: u32) -> FoldResult<FoldSummary> {
        let current = self.records.get(category).await?;
        FoldState::of_record(&current).check_finalize(category)?;
        let proof = stored_proof(&current)?;

        let handle = self.engine_handle().await?;
        let sealed = self
            .worker
            .submit(Job::Finalize { handle, proof })
            .await?
            .into_proof()?;

        let next = current.finalized_with(sealed);
        self.commit(&current, next, attempt, "category finalized")
            .await
    }

    async fn verify_locked(&self, category: Category) -> FoldResult<VerifyReport> {
        let current = self.records.get(category).await?;
        FoldState::of_record(&current).check_verify(category)?;
        let compact = stored_proof(&current)?;
        let summary = current.summary();

        let handle = self.engine_handle().await?;
        let canonical = self
            .worker
            .submit(Job::Decompress {
                handle: handle.clone(),
                compact,
            })
            .await?
            .into_proof()?;
        let valid = self
            .worker
            .submit(Job::Verify {
                handle,
                proof: canonical,
                num_folds: summary.num_folds,
                category,
                finalized: summary.finalized,
            })
            .await?
            .into_verified()?;

        self.remember(summary);
        if valid {
            tracing::info!(category = %category, num_folds = summary.num_folds, finalized = summary.finalized, "proof verified");
        } else {
            tracing::warn!(category = %category, num_folds = summary.num_folds, finalized = summary.finalized, "proof failed verification");
        }

        Ok(VerifyReport { valid, summary })
    }

    async fn commit(
        &self,
        current: &FoldRecord,
        next: FoldRecord,
        attempt: u32,
        event: &'static str,
    ) -> FoldResult<FoldSummary> {
        let summary = next.summary();
        self.records
            .compare_and_set(current.category, current.num_folds, next)
            .await?;
        self.remember(summary);

        tracing::info!(
            category = %summary.category,
            num_folds = summary.num_folds,
            finalized = summary.finalized,
            attempt,
            "{}",
            event
        );
        Ok(summary)
    }
}

fn check_attestation_category(category: Category, attestation: &Attestation) -> FoldResult<()> {
    if attestation.category != category {
        return Err(FoldError::FoldRejected(format!(
            "attestation issued for {} submitted to {}",
            attestation.category, category
        )));
    }
    Ok(())
}

fn stored_proof(record: &FoldRecord) -> FoldResult<Vec<u8>> {
    record.proof_bytes.clone().ok_or_else(|| {
        FoldError::InvalidRecord(format!(
            "{}: {} folds without a proof",
            record.category, record.num_folds
        ))
    })
}
