//! Worker Bridge
//!
//! Runs proof engine operations off the async runtime so callers are never
//! blocked by cryptographic work.
//!
//! ## Design
//!
//! - **Queue**: jobs go over an unbounded `mpsc` channel to one dispatcher task
//! - **Execution**: each job runs on a `spawn_blocking` thread
//! - **Concurrency**: a semaphore caps jobs running at once; queued jobs wait
//!   in submission order
//! - **Cancellation**: a job can be cancelled until the dispatcher hands it
//!   to the engine; after that it runs to completion
//!
//! Per-category serialization is the controller's responsibility; the bridge
//! happily runs jobs from different categories side by side.

pub mod job;

pub use job::{Job, JobOutput, WorkerError};

use crate::engine::ProofEngine;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::sync::{mpsc, oneshot, Semaphore};
use uuid::Uuid;

const QUEUED: u8 = 0;
const RUNNING: u8 = 1;
const CANCELLED: u8 = 2;

/// Worker configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Jobs allowed to run at once (at least 1)
    #[serde(default = "default_max_concurrent_jobs")]
    pub max_concurrent_jobs: usize,
}

fn default_max_concurrent_jobs() -> usize {
    3
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_jobs: default_max_concurrent_jobs(),
        }
    }
}

type JobResult = Result<JobOutput, WorkerError>;

struct Envelope {
    id: Uuid,
    job: Job,
    status: Arc<AtomicU8>,
    reply: oneshot::Sender<JobResult>,
}

/// Handle to a submitted job.
///
/// Resolves to the job's result when awaited. Dropping the handle does not
/// stop the job.
pub struct JobHandle {
    status: Arc<AtomicU8>,
    receiver: oneshot::Receiver<JobResult>,
}

impl JobHandle {
    /// Cancel the job if it has not started.
    ///
    /// Returns `false` when the job is already running or done; in-progress
    /// engine work cannot be interrupted.
    pub fn cancel(&self) -> bool {
        self.status
            .compare_exchange(QUEUED, CANCELLED, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    /// Whether the job has been handed to the engine.
    pub fn is_started(&self) -> bool {
        self.status.load(Ordering::SeqCst) == RUNNING
    }

    fn resolved(result: JobResult) -> Self {
        let (tx, rx) = oneshot::channel();
        let _ = tx.send(result);
        Self {
            status: Arc::new(AtomicU8::new(CANCELLED)),
            receiver: rx,
        }
    }
}

impl Future for JobHandle {
    type Output = JobResult;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.receiver).poll(cx) {
            Poll::Ready(Ok(result)) => Poll::Ready(result),
            Poll::Ready(Err(_)) => Poll::Ready(Err(WorkerError::Shutdown)),
            Poll::Pending if self.status.load(Ordering::SeqCst) == CANCELLED => {
                Poll::Ready(Err(WorkerError::Cancelled))
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

/// Submits engine jobs to background threads.
///
/// Cheap to clone; clones share one queue. Must be created inside a tokio
/// runtime.
#[derive(Clone)]
pub struct WorkerBridge {
    sender: mpsc::UnboundedSender<Envelope>,
    closed: Arc<AtomicBool>,
}

impl WorkerBridge {
    pub fn new(engine: Arc<dyn ProofEngine>, config: WorkerConfig) -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        let closed = Arc::new(AtomicBool::new(false));
        let permits = config.max_concurrent_jobs.max(1);

        tokio::spawn(dispatch(
            engine,
            receiver,
            Arc::new(Semaphore::new(permits)),
            closed.clone(),
        ));

        tracing::debug!(max_concurrent_jobs = permits, "worker bridge started");
        Self { sender, closed }
    }

    /// Queue a job. Never blocks.
    pub fn submit(&self, job: Job) -> JobHandle {
        if self.closed.load(Ordering::SeqCst) {
            return JobHandle::resolved(Err(WorkerError::Shutdown));
        }

        let id = Uuid::new_v4();
        let status = Arc::new(AtomicU8::new(QUEUED));
        let (reply, receiver) = oneshot::channel();

        tracing::debug!(job_id = %id, kind = job.kind(), category = ?job.category(), "job queued");

        let envelope = Envelope {
            id,
            job,
            status: status.clone(),
            reply,
        };
        if let Err(mpsc::error::SendError(envelope)) = self.sender.send(envelope) {
            let _ = envelope.reply.send(Err(WorkerError::Shutdown));
        }

        JobHandle { status, receiver }
    }

    /// Stop accepting jobs. Queued jobs that have not started resolve to
    /// `WorkerError::Shutdown`; running jobs finish.
    pub fn shutdown(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    pub fn is_shut_down(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

async fn dispatch(
    engine: Arc<dyn ProofEngine>,
    mut receiver: mpsc::UnboundedReceiver<Envelope>,
    semaphore: Arc<Semaphore>,
    closed: Arc<AtomicBool>,
) {
    while let Some(envelope) = receiver.recv().await {
        if envelope.status.load(Ordering::SeqCst) == CANCELLED {
            tracing::debug!(job_id = %envelope.id, "skipping cancelled job");
            let _ = envelope.reply.send(Err(WorkerError::Cancelled));
            continue;
        }

        let permit = match semaphore.clone().acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => break,
        };

        if closed.load(Ordering::SeqCst) {
            let _ = envelope.reply.send(Err(WorkerError::Shutdown));
            continue;
        }

        if envelope
            .status
            .compare_exchange(QUEUED, RUNNING, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            tracing::debug!(job_id = %envelope.id, "job cancelled while waiting for a slot");
            let _ = envelope.reply.send(Err(WorkerError::Cancelled));
            continue;
        }

        let engine = engine.clone();
        tokio::spawn(async move {
            let Envelope { id, job, reply, .. } = envelope;
            let kind = job.kind();
            tracing::debug!(job_id = %id, kind, "job started");

            let joined = tokio::task::spawn_blocking(move || job.run(engine.as_ref())).await;
            drop(permit);

            let result = match joined {
                Ok(result) => result.map_err(WorkerError::from),
                Err(e) => Err(WorkerError::Panicked(e.to_string())),
            };

            if let Err(e) = &result {
                tracing::debug!(job_id = %id, kind, error = %e, "job failed");
            } else {
                tracing::debug!(job_id = %id, kind, "job finished");
            }

            // The caller may have stopped waiting; the result is still final.
            let _ = reply.send(result);
        });
    }

    tracing::debug!("worker bridge dispatcher stopped");
}
