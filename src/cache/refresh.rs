//! Single-flight background refresh.
//! A bounded tokio mpsc queue feeds a small worker pool. A key enters the
//! in-flight set atomically when its job is scheduled and leaves it when the
//! job's guard drops, whatever way the job ends.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::key::CacheKey;
use super::EntryMeta;
use crate::error::RefreshError;
use crate::style::Style;

/// Everything needed to recompute one cached translation.
#[derive(Debug, Clone)]
pub struct RefreshJob {
    pub key: CacheKey,
    pub from: Style,
    pub to: Style,
    pub source_text: String,
    pub meta: EntryMeta,
    /// Creation time of the entry being refreshed; the result is only
    /// stored over that same entry.
    pub created_at_ms: i64,
}

/// Recomputes and re-stores a translation. Implemented by the pipeline.
#[async_trait]
pub trait RefreshHandler: Send + Sync {
    async fn refresh(&self, job: RefreshJob) -> Result<(), RefreshError>;
}

type InFlight = Arc<Mutex<HashSet<CacheKey>>>;

/// Removes its key from the in-flight set on drop.
struct InFlightGuard {
    key: CacheKey,
    in_flight: InFlight,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.in_flight.lock().remove(&self.key);
    }
}

struct QueuedJob {
    job: RefreshJob,
    guard: InFlightGuard,
}

pub struct RefreshCoordinator {
    tx: mpsc::Sender<QueuedJob>,
    rx: Mutex<Option<mpsc::Receiver<QueuedJob>>>,
    in_flight: InFlight,
    shutdown: CancellationToken,
}

impl RefreshCoordinator {
    pub fn new(queue_capacity: usize) -> Self {
        let (tx, rx) = mpsc::channel(queue_capacity.max(1));
        Self {
            tx,
            rx: Mutex::new(Some(rx)),
            in_flight: Arc::new(Mutex::new(HashSet::new())),
            shutdown: CancellationToken::new(),
        }
    }

    /// Schedule a refresh unless one is already in flight for the key.
    /// Returns true only for the call that actually enqueued the job.
    pub fn try_schedule(&self, job: RefreshJob) -> bool {
        if self.shutdown.is_cancelled() {
            return false;
        }
        if !self.in_flight.lock().insert(job.key) {
            debug!(key = %job.key, "refresh already in flight");
            return false;
        }

        let key = job.key;
        let queued = QueuedJob {
            job,
            guard: InFlightGuard {
                key,
                in_flight: Arc::clone(&self.in_flight),
            },
        };

        // On failure the rejected job (and its guard) is dropped here,
        // releasing the key.
        match self.tx.try_send(queued) {
            Ok(()) => {
                debug!(key = %key, "refresh scheduled");
                true
            }
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!(key = %key, "refresh queue full, dropping refresh");
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                error!(key = %key, "refresh queue closed");
                false
            }
        }
    }

    /// Start `workers` tasks draining the queue. Only the first call has an
    /// effect; returns whether workers were started.
    pub fn start(&self, workers: usize, handler: Arc<dyn RefreshHandler>) -> bool {
        if self.shutdown.is_cancelled() {
            warn!("refresh coordinator shut down, not starting workers");
            return false;
        }
        let Some(rx) = self.rx.lock().take() else {
            warn!("refresh workers already started");
            return false;
        };
        let rx = Arc::new(tokio::sync::Mutex::new(rx));

        for worker_id in 0..workers.max(1) {
            tokio::spawn(run_worker(
                worker_id,
                Arc::clone(&rx),
                Arc::clone(&handler),
                self.shutdown.clone(),
            ));
        }
        info!(workers = workers.max(1), "refresh workers started");
        true
    }

    /// Stop accepting jobs and let workers exit after the job in hand.
    /// Queued jobs are dropped and their keys released.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
        // Workers never started: nobody else will drain the queue.
        if let Some(mut rx) = self.rx.lock().take() {
            let dropped = drain(&mut rx);
            debug!(dropped, "refresh queue drained at shutdown");
        }
    }

    pub fn is_shut_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Child token that fires on `shutdown`, for other background loops.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.child_token()
    }

    pub fn is_in_flight(&self, key: &CacheKey) -> bool {
        self.in_flight.lock().contains(key)
    }

    pub fn in_flight_len(&self) -> usize {
        self.in_flight.lock().len()
    }
}

async fn run_worker(
    worker_id: usize,
    rx: Arc<tokio::sync::Mutex<mpsc::Receiver<QueuedJob>>>,
    handler: Arc<dyn RefreshHandler>,
    shutdown: CancellationToken,
) {
    loop {
        let next = tokio::select! {
            biased;
            _ = shutdown.cancelled() => None,
            queued = async { rx.lock().await.recv().await } => queued,
        };
        let Some(QueuedJob { job, guard }) = next else {
            break;
        };

        let key = job.key;
        let start = Instant::now();
        // Run in its own task so a panicking handler cannot take the worker
        // down; the guard lives in this frame and drops either way.
        let handler = Arc::clone(&handler);
        let outcome = tokio::spawn(async move { handler.refresh(job).await }).await;
        let elapsed_ms = start.elapsed().as_millis() as u64;

        match outcome {
            Ok(Ok(())) => info!(worker_id, key = %key, elapsed_ms, "refresh complete"),
            Ok(Err(e)) => warn!(worker_id, key = %key, error = %e, "refresh failed"),
            Err(e) => error!(worker_id, key = %key, error = %e, "refresh task panicked"),
        }
        drop(guard);
    }
    let dropped = drain(&mut *rx.lock().await);
    debug!(worker_id, dropped, "refresh worker exiting");
}

/// Close the queue and drop whatever is still in it, releasing each key.
fn drain(rx: &mut mpsc::Receiver<QueuedJob>) -> usize {
    rx.close();
    let mut dropped = 0;
    while rx.try_recv().is_ok() {
        dropped += 1;
    }
    dropped
}
