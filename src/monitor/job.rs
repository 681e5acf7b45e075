//! A running job keeps one endpoint probed on its interval.
//!
//! The loop probes immediately on start, records the result, then sleeps for
//! the endpoint's interval before the next tick. The sleep starts after the
//! previous probe-and-record sequence finished, so a slow probe pushes the
//! next tick back instead of overlapping it.

use crate::db::store::EndpointSnapshot;
use crate::monitor::prober::Prober;
use crate::monitor::recorder::{RecordError, ResultRecorder};
use futures::FutureExt;
use serde::Deserialize;
use std::panic::AssertUnwindSafe;
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::oneshot::{self, error::TryRecvError};
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// What happens to a probe that is in flight when its job is cancelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CancelMode {
    /// Pending ticks are dropped; an in-flight probe finishes and is recorded.
    #[default]
    Drain,
    /// The task is aborted; an in-flight probe is discarded unrecorded.
    Abort,
}

impl FromStr for CancelMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "drain" => Ok(CancelMode::Drain),
            "abort" => Ok(CancelMode::Abort),
            other => Err(format!(
                "unknown cancel mode {other:?}, expected \"drain\" or \"abort\""
            )),
        }
    }
}

/// Shared collaborators handed to every job.
#[derive(Clone)]
pub struct JobContext {
    pub prober: Arc<dyn Prober>,
    pub recorder: ResultRecorder,
    /// Caps concurrent probe-and-record sequences across all jobs when set.
    pub limiter: Option<Arc<Semaphore>>,
}

/// Handle to a spawned job, held only by the reconciler's job table.
pub struct JobHandle {
    snapshot: EndpointSnapshot,
    shutdown_tx: oneshot::Sender<()>,
    handle: JoinHandle<()>,
}

impl JobHandle {
    pub fn spawn(snapshot: EndpointSnapshot, ctx: JobContext) -> Self {
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let handle = tokio::spawn(run_job(snapshot.clone(), ctx, shutdown_rx));
        Self {
            snapshot,
            shutdown_tx,
            handle,
        }
    }

    pub fn snapshot(&self) -> &EndpointSnapshot {
        &self.snapshot
    }

    /// Stops future ticks and returns the task handle so the caller can wait
    /// for the job to wind down.
    pub fn cancel(self, mode: CancelMode) -> JoinHandle<()> {
        match mode {
            CancelMode::Drain => {
                if self.shutdown_tx.send(()).is_err() {
                    warn!(
                        endpoint_id = self.snapshot.id,
                        "Failed to send shutdown signal to job; it might have already finished."
                    );
                }
            }
            CancelMode::Abort => self.handle.abort(),
        }
        self.handle
    }
}

async fn run_job(
    snapshot: EndpointSnapshot,
    ctx: JobContext,
    mut shutdown_rx: oneshot::Receiver<()>,
) {
    let interval = snapshot.interval();
    info!(
        endpoint_id = snapshot.id,
        url = %snapshot.url,
        interval_seconds = snapshot.interval_seconds,
        "Started job for endpoint."
    );

    loop {
        // A cancel that arrived just after spawn wins over the first tick.
        if !matches!(shutdown_rx.try_recv(), Err(TryRecvError::Empty)) {
            break;
        }

        // Waiting for a limiter slot is still a pending tick, so a cancel
        // must be able to interrupt it.
        let permit = match &ctx.limiter {
            Some(limiter) => tokio::select! {
                biased;
                _ = &mut shutdown_rx => break,
                permit = limiter.clone().acquire_owned() => permit.ok(),
            },
            None => None,
        };

        match AssertUnwindSafe(run_tick(&snapshot, &ctx))
            .catch_unwind()
            .await
        {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                error!(endpoint_id = snapshot.id, error = %e, "Probe tick failed.");
            }
            Err(_) => {
                error!(endpoint_id = snapshot.id, "Probe tick panicked.");
            }
        }
        drop(permit);

        tokio::select! {
            biased;
            _ = &mut shutdown_rx => break,
            _ = tokio::time::sleep(interval) => {}
        }
    }

    info!(endpoint_id = snapshot.id, "Job for endpoint stopped.");
}

async fn run_tick(snapshot: &EndpointSnapshot, ctx: &JobContext) -> Result<(), RecordError> {
    let outcome = ctx.prober.probe(&snapshot.url).await;
    debug!(
        endpoint_id = snapshot.id,
        url = %snapshot.url,
        http_status = outcome.http_status,
        succeeded = outcome.succeeded,
        response_time_ms = outcome.elapsed_ms,
        "Probed endpoint."
    );

    ctx.recorder.record(snapshot.id, &outcome).await?;
    Ok(())
}
