//! Keeps the running job set in line with the active endpoints in storage.

use crate::db::store::{EndpointSnapshot, EndpointStore, StoreError};
use crate::monitor::job::{CancelMode, JobContext, JobHandle};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tracing::{debug, error, info, warn};

/// What a single reconciliation pass changed.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ReconcileReport {
    pub started: Vec<i32>,
    pub stopped: Vec<i32>,
    /// Jobs whose url or interval changed; each was stopped and started again.
    pub replaced: Vec<i32>,
    pub unchanged: usize,
    /// Active endpoints that failed validation and were not scheduled.
    pub skipped: Vec<i32>,
}

impl ReconcileReport {
    pub fn is_noop(&self) -> bool {
        self.started.is_empty()
            && self.stopped.is_empty()
            && self.replaced.is_empty()
            && self.skipped.is_empty()
    }
}

/// Owner of the job table. Only the reconciler inserts or removes jobs.
pub struct Reconciler {
    store: Arc<dyn EndpointStore>,
    ctx: JobContext,
    cancel_mode: CancelMode,
    jobs: HashMap<i32, JobHandle>,
    // Cancelled jobs that may still be finishing an in-flight probe.
    retiring: Vec<JoinHandle<()>>,
}

impl Reconciler {
    pub fn new(store: Arc<dyn EndpointStore>, ctx: JobContext, cancel_mode: CancelMode) -> Self {
        Self {
            store,
            ctx,
            cancel_mode,
            jobs: HashMap::new(),
            retiring: Vec::new(),
        }
    }

    pub fn job_count(&self) -> usize {
        self.jobs.len()
    }

    pub fn scheduled_ids(&self) -> Vec<i32> {
        let mut ids: Vec<i32> = self.jobs.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    pub fn snapshot_of(&self, endpoint_id: i32) -> Option<&EndpointSnapshot> {
        self.jobs.get(&endpoint_id).map(JobHandle::snapshot)
    }

    /// Reads the active endpoints and applies the diff to the job table.
    ///
    /// On a read failure the job table is left exactly as it was.
    pub async fn reconcile(&mut self) -> Result<ReconcileReport, StoreError> {
        let endpoints = self.store.active_endpoints().await?;
        Ok(self.apply(endpoints))
    }

    pub async fn reconcile_and_log(&mut self) {
        match self.reconcile().await {
            Ok(report) if report.is_noop() => {
                debug!(jobs = self.jobs.len(), "Reconciliation found no changes.");
            }
            Ok(report) => {
                info!(
                    jobs = self.jobs.len(),
                    started = ?report.started,
                    stopped = ?report.stopped,
                    replaced = ?report.replaced,
                    skipped = ?report.skipped,
                    unchanged = report.unchanged,
                    "Reconciled endpoint jobs."
                );
            }
            Err(e) => {
                error!(error = %e, "Failed to read active endpoints; job table left unchanged.");
            }
        }
    }

    fn apply(&mut self, endpoints: Vec<EndpointSnapshot>) -> ReconcileReport {
        self.retiring.retain(|h| !h.is_finished());
        let mut report = ReconcileReport::default();

        let mut desired: HashMap<i32, EndpointSnapshot> = HashMap::with_capacity(endpoints.len());
        for endpoint in endpoints {
            match endpoint.validate() {
                Ok(()) => {
                    desired.insert(endpoint.id, endpoint);
                }
                Err(e) => {
                    warn!(endpoint_id = endpoint.id, error = %e, "Skipping invalid endpoint.");
                    report.skipped.push(endpoint.id);
                }
            }
        }

        // 1. Stop jobs whose endpoint is gone, inactive or now invalid.
        let stale: Vec<i32> = self
            .jobs
            .keys()
            .filter(|id| !desired.contains_key(id))
            .copied()
            .collect();
        for endpoint_id in stale {
            if let Some(job) = self.jobs.remove(&endpoint_id) {
                info!(endpoint_id = endpoint_id, "Stopping job for endpoint.");
                self.retire(job);
                report.stopped.push(endpoint_id);
            }
        }

        // 2. Start new jobs and replace the ones whose snapshot changed.
        for (endpoint_id, snapshot) in desired {
            match self.jobs.get(&endpoint_id) {
                Some(job) if job.snapshot() == &snapshot => report.unchanged += 1,
                Some(_) => {
                    info!(
                        endpoint_id = endpoint_id,
                        url = %snapshot.url,
                        interval_seconds = snapshot.interval_seconds,
                        "Replacing job for updated endpoint."
                    );
                    if let Some(old) = self.jobs.remove(&endpoint_id) {
                        self.retire(old);
                    }
                    self.jobs
                        .insert(endpoint_id, JobHandle::spawn(snapshot, self.ctx.clone()));
                    report.replaced.push(endpoint_id);
                }
                None => {
                    self.jobs
                        .insert(endpoint_id, JobHandle::spawn(snapshot, self.ctx.clone()));
                    report.started.push(endpoint_id);
                }
            }
        }

        report.started.sort_unstable();
        report.stopped.sort_unstable();
        report.replaced.sort_unstable();
        report.skipped.sort_unstable();
        report
    }

    fn retire(&mut self, job: JobHandle) {
        self.retiring.push(job.cancel(self.cancel_mode));
    }

    /// Runs a reconciliation every `period` until `shutdown_rx` fires.
    ///
    /// The first pass happens one period from now; callers reconcile once
    /// themselves before entering the loop.
    pub async fn run(&mut self, period: Duration, mut shutdown_rx: watch::Receiver<bool>) {
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(interval_seconds = period.as_secs(), "Reconciliation loop started.");

        loop {
            tokio::select! {
                biased;
                _ = shutdown_rx.changed() => {
                    info!("Shutdown signal received, stopping reconciliation loop.");
                    break;
                }
                _ = ticker.tick() => {
                    self.reconcile_and_log().await;
                }
            }
        }
    }

    /// Cancels every job, waits for them to finish and clears the table.
    /// Returns how many jobs were live.
    pub async fn shutdown(&mut self) -> usize {
        let live = self.jobs.len();
        let mode = self.cancel_mode;
        let cancelled: Vec<JoinHandle<()>> = self
            .jobs
            .drain()
            .map(|(_, job)| job.cancel(mode))
            .collect();
        self.retiring.extend(cancelled);

        for joined in futures::future::join_all(self.retiring.drain(..)).await {
            if let Err(e) = joined {
                if e.is_panic() {
                    error!(error = %e, "Endpoint job panicked during shutdown.");
                }
            }
        }
        live
    }
}
