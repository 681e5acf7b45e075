//! Process-level facade over the reconciler and its jobs.

use crate::db::store::EndpointStore;
use crate::monitor::job::{CancelMode, JobContext};
use crate::monitor::prober::Prober;
use crate::monitor::reconciler::Reconciler;
use crate::monitor::recorder::ResultRecorder;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{Mutex, Semaphore, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

pub const DEFAULT_RECONCILE_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchedulerConfig {
    pub reconcile_interval: Duration,
    pub cancel_mode: CancelMode,
    /// `None` leaves probe concurrency unbounded.
    pub max_concurrent_probes: Option<usize>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            reconcile_interval: DEFAULT_RECONCILE_INTERVAL,
            cancel_mode: CancelMode::Drain,
            max_concurrent_probes: None,
        }
    }
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum SchedulerError {
    #[error("Scheduler is already running")]
    AlreadyRunning,
}

struct RunningState {
    shutdown_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

pub struct Scheduler {
    store: Arc<dyn EndpointStore>,
    prober: Arc<dyn Prober>,
    config: SchedulerConfig,
    running: Mutex<Option<RunningState>>,
}

impl Scheduler {
    pub fn new(
        store: Arc<dyn EndpointStore>,
        prober: Arc<dyn Prober>,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            store,
            prober,
            config,
            running: Mutex::new(None),
        }
    }

    pub async fn is_running(&self) -> bool {
        self.running.lock().await.is_some()
    }

    /// Reconciles once, then keeps reconciling on the configured period in a
    /// background task.
    ///
    /// Calling `start` on a running scheduler returns
    /// [`SchedulerError::AlreadyRunning`] and changes nothing.
    pub async fn start(&self) -> Result<(), SchedulerError> {
        let mut running = self.running.lock().await;
        if running.is_some() {
            warn!("Scheduler start requested while already running.");
            return Err(SchedulerError::AlreadyRunning);
        }

        info!("Starting scheduler...");
        let mut reconciler =
            Reconciler::new(self.store.clone(), self.job_context(), self.config.cancel_mode);
        reconciler.reconcile_and_log().await;

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let period = self.config.reconcile_interval;
        let task = tokio::spawn(async move {
            reconciler.run(period, shutdown_rx).await;
            let stopped = reconciler.shutdown().await;
            info!(jobs = stopped, "All endpoint jobs stopped.");
        });

        *running = Some(RunningState { shutdown_tx, task });
        info!(
            reconcile_interval_seconds = period.as_secs(),
            "Scheduler started successfully."
        );
        Ok(())
    }

    /// Stops the reconciliation loop, then cancels and waits for every job.
    ///
    /// When this returns no further ticks will fire. Safe to call when the
    /// scheduler was never started.
    pub async fn stop(&self) {
        let Some(state) = self.running.lock().await.take() else {
            debug!("Scheduler stop requested but it is not running.");
            return;
        };

        if state.shutdown_tx.send(true).is_err() {
            warn!("Reconciliation loop already exited before shutdown.");
        }
        if let Err(e) = state.task.await {
            error!(error = %e, "Reconciliation task ended abnormally.");
        }
        info!("Stopped scheduler.");
    }

    fn job_context(&self) -> JobContext {
        JobContext {
            prober: self.prober.clone(),
            recorder: ResultRecorder::new(self.store.clone()),
            limiter: self
                .config
                .max_concurrent_probes
                .map(|permits| Arc::new(Semaphore::new(permits))),
        }
    }
}
