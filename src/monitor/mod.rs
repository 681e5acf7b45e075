//! The scheduling core: probes, result recording, per-endpoint jobs and the
//! reconciler that keeps jobs in sync with storage.

pub mod job;
pub mod prober;
pub mod reconciler;
pub mod recorder;
pub mod scheduler;

#[cfg(test)]
pub(crate) mod test_support;

pub use job::CancelMode;
pub use prober::{DEFAULT_PROBE_TIMEOUT, HttpProber, ProbeOutcome, Prober};
pub use reconciler::{ReconcileReport, Reconciler};
pub use recorder::{RecordError, ResultRecorder};
pub use scheduler::{Scheduler, SchedulerConfig, SchedulerError};
