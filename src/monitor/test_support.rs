use crate::db::MemoryEndpointStore;
use crate::monitor::job::JobContext;
use crate::monitor::prober::{ProbeOutcome, Prober};
use crate::monitor::recorder::ResultRecorder;
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::time::Instant;

/// Prober that answers from memory after an optional delay and records when
/// each probe started.
pub(crate) struct FakeProber {
    delay: Duration,
    outcome: Mutex<ProbeOutcome>,
    starts: Mutex<Vec<(String, Instant)>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    panic_next: AtomicBool,
}

impl FakeProber {
    pub(crate) fn new() -> Self {
        Self::with_delay(Duration::ZERO)
    }

    pub(crate) fn with_delay(delay: Duration) -> Self {
        Self {
            delay,
            outcome: Mutex::new(ProbeOutcome::from_status(200, delay.as_millis() as i64)),
            starts: Mutex::new(Vec::new()),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            panic_next: AtomicBool::new(false),
        }
    }

    pub(crate) fn set_outcome(&self, outcome: ProbeOutcome) {
        *self.outcome.lock().unwrap() = outcome;
    }

    pub(crate) fn panic_next(&self) {
        self.panic_next.store(true, Ordering::SeqCst);
    }

    pub(crate) fn starts_for(&self, url: &str) -> Vec<Instant> {
        self.starts
            .lock()
            .unwrap()
            .iter()
            .filter(|(u, _)| u == url)
            .map(|(_, t)| *t)
            .collect()
    }

    pub(crate) fn call_count(&self) -> usize {
        self.starts.lock().unwrap().len()
    }

    pub(crate) fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    pub(crate) fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Prober for FakeProber {
    async fn probe(&self, url: &str) -> ProbeOutcome {
        self.starts
            .lock()
            .unwrap()
            .push((url.to_string(), Instant::now()));
        if self.panic_next.swap(false, Ordering::SeqCst) {
            panic!("probe of {url} blew up");
        }

        let now_in_flight = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now_in_flight, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        self.outcome.lock().unwrap().clone()
    }
}

pub(crate) fn job_context(
    store: &Arc<MemoryEndpointStore>,
    prober: &Arc<FakeProber>,
    max_concurrent_probes: Option<usize>,
) -> JobContext {
    JobContext {
        prober: prober.clone(),
        recorder: ResultRecorder::new(store.clone()),
        limiter: max_concurrent_probes.map(|n| Arc::new(Semaphore::new(n))),
    }
}
