//! In-process [`EndpointStore`] used for dry runs and tests.
//!
//! Endpoints are mutated from the outside through the `set_*` helpers, which
//! is how tests play the role of the CRUD API editing endpoints while the
//! scheduler is running. Read and write failures can be injected per
//! operation.

use crate::config::EndpointSeed;
use crate::db::enums::EndpointStatus;
use crate::db::store::{
    EndpointSnapshot, EndpointStore, NewProbeResult, ProbeResultRecord, StoreError,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Mutex;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredEndpoint {
    pub id: i32,
    pub name: String,
    pub url: String,
    pub interval_seconds: i32,
    pub is_active: bool,
    pub status: EndpointStatus,
    pub last_checked_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Default)]
struct Tables {
    endpoints: BTreeMap<i32, StoredEndpoint>,
    results: Vec<ProbeResultRecord>,
    next_endpoint_id: i32,
    next_result_id: i64,
}

#[derive(Debug, Default)]
pub struct MemoryEndpointStore {
    tables: Mutex<Tables>,
    fail_reads: AtomicBool,
    fail_result_writes: AtomicBool,
    fail_status_updates: AtomicBool,
}

impl MemoryEndpointStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn seeded(seeds: &[EndpointSeed]) -> Self {
        let store = Self::new();
        for seed in seeds {
            let id = store
                .add_endpoint(&seed.name, &seed.url, seed.interval_seconds)
                .await;
            if !seed.is_active {
                store.set_active(id, false).await;
            }
        }
        store
    }

    /// Inserts a new active endpoint with `unknown` status and returns its id.
    pub async fn add_endpoint(&self, name: &str, url: &str, interval_seconds: i32) -> i32 {
        let mut tables = self.tables.lock().await;
        tables.next_endpoint_id += 1;
        let id = tables.next_endpoint_id;
        tables.endpoints.insert(
            id,
            StoredEndpoint {
                id,
                name: name.to_string(),
                url: url.to_string(),
                interval_seconds,
                is_active: true,
                status: EndpointStatus::Unknown,
                last_checked_at: None,
            },
        );
        id
    }

    pub async fn set_active(&self, id: i32, is_active: bool) -> bool {
        self.edit(id, |ep| ep.is_active = is_active).await
    }

    pub async fn set_interval(&self, id: i32, interval_seconds: i32) -> bool {
        self.edit(id, |ep| ep.interval_seconds = interval_seconds).await
    }

    pub async fn set_url(&self, id: i32, url: &str) -> bool {
        self.edit(id, |ep| ep.url = url.to_string()).await
    }

    /// Deletes the endpoint. Its probe history is kept.
    pub async fn remove_endpoint(&self, id: i32) -> bool {
        self.tables.lock().await.endpoints.remove(&id).is_some()
    }

    pub async fn endpoint(&self, id: i32) -> Option<StoredEndpoint> {
        self.tables.lock().await.endpoints.get(&id).cloned()
    }

    pub async fn results_for(&self, endpoint_id: i32) -> Vec<ProbeResultRecord> {
        self.tables
            .lock()
            .await
            .results
            .iter()
            .filter(|r| r.endpoint_id == endpoint_id)
            .cloned()
            .collect()
    }

    pub async fn result_count(&self) -> usize {
        self.tables.lock().await.results.len()
    }

    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub fn fail_result_writes(&self, fail: bool) {
        self.fail_result_writes.store(fail, Ordering::SeqCst);
    }

    pub fn fail_status_updates(&self, fail: bool) {
        self.fail_status_updates.store(fail, Ordering::SeqCst);
    }

    async fn edit(&self, id: i32, f: impl FnOnce(&mut StoredEndpoint)) -> bool {
        match self.tables.lock().await.endpoints.get_mut(&id) {
            Some(ep) => {
                f(ep);
                true
            }
            None => false,
        }
    }
}

#[async_trait]
impl EndpointStore for MemoryEndpointStore {
    async fn active_endpoints(&self) -> Result<Vec<EndpointSnapshot>, StoreError> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("injected read failure".to_string()));
        }
        let tables = self.tables.lock().await;
        Ok(tables
            .endpoints
            .values()
            .filter(|ep| ep.is_active)
            .map(|ep| EndpointSnapshot::new(ep.id, ep.url.clone(), ep.interval_seconds))
            .collect())
    }

    async fn insert_probe_result(
        &self,
        result: NewProbeResult,
    ) -> Result<ProbeResultRecord, StoreError> {
        if self.fail_result_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("injected write failure".to_string()));
        }
        let mut tables = self.tables.lock().await;
        tables.next_result_id += 1;
        let record = ProbeResultRecord {
            id: tables.next_result_id,
            endpoint_id: result.endpoint_id,
            http_status: result.http_status,
            succeeded: result.succeeded,
            response_time_ms: result.response_time_ms,
            error: result.error,
            created_at: result.created_at,
        };
        tables.results.push(record.clone());
        Ok(record)
    }

    async fn update_endpoint_status(
        &self,
        endpoint_id: i32,
        status: EndpointStatus,
        checked_at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        if self.fail_status_updates.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("injected update failure".to_string()));
        }
        Ok(self
            .edit(endpoint_id, |ep| {
                ep.status = status;
                ep.last_checked_at = Some(checked_at);
            })
            .await)
    }
}
