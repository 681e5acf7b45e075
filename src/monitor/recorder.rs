//! Persists probe outcomes and derives the endpoint's cached status.

use crate::db::enums::EndpointStatus;
use crate::db::store::{EndpointStore, ProbeResultRecord, StoreError};
use crate::monitor::prober::ProbeOutcome;
use chrono::Utc;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Error, Debug)]
pub enum RecordError {
    #[error("Failed to persist probe result for endpoint {endpoint_id}: {source}")]
    ResultWrite {
        endpoint_id: i32,
        #[source]
        source: StoreError,
    },
}

#[derive(Clone)]
pub struct ResultRecorder {
    store: Arc<dyn EndpointStore>,
}

impl ResultRecorder {
    pub fn new(store: Arc<dyn EndpointStore>) -> Self {
        Self { store }
    }

    /// Appends the probe result, then updates the endpoint's status.
    ///
    /// The result write always happens first. If it fails nothing else is
    /// written. A failed status update is logged and swallowed; the result
    /// stays recorded.
    pub async fn record(
        &self,
        endpoint_id: i32,
        outcome: &ProbeOutcome,
    ) -> Result<ProbeResultRecord, RecordError> {
        let now = Utc::now();
        let record = self
            .store
            .insert_probe_result(outcome.to_new_result(endpoint_id, now))
            .await
            .map_err(|source| RecordError::ResultWrite {
                endpoint_id,
                source,
            })?;

        let status = EndpointStatus::from_success(outcome.succeeded);
        match self
            .store
            .update_endpoint_status(endpoint_id, status, now)
            .await
        {
            Ok(true) => {}
            Ok(false) => {
                debug!(
                    endpoint_id = endpoint_id,
                    "Endpoint no longer exists; status update skipped."
                );
            }
            Err(e) => {
                warn!(
                    endpoint_id = endpoint_id,
                    status = %status,
                    error = %e,
                    "Failed to update endpoint status; probe result was kept."
                );
            }
        }

        Ok(record)
    }
}
