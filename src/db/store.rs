//! Storage boundary consumed by the scheduling core.
//!
//! The scheduler only needs three operations from storage: reading the set of
//! active endpoints, appending a probe result and updating an endpoint's cached
//! status. Everything else about the storage engine stays behind this trait.

use crate::db::entities::{endpoint, probe_result};
use crate::db::enums::EndpointStatus;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Url;
use sea_orm::DbErr;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Smallest probe interval an endpoint may be scheduled with.
pub const MIN_INTERVAL_SECONDS: i32 = 10;

pub type ProbeResultRecord = probe_result::Model;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] DbErr),
    #[error("Storage unavailable: {0}")]
    Unavailable(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InvalidEndpoint {
    #[error("interval of {0}s is below the minimum of {MIN_INTERVAL_SECONDS}s")]
    IntervalTooShort(i32),
    #[error("url {url:?} is not a valid absolute URL: {reason}")]
    MalformedUrl { url: String, reason: String },
    #[error("url scheme {0:?} is not http or https")]
    UnsupportedScheme(String),
}

/// The part of an endpoint a job needs, captured at reconciliation time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointSnapshot {
    pub id: i32,
    pub url: String,
    pub interval_seconds: i32,
}

impl EndpointSnapshot {
    pub fn new(id: i32, url: impl Into<String>, interval_seconds: i32) -> Self {
        Self {
            id,
            url: url.into(),
            interval_seconds,
        }
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_seconds.max(MIN_INTERVAL_SECONDS) as u64)
    }

    pub fn validate(&self) -> Result<(), InvalidEndpoint> {
        if self.interval_seconds < MIN_INTERVAL_SECONDS {
            return Err(InvalidEndpoint::IntervalTooShort(self.interval_seconds));
        }
        let parsed = Url::parse(&self.url).map_err(|e| InvalidEndpoint::MalformedUrl {
            url: self.url.clone(),
            reason: e.to_string(),
        })?;
        match parsed.scheme() {
            "http" | "https" => Ok(()),
            other => Err(InvalidEndpoint::UnsupportedScheme(other.to_string())),
        }
    }
}

impl From<&endpoint::Model> for EndpointSnapshot {
    fn from(model: &endpoint::Model) -> Self {
        Self::new(model.id, model.url.clone(), model.interval_seconds)
    }
}

/// A probe result that has not been persisted yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewProbeResult {
    pub endpoint_id: i32,
    pub http_status: i32,
    pub succeeded: bool,
    pub response_time_ms: i64,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[async_trait]
pub trait EndpointStore: Send + Sync {
    /// All endpoints with `is_active = true`.
    async fn active_endpoints(&self) -> Result<Vec<EndpointSnapshot>, StoreError>;

    /// Appends one immutable probe result.
    async fn insert_probe_result(
        &self,
        result: NewProbeResult,
    ) -> Result<ProbeResultRecord, StoreError>;

    /// Sets `status` and `last_checked_at` for one endpoint.
    ///
    /// Returns `Ok(false)` when the endpoint no longer exists.
    async fn update_endpoint_status(
        &self,
        endpoint_id: i32,
        status: EndpointStatus,
        checked_at: DateTime<Utc>,
    ) -> Result<bool, StoreError>;
}
