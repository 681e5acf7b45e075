//! One-shot HTTP liveness probes.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::error::Error as StdError;
use std::time::{Duration, Instant};

use crate::db::store::NewProbeResult;

pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(10);

/// Classified outcome of a single probe attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeOutcome {
    /// HTTP status code, or `0` when no response was received.
    pub http_status: i32,
    pub succeeded: bool,
    pub elapsed_ms: i64,
    /// Set only for transport-level failures, never for non-2xx responses.
    pub error: Option<String>,
}

impl ProbeOutcome {
    pub fn from_status(status: u16, elapsed_ms: i64) -> Self {
        Self {
            http_status: i32::from(status),
            succeeded: (200..300).contains(&status),
            elapsed_ms,
            error: None,
        }
    }

    pub fn transport_failure(error: impl Into<String>, elapsed_ms: i64) -> Self {
        let mut error = error.into();
        if error.is_empty() {
            error = "Request failed".to_string();
        }
        Self {
            http_status: 0,
            succeeded: false,
            elapsed_ms,
            error: Some(error),
        }
    }

    pub fn to_new_result(&self, endpoint_id: i32, created_at: DateTime<Utc>) -> NewProbeResult {
        NewProbeResult {
            endpoint_id,
            http_status: self.http_status,
            succeeded: self.succeeded,
            response_time_ms: self.elapsed_ms,
            error: self.error.clone(),
            created_at,
        }
    }
}

#[async_trait]
pub trait Prober: Send + Sync {
    /// Performs exactly one attempt against `url`. Never retries and never
    /// fails: transport errors are reported through the outcome.
    async fn probe(&self, url: &str) -> ProbeOutcome;
}

/// Probes endpoints with a plain `GET` using a shared reqwest client.
#[derive(Clone, Debug)]
pub struct HttpProber {
    client: reqwest::Client,
}

impl HttpProber {
    pub fn new(timeout: Duration, user_agent: &str) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(user_agent)
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Prober for HttpProber {
    async fn probe(&self, url: &str) -> ProbeOutcome {
        let start_time = Instant::now();
        let result = self.client.get(url).send().await;
        let elapsed_ms = start_time.elapsed().as_millis() as i64;

        match result {
            Ok(response) => ProbeOutcome::from_status(response.status().as_u16(), elapsed_ms),
            Err(e) => ProbeOutcome::transport_failure(describe_transport_error(&e), elapsed_ms),
        }
    }
}

fn describe_transport_error(e: &reqwest::Error) -> String {
    if e.is_timeout() {
        return "Request timed out".to_string();
    }
    let class = if e.is_builder() {
        "Invalid request"
    } else if e.is_connect() {
        "Connection failed"
    } else if e.is_redirect() {
        "Redirect error"
    } else {
        "Request failed"
    };

    // reqwest's own message is generic; the useful part (DNS, refused, TLS)
    // sits at the bottom of the source chain.
    let mut detail = e.to_string();
    let mut source = e.source();
    while let Some(inner) = source {
        detail = inner.to_string();
        source = inner.source();
    }
    format!("{class}: {detail}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;
    use tokio::net::TcpListener;

    fn prober(timeout: Duration) -> HttpProber {
        HttpProber::new(timeout, "pingwatch-test").unwrap()
    }

    #[test]
    fn test_outcome_classification() {
        assert!(ProbeOutcome::from_status(200, 1).succeeded);
        assert!(ProbeOutcome::from_status(204, 1).succeeded);
        assert!(!ProbeOutcome::from_status(301, 1).succeeded);
        assert!(!ProbeOutcome::from_status(404, 1).succeeded);
        assert!(!ProbeOutcome::from_status(199, 1).succeeded);
        assert_eq!(ProbeOutcome::from_status(503, 1).error, None);

        let failed = ProbeOutcome::transport_failure("", 7);
        assert_eq!(failed.http_status, 0);
        assert_eq!(failed.elapsed_ms, 7);
        assert_eq!(failed.error.as_deref(), Some("Request failed"));
    }

    #[tokio::test]
    async fn test_probe_success() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/health")
            .with_status(200)
            .with_body("ok")
            .create_async()
            .await;

        let outcome = prober(DEFAULT_PROBE_TIMEOUT)
            .probe(&format!("{}/health", server.url()))
            .await;

        mock.assert_async().await;
        assert_eq!(outcome.http_status, 200);
        assert!(outcome.succeeded);
        assert_eq!(outcome.error, None);
        assert!(outcome.elapsed_ms >= 0);
    }

    #[tokio::test]
    async fn test_probe_server_error_is_a_result_not_an_error() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/")
            .with_status(503)
            .expect(1)
            .create_async()
            .await;

        let outcome = prober(DEFAULT_PROBE_TIMEOUT)
            .probe(&format!("{}/", server.url()))
            .await;

        mock.assert_async().await;
        assert_eq!(outcome.http_status, 503);
        assert!(!outcome.succeeded);
        assert_eq!(outcome.error, None);
    }

    #[tokio::test]
    async fn test_probe_client_error_status() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/missing")
            .with_status(404)
            .create_async()
            .await;

        let outcome = prober(DEFAULT_PROBE_TIMEOUT)
            .probe(&format!("{}/missing", server.url()))
            .await;

        assert_eq!(outcome.http_status, 404);
        assert!(!outcome.succeeded);
        assert_eq!(outcome.error, None);
    }

    #[tokio::test]
    async fn test_probe_connection_refused() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let outcome = prober(DEFAULT_PROBE_TIMEOUT)
            .probe(&format!("http://{addr}/"))
            .await;

        assert_eq!(outcome.http_status, 0);
        assert!(!outcome.succeeded);
        let error = outcome.error.expect("transport failure must carry an error");
        assert!(error.starts_with("Connection failed"), "unexpected error: {error}");
    }

    #[tokio::test]
    async fn test_probe_timeout() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        // Accept the connection and read the request but never answer.
        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 1024];
            let _ = socket.read(&mut buf).await;
            tokio::time::sleep(Duration::from_secs(5)).await;
        });

        let timeout = Duration::from_millis(300);
        let outcome = prober(timeout).probe(&format!("http://{addr}/slow")).await;
        server.abort();

        assert_eq!(outcome.http_status, 0);
        assert!(!outcome.succeeded);
        assert_eq!(outcome.error.as_deref(), Some("Request timed out"));
        assert!(outcome.elapsed_ms >= 300);
        assert!(outcome.elapsed_ms < 5_000);
    }

    #[tokio::test]
    async fn test_probe_malformed_url() {
        let outcome = prober(DEFAULT_PROBE_TIMEOUT).probe("not a url").await;

        assert_eq!(outcome.http_status, 0);
        assert!(!outcome.succeeded);
        assert!(outcome.error.unwrap().starts_with("Invalid request"));
    }

    #[test]
    fn test_outcome_to_new_result() {
        let now = Utc::now();
        let outcome = ProbeOutcome::transport_failure("Connection failed: refused", 12);
        let result = outcome.to_new_result(3, now);
        assert_eq!(result.endpoint_id, 3);
        assert_eq!(result.http_status, 0);
        assert_eq!(result.response_time_ms, 12);
        assert_eq!(result.error.as_deref(), Some("Connection failed: refused"));
        assert_eq!(result.created_at, now);
    }
}
