//! Mutual-TLS HTTP client for the coordination API
//!
//! Endpoints:
//! - GET  {base}/chains/{chain}/tasks[?after={taskId}]
//! - POST {base}/chains/{chain}/events

use super::task::{Task, TasksResponse};
use super::{EventSink, TaskSource};
use crate::config::CoordinationConfig;
use crate::error::{RelayerError, RelayerResult};
use crate::events::{Event, PublishEventsRequest};

use async_trait::async_trait;
use reqwest::{Client, Identity, Response};
use tracing::{debug, info};

/// Client for the coordination service
pub struct CoordinationClient {
    base_url: String,
    client: Client,
}

impl CoordinationClient {
    /// Create a client authenticated with the configured certificate and key
    pub fn new(config: &CoordinationConfig) -> RelayerResult<Self> {
        let cert = std::fs::read(&config.cert_path).map_err(|e| {
            RelayerError::Config(format!(
                "Failed to read client certificate {:?}: {}",
                config.cert_path, e
            ))
        })?;
        let key = std::fs::read(&config.key_path).map_err(|e| {
            RelayerError::Config(format!(
                "Failed to read client key {:?}: {}",
                config.key_path, e
            ))
        })?;

        let identity = Identity::from_pem(&identity_pem(&cert, &key))
            .map_err(|e| RelayerError::Config(format!("Invalid client identity: {}", e)))?;

        let client = Client::builder()
            .use_rustls_tls()
            .identity(identity)
            .timeout(config.timeout)
            .build()
            .map_err(|e| RelayerError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self::with_client(&config.base_url, client))
    }

    /// Create a client around an already configured `reqwest::Client`
    pub fn with_client(base_url: &str, client: Client) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        }
    }

    fn tasks_url(&self, chain: &str) -> String {
        format!("{}/chains/{}/tasks", self.base_url, chain)
    }

    fn events_url(&self, chain: &str) -> String {
        format!("{}/chains/{}/events", self.base_url, chain)
    }
}

/// Turn any non-2xx response into an error carrying the body
async fn ensure_success(resp: Response) -> RelayerResult<Response> {
    if resp.status().is_success() {
        return Ok(resp);
    }

    let status = resp.status().as_u16();
    let body = resp.text().await.unwrap_or_default();
    Err(RelayerError::UnexpectedStatus { status, body })
}

#[async_trait]
impl TaskSource for CoordinationClient {
    async fn fetch_tasks(&self, chain: &str, after: Option<String>) -> RelayerResult<Vec<Task>> {
        let mut request = self.client.get(self.tasks_url(chain));
        if let Some(cursor) = after.as_deref() {
            request = request.query(&[("after", cursor)]);
        }

        let resp = ensure_success(request.send().await?).await?;
        let body: TasksResponse = resp
            .json()
            .await
            .map_err(|e| RelayerError::Transport(format!("Failed to parse tasks: {}", e)))?;

        debug!(
            "Fetched {} tasks for chain {} (after {:?})",
            body.data.tasks.len(),
            chain,
            after
        );
        Ok(body.data.tasks)
    }
}

#[async_trait]
impl EventSink for CoordinationClient {
    async fn post_events(&self, chain: &str, events: &[Event]) -> RelayerResult<()> {
        let request = PublishEventsRequest {
            events: events.to_vec(),
        };

        let resp = self
            .client
            .post(self.events_url(chain))
            .json(&request)
            .send()
            .await?;
        let resp = ensure_success(resp).await?;

        let ack = resp.text().await.unwrap_or_default();
        info!(
            "Posted {} events for chain {}: {}",
            events.len(),
            chain,
            ack
        );
        Ok(())
    }
}

/// Certificate and key as one PEM bundle. The newline keeps the key's BEGIN
/// line intact when the certificate file lacks a trailing newline.
fn identity_pem(cert: &[u8], key: &[u8]) -> Vec<u8> {
    let mut pem = Vec::with_capacity(cert.len() + key.len() + 1);
    pem.extend_from_slice(cert);
    pem.push(b'\n');
    pem.extend_from_slice(key);
    pem
}
