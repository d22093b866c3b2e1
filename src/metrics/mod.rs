//! Prometheus metrics for monitoring
//!
//! Exposes metrics for:
//! - Watched block height per source chain
//! - Observed events and posted batches
//! - Task fetches, completions and failures

use crate::error::{RelayerError, RelayerResult};
use crate::events::Event;

use axum::{http::StatusCode, routing::get, Router};
use lazy_static::lazy_static;
use prometheus::{
    register_counter_vec, register_gauge_vec, register_histogram_vec, CounterVec, Encoder,
    GaugeVec, HistogramVec, TextEncoder,
};
use std::net::SocketAddr;
use tokio::sync::watch;
use tower_http::trace::TraceLayer;
use tracing::info;

lazy_static! {
    // Subscriber metrics
    pub static ref CHAIN_BLOCK_HEIGHT: GaugeVec = register_gauge_vec!(
        "gmp_chain_block_height",
        "Last block scanned for ContractCall logs",
        &["chain"]
    ).unwrap();

    pub static ref EVENTS_OBSERVED: CounterVec = register_counter_vec!(
        "gmp_events_observed_total",
        "Total events observed by type",
        &["chain", "event_type"]
    ).unwrap();

    pub static ref EVENT_BATCHES: CounterVec = register_counter_vec!(
        "gmp_event_batches_total",
        "Event batches posted to the coordination service",
        &["chain", "outcome"]
    ).unwrap();

    // Includer metrics
    pub static ref TASKS_FETCHED: CounterVec = register_counter_vec!(
        "gmp_tasks_fetched_total",
        "Total tasks fetched from the coordination service",
        &["chain"]
    ).unwrap();

    pub static ref TASK_FETCH_FAILURES: CounterVec = register_counter_vec!(
        "gmp_task_fetch_failures_total",
        "Total failed task fetches",
        &["chain"]
    ).unwrap();

    pub static ref TASKS_COMPLETED: CounterVec = register_counter_vec!(
        "gmp_tasks_completed_total",
        "Total tasks included on the destination chain",
        &["chain", "task_type", "status"]
    ).unwrap();

    pub static ref TASK_FAILURES: CounterVec = register_counter_vec!(
        "gmp_task_failures_total",
        "Total tasks abandoned for the current tick",
        &["chain", "reason"]
    ).unwrap();

    pub static ref TASK_LATENCY: HistogramVec = register_histogram_vec!(
        "gmp_task_latency_seconds",
        "Time from dispatch to completion report",
        &["chain"],
        vec![0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0, 300.0]
    ).unwrap();
}

/// Prometheus metrics server
pub struct MetricsServer {
    port: u16,
}

impl MetricsServer {
    pub fn new(port: u16) -> Self {
        Self { port }
    }

    pub fn router() -> Router {
        Router::new()
            .route("/metrics", get(metrics_handler))
            .route("/health", get(health_handler))
            .layer(TraceLayer::new_for_http())
    }

    /// Serve until `shutdown` flips to true
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> RelayerResult<()> {
        let addr = SocketAddr::from(([0, 0, 0, 0], self.port));
        info!("Starting metrics server on {}", addr);

        let listener = tokio::net::TcpListener::bind(&addr)
            .await
            .map_err(|e| RelayerError::Config(format!("cannot bind metrics port {}: {}", addr, e)))?;
        axum::serve(listener, Self::router())
            .with_graceful_shutdown(async move {
                while !*shutdown.borrow() {
                    if shutdown.changed().await.is_err() {
                        break;
                    }
                }
            })
            .await
            .map_err(|e| RelayerError::Config(format!("metrics server failed: {}", e)))?;

        Ok(())
    }
}

async fn metrics_handler() -> Result<String, (StatusCode, String)> {
    render().map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))
}

async fn health_handler() -> &'static str {
    "OK"
}

/// Encode every registered metric in the text exposition format
pub fn render() -> RelayerResult<String> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| RelayerError::Config(format!("failed to encode metrics: {}", e)))?;
    String::from_utf8(buffer)
        .map_err(|e| RelayerError::Config(format!("metrics are not utf-8: {}", e)))
}

// Helper functions to record metrics

pub fn record_blocks_processed(chain: &str, block_number: u64) {
    CHAIN_BLOCK_HEIGHT
        .with_label_values(&[chain])
        .set(block_number as f64);
}

pub fn record_event(chain: &str, event: &Event) {
    EVENTS_OBSERVED
        .with_label_values(&[chain, event.name()])
        .inc();
}

pub fn record_batch_posted(chain: &str, accepted: bool) {
    let outcome = if accepted { "accepted" } else { "dropped" };
    EVENT_BATCHES.with_label_values(&[chain, outcome]).inc();
}

pub fn record_tasks_fetched(chain: &str, count: usize) {
    TASKS_FETCHED
        .with_label_values(&[chain])
        .inc_by(count as f64);
}

pub fn record_fetch_failure(chain: &str) {
    TASK_FETCH_FAILURES.with_label_values(&[chain]).inc();
}

pub fn record_task_completed(chain: &str, task_type: &str, status: &str) {
    TASKS_COMPLETED
        .with_label_values(&[chain, task_type, status])
        .inc();
}

pub fn record_task_failed(chain: &str, error: &RelayerError) {
    TASK_FAILURES
        .with_label_values(&[chain, error.kind()])
        .inc();
}

pub fn record_task_latency(chain: &str, latency_secs: f64) {
    TASK_LATENCY
        .with_label_values(&[chain])
        .observe(latency_secs);
}
