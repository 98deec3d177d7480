//! Prometheus metrics for monitoring
//!
//! Exposes metrics for:
//! - Evaluation cycles and latency
//! - Signature shares returned by the oracle
//! - Broadcast attempts per chain

use crate::error::SwapResult;

use axum::{routing::get, Router};
use lazy_static::lazy_static;
use prometheus::{
    register_counter_vec, register_histogram_vec, CounterVec, Encoder, HistogramVec, TextEncoder,
};
use std::net::SocketAddr;
use tracing::info;

lazy_static! {
    // Cycle metrics
    pub static ref CYCLES: CounterVec = register_counter_vec!(
        "crosslock_cycles_total",
        "Evaluation cycles by result (settled, unsettled, aborted)",
        &["result"]
    ).unwrap();

    pub static ref EVALUATION_LATENCY: HistogramVec = register_histogram_vec!(
        "crosslock_evaluation_latency_seconds",
        "Oracle evaluation latency by mode (full, degraded)",
        &["mode"],
        vec![0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0]
    ).unwrap();

    // Signature metrics
    pub static ref SIGNATURE_SHARES: CounterVec = register_counter_vec!(
        "crosslock_signature_shares_total",
        "Signature shares returned by the oracle, per chain",
        &["chain"]
    ).unwrap();

    // Broadcast metrics
    pub static ref BROADCASTS: CounterVec = register_counter_vec!(
        "crosslock_broadcasts_total",
        "Broadcast attempts per chain and status",
        &["chain", "status"]
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

    pub async fn run(&self) -> SwapResult<()> {
        let app = Router::new().route("/metrics", get(metrics_handler));

        let addr = SocketAddr::from(([0, 0, 0, 0], self.port));
        info!("Starting metrics server on {}", addr);

        let listener = tokio::net::TcpListener::bind(&addr).await.unwrap();
        axum::serve(listener, app).await.unwrap();

        Ok(())
    }
}

async fn metrics_handler() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer).unwrap();
    String::from_utf8(buffer).unwrap()
}

// Helper functions to record metrics

pub fn record_cycle(result: &str) {
    CYCLES.with_label_values(&[result]).inc();
}

pub fn observe_evaluation(mode: &str, latency_secs: f64) {
    EVALUATION_LATENCY
        .with_label_values(&[mode])
        .observe(latency_secs);
}

pub fn record_signature_share(chain: &str) {
    SIGNATURE_SHARES.with_label_values(&[chain]).inc();
}

pub fn record_broadcast(chain: &str, accepted: bool) {
    let status = if accepted { "accepted" } else { "failed" };
    BROADCASTS.with_label_values(&[chain, status]).inc();
}
