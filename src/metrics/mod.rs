//! Prometheus metrics for monitoring
//!
//! Exposes metrics for:
//! - Pipeline stage outcomes and latency per ledger
//! - Latest fee and gas prices seen from the nodes
//! - Broadcast counts

use crate::error::GatewayError;

use anyhow::Context;
use axum::{http::StatusCode, routing::get, Router};
use lazy_static::lazy_static;
use prometheus::{
    register_counter_vec, register_gauge_vec, register_histogram_vec, CounterVec, Encoder,
    GaugeVec, HistogramVec, TextEncoder,
};
use std::net::SocketAddr;
use tracing::info;

lazy_static! {
    pub static ref STAGE_OUTCOMES: CounterVec = register_counter_vec!(
        "nodegate_stage_total",
        "Pipeline stage executions by outcome",
        &["ledger", "stage", "outcome"]
    ).unwrap();

    pub static ref STAGE_LATENCY: HistogramVec = register_histogram_vec!(
        "nodegate_stage_latency_seconds",
        "Pipeline stage latency including node round trips",
        &["ledger", "stage"],
        vec![0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]
    ).unwrap();

    pub static ref FEE_RATE: GaugeVec = register_gauge_vec!(
        "nodegate_fee_rate_sat_per_byte",
        "Most recent UTXO fee rate derived from the node",
        &["network"]
    ).unwrap();

    pub static ref GAS_PRICE: GaugeVec = register_gauge_vec!(
        "nodegate_gas_price_gwei",
        "Most recent gas price suggested by the account node",
        &["network"]
    ).unwrap();

    pub static ref BROADCASTS: CounterVec = register_counter_vec!(
        "nodegate_broadcasts_total",
        "Transactions accepted by a node",
        &["ledger", "network"]
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

    pub async fn run(&self) -> anyhow::Result<()> {
        let app = Router::new().route("/metrics", get(metrics_handler));

        let addr = SocketAddr::from(([0, 0, 0, 0], self.port));
        info!("Starting metrics server on {}", addr);

        let listener = tokio::net::TcpListener::bind(&addr)
            .await
            .with_context(|| format!("Failed to bind metrics server on {}", addr))?;
        axum::serve(listener, app).await?;

        Ok(())
    }
}

async fn metrics_handler() -> Result<String, StatusCode> {
    render().map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)
}

/// Text exposition of every registered metric
pub fn render() -> anyhow::Result<String> {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    encoder.encode(&prometheus::gather(), &mut buffer)?;
    Ok(String::from_utf8(buffer)?)
}

// Helper functions to record metrics

pub fn record_stage(ledger: &str, stage: &str, latency_secs: f64, error: Option<&GatewayError>) {
    let outcome = error.map(GatewayError::kind).unwrap_or("ok");
    STAGE_OUTCOMES
        .with_label_values(&[ledger, stage, outcome])
        .inc();
    STAGE_LATENCY
        .with_label_values(&[ledger, stage])
        .observe(latency_secs);
}

pub fn record_fee_rate(network: &str, per_byte: u64) {
    FEE_RATE.with_label_values(&[network]).set(per_byte as f64);
}

pub fn record_gas_price(network: &str, gwei: f64) {
    GAS_PRICE.with_label_values(&[network]).set(gwei);
}

pub fn record_broadcast(ledger: &str, network: &str) {
    BROADCASTS.with_label_values(&[ledger, network]).inc();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_outcomes_are_labelled_by_error_kind() {
        record_stage("bitcoin", "metrics_test", 0.2, None);
        record_stage(
            "bitcoin",
            "metrics_test",
            0.1,
            Some(&GatewayError::FeeUnavailable("zero".to_string())),
        );

        let ok = STAGE_OUTCOMES.with_label_values(&["bitcoin", "metrics_test", "ok"]);
        let failed = STAGE_OUTCOMES.with_label_values(&["bitcoin", "metrics_test", "fee_unavailable"]);
        assert!(ok.get() >= 1.0);
        assert!(failed.get() >= 1.0);

        let text = render().unwrap();
        assert!(text.contains("nodegate_stage_total"));
        assert!(text.contains("nodegate_stage_latency_seconds"));
    }
}
