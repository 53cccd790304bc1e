// src/metrics.rs
use anyhow::{Context, Result};
use axum::{routing::get, Router};
use metrics::{describe_counter, describe_gauge};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;

pub const DELIVERED: &str = "relay_entries_delivered_total";
pub const TOO_OLD: &str = "relay_entries_too_old_total";
pub const DELIVERY_FAILURES: &str = "relay_delivery_failures_total";
pub const SOURCE_ERRORS: &str = "relay_source_errors_total";
pub const CYCLES: &str = "relay_cycles_total";
pub const LAST_CYCLE_TS: &str = "relay_last_cycle_ts";

/// One-time registration so series show up on /metrics.
pub fn ensure_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!(DELIVERED, "Entries successfully posted to a webhook.");
        describe_counter!(TOO_OLD, "Entries absorbed without delivery because of their age.");
        describe_counter!(DELIVERY_FAILURES, "Entries whose delivery failed (retried next cycle).");
        describe_counter!(SOURCE_ERRORS, "Source passes that failed to fetch or parse.");
        describe_counter!(CYCLES, "Completed polling cycles.");
        describe_gauge!(LAST_CYCLE_TS, "Unix ts of the last completed polling cycle.");
    });
}

pub struct Metrics {
    pub handle: PrometheusHandle,
}

impl Metrics {
    /// Install the Prometheus recorder as the global metrics sink.
    pub fn init() -> Result<Self> {
        let handle = PrometheusBuilder::new()
            .install_recorder()
            .context("prometheus: install recorder")?;
        ensure_described();
        Ok(Self { handle })
    }

    /// Router exposing `/metrics` in the Prometheus exposition format.
    pub fn router(&self) -> Router {
        let handle = self.handle.clone();
        Router::new().route(
            "/metrics",
            get(move || {
                let h = handle.clone();
                async move { h.render() }
            }),
        )
    }

    /// Serve [`Metrics::router`] on `addr` in a background task.
    pub async fn serve(&self, addr: &str) -> Result<tokio::task::JoinHandle<()>> {
        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .with_context(|| format!("binding metrics listener on {addr}"))?;
        tracing::info!(%addr, "metrics endpoint listening");
        let router = self.router();
        Ok(tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, router).await {
                tracing::warn!(error = %e, "metrics server stopped");
            }
        }))
    }
}
