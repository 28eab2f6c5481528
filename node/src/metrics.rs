//! # Prometheus Metrics
//!
//! Exposes operational metrics for the ledger node. Scraped by Prometheus
//! at the `/metrics` HTTP endpoint on the configured metrics port.
//!
//! All metrics are registered in a dedicated [`prometheus::Registry`] so they
//! do not collide with any default global registry consumers.

use axum::http::StatusCode;
use axum::response::IntoResponse;
use prometheus::{Encoder, Histogram, HistogramOpts, IntCounter, Registry, TextEncoder};
use std::sync::Arc;

/// Holds all Prometheus metric handles for the node.
///
/// Clone-friendly (prometheus handles are `Arc`s internally) so it can be
/// shared across request handlers.
#[derive(Clone)]
pub struct NodeMetrics {
    /// Prometheus registry that owns all metrics below.
    registry: Registry,
    /// Quests approved (and funded).
    pub quests_approved_total: IntCounter,
    /// Submissions recorded, graded or pending.
    pub submissions_total: IntCounter,
    /// Coins paid out as quest rewards.
    pub coins_awarded_total: IntCounter,
    /// Coins debited from admins as quest budgets.
    pub coins_budgeted_total: IntCounter,
    /// Coins credited through admin grants.
    pub coins_granted_total: IntCounter,
    /// RPC and REST calls that ended in an error.
    pub rpc_errors_total: IntCounter,
    /// Histogram of request handling latency in seconds.
    pub rpc_latency_seconds: Histogram,
}

fn counter(registry: &Registry, name: &str, help: &str) -> prometheus::Result<IntCounter> {
    let c = IntCounter::new(name, help)?;
    registry.register(Box::new(c.clone()))?;
    Ok(c)
}

impl NodeMetrics {
    /// Creates and registers all metrics. Call once at startup.
    pub fn new() -> prometheus::Result<Self> {
        let registry = Registry::new_custom(Some("chess".into()), None)?;

        let rpc_latency_seconds = Histogram::with_opts(
            HistogramOpts::new(
                "rpc_latency_seconds",
                "Request handling latency in seconds",
            )
            .buckets(vec![0.0005, 0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0]),
        )?;
        registry.register(Box::new(rpc_latency_seconds.clone()))?;

        Ok(Self {
            quests_approved_total: counter(
                &registry,
                "quests_approved_total",
                "Total number of quests approved",
            )?,
            submissions_total: counter(
                &registry,
                "submissions_total",
                "Total number of submissions recorded",
            )?,
            coins_awarded_total: counter(
                &registry,
                "coins_awarded_total",
                "Total coins paid out as quest rewards",
            )?,
            coins_budgeted_total: counter(
                &registry,
                "coins_budgeted_total",
                "Total coins debited as quest budgets",
            )?,
            coins_granted_total: counter(
                &registry,
                "coins_granted_total",
                "Total coins credited by admin grants",
            )?,
            rpc_errors_total: counter(
                &registry,
                "rpc_errors_total",
                "Total number of requests that returned an error",
            )?,
            rpc_latency_seconds,
            registry,
        })
    }

    /// Encodes all registered metrics into the Prometheus text exposition format.
    pub fn encode(&self) -> Result<String, prometheus::Error> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8_lossy(&buffer).into_owned())
    }
}

/// Shared metrics state passed to axum handlers.
pub type SharedMetrics = Arc<NodeMetrics>;

/// Axum handler that renders `/metrics` in Prometheus text format.
pub async fn metrics_handler(
    axum::extract::State(metrics): axum::extract::State<SharedMetrics>,
) -> impl IntoResponse {
    match metrics.encode() {
        Ok(body) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            body,
        )
            .into_response(),
        Err(e) => {
            tracing::error!("failed to encode metrics: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "metrics encoding failed").into_response()
        }
    }
}
