//! 📊 Prometheus metrics for the engine
//!
//! One registry per process, shared as `Arc<EngineMetrics>` between the
//! engine actor, the notifier and the HTTP server.

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use prometheus::{Histogram, HistogramOpts, IntCounter, IntGauge, Opts, Registry};
use std::sync::Arc;
use tracing::error;

use crate::engine::EngineStatus;

pub struct EngineMetrics {
    registry: Registry,

    // Ingestion
    pub activities_ingested: IntCounter,
    pub activities_rejected: IntCounter,
    pub activities_evicted: IntCounter,

    // Signals
    pub signals_emitted: IntCounter,
    pub signals_suppressed: IntCounter,
    pub signals_evicted: IntCounter,

    // Relations
    pub relations_created: IntCounter,
    pub relations_updated: IntCounter,

    // Auto-buy
    pub auto_buy_accepted: IntCounter,
    pub auto_buy_rejected: IntCounter,
    pub executions_filled: IntCounter,
    pub execution_failures: IntCounter,

    pub invariant_violations: IntCounter,

    // Performance
    pub tick_latency: Histogram,

    // State gauges
    pub ledger_size: IntGauge,
    pub active_signals: IntGauge,
    pub relations: IntGauge,
    pub wallets: IntGauge,
}

fn counter(registry: &Registry, name: &str, help: &str) -> prometheus::Result<IntCounter> {
    let c = IntCounter::with_opts(Opts::new(name, help))?;
    registry.register(Box::new(c.clone()))?;
    Ok(c)
}

fn gauge(registry: &Registry, name: &str, help: &str) -> prometheus::Result<IntGauge> {
    let g = IntGauge::with_opts(Opts::new(name, help))?;
    registry.register(Box::new(g.clone()))?;
    Ok(g)
}

impl EngineMetrics {
    pub fn new() -> prometheus::Result<Self> {
        let registry = Registry::new();

        let activities_ingested = counter(&registry, "whale_activities_ingested_total", "Activities accepted into the ledger")?;
        let activities_rejected = counter(&registry, "whale_activities_rejected_total", "Activities rejected by validation or a full queue")?;
        let activities_evicted = counter(&registry, "whale_activities_evicted_total", "Activities evicted from the ledger by capacity")?;

        let signals_emitted = counter(&registry, "whale_signals_emitted_total", "Signals admitted to the signal book")?;
        let signals_suppressed = counter(&registry, "whale_signals_suppressed_total", "Candidate signals dropped by suppression")?;
        let signals_evicted = counter(&registry, "whale_signals_evicted_total", "Signals evicted by retention")?;

        let relations_created = counter(&registry, "whale_relations_created_total", "New wallet relations")?;
        let relations_updated = counter(&registry, "whale_relations_updated_total", "Reinforced wallet relations")?;

        let auto_buy_accepted = counter(&registry, "whale_auto_buy_accepted_total", "Auto-buy decisions accepted")?;
        let auto_buy_rejected = counter(&registry, "whale_auto_buy_rejected_total", "Auto-buy decisions rejected")?;
        let executions_filled = counter(&registry, "whale_executions_filled_total", "Simulated executions filled")?;
        let execution_failures = counter(&registry, "whale_execution_failures_total", "Executions failed or timed out")?;

        let invariant_violations = counter(&registry, "whale_invariant_violations_total", "Graph or state invariant violations")?;

        let tick_latency = Histogram::with_opts(
            HistogramOpts::new("whale_tick_latency_seconds", "Engine tick processing latency")
                .buckets(vec![0.0001, 0.0005, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5]),
        )?;
        registry.register(Box::new(tick_latency.clone()))?;

        let ledger_size = gauge(&registry, "whale_ledger_size", "Activities currently in the ledger")?;
        let active_signals = gauge(&registry, "whale_active_signals", "Unexpired signals")?;
        let relations = gauge(&registry, "whale_relations", "Known wallet relations")?;
        let wallets = gauge(&registry, "whale_tracked_wallets", "Registered wallets")?;

        Ok(Self {
            registry,
            activities_ingested,
            activities_rejected,
            activities_evicted,
            signals_emitted,
            signals_suppressed,
            signals_evicted,
            relations_created,
            relations_updated,
            auto_buy_accepted,
            auto_buy_rejected,
            executions_filled,
            execution_failures,
            invariant_violations,
            tick_latency,
            ledger_size,
            active_signals,
            relations,
            wallets,
        })
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Mirror engine sizes into the gauges
    pub fn set_state(&self, status: &EngineStatus) {
        self.ledger_size.set(status.ledger_size as i64);
        self.active_signals.set(status.active_signals as i64);
        self.relations.set(status.relations as i64);
        self.wallets.set(status.wallets as i64);
    }

    pub fn encode(&self) -> prometheus::Result<String> {
        prometheus::TextEncoder::new().encode_to_string(&self.registry.gather())
    }
}

/// GET /metrics
pub async fn metrics_handler(State(metrics): State<Arc<EngineMetrics>>) -> Response {
    match metrics.encode() {
        Ok(body) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4")],
            body,
        )
            .into_response(),
        Err(e) => {
            error!("Failed to encode metrics: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Failed to encode metrics: {}", e),
            )
                .into_response()
        }
    }
}

/// GET /health
pub async fn health_handler() -> Response {
    (
        StatusCode::OK,
        [("content-type", "application/json")],
        r#"{"status":"healthy","service":"whale-tracker"}"#,
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_exposes_counters() {
        let metrics = EngineMetrics::new().unwrap();
        metrics.activities_ingested.inc();
        metrics.signals_emitted.inc_by(3);
        metrics.tick_latency.observe(0.002);

        let body = metrics.encode().unwrap();
        assert!(body.contains("whale_activities_ingested_total 1"));
        assert!(body.contains("whale_signals_emitted_total 3"));
        assert!(body.contains("whale_tick_latency_seconds_count 1"));
    }

    #[test]
    fn test_set_state_updates_gauges() {
        let metrics = EngineMetrics::new().unwrap();
        let status = EngineStatus {
            tracking: true,
            last_tick: None,
            ledger_size: 7,
            wallets: 3,
            relations: 2,
            active_signals: 1,
            pending_mirrors: 0,
            executions: 0,
        };
        metrics.set_state(&status);
        assert_eq!(metrics.ledger_size.get(), 7);
        assert_eq!(metrics.wallets.get(), 3);
        assert_eq!(metrics.relations.get(), 2);
        assert_eq!(metrics.active_signals.get(), 1);
    }

    #[test]
    fn test_separate_instances_do_not_collide() {
        let a = EngineMetrics::new().unwrap();
        let b = EngineMetrics::new().unwrap();
        a.auto_buy_accepted.inc();
        assert_eq!(b.auto_buy_accepted.get(), 0);
    }
}
