//! 📣 Engine events and the notifier task
//!
//! The engine never logs its observable effects directly at info level or
//! touches metrics; it queues `EngineEvent`s and the notifier turns them into
//! log lines and counter increments.

use serde::Serialize;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::graph::GraphViolation;
use crate::metrics::EngineMetrics;
use crate::policy::{AutoBuyDecision, ExecutionStatus};
use crate::types::{short_addr, ActivitySignal, RelationType, SignalType, WalletRelation};

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum EngineEvent {
    ActivityIngested {
        wallet: String,
        token: String,
        usd_value: f64,
    },
    ActivityRejected {
        reason: String,
    },
    ActivitiesEvicted {
        count: usize,
    },
    WalletDiscovered {
        address: String,
    },
    RelationCreated(WalletRelation),
    RelationReinforced {
        previous_type: RelationType,
        relation: WalletRelation,
    },
    SignalEmitted(ActivitySignal),
    SignalSuppressed {
        signal_type: SignalType,
        token: String,
    },
    SignalsEvicted {
        count: usize,
    },
    AutoBuyDecided(AutoBuyDecision),
    ExecutionSettled {
        record_id: String,
        status: ExecutionStatus,
    },
    InvariantViolation(GraphViolation),
}

/// Log one event and update counters
pub fn dispatch(event: &EngineEvent, metrics: &EngineMetrics) {
    match event {
        EngineEvent::ActivityIngested { wallet, token, usd_value } => {
            metrics.activities_ingested.inc();
            debug!("📥 {} on {} (${:.0})", short_addr(wallet), token, usd_value);
        }
        EngineEvent::ActivityRejected { reason } => {
            metrics.activities_rejected.inc();
            warn!("⚠️  Activity rejected: {}", reason);
        }
        EngineEvent::ActivitiesEvicted { count } => {
            metrics.activities_evicted.inc_by(*count as u64);
        }
        EngineEvent::WalletDiscovered { address } => {
            info!("🆕 Discovered wallet {}", short_addr(address));
        }
        EngineEvent::RelationCreated(relation) => {
            metrics.relations_created.inc();
            info!(
                "🔗 New relation {} <-> {} ({}, strength {}, {} shared)",
                short_addr(&relation.wallet1),
                short_addr(&relation.wallet2),
                relation.relation_type.as_str(),
                relation.strength,
                relation.shared_tokens.len()
            );
        }
        EngineEvent::RelationReinforced { previous_type, relation } => {
            metrics.relations_updated.inc();
            if *previous_type != relation.relation_type {
                info!(
                    "⬆️  Relation {} <-> {} escalated {} -> {}",
                    short_addr(&relation.wallet1),
                    short_addr(&relation.wallet2),
                    previous_type.as_str(),
                    relation.relation_type.as_str()
                );
            } else {
                debug!(
                    "🔗 Relation {} <-> {} reinforced (strength {})",
                    short_addr(&relation.wallet1),
                    short_addr(&relation.wallet2),
                    relation.strength
                );
            }
        }
        EngineEvent::SignalEmitted(signal) => {
            metrics.signals_emitted.inc();
            info!(
                "🚨 {} on {}: confidence {}, risk {}, {:?} urgency{}",
                signal.signal_type.as_str(),
                signal.token,
                signal.confidence,
                signal.risk_level,
                signal.urgency,
                if signal.auto_buy_recommended { ", auto-buy eligible" } else { "" }
            );
        }
        EngineEvent::SignalSuppressed { signal_type, token } => {
            metrics.signals_suppressed.inc();
            debug!("🔇 Suppressed {} on {}", signal_type.as_str(), token);
        }
        EngineEvent::SignalsEvicted { count } => {
            metrics.signals_evicted.inc_by(*count as u64);
        }
        EngineEvent::AutoBuyDecided(decision) => {
            if decision.accepted {
                metrics.auto_buy_accepted.inc();
            } else {
                metrics.auto_buy_rejected.inc();
            }
        }
        EngineEvent::ExecutionSettled { record_id, status } => match status {
            ExecutionStatus::Filled { reference, .. } => {
                metrics.executions_filled.inc();
                info!("✅ Execution {} filled ({})", record_id, reference);
            }
            ExecutionStatus::Failed { reason, .. } => {
                metrics.execution_failures.inc();
                warn!("❌ Execution {} failed: {}", record_id, reason);
            }
            ExecutionStatus::Pending => {}
        },
        EngineEvent::InvariantViolation(violation) => {
            metrics.invariant_violations.inc();
            debug!(
                "Invariant violation recorded for {} <-> {}",
                violation.wallet1, violation.wallet2
            );
        }
    }
}

pub fn spawn_notifier(
    mut rx: mpsc::UnboundedReceiver<EngineEvent>,
    metrics: Arc<EngineMetrics>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        info!("📣 Notifier: Started");
        while let Some(event) = rx.recv().await {
            dispatch(&event, &metrics);
        }
        info!("📣 Notifier: Channel closed, stopping");
    })
}
