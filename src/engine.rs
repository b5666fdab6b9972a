//! 🐋 Engine context
//!
//! `WhaleEngine` owns every piece of tracker state. It is driven from a single
//! task: feed events go through `ingest`, periodic work through `tick` and
//! `refresh_metrics`. Observable effects are queued as `EngineEvent`s and
//! collected with `take_events`.

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::{Config, DetectionConfig, RegistryConfig, RelationConfig};
use crate::error::{ExecutionError, IngestError, PolicyError};
use crate::events::EngineEvent;
use crate::execution::{ExecutionLog, ExecutionReceipt};
use crate::graph::{self, NetworkGraph};
use crate::ledger::ActivityLedger;
use crate::policy::{self, AutoBuyDecision, AutoBuyPolicy, ExecutionRecord, ExecutionStatus, PolicyUpdate, RejectReason};
use crate::registry::WalletRegistry;
use crate::relations::{RelationOutcome, RelationSet};
use crate::report::{self, CoinReport, ReportInputs};
use crate::scoring;
use crate::signals::{self, CopyTradeMirror, SignalBook};
use crate::types::{ActivityEvent, ActivitySignal, TrackedWallet, WalletActivity, WalletRelation};

const MAX_PENDING_MIRRORS: usize = 100;
const WALLET_DETAIL_ACTIVITIES: usize = 20;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EngineStatus {
    pub tracking: bool,
    pub last_tick: Option<DateTime<Utc>>,
    pub ledger_size: usize,
    pub wallets: usize,
    pub relations: usize,
    pub active_signals: usize,
    pub pending_mirrors: usize,
    pub executions: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct WalletDetail {
    pub wallet: TrackedWallet,
    pub recent_activities: Vec<WalletActivity>,
    pub relations: Vec<WalletRelation>,
}

/// What one tick did
#[derive(Debug, Clone, Default)]
pub struct TickReport {
    pub relations_changed: usize,
    pub signals_emitted: usize,
    pub signals_suppressed: usize,
    pub auto_buy_decisions: usize,
    /// Accepted executions waiting for the backend
    pub dispatch: Vec<ExecutionRecord>,
    pub violations: usize,
}

pub struct WhaleEngine {
    detection: DetectionConfig,
    relation_config: RelationConfig,
    registry_config: RegistryConfig,

    registry: WalletRegistry,
    ledger: ActivityLedger,
    relations: RelationSet,
    signals: SignalBook,
    mirror: CopyTradeMirror,
    graph: NetworkGraph,
    policy: AutoBuyPolicy,
    executions: ExecutionLog,

    tracking: bool,
    last_tick: Option<DateTime<Utc>>,
    outbox: Vec<EngineEvent>,
}

impl WhaleEngine {
    pub fn from_config(config: &Config, now: DateTime<Utc>) -> Result<Self> {
        let mut registry = WalletRegistry::new(config.registry.auto_register);
        for seed in &config.wallets {
            let address = seed.address.clone();
            registry
                .upsert_wallet(seed.clone().into_wallet(now))
                .with_context(|| format!("Invalid seed wallet {}", address))?;
        }

        if let Some(unknown) = config.auto_buy.follow_whales.iter().find(|w| !registry.contains(w)) {
            return Err(PolicyError::UnknownWallet(unknown.clone())).context("Invalid [auto_buy] follow_whales");
        }

        info!("🐋 Engine initialized with {} seed wallets", registry.len());

        Ok(Self {
            detection: config.detection.clone(),
            relation_config: config.relations.clone(),
            registry_config: config.registry.clone(),
            registry,
            ledger: ActivityLedger::new(config.engine.ledger_capacity),
            relations: RelationSet::new(),
            signals: SignalBook::new(config.engine.signal_retention),
            mirror: CopyTradeMirror::new(MAX_PENDING_MIRRORS),
            graph: NetworkGraph::default(),
            policy: config.auto_buy.clone(),
            executions: ExecutionLog::new(config.engine.execution_log_capacity),
            tracking: true,
            last_tick: None,
            outbox: Vec::new(),
        })
    }

    /// Score, validate and append one feed event
    pub fn ingest(&mut self, event: ActivityEvent) -> Result<WalletActivity, IngestError> {
        let wallet = self.registry.get_wallet(&event.wallet);
        let activity = scoring::build_activity(event, wallet);
        self.append(activity)
    }

    fn append(&mut self, activity: WalletActivity) -> Result<WalletActivity, IngestError> {
        let evicted = match self.ledger.append(activity.clone()) {
            Ok(evicted) => evicted,
            Err(e) => {
                self.outbox.push(EngineEvent::ActivityRejected { reason: e.to_string() });
                return Err(e);
            }
        };
        if evicted > 0 {
            self.outbox.push(EngineEvent::ActivitiesEvicted { count: evicted });
        }

        if self.registry.observe_activity(&activity) {
            self.outbox.push(EngineEvent::WalletDiscovered {
                address: activity.wallet.clone(),
            });
        }

        self.mirror
            .observe(&activity, &self.policy.follow_whales, self.policy.copy_trade_delay_secs);

        self.outbox.push(EngineEvent::ActivityIngested {
            wallet: activity.wallet.clone(),
            token: activity.token.clone(),
            usd_value: activity.usd_value,
        });
        Ok(activity)
    }

    /// Relations, detection, mirror release, auto-buy, graph rebuild
    pub fn tick(&mut self, now: DateTime<Utc>) -> TickReport {
        let mut report = TickReport::default();
        if !self.tracking {
            return report;
        }

        for outcome in self
            .relations
            .infer(&self.registry, &self.ledger, &self.relation_config, now)
        {
            report.relations_changed += 1;
            self.outbox.push(match outcome {
                RelationOutcome::Created(relation) => EngineEvent::RelationCreated(relation),
                RelationOutcome::Reinforced { previous_type, relation } => {
                    EngineEvent::RelationReinforced { previous_type, relation }
                }
            });
        }

        let mut candidates = signals::detect(&self.ledger, &self.detection, now);
        candidates.extend(self.mirror.drain_due(&self.registry, now));

        let admission = self.signals.admit(candidates, self.detection.suppression(), now);
        report.signals_emitted = admission.emitted.len();
        report.signals_suppressed = admission.suppressed.len();
        for (signal_type, token) in admission.suppressed {
            self.outbox.push(EngineEvent::SignalSuppressed { signal_type, token });
        }
        if admission.evicted > 0 {
            self.outbox.push(EngineEvent::SignalsEvicted { count: admission.evicted });
        }

        for signal in admission.emitted {
            let decision = signal.auto_buy_recommended.then(|| self.decide(&signal, now));
            self.outbox.push(EngineEvent::SignalEmitted(signal));
            if let Some(decision) = decision {
                report.auto_buy_decisions += 1;
                if let Some(record) = &decision.execution {
                    report.dispatch.push(record.clone());
                }
                self.outbox.push(EngineEvent::AutoBuyDecided(decision));
            }
        }

        let (graph, violations) = graph::build(&self.registry, &self.ledger, &self.relations, now);
        self.graph = graph;
        report.violations = violations.len();
        self.outbox
            .extend(violations.into_iter().map(EngineEvent::InvariantViolation));

        self.last_tick = Some(now);
        debug!(
            "⏱️  Tick: {} relation changes, {} signals ({} suppressed), {} auto-buy decisions",
            report.relations_changed, report.signals_emitted, report.signals_suppressed, report.auto_buy_decisions
        );
        report
    }

    /// Evaluate against the current policy and log the execution if accepted
    fn decide(&mut self, signal: &ActivitySignal, now: DateTime<Utc>) -> AutoBuyDecision {
        let decision = policy::evaluate(signal, &self.policy, now);
        if let Some(record) = &decision.execution {
            let evicted = self.executions.record(record.clone());
            if evicted > 0 {
                debug!("🗑️  Execution log full, evicted {} records", evicted);
            }
        }
        decision
    }

    /// Manually trigger an auto-buy evaluation. None if the signal is unknown.
    pub fn auto_buy(&mut self, signal_id: &str, now: DateTime<Utc>) -> Option<AutoBuyDecision> {
        let signal = self.signals.get(signal_id)?.clone();

        let decision = if signal.is_active(now) {
            self.decide(&signal, now)
        } else {
            info!("🚫 Auto-buy rejected: {} on {} has expired", signal.id, signal.token);
            AutoBuyDecision::rejected(&signal, RejectReason::Expired)
        };
        self.outbox.push(EngineEvent::AutoBuyDecided(decision.clone()));
        Some(decision)
    }

    /// Settle a dispatched execution. False if the record is gone or settled.
    pub fn record_execution_result(
        &mut self,
        record_id: &str,
        result: Result<ExecutionReceipt, ExecutionError>,
        now: DateTime<Utc>,
    ) -> bool {
        let status = match result {
            Ok(receipt) => ExecutionStatus::Filled {
                reference: receipt.reference,
                completed_at: now,
            },
            Err(e) => ExecutionStatus::Failed {
                reason: e.to_string(),
                completed_at: now,
            },
        };

        if !self.executions.settle(record_id, status.clone()) {
            return false;
        }
        self.outbox.push(EngineEvent::ExecutionSettled {
            record_id: record_id.to_string(),
            status,
        });
        true
    }

    /// Validated partial update; the old policy stays on error
    pub fn update_policy(&mut self, update: PolicyUpdate) -> Result<AutoBuyPolicy, PolicyError> {
        let next = self.policy.apply_update(update, &self.registry)?;
        info!(
            "🛡️  Auto-buy policy updated (enabled: {}, min conf {}, max risk {}, max ${:.0})",
            next.enabled, next.min_confidence, next.max_risk, next.max_position_size_usd
        );
        self.policy = next.clone();
        Ok(next)
    }

    pub fn refresh_metrics<R: Rng>(&mut self, rng: &mut R, now: DateTime<Utc>) {
        self.registry.refresh_metrics(
            &self.ledger,
            Duration::minutes(self.registry_config.activity_window_mins),
            rng,
            now,
        );
    }

    pub fn set_tracking(&mut self, tracking: bool) {
        if self.tracking != tracking {
            if tracking {
                info!("▶️  Whale tracking resumed");
            } else {
                warn!("⏸️  Whale tracking paused");
            }
        }
        self.tracking = tracking;
    }

    pub fn is_tracking(&self) -> bool {
        self.tracking
    }

    pub fn take_events(&mut self) -> Vec<EngineEvent> {
        std::mem::take(&mut self.outbox)
    }

    // Queries

    pub fn wallets(&self) -> Vec<TrackedWallet> {
        self.registry.list_wallets()
    }

    pub fn wallet_detail(&self, address: &str) -> Option<WalletDetail> {
        let wallet = self.registry.get_wallet(address)?.clone();
        Some(WalletDetail {
            wallet,
            recent_activities: self
                .ledger
                .by_wallet(address)
                .into_iter()
                .take(WALLET_DETAIL_ACTIVITIES)
                .cloned()
                .collect(),
            relations: self
                .relations
                .list()
                .into_iter()
                .filter(|r| r.wallet1 == address || r.wallet2 == address)
                .collect(),
        })
    }

    pub fn activities(&self, limit: usize) -> Vec<WalletActivity> {
        self.ledger.latest(limit).cloned().collect()
    }

    pub fn active_signals(&self, now: DateTime<Utc>) -> Vec<ActivitySignal> {
        self.signals.active(now)
    }

    pub fn relations(&self) -> Vec<WalletRelation> {
        self.relations.list()
    }

    pub fn graph(&self) -> &NetworkGraph {
        &self.graph
    }

    pub fn policy(&self) -> &AutoBuyPolicy {
        &self.policy
    }

    pub fn executions(&self) -> Vec<ExecutionRecord> {
        self.executions.list()
    }

    pub fn report(&self, token: &str, now: DateTime<Utc>) -> CoinReport {
        let inputs = ReportInputs {
            ledger: &self.ledger,
            registry: &self.registry,
            relations: &self.relations,
            signals: &self.signals,
            policy: &self.policy,
        };
        report::build_report(token, &inputs, now)
    }

    pub fn status(&self, now: DateTime<Utc>) -> EngineStatus {
        EngineStatus {
            tracking: self.tracking,
            last_tick: self.last_tick,
            ledger_size: self.ledger.len(),
            wallets: self.registry.len(),
            relations: self.relations.len(),
            active_signals: self.signals.active(now).len(),
            pending_mirrors: self.mirror.len(),
            executions: self.executions.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SeedWallet;
    use crate::signals::test_support::t0;
    use crate::types::{ActivityKind, RelationType, RiskTier, SignalType};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn seed(address: &str, influence: u8) -> SeedWallet {
        SeedWallet {
            address: address.to_string(),
            label: format!("Whale {}", address),
            balance: 100_000.0,
            risk_tier: RiskTier::Moderate,
            influence,
            win_rate: 80.0,
            profitability: 120.0,
            avg_hold_time_hours: 24.0,
            total_tx_count: 10,
            followers: 100,
            preferred_tokens: Vec::new(),
            tags: Vec::new(),
        }
    }

    fn config() -> Config {
        let mut config = Config::default();
        config.wallets = vec![seed("W1", 95), seed("W2", 92), seed("W3", 70)];
        config
    }

    fn engine() -> WhaleEngine {
        WhaleEngine::from_config(&config(), t0()).unwrap()
    }

    fn event(wallet: &str, kind: ActivityKind, token: &str, usd: f64, at: DateTime<Utc>) -> ActivityEvent {
        ActivityEvent {
            kind,
            wallet: wallet.to_string(),
            token: token.to_string(),
            token_name: None,
            amount: usd * 10.0,
            usd_value: usd,
            price: 0.1,
            timestamp: at,
            tx_ref: format!("tx-{}-{}-{}", wallet, token, at.timestamp()),
            scoring: None,
        }
    }

    fn enable_auto_buy(engine: &mut WhaleEngine) {
        engine
            .update_policy(PolicyUpdate {
                enabled: Some(true),
                ..PolicyUpdate::default()
            })
            .unwrap();
    }

    #[test]
    fn test_accumulation_end_to_end_dispatches_auto_buy() {
        let mut engine = engine();
        enable_auto_buy(&mut engine);

        engine.ingest(event("W1", ActivityKind::Buy, "BONK", 30_000.0, t0() - Duration::minutes(40))).unwrap();
        engine.ingest(event("W2", ActivityKind::Buy, "BONK", 25_000.0, t0() - Duration::minutes(20))).unwrap();
        engine.ingest(event("W3", ActivityKind::Buy, "BONK", 25_000.0, t0() - Duration::minutes(5))).unwrap();

        let report = engine.tick(t0());
        let signals = engine.active_signals(t0());
        let accumulation = signals
            .iter()
            .find(|s| s.signal_type == SignalType::WhaleAccumulation)
            .unwrap();
        assert_eq!(accumulation.confidence, 95);
        assert_eq!(accumulation.risk_level, 30);
        assert!(accumulation.auto_buy_recommended);

        assert_eq!(report.dispatch.len(), 1);
        assert_eq!(report.dispatch[0].position_size_usd, 950.0);
        assert_eq!(engine.executions().len(), 1);
        assert_eq!(engine.executions()[0].status, ExecutionStatus::Pending);

        let events = engine.take_events();
        assert!(events.iter().any(|e| matches!(e, EngineEvent::AutoBuyDecided(d) if d.accepted)));
        assert!(engine.take_events().is_empty());
    }

    #[test]
    fn test_second_tick_is_suppressed() {
        let mut engine = engine();
        engine.ingest(event("W1", ActivityKind::Buy, "BONK", 30_000.0, t0() - Duration::minutes(10))).unwrap();
        engine.ingest(event("W2", ActivityKind::Buy, "BONK", 30_000.0, t0() - Duration::minutes(5))).unwrap();

        let first = engine.tick(t0());
        assert!(first.signals_emitted >= 1);
        let second = engine.tick(t0() + Duration::seconds(5));
        assert_eq!(second.signals_emitted, 0);
        assert!(second.signals_suppressed >= 1);
    }

    #[test]
    fn test_disabled_policy_rejects_without_dispatch() {
        let mut engine = engine();
        engine.ingest(event("W1", ActivityKind::Buy, "WIF", 50_000.0, t0() - Duration::minutes(3))).unwrap();
        engine.ingest(event("W2", ActivityKind::Buy, "WIF", 50_000.0, t0() - Duration::minutes(2))).unwrap();

        let report = engine.tick(t0());
        assert!(report.auto_buy_decisions >= 1);
        assert!(report.dispatch.is_empty());
        assert!(engine.executions().is_empty());
        let events = engine.take_events();
        assert!(events
            .iter()
            .any(|e| matches!(e, EngineEvent::AutoBuyDecided(d) if !d.accepted && d.reason == "disabled")));
    }

    #[test]
    fn test_relation_inferred_on_tick() {
        let mut engine = engine();
        for (i, token) in ["BONK", "WIF", "POPCAT"].iter().enumerate() {
            let at = t0() - Duration::hours(3) + Duration::minutes(i as i64);
            engine.ingest(event("W1", ActivityKind::Buy, token, 1_000.0, at)).unwrap();
            engine.ingest(event("W2", ActivityKind::Buy, token, 1_000.0, at)).unwrap();
        }

        engine.tick(t0());
        let relation = engine.relations().into_iter().next().unwrap();
        assert_eq!(relation.relation_type, RelationType::WhaleGroup);
        assert_eq!(relation.strength, 75);
        assert_eq!(relation.shared_tokens.len(), 3);

        let detail = engine.wallet_detail("W2").unwrap();
        assert_eq!(detail.recent_activities.len(), 3);
        assert_eq!(detail.relations.len(), 1);
        assert!(engine.graph().built_at.is_some());
    }

    #[test]
    fn test_invalid_event_is_rejected_and_reported() {
        let mut engine = engine();
        let mut bad = event("W1", ActivityKind::Buy, "BONK", 1_000.0, t0());
        bad.usd_value = -5.0;

        assert!(matches!(engine.ingest(bad), Err(IngestError::InvalidValue { .. })));
        assert_eq!(engine.status(t0()).ledger_size, 0);
        let events = engine.take_events();
        assert!(matches!(events.as_slice(), [EngineEvent::ActivityRejected { .. }]));
    }

    #[test]
    fn test_unknown_wallet_is_auto_registered() {
        let mut engine = engine();
        engine.ingest(event("NEWWALLET1", ActivityKind::Buy, "MYRO", 2_000.0, t0())).unwrap();
        assert_eq!(engine.status(t0()).wallets, 4);
        assert!(engine
            .take_events()
            .iter()
            .any(|e| matches!(e, EngineEvent::WalletDiscovered { address } if address == "NEWWALLET1")));
    }

    #[test]
    fn test_followed_whale_is_mirrored_after_delay() {
        let mut engine = engine();
        engine
            .update_policy(PolicyUpdate {
                follow_whales: Some(vec!["W1".to_string()]),
                copy_trade_delay_secs: Some(30),
                ..PolicyUpdate::default()
            })
            .unwrap();

        engine.ingest(event("W1", ActivityKind::Buy, "BOME", 5_000.0, t0())).unwrap();
        assert_eq!(engine.status(t0()).pending_mirrors, 1);

        engine.tick(t0() + Duration::seconds(10));
        assert!(engine.active_signals(t0() + Duration::seconds(10)).is_empty());

        let now = t0() + Duration::seconds(31);
        engine.tick(now);
        let signals = engine.active_signals(now);
        assert_eq!(signals.len(), 1);
        assert_eq!(signals[0].signal_type, SignalType::SmartMoneyEntry);
        assert_eq!(signals[0].whales_involved, vec!["W1"]);
    }

    #[test]
    fn test_followed_buy_with_extreme_delay_or_timestamp_never_panics() {
        let mut engine = engine();
        let err = engine
            .update_policy(PolicyUpdate {
                follow_whales: Some(vec!["W1".to_string()]),
                copy_trade_delay_secs: Some(100_000_000_000_000_000),
                ..PolicyUpdate::default()
            })
            .unwrap_err();
        assert!(matches!(err, PolicyError::DelayTooLong { .. }));

        engine
            .update_policy(PolicyUpdate {
                follow_whales: Some(vec!["W1".to_string()]),
                ..PolicyUpdate::default()
            })
            .unwrap();
        let far = event("W1", ActivityKind::Buy, "BONK", 5_000.0, DateTime::<Utc>::MAX_UTC);
        assert!(matches!(engine.ingest(far), Err(IngestError::TimestampInFuture(_))));

        engine.ingest(event("W1", ActivityKind::Buy, "BONK", 5_000.0, t0())).unwrap();
        assert_eq!(engine.status(t0()).pending_mirrors, 1);
        engine.tick(t0() + Duration::seconds(31));
    }

    #[test]
    fn test_follow_unknown_wallet_rejected() {
        let mut engine = engine();
        let err = engine
            .update_policy(PolicyUpdate {
                follow_whales: Some(vec!["NOBODY".to_string()]),
                ..PolicyUpdate::default()
            })
            .unwrap_err();
        assert_eq!(err, PolicyError::UnknownWallet("NOBODY".to_string()));
        assert!(engine.policy().follow_whales.is_empty());
    }

    #[test]
    fn test_manual_auto_buy_and_settlement() {
        let mut engine = engine();
        enable_auto_buy(&mut engine);
        engine
            .update_policy(PolicyUpdate {
                max_risk: Some(100.0),
                ..PolicyUpdate::default()
            })
            .unwrap();
        engine.ingest(event("W1", ActivityKind::Sell, "SLERF", 40_000.0, t0() - Duration::minutes(2))).unwrap();
        engine.ingest(event("W2", ActivityKind::Sell, "SLERF", 40_000.0, t0() - Duration::minutes(1))).unwrap();
        engine.tick(t0());

        assert!(engine.auto_buy("missing", t0()).is_none());

        let exit = engine.active_signals(t0()).into_iter().next().unwrap();
        assert_eq!(exit.signal_type, SignalType::MassExit);
        let decision = engine.auto_buy(&exit.id, t0()).unwrap();
        assert!(decision.accepted);
        let record = decision.execution.unwrap();

        let receipt = ExecutionReceipt {
            reference: "sim-abc".to_string(),
            token: "SLERF".to_string(),
            size_usd: record.position_size_usd,
            filled_at: t0(),
        };
        assert!(engine.record_execution_result(&record.id, Ok(receipt), t0()));
        assert!(matches!(engine.executions()[0].status, ExecutionStatus::Filled { .. }));
        assert!(!engine.record_execution_result(&record.id, Err(ExecutionError::Timeout(10)), t0()));

        let expired = engine.auto_buy(&exit.id, t0() + Duration::hours(7)).unwrap();
        assert!(!expired.accepted);
        assert_eq!(expired.reason, "signal expired");
    }

    #[test]
    fn test_paused_engine_skips_tick() {
        let mut engine = engine();
        engine.set_tracking(false);
        engine.ingest(event("W1", ActivityKind::Buy, "BONK", 60_000.0, t0())).unwrap();
        engine.ingest(event("W2", ActivityKind::Buy, "BONK", 60_000.0, t0())).unwrap();
        engine.tick(t0());
        assert!(engine.active_signals(t0()).is_empty());
        assert!(engine.status(t0()).last_tick.is_none());
        assert!(!engine.status(t0()).tracking);
        assert!(!engine.is_tracking());
    }

    #[test]
    fn test_refresh_metrics_drifts_balances_within_bounds() {
        let mut engine = engine();
        let before = engine.wallets();
        engine.refresh_metrics(&mut StdRng::seed_from_u64(7), t0());

        for wallet in engine.wallets() {
            let old = before.iter().find(|w| w.address == wallet.address).unwrap();
            let drift = (wallet.balance - old.balance).abs() / old.balance;
            assert!(drift <= 0.03, "{} drifted {}", wallet.address, drift);
        }
    }

    #[test]
    fn test_unknown_token_report_is_neutral() {
        let engine = engine();
        let report = engine.report("XYZ", t0());
        assert_eq!(report.recommendation.action, crate::report::Action::Hold);
    }

    #[test]
    fn test_from_config_rejects_unknown_followed_wallet() {
        let mut config = config();
        config.auto_buy.follow_whales = vec!["GHOST".to_string()];
        assert!(WhaleEngine::from_config(&config, t0()).is_err());
    }
}
