//! 🔁 Engine actor
//!
//! One task owns the `WhaleEngine`. Everything else talks to it through an
//! `EngineHandle`: queries and updates over the command inbox, feed events
//! over a separate bounded queue that is drained at the start of each tick.
//! Execution calls run in their own tasks under a timeout and report back
//! through the inbox.

use chrono::Utc;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, oneshot};
use tokio::time::{interval_at, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::config::EngineConfig;
use crate::engine::{EngineStatus, TickReport, WalletDetail, WhaleEngine};
use crate::error::{ExecutionError, IngestError, PolicyError, ServiceError};
use crate::events::EngineEvent;
use crate::execution::{ExecutionBackend, ExecutionReceipt};
use crate::graph::NetworkGraph;
use crate::metrics::EngineMetrics;
use crate::policy::{AutoBuyDecision, AutoBuyPolicy, ExecutionRecord, PolicyUpdate};
use crate::report::CoinReport;
use crate::types::{ActivityEvent, ActivitySignal, TrackedWallet, WalletActivity, WalletRelation};

const COMMAND_QUEUE_CAPACITY: usize = 256;

enum Command {
    Wallets(oneshot::Sender<Vec<TrackedWallet>>),
    WalletDetail(String, oneshot::Sender<Option<WalletDetail>>),
    Activities(usize, oneshot::Sender<Vec<WalletActivity>>),
    Signals(oneshot::Sender<Vec<ActivitySignal>>),
    Relations(oneshot::Sender<Vec<WalletRelation>>),
    Graph(oneshot::Sender<NetworkGraph>),
    Report(String, oneshot::Sender<CoinReport>),
    Policy(oneshot::Sender<AutoBuyPolicy>),
    UpdatePolicy(PolicyUpdate, oneshot::Sender<Result<AutoBuyPolicy, PolicyError>>),
    AutoBuy(String, oneshot::Sender<Option<AutoBuyDecision>>),
    Executions(oneshot::Sender<Vec<ExecutionRecord>>),
    Status(oneshot::Sender<EngineStatus>),
    Tick(oneshot::Sender<TickReport>),
    SetTracking(bool, oneshot::Sender<()>),
    ExecutionDone {
        record_id: String,
        result: Result<ExecutionReceipt, ExecutionError>,
    },
    Shutdown,
}

#[derive(Clone)]
pub struct EngineHandle {
    commands: mpsc::Sender<Command>,
    feed: mpsc::Sender<ActivityEvent>,
    feed_capacity: usize,
    metrics: Arc<EngineMetrics>,
}

impl EngineHandle {
    /// Queue a feed event for the next tick
    pub fn submit(&self, event: ActivityEvent) -> Result<(), IngestError> {
        match self.feed.try_send(event) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Full(event)) => {
                self.metrics.activities_rejected.inc();
                warn!(
                    "⚠️  Feed queue full ({}), dropping {} event for {}",
                    self.feed_capacity,
                    event.kind.as_str(),
                    event.token
                );
                Err(IngestError::QueueFull {
                    capacity: self.feed_capacity,
                })
            }
            Err(mpsc::error::TrySendError::Closed(_)) => Err(IngestError::QueueClosed),
        }
    }

    async fn request<T>(&self, make: impl FnOnce(oneshot::Sender<T>) -> Command) -> Result<T, ServiceError> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(make(tx))
            .await
            .map_err(|_| ServiceError::EngineStopped)?;
        rx.await.map_err(|_| ServiceError::EngineStopped)
    }

    pub async fn wallets(&self) -> Result<Vec<TrackedWallet>, ServiceError> {
        self.request(Command::Wallets).await
    }

    pub async fn wallet_detail(&self, address: &str) -> Result<Option<WalletDetail>, ServiceError> {
        self.request(|tx| Command::WalletDetail(address.to_string(), tx)).await
    }

    pub async fn activities(&self, limit: usize) -> Result<Vec<WalletActivity>, ServiceError> {
        self.request(|tx| Command::Activities(limit, tx)).await
    }

    pub async fn signals(&self) -> Result<Vec<ActivitySignal>, ServiceError> {
        self.request(Command::Signals).await
    }

    pub async fn relations(&self) -> Result<Vec<WalletRelation>, ServiceError> {
        self.request(Command::Relations).await
    }

    pub async fn graph(&self) -> Result<NetworkGraph, ServiceError> {
        self.request(Command::Graph).await
    }

    pub async fn report(&self, token: &str) -> Result<CoinReport, ServiceError> {
        self.request(|tx| Command::Report(token.to_string(), tx)).await
    }

    pub async fn policy(&self) -> Result<AutoBuyPolicy, ServiceError> {
        self.request(Command::Policy).await
    }

    pub async fn update_policy(&self, update: PolicyUpdate) -> Result<AutoBuyPolicy, ServiceError> {
        Ok(self.request(|tx| Command::UpdatePolicy(update, tx)).await??)
    }

    pub async fn auto_buy(&self, signal_id: &str) -> Result<Option<AutoBuyDecision>, ServiceError> {
        self.request(|tx| Command::AutoBuy(signal_id.to_string(), tx)).await
    }

    pub async fn executions(&self) -> Result<Vec<ExecutionRecord>, ServiceError> {
        self.request(Command::Executions).await
    }

    pub async fn status(&self) -> Result<EngineStatus, ServiceError> {
        self.request(Command::Status).await
    }

    /// Run a tick now instead of waiting for the timer
    pub async fn tick(&self) -> Result<TickReport, ServiceError> {
        self.request(Command::Tick).await
    }

    /// Pause or resume ticks; paused ticks leave the feed queued
    pub async fn set_tracking(&self, tracking: bool) -> Result<(), ServiceError> {
        self.request(|tx| Command::SetTracking(tracking, tx)).await
    }

    pub async fn shutdown(&self) {
        if self.commands.send(Command::Shutdown).await.is_err() {
            debug!("Engine already stopped");
        }
    }
}

struct EngineActor<B> {
    engine: WhaleEngine,
    backend: Arc<B>,
    // Weak so the actor stops once every handle is dropped
    commands_tx: mpsc::WeakSender<Command>,
    feed_rx: mpsc::Receiver<ActivityEvent>,
    events: mpsc::UnboundedSender<EngineEvent>,
    metrics: Arc<EngineMetrics>,
    execution_timeout: Duration,
    rng: StdRng,
}

pub fn spawn_engine<B: ExecutionBackend>(
    engine: WhaleEngine,
    config: &EngineConfig,
    backend: Arc<B>,
    metrics: Arc<EngineMetrics>,
    events: mpsc::UnboundedSender<EngineEvent>,
) -> (EngineHandle, tokio::task::JoinHandle<()>) {
    let (commands_tx, commands_rx) = mpsc::channel(COMMAND_QUEUE_CAPACITY);
    let (feed_tx, feed_rx) = mpsc::channel(config.feed_queue_capacity);

    let handle = EngineHandle {
        commands: commands_tx.clone(),
        feed: feed_tx,
        feed_capacity: config.feed_queue_capacity,
        metrics: metrics.clone(),
    };

    let actor = EngineActor {
        engine,
        backend,
        commands_tx: commands_tx.downgrade(),
        feed_rx,
        events,
        metrics,
        execution_timeout: Duration::from_secs(config.execution_timeout_secs),
        rng: StdRng::from_entropy(),
    };

    let tick_every = Duration::from_secs(config.tick_interval_secs);
    let refresh_every = Duration::from_secs(config.metrics_refresh_secs);
    let task = tokio::spawn(actor.run(commands_rx, tick_every, refresh_every));

    (handle, task)
}

impl<B: ExecutionBackend> EngineActor<B> {
    async fn run(mut self, mut commands: mpsc::Receiver<Command>, tick_every: Duration, refresh_every: Duration) {
        info!(
            "🐋 Engine actor: Started (tick={}s, refresh={}s)",
            tick_every.as_secs(),
            refresh_every.as_secs()
        );

        let start = tokio::time::Instant::now();
        let mut tick = interval_at(start + tick_every, tick_every);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut refresh = interval_at(start + refresh_every, refresh_every);
        refresh.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = tick.tick() => {
                    self.run_tick();
                }
                _ = refresh.tick() => {
                    self.engine.refresh_metrics(&mut self.rng, Utc::now());
                }
                command = commands.recv() => match command {
                    None | Some(Command::Shutdown) => break,
                    Some(command) => self.handle(command),
                },
            }
            self.flush_events();
        }

        self.engine.set_tracking(false);
        self.flush_events();
        info!("🛑 Engine actor: Stopped");
    }

    fn run_tick(&mut self) -> TickReport {
        let started = Instant::now();
        if !self.engine.is_tracking() {
            return TickReport::default();
        }

        let mut drained = 0;
        while let Ok(event) = self.feed_rx.try_recv() {
            drained += 1;
            // Rejections are reported through the outbox
            let _ = self.engine.ingest(event);
        }
        if drained > 0 {
            debug!("📥 Drained {} feed events", drained);
        }

        let now = Utc::now();
        let report = self.engine.tick(now);
        for record in &report.dispatch {
            self.dispatch(record.clone());
        }

        self.metrics.tick_latency.observe(started.elapsed().as_secs_f64());
        self.metrics.set_state(&self.engine.status(now));
        report
    }

    fn handle(&mut self, command: Command) {
        let now = Utc::now();
        // A dropped reply channel only means the caller went away
        match command {
            Command::Wallets(reply) => {
                let _ = reply.send(self.engine.wallets());
            }
            Command::WalletDetail(address, reply) => {
                let _ = reply.send(self.engine.wallet_detail(&address));
            }
            Command::Activities(limit, reply) => {
                let _ = reply.send(self.engine.activities(limit));
            }
            Command::Signals(reply) => {
                let _ = reply.send(self.engine.active_signals(now));
            }
            Command::Relations(reply) => {
                let _ = reply.send(self.engine.relations());
            }
            Command::Graph(reply) => {
                let _ = reply.send(self.engine.graph().clone());
            }
            Command::Report(token, reply) => {
                let _ = reply.send(self.engine.report(&token, now));
            }
            Command::Policy(reply) => {
                let _ = reply.send(self.engine.policy().clone());
            }
            Command::UpdatePolicy(update, reply) => {
                let _ = reply.send(self.engine.update_policy(update));
            }
            Command::AutoBuy(signal_id, reply) => {
                let decision = self.engine.auto_buy(&signal_id, now);
                if let Some(record) = decision.as_ref().and_then(|d| d.execution.clone()) {
                    self.dispatch(record);
                }
                let _ = reply.send(decision);
            }
            Command::Executions(reply) => {
                let _ = reply.send(self.engine.executions());
            }
            Command::Status(reply) => {
                let _ = reply.send(self.engine.status(now));
            }
            Command::Tick(reply) => {
                let report = self.run_tick();
                let _ = reply.send(report);
            }
            Command::SetTracking(tracking, reply) => {
                self.engine.set_tracking(tracking);
                let _ = reply.send(());
            }
            Command::ExecutionDone { record_id, result } => {
                self.engine.record_execution_result(&record_id, result, now);
            }
            Command::Shutdown => {}
        }
    }

    /// Fire-and-forget: the result comes back as `Command::ExecutionDone`
    fn dispatch(&self, record: ExecutionRecord) {
        let backend = self.backend.clone();
        let Some(commands) = self.commands_tx.upgrade() else {
            warn!("⚠️  No engine handles left, execution {} not dispatched", record.id);
            return;
        };
        let timeout = self.execution_timeout;

        info!(
            "⚡ Dispatching execution {}: ${:.2} {}",
            record.id, record.position_size_usd, record.token
        );

        tokio::spawn(async move {
            let result = match tokio::time::timeout(
                timeout,
                backend.execute(record.token.clone(), record.position_size_usd),
            )
            .await
            {
                Ok(result) => result,
                Err(_) => Err(ExecutionError::Timeout(timeout.as_secs())),
            };

            let done = Command::ExecutionDone {
                record_id: record.id.clone(),
                result,
            };
            if commands.send(done).await.is_err() {
                warn!("⚠️  Engine stopped before execution {} completed", record.id);
            }
        });
    }

    fn flush_events(&mut self) {
        for event in self.engine.take_events() {
            if self.events.send(event).is_err() {
                debug!("Notifier gone, dropping events");
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Config, SeedWallet};
    use crate::execution::SimulatedExecutor;
    use crate::policy::ExecutionStatus;
    use crate::types::{ActivityKind, RiskTier, SignalType};
    use std::future::Future;

    fn seed(address: &str) -> SeedWallet {
        SeedWallet {
            address: address.to_string(),
            label: address.to_string(),
            balance: 50_000.0,
            risk_tier: RiskTier::Moderate,
            influence: 90,
            win_rate: 75.0,
            profitability: 0.0,
            avg_hold_time_hours: 24.0,
            total_tx_count: 0,
            followers: 0,
            preferred_tokens: Vec::new(),
            tags: Vec::new(),
        }
    }

    fn config() -> Config {
        let mut config = Config::default();
        config.wallets = vec![seed("W1"), seed("W2"), seed("W3")];
        config.auto_buy.enabled = true;
        config.engine.execution_timeout_secs = 1;
        config
    }

    fn buy(wallet: &str, token: &str, usd: f64, secs_ago: i64) -> ActivityEvent {
        ActivityEvent {
            kind: ActivityKind::Buy,
            wallet: wallet.to_string(),
            token: token.to_string(),
            token_name: None,
            amount: usd * 100.0,
            usd_value: usd,
            price: 0.01,
            timestamp: Utc::now() - chrono::Duration::seconds(secs_ago),
            tx_ref: format!("tx-{}-{}", wallet, token),
            scoring: None,
        }
    }

    fn start<B: ExecutionBackend>(config: &Config, backend: B) -> EngineHandle {
        let engine = WhaleEngine::from_config(config, Utc::now()).unwrap();
        let metrics = Arc::new(EngineMetrics::new().unwrap());
        let (events_tx, _) = mpsc::unbounded_channel();
        let (handle, _task) = spawn_engine(engine, &config.engine, Arc::new(backend), metrics, events_tx);
        handle
    }

    async fn settled(handle: &EngineHandle) -> Vec<ExecutionRecord> {
        for _ in 0..400 {
            let records = handle.executions().await.unwrap();
            if !records.is_empty() && records.iter().all(|r| r.status != ExecutionStatus::Pending) {
                return records;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("executions never settled");
    }

    struct SlowBackend;

    impl ExecutionBackend for SlowBackend {
        fn execute(
            &self,
            _token: String,
            _size_usd: f64,
        ) -> impl Future<Output = Result<ExecutionReceipt, ExecutionError>> + Send {
            async move {
                tokio::time::sleep(Duration::from_secs(30)).await;
                Err(ExecutionError::Unavailable("never answers".to_string()))
            }
        }
    }

    #[tokio::test]
    async fn test_feed_drained_on_tick_and_signal_executed() {
        let handle = start(&config(), SimulatedExecutor::new(Duration::from_millis(5), 0.0));

        // Far enough apart to not count as a coordinated burst
        for (wallet, secs_ago) in [("W1", 120), ("W2", 60), ("W3", 30)] {
            handle.submit(buy(wallet, "BONK", 30_000.0, secs_ago)).unwrap();
        }
        assert_eq!(handle.status().await.unwrap().ledger_size, 0);

        let report = handle.tick().await.unwrap();
        assert_eq!(report.dispatch.len(), 1);

        let status = handle.status().await.unwrap();
        assert_eq!(status.ledger_size, 3);
        assert!(status.last_tick.is_some());

        let signals = handle.signals().await.unwrap();
        assert!(signals.iter().any(|s| s.signal_type == SignalType::WhaleAccumulation));

        let records = settled(&handle).await;
        assert!(matches!(records[0].status, ExecutionStatus::Filled { .. }));
    }

    #[tokio::test]
    async fn test_slow_backend_times_out() {
        let handle = start(&config(), SlowBackend);
        // Far enough apart to not count as a coordinated burst
        for (wallet, secs_ago) in [("W1", 120), ("W2", 60), ("W3", 30)] {
            handle.submit(buy(wallet, "WIF", 30_000.0, secs_ago)).unwrap();
        }
        handle.tick().await.unwrap();

        // The actor keeps answering while the execution is outstanding
        assert_eq!(handle.status().await.unwrap().executions, 1);

        let records = settled(&handle).await;
        match &records[0].status {
            ExecutionStatus::Failed { reason, .. } => assert!(reason.contains("timed out")),
            other => panic!("unexpected status {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_paused_engine_leaves_feed_queued() {
        let handle = start(&config(), SimulatedExecutor::default());
        handle.set_tracking(false).await.unwrap();

        for (wallet, secs_ago) in [("W1", 120), ("W2", 60)] {
            handle.submit(buy(wallet, "BONK", 1_000.0, secs_ago)).unwrap();
        }
        handle.tick().await.unwrap();
        let status = handle.status().await.unwrap();
        assert!(!status.tracking);
        assert_eq!(status.ledger_size, 0);

        handle.set_tracking(true).await.unwrap();
        handle.tick().await.unwrap();
        assert_eq!(handle.status().await.unwrap().ledger_size, 2);
    }

    #[tokio::test]
    async fn test_full_feed_queue_is_reported() {
        let mut config = config();
        config.engine.feed_queue_capacity = 2;
        let handle = start(&config, SimulatedExecutor::default());

        handle.submit(buy("W1", "BONK", 100.0, 5)).unwrap();
        handle.submit(buy("W2", "BONK", 100.0, 5)).unwrap();
        assert_eq!(
            handle.submit(buy("W3", "BONK", 100.0, 5)),
            Err(IngestError::QueueFull { capacity: 2 })
        );

        handle.tick().await.unwrap();
        handle.submit(buy("W3", "BONK", 100.0, 5)).unwrap();
    }

    #[tokio::test]
    async fn test_policy_update_round_trip() {
        let handle = start(&config(), SimulatedExecutor::default());

        let updated = handle
            .update_policy(PolicyUpdate {
                min_confidence: Some(90.0),
                ..PolicyUpdate::default()
            })
            .await
            .unwrap();
        assert_eq!(updated.min_confidence, 90);
        assert_eq!(handle.policy().await.unwrap().min_confidence, 90);

        let err = handle
            .update_policy(PolicyUpdate {
                max_risk: Some(150.0),
                ..PolicyUpdate::default()
            })
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Policy(_)));
        assert_eq!(handle.policy().await.unwrap().max_risk, 60);
    }

    #[tokio::test]
    async fn test_stopped_engine_reports_error() {
        let handle = start(&config(), SimulatedExecutor::default());
        handle.shutdown().await;

        let mut stopped = false;
        for _ in 0..100 {
            if matches!(handle.status().await, Err(ServiceError::EngineStopped)) {
                stopped = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert!(stopped);
        assert_eq!(handle.submit(buy("W1", "BONK", 1.0, 5)), Err(IngestError::QueueClosed));
    }

    #[tokio::test]
    async fn test_actor_stops_when_handles_dropped() {
        let config = config();
        let engine = WhaleEngine::from_config(&config, Utc::now()).unwrap();
        let metrics = Arc::new(EngineMetrics::new().unwrap());
        let (events_tx, _) = mpsc::unbounded_channel();
        let (handle, task) = spawn_engine(
            engine,
            &config.engine,
            Arc::new(SimulatedExecutor::default()),
            metrics,
            events_tx,
        );

        let clone = handle.clone();
        assert_eq!(clone.wallets().await.unwrap().len(), 3);
        drop(handle);
        drop(clone);

        let joined = tokio::time::timeout(Duration::from_secs(2), task).await;
        assert!(matches!(joined, Ok(Ok(()))));
    }

    #[tokio::test]
    async fn test_unknown_signal_auto_buy_is_none() {
        let handle = start(&config(), SimulatedExecutor::default());
        assert!(handle.auto_buy("nope").await.unwrap().is_none());
        assert!(handle.wallet_detail("nobody").await.unwrap().is_none());
        assert_eq!(handle.wallets().await.unwrap().len(), 3);
    }
}
