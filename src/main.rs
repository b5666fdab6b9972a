use anyhow::{Context, Result};
use chrono::Utc;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use whale_tracker::api::{self, AppState};
use whale_tracker::config::{Config, ConfigSource, MonitoringConfig};
use whale_tracker::events::spawn_notifier;
use whale_tracker::execution::SimulatedExecutor;
use whale_tracker::metrics::EngineMetrics;
use whale_tracker::simulator::spawn_simulator;
use whale_tracker::{spawn_engine, WhaleEngine};

#[tokio::main]
async fn main() -> Result<()> {
    let (config, source) = Config::load_or_default()?;
    init_logging(&config.monitoring);

    info!("🚀 Whale Tracker Starting...");
    match &source {
        ConfigSource::File(path) => info!("⚙️  Configuration loaded from {}", path),
        ConfigSource::Defaults { reason } => {
            warn!("⚠️  No usable config file ({}), using built-in defaults", reason)
        }
    }
    config.validate().context("Invalid configuration")?;
    info!("   • Ledger capacity: {}", config.engine.ledger_capacity);
    info!("   • Signal retention: {}", config.engine.signal_retention);
    info!("   • Tick interval: {}s", config.engine.tick_interval_secs);
    info!(
        "   • Auto-buy: {} (min conf {}, max risk {})",
        if config.auto_buy.enabled { "ENABLED" } else { "disabled" },
        config.auto_buy.min_confidence,
        config.auto_buy.max_risk
    );

    let metrics = Arc::new(EngineMetrics::new().context("Failed to register metrics")?);
    info!("📊 Metrics registry initialized");

    let engine = WhaleEngine::from_config(&config, Utc::now())?;

    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let notifier = spawn_notifier(events_rx, metrics.clone());

    let (handle, engine_task) = spawn_engine(
        engine,
        &config.engine,
        Arc::new(SimulatedExecutor::default()),
        metrics.clone(),
        events_tx,
    );

    let simulator = if config.simulation.enabled {
        let whales = config.wallets.iter().map(|w| w.address.clone()).collect();
        Some(spawn_simulator(handle.clone(), whales, config.simulation.clone()))
    } else {
        info!("ℹ️  Feed simulator: DISABLED in config");
        None
    };

    let api_task = if config.api.enabled {
        let state = AppState {
            engine: handle.clone(),
            metrics: metrics.clone(),
        };
        let api_config = config.api.clone();
        Some(tokio::spawn(async move {
            if let Err(e) = api::serve(&api_config, state).await {
                error!("❌ API server stopped: {:#}", e);
            }
        }))
    } else {
        info!("ℹ️  API server: DISABLED in config");
        None
    };

    info!("✅ Whale tracking active, press Ctrl-C to stop");
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;

    info!("🛑 Shutting down...");
    if let Some(task) = simulator {
        task.abort();
    }
    if let Some(task) = api_task {
        task.abort();
    }
    handle.shutdown().await;
    drop(handle);
    if let Err(e) = engine_task.await {
        error!("❌ Engine task failed: {}", e);
    }
    // Notifier exits once the engine drops its event sender
    if let Err(e) = notifier.await {
        error!("❌ Notifier task failed: {}", e);
    }

    info!("👋 Whale Tracker stopped");
    Ok(())
}

fn init_logging(monitoring: &MonitoringConfig) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&monitoring.log_level));

    let builder = fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true);

    if monitoring.json_logs {
        builder.json().init();
    } else {
        builder.init();
    }
}
