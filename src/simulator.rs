//! 🎲 Simulated activity feed (demo mode)
//!
//! Stands in for an external indexer: random single whale moves plus the
//! occasional coordinated burst where several whales buy the same token a
//! couple of seconds apart. Events go through `EngineHandle::submit` like any
//! other feed input.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::SimulationConfig;
use crate::error::IngestError;
use crate::scoring::synthetic_tx_ref;
use crate::service::EngineHandle;
use crate::types::{ActivityEvent, ActivityKind, ActivityScoring, Impact};

/// Burst tokens are drawn from the head of the token list
const BURST_TOKEN_POOL: usize = 3;

pub struct FeedSimulator {
    rng: StdRng,
    whales: Vec<String>,
    config: SimulationConfig,
}

impl FeedSimulator {
    pub fn new(whales: Vec<String>, config: SimulationConfig) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self { rng, whales, config }
    }

    /// One whale move, or None if the dice say no
    pub fn random_move(&mut self, now: DateTime<Utc>) -> Option<ActivityEvent> {
        if !self.rng.gen_bool(self.config.move_probability) {
            return None;
        }
        let wallet = self.whales.choose(&mut self.rng)?.clone();
        let token = self.config.tokens.choose(&mut self.rng)?.clone();
        let kind = if self.rng.gen_bool(self.config.buy_probability) {
            ActivityKind::Buy
        } else {
            ActivityKind::Sell
        };

        Some(ActivityEvent {
            kind,
            wallet,
            token_name: Some(format!("{} Token", token)),
            token,
            amount: self.rng.gen_range(100_000.0..1_100_000.0),
            usd_value: self.rng.gen_range(10_000.0..60_000.0),
            price: self.rng.gen_range(0.001..0.011),
            timestamp: now,
            tx_ref: synthetic_tx_ref(),
            scoring: None,
        })
    }

    /// 2-4 of the leading whales buying one token, spaced apart
    pub fn coordinated_burst(&mut self, now: DateTime<Utc>) -> Vec<ActivityEvent> {
        if self.whales.len() < 2 || !self.rng.gen_bool(self.config.coordinated_probability) {
            return Vec::new();
        }
        let pool = self.config.tokens.len().min(BURST_TOKEN_POOL);
        let Some(token) = self.config.tokens[..pool].choose(&mut self.rng).cloned() else {
            return Vec::new();
        };
        let count = self.rng.gen_range(2..=4).min(self.whales.len());
        let spacing = ChronoDuration::seconds(self.config.coordinated_spacing_secs as i64);

        (0..count)
            .map(|i| ActivityEvent {
                kind: ActivityKind::Buy,
                wallet: self.whales[i].clone(),
                token: token.clone(),
                token_name: Some(format!("{} Token", token)),
                amount: self.rng.gen_range(200_000.0..700_000.0),
                usd_value: self.rng.gen_range(15_000.0..45_000.0),
                price: self.rng.gen_range(0.001..0.011),
                timestamp: now + spacing * i as i32,
                tx_ref: format!("coord{}", synthetic_tx_ref()),
                scoring: Some(ActivityScoring {
                    confidence: 95,
                    impact: Impact::WhaleMove,
                    profit_potential: self.rng.gen_range(40.0..120.0),
                    time_to_profit_hours: self.rng.gen_range(6.0..30.0),
                }),
            })
            .collect()
    }
}

pub fn spawn_simulator(
    handle: EngineHandle,
    whales: Vec<String>,
    config: SimulationConfig,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        info!(
            "🎲 Feed simulator: Started ({} whales, {} tokens)",
            whales.len(),
            config.tokens.len()
        );

        let spacing = Duration::from_secs(config.coordinated_spacing_secs);
        let mut moves = tokio::time::interval(Duration::from_secs(config.move_interval_secs));
        let mut bursts = tokio::time::interval(Duration::from_secs(config.coordinated_interval_secs));
        let mut simulator = FeedSimulator::new(whales, config);

        loop {
            tokio::select! {
                _ = moves.tick() => {
                    if let Some(event) = simulator.random_move(Utc::now()) {
                        debug!("🎲 {} {} ${:.0}", event.kind.as_str(), event.token, event.usd_value);
                        if let Err(IngestError::QueueClosed) = handle.submit(event) {
                            break;
                        }
                    }
                }
                _ = bursts.tick() => {
                    let burst = simulator.coordinated_burst(Utc::now());
                    if !burst.is_empty() {
                        info!("🎲 Simulating coordinated burst: {} whales on {}", burst.len(), burst[0].token);
                    }
                    for (i, mut event) in burst.into_iter().enumerate() {
                        if i > 0 {
                            tokio::time::sleep(spacing).await;
                        }
                        event.timestamp = Utc::now();
                        if let Err(IngestError::QueueClosed) = handle.submit(event) {
                            warn!("🎲 Feed closed mid-burst");
                            return;
                        }
                    }
                }
            }
        }
        info!("🎲 Feed simulator: Engine gone, stopping");
    })
}
