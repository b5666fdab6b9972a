use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fs;

use crate::policy::AutoBuyPolicy;
use crate::types::{RiskTier, TrackedWallet};

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub engine: EngineConfig,
    pub detection: DetectionConfig,
    pub relations: RelationConfig,
    pub registry: RegistryConfig,
    pub auto_buy: AutoBuyPolicy,
    pub simulation: SimulationConfig,
    pub api: ApiConfig,
    pub monitoring: MonitoringConfig,
    #[serde(default = "default_seed_wallets")]
    pub wallets: Vec<SeedWallet>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct EngineConfig {
    pub ledger_capacity: usize,
    pub signal_retention: usize,
    pub execution_log_capacity: usize,
    pub tick_interval_secs: u64,
    pub metrics_refresh_secs: u64,
    pub feed_queue_capacity: usize,
    pub execution_timeout_secs: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            ledger_capacity: 100,
            signal_retention: 20,
            execution_log_capacity: 50,
            tick_interval_secs: 5,
            metrics_refresh_secs: 30,
            feed_queue_capacity: 1024,
            execution_timeout_secs: 10,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DetectionConfig {
    /// Lookback for all detectors (minutes)
    pub window_mins: i64,
    /// No same-type/same-token re-emit inside this window (minutes)
    pub suppression_mins: i64,
    pub accumulation_min_wallets: usize,
    pub accumulation_min_volume_usd: f64,
    pub critical_volume_usd: f64,
    pub auto_buy_volume_usd: f64,
    /// Max spread of buys counted as one coordinated burst (seconds)
    pub coordination_window_secs: i64,
    pub coordination_min_wallets: usize,
    pub mass_exit_min_wallets: usize,
    pub mass_exit_min_volume_usd: f64,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            window_mins: 60,
            suppression_mins: 30,
            accumulation_min_wallets: 2,
            accumulation_min_volume_usd: 50_000.0,
            critical_volume_usd: 100_000.0,
            auto_buy_volume_usd: 75_000.0,
            coordination_window_secs: 10,
            coordination_min_wallets: 2,
            mass_exit_min_wallets: 2,
            mass_exit_min_volume_usd: 50_000.0,
        }
    }
}

impl DetectionConfig {
    pub fn window(&self) -> Duration {
        Duration::minutes(self.window_mins)
    }

    pub fn suppression(&self) -> Duration {
        Duration::minutes(self.suppression_mins)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RelationConfig {
    /// Newest activities per wallet compared for overlap
    pub lookback_activities: usize,
    pub min_shared_tokens: usize,
    /// Both wallets at or above this influence => whale_group
    pub whale_group_min_influence: u8,
}

impl Default for RelationConfig {
    fn default() -> Self {
        Self {
            lookback_activities: 10,
            min_shared_tokens: 2,
            whale_group_min_influence: 90,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Register unknown wallets on their first observed activity
    pub auto_register: bool,
    /// Ledger window used to refresh `last_activity` (minutes)
    pub activity_window_mins: i64,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            auto_register: true,
            activity_window_mins: 60,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SimulationConfig {
    pub enabled: bool,
    pub move_interval_secs: u64,
    pub move_probability: f64,
    pub buy_probability: f64,
    pub coordinated_interval_secs: u64,
    pub coordinated_probability: f64,
    pub coordinated_spacing_secs: u64,
    pub tokens: Vec<String>,
    pub seed: Option<u64>,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            move_interval_secs: 5,
            move_probability: 0.3,
            buy_probability: 0.6,
            coordinated_interval_secs: 15,
            coordinated_probability: 0.2,
            coordinated_spacing_secs: 2,
            tokens: ["BONK", "WIF", "POPCAT", "MYRO", "BOME", "SLERF", "HARAMBE"]
                .iter()
                .map(|t| t.to_string())
                .collect(),
            seed: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ApiConfig {
    pub enabled: bool,
    pub host: String,
    pub port: u16,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            host: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct MonitoringConfig {
    pub log_level: String,
    pub json_logs: bool,
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logs: false,
        }
    }
}

/// Registry seed entry
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SeedWallet {
    pub address: String,
    pub label: String,
    pub balance: f64,
    pub risk_tier: RiskTier,
    pub influence: u8,
    pub win_rate: f64,
    #[serde(default)]
    pub profitability: f64,
    #[serde(default)]
    pub avg_hold_time_hours: f64,
    #[serde(default)]
    pub total_tx_count: u64,
    #[serde(default)]
    pub followers: u64,
    #[serde(default)]
    pub preferred_tokens: Vec<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl SeedWallet {
    pub fn into_wallet(self, now: DateTime<Utc>) -> TrackedWallet {
        TrackedWallet {
            address: self.address,
            label: self.label,
            balance: self.balance,
            total_tx_count: self.total_tx_count,
            first_seen: now,
            last_activity: now,
            profitability: self.profitability,
            win_rate: self.win_rate,
            avg_hold_time_hours: self.avg_hold_time_hours,
            preferred_tokens: self.preferred_tokens,
            risk_tier: self.risk_tier,
            influence: self.influence,
            followers: self.followers,
            tags: self.tags,
        }
    }
}

fn default_seed_wallets() -> Vec<SeedWallet> {
    let seed = |address: &str,
                label: &str,
                balance: f64,
                risk_tier: RiskTier,
                influence: u8,
                win_rate: f64,
                profitability: f64| SeedWallet {
        address: address.to_string(),
        label: label.to_string(),
        balance,
        risk_tier,
        influence,
        win_rate,
        profitability,
        avg_hold_time_hours: 72.0,
        total_tx_count: 7500,
        followers: 2500,
        preferred_tokens: ["BONK", "WIF", "POPCAT", "MYRO", "BOME"]
            .iter()
            .map(|t| t.to_string())
            .collect(),
        tags: vec!["verified".to_string(), "profitable".to_string(), "active".to_string()],
    };

    vec![
        seed("9WzDXwBbmkg8ZTbNMqUxvQRAyrZzDsGYdLVL9zYtAWWM", "Sol Whale #1", 150_000.0, RiskTier::Moderate, 95, 78.0, 120.0),
        seed("5Q544fKrFoe6tsEbD7S8EmxGTJYAKtTVhAW5Q5pge4j1", "BONK Accumulator", 89_000.0, RiskTier::Aggressive, 88, 82.0, 140.0),
        seed("7dHbWXmci3dT8UFYWYZweBLXgycu7Y3iL6trKn1Y7ARj", "Memecoin Hunter", 67_000.0, RiskTier::Degen, 91, 85.0, 210.0),
        seed("36E4Ym8oHzLQ4Zr6DQMNNUdF9k6qK6pBEKsUJKqBHGTy", "Smart Money Alpha", 234_000.0, RiskTier::Conservative, 97, 89.0, 95.0),
        seed("8BF5mhw1ZThKi2R5gJw8qZxF3wVhY5V1t9K2NdHvLpQz", "Solana OG", 445_000.0, RiskTier::Moderate, 99, 92.0, 180.0),
    ]
}

/// Where the running configuration came from
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigSource {
    File(String),
    Defaults { reason: String },
}

impl Config {
    pub fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path))?;

        let config: Config = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path))?;

        Ok(config)
    }

    /// `$WHALE_TRACKER_CONFIG`, then config.toml, then config.example.toml,
    /// then built-in defaults. Runs before logging is up, so the caller
    /// reports the source.
    pub fn load_or_default() -> Result<(Self, ConfigSource)> {
        let _ = dotenv::dotenv();

        if let Ok(path) = std::env::var("WHALE_TRACKER_CONFIG") {
            let config = Self::load(&path)?;
            return Ok((config, ConfigSource::File(path)));
        }

        Ok(Self::load_first(&["config.toml", "config.example.toml"]))
    }

    /// First file that loads, or the built-in defaults with the last error
    pub fn load_first(paths: &[&str]) -> (Self, ConfigSource) {
        let mut reason = String::from("no config paths given");
        for path in paths {
            match Self::load(path) {
                Ok(config) => return (config, ConfigSource::File(path.to_string())),
                Err(e) => reason = format!("{:#}", e),
            }
        }
        (Self::default_with_seeds(), ConfigSource::Defaults { reason })
    }

    /// Defaults including the built-in seed wallets
    pub fn default_with_seeds() -> Self {
        Self {
            wallets: default_seed_wallets(),
            ..Default::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.engine.ledger_capacity == 0 {
            anyhow::bail!("engine.ledger_capacity must be > 0");
        }
        if self.engine.signal_retention == 0 {
            anyhow::bail!("engine.signal_retention must be > 0");
        }
        if self.engine.tick_interval_secs == 0 || self.engine.metrics_refresh_secs == 0 {
            anyhow::bail!("engine tick intervals must be > 0");
        }
        if self.engine.feed_queue_capacity == 0 {
            anyhow::bail!("engine.feed_queue_capacity must be > 0");
        }
        if self.detection.window_mins <= 0 || self.detection.suppression_mins < 0 {
            anyhow::bail!("detection windows must be positive");
        }
        if self.detection.accumulation_min_wallets < 2 || self.detection.coordination_min_wallets < 2 {
            anyhow::bail!("detectors need at least 2 wallets");
        }
        if self.relations.min_shared_tokens < 2 {
            anyhow::bail!("relations.min_shared_tokens must be >= 2");
        }
        if self.relations.whale_group_min_influence > 100 {
            anyhow::bail!("relations.whale_group_min_influence must be <= 100");
        }
        self.auto_buy
            .check()
            .context("Invalid [auto_buy] section")?;
        for p in [
            self.simulation.move_probability,
            self.simulation.buy_probability,
            self.simulation.coordinated_probability,
        ] {
            if !(0.0..=1.0).contains(&p) {
                anyhow::bail!("simulation probabilities must be between 0.0 and 1.0");
            }
        }
        if self.simulation.enabled
            && (self.simulation.move_interval_secs == 0 || self.simulation.coordinated_interval_secs == 0)
        {
            anyhow::bail!("simulation intervals must be > 0");
        }
        if self.simulation.enabled && self.simulation.tokens.is_empty() {
            anyhow::bail!("simulation.tokens must not be empty when simulation is enabled");
        }
        if self.api.enabled && self.api.port == 0 {
            anyhow::bail!("api.port must be > 0");
        }
        if self.wallets.iter().any(|w| w.address.is_empty()) {
            anyhow::bail!("seed wallets need a non-empty address");
        }
        if self.wallets.iter().any(|w| w.influence > 100) {
            anyhow::bail!("seed wallet influence must be <= 100");
        }

        Ok(())
    }
}
