use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// First 8 chars of an address, for log lines
pub fn short_addr(address: &str) -> &str {
    address.get(..8).unwrap_or(address)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskTier {
    Conservative,
    Moderate,
    Aggressive,
    Degen,
}

impl RiskTier {
    pub fn as_str(&self) -> &str {
        match self {
            RiskTier::Conservative => "conservative",
            RiskTier::Moderate => "moderate",
            RiskTier::Aggressive => "aggressive",
            RiskTier::Degen => "degen",
        }
    }

    /// Risk level (0-100) carried by signals that mirror a wallet of this tier
    pub fn signal_risk(&self) -> u8 {
        match self {
            RiskTier::Conservative => 25,
            RiskTier::Moderate => 40,
            RiskTier::Aggressive => 60,
            RiskTier::Degen => 80,
        }
    }
}

/// A wallet under observation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackedWallet {
    pub address: String,
    pub label: String,
    pub balance: f64,
    pub total_tx_count: u64,
    pub first_seen: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
    /// Lifetime profitability (%)
    pub profitability: f64,
    /// Win rate (%)
    pub win_rate: f64,
    /// Average hold time (hours)
    pub avg_hold_time_hours: f64,
    pub preferred_tokens: Vec<String>,
    pub risk_tier: RiskTier,
    /// Market influence score (0-100)
    pub influence: u8,
    /// Estimated copy traders
    pub followers: u64,
    pub tags: Vec<String>,
}

impl TrackedWallet {
    /// Wallet first seen through the activity feed, with neutral stats
    pub fn discovered(address: &str, seen_at: DateTime<Utc>) -> Self {
        Self {
            address: address.to_string(),
            label: format!("Wallet {}", short_addr(address)),
            balance: 0.0,
            total_tx_count: 0,
            first_seen: seen_at,
            last_activity: seen_at,
            profitability: 0.0,
            win_rate: 0.0,
            avg_hold_time_hours: 0.0,
            preferred_tokens: Vec::new(),
            risk_tier: RiskTier::Moderate,
            influence: 0,
            followers: 0,
            tags: vec!["discovered".to_string()],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityKind {
    Buy,
    Sell,
    Transfer,
    Stake,
    Unstake,
}

impl ActivityKind {
    pub fn as_str(&self) -> &str {
        match self {
            ActivityKind::Buy => "buy",
            ActivityKind::Sell => "sell",
            ActivityKind::Transfer => "transfer",
            ActivityKind::Stake => "stake",
            ActivityKind::Unstake => "unstake",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Impact {
    Low,
    Medium,
    High,
    WhaleMove,
}

/// Per-event scoring, either supplied by the feed or derived on ingestion
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ActivityScoring {
    /// Signal strength of this single event (0-100)
    pub confidence: u8,
    pub impact: Impact,
    /// Estimated profit potential (%, signed)
    pub profit_potential: f64,
    pub time_to_profit_hours: f64,
}

/// Raw event as delivered by the ingestion feed
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivityEvent {
    pub kind: ActivityKind,
    pub wallet: String,
    pub token: String,
    #[serde(default)]
    pub token_name: Option<String>,
    pub amount: f64,
    pub usd_value: f64,
    pub price: f64,
    pub timestamp: DateTime<Utc>,
    pub tx_ref: String,
    #[serde(default)]
    pub scoring: Option<ActivityScoring>,
}

/// An observed wallet action stored in the ledger
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WalletActivity {
    pub id: String,
    pub wallet: String,
    pub kind: ActivityKind,
    pub token: String,
    pub token_name: String,
    pub amount: f64,
    pub usd_value: f64,
    pub price: f64,
    pub timestamp: DateTime<Utc>,
    pub tx_ref: String,
    #[serde(flatten)]
    pub scoring: ActivityScoring,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationType {
    CopyTrader,
    Coordinated,
    WhaleGroup,
    ConnectedWallets,
    InsiderGroup,
}

impl RelationType {
    /// Confidence ordering; escalation only ever moves to a higher rank
    pub fn rank(&self) -> u8 {
        match self {
            RelationType::ConnectedWallets => 0,
            RelationType::CopyTrader => 1,
            RelationType::Coordinated => 2,
            RelationType::WhaleGroup => 3,
            RelationType::InsiderGroup => 4,
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            RelationType::CopyTrader => "copy_trader",
            RelationType::Coordinated => "coordinated",
            RelationType::WhaleGroup => "whale_group",
            RelationType::ConnectedWallets => "connected_wallets",
            RelationType::InsiderGroup => "insider_group",
        }
    }
}

/// Unordered wallet pair, stored with addresses in sorted order
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PairKey(String, String);

impl PairKey {
    pub fn new(a: &str, b: &str) -> Self {
        if a <= b {
            PairKey(a.to_string(), b.to_string())
        } else {
            PairKey(b.to_string(), a.to_string())
        }
    }

    pub fn first(&self) -> &str {
        &self.0
    }

    pub fn second(&self) -> &str {
        &self.1
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WalletRelation {
    pub wallet1: String,
    pub wallet2: String,
    pub relation_type: RelationType,
    /// 0-100
    pub strength: u8,
    /// -100..100
    pub correlation: f64,
    pub shared_tokens: BTreeSet<String>,
    pub confidence: u8,
    pub first_detected: DateTime<Utc>,
    pub last_confirmed: DateTime<Utc>,
}

impl WalletRelation {
    pub fn key(&self) -> PairKey {
        PairKey::new(&self.wallet1, &self.wallet2)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalType {
    WhaleAccumulation,
    SmartMoneyEntry,
    CoordinatedBuying,
    InsiderActivity,
    MassExit,
}

impl SignalType {
    pub fn as_str(&self) -> &str {
        match self {
            SignalType::WhaleAccumulation => "whale_accumulation",
            SignalType::SmartMoneyEntry => "smart_money_entry",
            SignalType::CoordinatedBuying => "coordinated_buying",
            SignalType::InsiderActivity => "insider_activity",
            SignalType::MassExit => "mass_exit",
        }
    }

    pub fn is_bullish(&self) -> bool {
        matches!(
            self,
            SignalType::WhaleAccumulation | SignalType::SmartMoneyEntry | SignalType::CoordinatedBuying
        )
    }

    pub fn is_bearish(&self) -> bool {
        matches!(self, SignalType::MassExit)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Urgency {
    Low,
    Medium,
    High,
    Critical,
}

/// What the emitting detector saw
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "detector", rename_all = "snake_case")]
pub enum SignalEvidence {
    Accumulation {
        buyers: usize,
        buy_count: usize,
        total_volume_usd: f64,
    },
    Coordinated {
        wallets: usize,
        window_secs: i64,
        span_secs: i64,
    },
    MassExit {
        sellers: usize,
        sell_count: usize,
        total_volume_usd: f64,
    },
    MirroredEntry {
        wallet: String,
        activity_id: String,
        delay_secs: u64,
    },
}

impl SignalEvidence {
    pub fn signal_type(&self) -> SignalType {
        match self {
            SignalEvidence::Accumulation { .. } => SignalType::WhaleAccumulation,
            SignalEvidence::Coordinated { .. } => SignalType::CoordinatedBuying,
            SignalEvidence::MassExit { .. } => SignalType::MassExit,
            SignalEvidence::MirroredEntry { .. } => SignalType::SmartMoneyEntry,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivitySignal {
    pub id: String,
    #[serde(rename = "type")]
    pub signal_type: SignalType,
    pub token: String,
    pub token_name: String,
    /// Reference price at detection time
    pub price: f64,
    pub confidence: u8,
    pub urgency: Urgency,
    pub description: String,
    pub whales_involved: Vec<String>,
    pub volume_impact: f64,
    pub price_impact: f64,
    /// Estimated profit (%)
    pub estimated_profit: f64,
    pub time_window: String,
    pub auto_buy_recommended: bool,
    /// 0-100
    pub risk_level: u8,
    pub generated_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub evidence: SignalEvidence,
}

impl ActivitySignal {
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        self.expires_at > now
    }
}
