//! 📋 Coin Report Synthesizer
//!
//! Read-only snapshot for one token built from the ledger, registry, relation
//! set and signal book. Pure function of its inputs and `now`: no randomness,
//! no caching. Sparse data falls back to neutral/hold defaults.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};

use crate::ledger::ActivityLedger;
use crate::policy::AutoBuyPolicy;
use crate::registry::WalletRegistry;
use crate::relations::RelationSet;
use crate::signals::SignalBook;
use crate::types::{ActivityKind, ActivitySignal, WalletActivity};

const LOOKBACK_HOURS: i64 = 24;
const RSI_PERIOD: usize = 14;
const RECENT_MOVES: usize = 5;
const NEUTRAL_CONFIDENCE: f64 = 50.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sentiment {
    Bullish,
    Bearish,
    Neutral,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Trend {
    Uptrend,
    Downtrend,
    Sideways,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    StrongBuy,
    Buy,
    Hold,
    Sell,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketSnapshot {
    pub current_price: f64,
    pub price_change_24h_pct: f64,
    pub volume_24h_usd: f64,
    pub trades_24h: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WhaleActivity {
    pub accumulating: Vec<String>,
    pub selling: Vec<String>,
    pub total_whale_volume_usd: f64,
    /// Buy USD minus sell USD
    pub net_flow_usd: f64,
    /// Relations whose shared tokens include this token
    pub related_pairs: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SmartMoney {
    pub sentiment: Sentiment,
    pub confidence: f64,
    pub recent_moves: Vec<WalletActivity>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TechnicalSnapshot {
    pub trend: Trend,
    pub support: [f64; 2],
    pub resistance: [f64; 2],
    pub rsi: f64,
    pub momentum: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OnChainMetrics {
    pub unique_buyers_24h: usize,
    pub unique_sellers_24h: usize,
    pub avg_transaction_size_usd: f64,
    pub total_volume_usd: f64,
    /// Share of buy volume from the top 3 buyers (%)
    pub buy_concentration_pct: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfitEstimate {
    pub probability: f64,
    pub expected_return_pct: f64,
    pub time_horizon: String,
    pub risk_adjusted_return_pct: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuyRecommendation {
    pub action: Action,
    pub confidence: f64,
    pub reasoning: String,
    pub suggested_position_usd: f64,
    pub entry_price: f64,
    pub stop_loss: f64,
    pub take_profit: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoinReport {
    pub token: String,
    pub token_name: String,
    pub generated_at: DateTime<Utc>,
    pub market: MarketSnapshot,
    pub whale_activity: WhaleActivity,
    pub smart_money: SmartMoney,
    pub technical: TechnicalSnapshot,
    pub on_chain: OnChainMetrics,
    pub signals: Vec<ActivitySignal>,
    pub profit_estimate: ProfitEstimate,
    pub risk_factors: Vec<String>,
    pub recommendation: BuyRecommendation,
}

/// Everything the report reads
pub struct ReportInputs<'a> {
    pub ledger: &'a ActivityLedger,
    pub registry: &'a WalletRegistry,
    pub relations: &'a RelationSet,
    pub signals: &'a SignalBook,
    pub policy: &'a AutoBuyPolicy,
}

pub fn build_report(token: &str, inputs: &ReportInputs<'_>, now: DateTime<Utc>) -> CoinReport {
    let cutoff = now - Duration::hours(LOOKBACK_HOURS);

    // Newest first
    let activity: Vec<&WalletActivity> = inputs
        .ledger
        .by_token(token)
        .into_iter()
        .filter(|a| a.timestamp >= cutoff && a.timestamp <= now)
        .collect();
    let whale_moves: Vec<&WalletActivity> = activity
        .iter()
        .copied()
        .filter(|a| inputs.registry.contains(&a.wallet))
        .collect();

    let whale_activity = whale_flow(token, &whale_moves, inputs.relations);

    let signals: Vec<ActivitySignal> = inputs
        .signals
        .iter()
        .filter(|s| s.token == token && s.generated_at >= cutoff && s.is_active(now))
        .cloned()
        .collect();
    let bullish = signals.iter().filter(|s| s.signal_type.is_bullish()).count();
    let bearish = signals.iter().filter(|s| s.signal_type.is_bearish()).count();
    let sentiment = if bullish > bearish {
        Sentiment::Bullish
    } else if bearish > bullish {
        Sentiment::Bearish
    } else {
        Sentiment::Neutral
    };
    let baseline = if signals.is_empty() {
        NEUTRAL_CONFIDENCE
    } else {
        signals.iter().map(|s| s.confidence as f64).sum::<f64>() / signals.len() as f64
    };

    let market = market_snapshot(&activity);
    let price = market.current_price;

    let token_name = activity
        .first()
        .map(|a| a.token_name.clone())
        .or_else(|| signals.first().map(|s| s.token_name.clone()))
        .unwrap_or_else(|| format!("{} Token", token));

    let technical = TechnicalSnapshot {
        trend: match sentiment {
            Sentiment::Bullish => Trend::Uptrend,
            Sentiment::Bearish => Trend::Downtrend,
            Sentiment::Neutral => Trend::Sideways,
        },
        support: [price * 0.9, price * 0.85],
        resistance: [price * 1.1, price * 1.2],
        rsi: rsi(&activity),
        momentum: momentum(&activity),
    };

    let profit_estimate = profit_estimate(sentiment, baseline, whale_activity.net_flow_usd);
    let recommendation = recommend(
        sentiment,
        baseline,
        whale_activity.accumulating.len(),
        price,
        inputs.policy.max_position_size_usd,
    );

    CoinReport {
        token: token.to_string(),
        token_name,
        generated_at: now,
        market,
        smart_money: SmartMoney {
            sentiment,
            confidence: baseline,
            recent_moves: whale_moves.iter().take(RECENT_MOVES).map(|a| (*a).clone()).collect(),
        },
        whale_activity,
        technical,
        on_chain: on_chain_metrics(&activity),
        signals,
        profit_estimate,
        risk_factors: risk_factors(sentiment),
        recommendation,
    }
}

fn whale_flow(token: &str, moves: &[&WalletActivity], relations: &RelationSet) -> WhaleActivity {
    let mut accumulating = BTreeSet::new();
    let mut selling = BTreeSet::new();
    let mut buy_usd = 0.0;
    let mut sell_usd = 0.0;

    for a in moves {
        match a.kind {
            ActivityKind::Buy => {
                accumulating.insert(a.wallet.clone());
                buy_usd += a.usd_value;
            }
            ActivityKind::Sell => {
                selling.insert(a.wallet.clone());
                sell_usd += a.usd_value;
            }
            _ => {}
        }
    }

    WhaleActivity {
        accumulating: accumulating.into_iter().collect(),
        selling: selling.into_iter().collect(),
        total_whale_volume_usd: moves.iter().map(|a| a.usd_value).sum(),
        net_flow_usd: buy_usd - sell_usd,
        related_pairs: relations.iter().filter(|r| r.shared_tokens.contains(token)).count(),
    }
}

fn market_snapshot(activity: &[&WalletActivity]) -> MarketSnapshot {
    let current_price = activity.first().map(|a| a.price).unwrap_or(0.0);
    let oldest_price = activity.last().map(|a| a.price).unwrap_or(0.0);
    let price_change_24h_pct = if activity.len() >= 2 && oldest_price > 0.0 {
        (current_price - oldest_price) / oldest_price * 100.0
    } else {
        0.0
    };

    MarketSnapshot {
        current_price,
        price_change_24h_pct,
        volume_24h_usd: activity.iter().map(|a| a.usd_value).sum(),
        trades_24h: activity.len(),
    }
}

/// RSI over the last 14 price changes (oldest to newest); 50 when sparse
fn rsi(activity: &[&WalletActivity]) -> f64 {
    if activity.len() <= RSI_PERIOD {
        return 50.0;
    }

    let prices: Vec<f64> = activity.iter().take(RSI_PERIOD + 1).rev().map(|a| a.price).collect();
    let (mut gains, mut losses) = (0.0, 0.0);
    for pair in prices.windows(2) {
        let change = pair[1] - pair[0];
        if change > 0.0 {
            gains += change;
        } else {
            losses -= change;
        }
    }

    if gains == 0.0 && losses == 0.0 {
        return 50.0;
    }
    if losses == 0.0 {
        return 100.0;
    }
    let rs = (gains / RSI_PERIOD as f64) / (losses / RSI_PERIOD as f64);
    100.0 - 100.0 / (1.0 + rs)
}

/// 0-100, 50 = balanced buy/sell volume
fn momentum(activity: &[&WalletActivity]) -> f64 {
    let (buy, sell) = activity.iter().fold((0.0, 0.0), |(b, s), a| match a.kind {
        ActivityKind::Buy => (b + a.usd_value, s),
        ActivityKind::Sell => (b, s + a.usd_value),
        _ => (b, s),
    });
    if buy + sell <= 0.0 {
        return 50.0;
    }
    50.0 + 50.0 * (buy - sell) / (buy + sell)
}

fn on_chain_metrics(activity: &[&WalletActivity]) -> OnChainMetrics {
    let mut buyers: HashMap<&str, f64> = HashMap::new();
    let mut sellers = BTreeSet::new();
    for a in activity {
        match a.kind {
            ActivityKind::Buy => *buyers.entry(a.wallet.as_str()).or_insert(0.0) += a.usd_value,
            ActivityKind::Sell => {
                sellers.insert(a.wallet.as_str());
            }
            _ => {}
        }
    }

    let total_volume_usd: f64 = activity.iter().map(|a| a.usd_value).sum();
    let avg_transaction_size_usd = if activity.is_empty() {
        0.0
    } else {
        total_volume_usd / activity.len() as f64
    };

    let buy_total: f64 = buyers.values().sum();
    let mut per_buyer: Vec<f64> = buyers.values().copied().collect();
    per_buyer.sort_by(|a, b| b.total_cmp(a));
    let top3: f64 = per_buyer.iter().take(3).sum();
    let buy_concentration_pct = if buy_total > 0.0 { top3 / buy_total * 100.0 } else { 0.0 };

    OnChainMetrics {
        unique_buyers_24h: buyers.len(),
        unique_sellers_24h: sellers.len(),
        avg_transaction_size_usd,
        total_volume_usd,
        buy_concentration_pct,
    }
}

fn profit_estimate(sentiment: Sentiment, baseline: f64, net_flow_usd: f64) -> ProfitEstimate {
    let c = baseline / 100.0;
    let (probability, expected_return_pct) = match sentiment {
        Sentiment::Bullish => (60.0 + 30.0 * c, 20.0 + 80.0 * c),
        Sentiment::Bearish => (20.0 + 40.0 * c, -(10.0 + 40.0 * c)),
        Sentiment::Neutral => (30.0 + 20.0 * c, (net_flow_usd / 10_000.0).clamp(-20.0, 20.0)),
    };
    ProfitEstimate {
        probability,
        expected_return_pct,
        time_horizon: "2-14 days".to_string(),
        risk_adjusted_return_pct: expected_return_pct * probability / 100.0,
    }
}

fn risk_factors(sentiment: Sentiment) -> Vec<String> {
    let factors: [&str; 3] = match sentiment {
        Sentiment::Bearish => ["High selling pressure", "Whale distribution", "Technical breakdown"],
        Sentiment::Bullish => ["Market volatility", "Profit taking potential", "Regulatory concerns"],
        Sentiment::Neutral => ["Market uncertainty", "Mixed signals", "Low conviction"],
    };
    factors.iter().map(|f| f.to_string()).collect()
}

fn recommend(
    sentiment: Sentiment,
    baseline: f64,
    accumulating: usize,
    price: f64,
    max_position: f64,
) -> BuyRecommendation {
    let confidence = (baseline + accumulating as f64 * 10.0).min(95.0);

    let (action, confidence, reasoning, size, stop, target) = match sentiment {
        Sentiment::Bullish if confidence > 80.0 => (
            Action::StrongBuy,
            confidence,
            format!("Strong whale accumulation with {} whales buying", accumulating),
            max_position.min(2000.0),
            0.85,
            1.4,
        ),
        Sentiment::Bullish if confidence > 60.0 => (
            Action::Buy,
            confidence,
            "Positive whale sentiment with moderate confidence".to_string(),
            (max_position * 0.6).min(1000.0),
            0.9,
            1.25,
        ),
        Sentiment::Bearish => (
            Action::Sell,
            100.0 - confidence,
            "Whale distribution detected, avoid or exit positions".to_string(),
            0.0,
            1.1,
            0.8,
        ),
        _ => (
            Action::Hold,
            NEUTRAL_CONFIDENCE,
            "Mixed signals, wait for clearer direction".to_string(),
            (max_position * 0.3).min(500.0),
            0.9,
            1.15,
        ),
    };

    BuyRecommendation {
        action,
        confidence,
        reasoning,
        suggested_position_usd: size,
        entry_price: price,
        stop_loss: price * stop,
        take_profit: price * target,
    }
}
