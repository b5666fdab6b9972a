//! Coordinated buying: distinct wallets buying the same token within a few
//! seconds of each other.
//!
//! Per token the buys are walked in time order with a sliding window of
//! `coordination_window_secs`; the window holding the most distinct wallets
//! (earliest on ties) is the burst.

use chrono::{DateTime, Duration, Utc};
use std::collections::{BTreeMap, HashMap};
use tracing::debug;

use super::signal_id;
use crate::config::DetectionConfig;
use crate::types::{ActivityKind, ActivitySignal, SignalEvidence, SignalType, Urgency, WalletActivity};

const EXPIRY_HOURS: i64 = 24;
const CONFIDENCE: u8 = 95;
const RISK_LEVEL: u8 = 35;

/// Densest burst of distinct buyers for one token
struct Burst<'a> {
    buys: Vec<&'a WalletActivity>,
    wallets: Vec<&'a str>,
    span_secs: i64,
}

fn densest_burst<'a>(mut buys: Vec<&'a WalletActivity>, window: Duration) -> Option<Burst<'a>> {
    buys.sort_by_key(|a| a.timestamp);

    let mut best: Option<(usize, usize, usize)> = None; // (start, end, distinct)
    let mut counts: HashMap<&str, usize> = HashMap::new();
    let mut start = 0;

    for end in 0..buys.len() {
        *counts.entry(buys[end].wallet.as_str()).or_insert(0) += 1;

        while buys[end].timestamp - buys[start].timestamp > window {
            let wallet = buys[start].wallet.as_str();
            if let Some(n) = counts.get_mut(wallet) {
                *n -= 1;
                if *n == 0 {
                    counts.remove(wallet);
                }
            }
            start += 1;
        }

        let distinct = counts.len();
        if best.map(|(_, _, d)| distinct > d).unwrap_or(true) {
            best = Some((start, end, distinct));
        }
    }

    let (start, end, _) = best?;
    let slice = buys[start..=end].to_vec();
    let mut wallets: Vec<&str> = Vec::new();
    for a in &slice {
        if !wallets.contains(&a.wallet.as_str()) {
            wallets.push(a.wallet.as_str());
        }
    }
    let span_secs = (slice[slice.len() - 1].timestamp - slice[0].timestamp).num_seconds();

    Some(Burst {
        buys: slice,
        wallets,
        span_secs,
    })
}

pub fn detect(
    recent: &[&WalletActivity],
    config: &DetectionConfig,
    now: DateTime<Utc>,
) -> Vec<ActivitySignal> {
    let window = Duration::seconds(config.coordination_window_secs);

    let mut by_token: BTreeMap<&str, Vec<&WalletActivity>> = BTreeMap::new();
    for activity in recent.iter().filter(|a| a.kind == ActivityKind::Buy) {
        by_token.entry(activity.token.as_str()).or_default().push(*activity);
    }

    let mut signals = Vec::new();

    for (token, buys) in by_token {
        let Some(burst) = densest_burst(buys, window) else {
            continue;
        };
        let n = burst.wallets.len();
        if n < config.coordination_min_wallets {
            continue;
        }

        let newest = burst.buys[burst.buys.len() - 1];
        let volume: f64 = burst.buys.iter().map(|a| a.usd_value).sum();
        let mean_profit =
            burst.buys.iter().map(|a| a.scoring.profit_potential).sum::<f64>() / burst.buys.len() as f64;

        debug!(
            "🤝 Coordinated buying on {}: {} wallets within {}s (${:.0})",
            token, n, burst.span_secs, volume
        );

        signals.push(ActivitySignal {
            id: signal_id("coord", token),
            signal_type: SignalType::CoordinatedBuying,
            token: token.to_string(),
            token_name: newest.token_name.clone(),
            price: newest.price,
            confidence: CONFIDENCE,
            urgency: Urgency::High,
            description: format!("{} major whales simultaneously accumulating {}", n, token),
            whales_involved: burst.wallets.iter().map(|w| w.to_string()).collect(),
            volume_impact: (n as f64 * 25.0).min(100.0),
            price_impact: (n as f64 * 8.0).min(100.0),
            estimated_profit: mean_profit.clamp(0.0, 100.0),
            time_window: "6-24 hours".to_string(),
            auto_buy_recommended: true,
            risk_level: RISK_LEVEL,
            generated_at: now,
            expires_at: now + Duration::hours(EXPIRY_HOURS),
            evidence: SignalEvidence::Coordinated {
                wallets: n,
                window_secs: config.coordination_window_secs,
                span_secs: burst.span_secs,
            },
        });
    }

    signals
}
