//! Whale accumulation: several distinct wallets buying the same token with
//! enough combined volume inside the detection window.

use chrono::{DateTime, Duration, Utc};
use tracing::debug;

use super::{group_by_token, signal_id};
use crate::config::DetectionConfig;
use crate::types::{ActivityKind, ActivitySignal, SignalEvidence, SignalType, Urgency, WalletActivity};

const EXPIRY_HOURS: i64 = 12;

pub fn detect(
    recent: &[&WalletActivity],
    config: &DetectionConfig,
    now: DateTime<Utc>,
) -> Vec<ActivitySignal> {
    let mut signals = Vec::new();

    for (token, flow) in group_by_token(recent, ActivityKind::Buy) {
        let wallets = flow.wallets.len();
        if wallets < config.accumulation_min_wallets || flow.volume_usd <= config.accumulation_min_volume_usd {
            continue;
        }

        debug!(
            "🐋 Accumulation on {}: {} wallets, {} buys, ${:.0}",
            token, wallets, flow.count, flow.volume_usd
        );

        signals.push(ActivitySignal {
            id: signal_id("accum", token),
            signal_type: SignalType::WhaleAccumulation,
            token: token.to_string(),
            token_name: flow.token_name.to_string(),
            price: flow.price,
            confidence: (wallets * 20 + 40).min(95) as u8,
            urgency: if flow.volume_usd > config.critical_volume_usd {
                Urgency::Critical
            } else {
                Urgency::High
            },
            description: format!(
                "{} whales accumulating {} with ${:.0} volume",
                wallets, token, flow.volume_usd
            ),
            whales_involved: flow.wallets.iter().map(|w| w.to_string()).collect(),
            volume_impact: (flow.volume_usd / 1000.0).min(100.0),
            price_impact: (wallets as f64 * 5.0).min(50.0),
            estimated_profit: flow.mean_profit().clamp(0.0, 100.0),
            time_window: "2-12 hours".to_string(),
            auto_buy_recommended: flow.volume_usd > config.auto_buy_volume_usd,
            risk_level: (60 - wallets as i64 * 10).max(20) as u8,
            generated_at: now,
            expires_at: now + Duration::hours(EXPIRY_HOURS),
            evidence: SignalEvidence::Accumulation {
                buyers: wallets,
                buy_count: flow.count,
                total_volume_usd: flow.volume_usd,
            },
        });
    }

    signals
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::ActivityLedger;
    use crate::signals::test_support::{activity, t0};

    #[test]
    fn test_three_whales_80k_bonk() {
        let mut ledger = ActivityLedger::new(100);
        ledger.append(activity("1", "W1", ActivityKind::Buy, "BONK", 30_000.0, t0() - Duration::minutes(40))).unwrap();
        ledger.append(activity("2", "W2", ActivityKind::Buy, "BONK", 25_000.0, t0() - Duration::minutes(20))).unwrap();
        ledger.append(activity("3", "W3", ActivityKind::Buy, "BONK", 25_000.0, t0() - Duration::minutes(5))).unwrap();

        let recent = ledger.recent(Duration::minutes(60), t0());
        let signals = detect(&recent, &DetectionConfig::default(), t0());

        assert_eq!(signals.len(), 1);
        let s = &signals[0];
        assert_eq!(s.signal_type, SignalType::WhaleAccumulation);
        assert_eq!(s.token, "BONK");
        assert!(s.auto_buy_recommended);
        assert_eq!(s.urgency, Urgency::High);
        assert_eq!(s.confidence, 95);
        assert_eq!(s.risk_level, 30);
        assert_eq!(s.volume_impact, 80.0);
        assert_eq!(s.price_impact, 15.0);
        assert_eq!(s.expires_at, t0() + Duration::hours(12));
        assert_eq!(s.whales_involved, vec!["W3", "W2", "W1"]);
    }

    #[test]
    fn test_single_wallet_or_low_volume_does_not_trigger() {
        let config = DetectionConfig::default();
        let a = activity("1", "W1", ActivityKind::Buy, "WIF", 40_000.0, t0());
        let b = activity("2", "W1", ActivityKind::Buy, "WIF", 40_000.0, t0());
        assert!(detect(&[&a, &b], &config, t0()).is_empty());

        let c = activity("3", "W2", ActivityKind::Buy, "MYRO", 20_000.0, t0());
        let d = activity("4", "W3", ActivityKind::Buy, "MYRO", 30_000.0, t0());
        // Exactly $50k is not above the threshold
        assert!(detect(&[&c, &d], &config, t0()).is_empty());
    }

    #[test]
    fn test_large_volume_is_critical_and_risk_floor_holds() {
        let buys: Vec<WalletActivity> = (0..5)
            .map(|i| activity(&i.to_string(), &format!("W{}", i), ActivityKind::Buy, "POPCAT", 30_000.0, t0()))
            .collect();
        let recent: Vec<&WalletActivity> = buys.iter().collect();

        let signals = detect(&recent, &DetectionConfig::default(), t0());
        assert_eq!(signals[0].urgency, Urgency::Critical);
        assert_eq!(signals[0].risk_level, 20);
        assert_eq!(signals[0].volume_impact, 100.0);
    }

    #[test]
    fn test_sells_are_ignored() {
        let a = activity("1", "W1", ActivityKind::Sell, "BONK", 60_000.0, t0());
        let b = activity("2", "W2", ActivityKind::Sell, "BONK", 60_000.0, t0());
        assert!(detect(&[&a, &b], &DetectionConfig::default(), t0()).is_empty());
    }
}
