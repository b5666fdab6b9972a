//! Mass exit: the bearish mirror of accumulation. Several distinct wallets
//! selling the same token with enough combined volume.

use chrono::{DateTime, Duration, Utc};
use tracing::debug;

use super::{group_by_token, signal_id};
use crate::config::DetectionConfig;
use crate::types::{ActivityKind, ActivitySignal, SignalEvidence, SignalType, Urgency, WalletActivity};

const EXPIRY_HOURS: i64 = 6;
const RISK_LEVEL: u8 = 80;

pub fn detect(
    recent: &[&WalletActivity],
    config: &DetectionConfig,
    now: DateTime<Utc>,
) -> Vec<ActivitySignal> {
    let mut signals = Vec::new();

    for (token, flow) in group_by_token(recent, ActivityKind::Sell) {
        let wallets = flow.wallets.len();
        if wallets < config.mass_exit_min_wallets || flow.volume_usd <= config.mass_exit_min_volume_usd {
            continue;
        }

        debug!(
            "🏃 Mass exit on {}: {} wallets, {} sells, ${:.0}",
            token, wallets, flow.count, flow.volume_usd
        );

        signals.push(ActivitySignal {
            id: signal_id("exit", token),
            signal_type: SignalType::MassExit,
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
                "{} whales exiting {} with ${:.0} sold",
                wallets, token, flow.volume_usd
            ),
            whales_involved: flow.wallets.iter().map(|w| w.to_string()).collect(),
            volume_impact: (flow.volume_usd / 1000.0).min(100.0),
            price_impact: (wallets as f64 * 5.0).min(50.0),
            estimated_profit: flow.mean_profit().clamp(-100.0, 0.0),
            time_window: "0-6 hours".to_string(),
            auto_buy_recommended: false,
            risk_level: RISK_LEVEL,
            generated_at: now,
            expires_at: now + Duration::hours(EXPIRY_HOURS),
            evidence: SignalEvidence::MassExit {
                sellers: wallets,
                sell_count: flow.count,
                total_volume_usd: flow.volume_usd,
            },
        });
    }

    signals
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signals::test_support::{activity, t0};

    #[test]
    fn test_two_sellers_over_threshold() {
        let a = activity("1", "W1", ActivityKind::Sell, "SLERF", 40_000.0, t0());
        let b = activity("2", "W2", ActivityKind::Sell, "SLERF", 70_000.0, t0());

        let signals = detect(&[&a, &b], &DetectionConfig::default(), t0());
        assert_eq!(signals.len(), 1);
        let s = &signals[0];
        assert_eq!(s.signal_type, SignalType::MassExit);
        assert!(!s.auto_buy_recommended);
        assert_eq!(s.urgency, Urgency::Critical);
        assert_eq!(s.risk_level, 80);
        assert_eq!(s.estimated_profit, -30.0);
        assert_eq!(s.expires_at, t0() + Duration::hours(6));
    }

    #[test]
    fn test_buys_do_not_count_as_exit() {
        let a = activity("1", "W1", ActivityKind::Buy, "SLERF", 40_000.0, t0());
        let b = activity("2", "W2", ActivityKind::Sell, "SLERF", 70_000.0, t0());
        assert!(detect(&[&a, &b], &DetectionConfig::default(), t0()).is_empty());
    }
}
