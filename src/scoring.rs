//! 📊 Activity Scoring
//!
//! Derives per-event scoring for feed events that arrive without it:
//! - Confidence: 50% wallet influence, 30% win rate, up to 20 points of size
//! - Impact: keyed on influence, then on USD size
//! - Profit potential: signed by direction (buys positive, sells negative)
//! - Time to profit: the wallet's average hold time, bounded to 2-50h

use uuid::Uuid;

use crate::types::{ActivityEvent, ActivityKind, ActivityScoring, Impact, TrackedWallet, WalletActivity};

const SIZE_POINTS_MAX: f64 = 20.0;
const USD_PER_SIZE_POINT: f64 = 5_000.0;
const MEDIUM_IMPACT_USD: f64 = 10_000.0;
const DEFAULT_TIME_TO_PROFIT_HOURS: f64 = 24.0;

pub fn score_activity(event: &ActivityEvent, wallet: Option<&TrackedWallet>) -> ActivityScoring {
    let (influence, win_rate, hold_hours) = wallet
        .map(|w| (w.influence as f64, w.win_rate, w.avg_hold_time_hours))
        .unwrap_or((0.0, 0.0, 0.0));

    let size_points = if event.usd_value.is_finite() {
        (event.usd_value.max(0.0) / USD_PER_SIZE_POINT).min(SIZE_POINTS_MAX)
    } else {
        0.0
    };
    let confidence = (influence * 0.5 + win_rate * 0.3 + size_points)
        .round()
        .clamp(0.0, 100.0) as u8;

    let impact = if influence > 95.0 {
        Impact::WhaleMove
    } else if influence > 85.0 {
        Impact::High
    } else if event.usd_value >= MEDIUM_IMPACT_USD {
        Impact::Medium
    } else {
        Impact::Low
    };

    let c = confidence as f64;
    let profit_potential = match event.kind {
        ActivityKind::Buy | ActivityKind::Stake => 20.0 + c * 0.8,
        ActivityKind::Sell | ActivityKind::Unstake => -(10.0 + c * 0.5),
        ActivityKind::Transfer => 0.0,
    };

    let time_to_profit_hours = if hold_hours > 0.0 {
        hold_hours.clamp(2.0, 50.0)
    } else {
        DEFAULT_TIME_TO_PROFIT_HOURS
    };

    ActivityScoring {
        confidence,
        impact,
        profit_potential,
        time_to_profit_hours,
    }
}

/// Turn a feed event into a ledger entry, scoring it if the feed didn't
pub fn build_activity(event: ActivityEvent, wallet: Option<&TrackedWallet>) -> WalletActivity {
    let scoring = match event.scoring {
        Some(scoring) => scoring,
        None => score_activity(&event, wallet),
    };
    let token_name = event
        .token_name
        .unwrap_or_else(|| format!("{} Token", event.token));

    WalletActivity {
        id: Uuid::new_v4().to_string(),
        wallet: event.wallet,
        kind: event.kind,
        token: event.token,
        token_name,
        amount: event.amount,
        usd_value: event.usd_value,
        price: event.price,
        timestamp: event.timestamp,
        tx_ref: event.tx_ref,
        scoring,
    }
}

/// Synthetic tx reference for events that don't carry one
pub fn synthetic_tx_ref() -> String {
    format!("sim{}", Uuid::new_v4().simple())
}
