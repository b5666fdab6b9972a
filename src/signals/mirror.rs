//! 🎭 Copy-trade mirror
//!
//! Buys by followed wallets are queued and released as smart-money-entry
//! signals once the copy-trade delay has elapsed since the followed buy.
//! Bounded: when full the oldest pending entry is dropped.

use chrono::{DateTime, Duration, Utc};
use std::collections::{HashSet, VecDeque};
use tracing::{debug, warn};

use super::signal_id;
use crate::registry::WalletRegistry;
use crate::types::{
    short_addr, ActivityKind, ActivitySignal, Impact, RiskTier, SignalEvidence, SignalType, Urgency,
    WalletActivity,
};

const EXPIRY_HOURS: i64 = 12;

#[derive(Debug, Clone)]
struct PendingMirror {
    activity: WalletActivity,
    due_at: DateTime<Utc>,
    delay_secs: u64,
}

pub struct CopyTradeMirror {
    pending: VecDeque<PendingMirror>,
    queued_ids: HashSet<String>,
    max_pending: usize,
}

impl CopyTradeMirror {
    pub fn new(max_pending: usize) -> Self {
        Self {
            pending: VecDeque::with_capacity(max_pending),
            queued_ids: HashSet::new(),
            max_pending,
        }
    }

    /// Queue a buy if its wallet is followed. Returns true if queued.
    pub fn observe(&mut self, activity: &WalletActivity, follow: &[String], delay_secs: u64) -> bool {
        if activity.kind != ActivityKind::Buy || !follow.iter().any(|w| w == &activity.wallet) {
            return false;
        }
        if self.queued_ids.contains(&activity.id) {
            return false;
        }
        let Some(due_at) = due_time(activity.timestamp, delay_secs) else {
            warn!(
                "⚠️  Mirror: delay {}s out of range for {} buy at {}, skipped",
                delay_secs,
                short_addr(&activity.wallet),
                activity.timestamp
            );
            return false;
        };

        if self.pending.len() >= self.max_pending {
            if let Some(dropped) = self.pending.pop_front() {
                self.queued_ids.remove(&dropped.activity.id);
                warn!(
                    "⚠️  Mirror queue full, dropped {} buy of {}",
                    short_addr(&dropped.activity.wallet),
                    dropped.activity.token
                );
            }
        }

        self.queued_ids.insert(activity.id.clone());
        self.pending.push_back(PendingMirror {
            activity: activity.clone(),
            due_at,
            delay_secs,
        });
        debug!(
            "📥 Mirror: queued {} {} (due {})",
            short_addr(&activity.wallet),
            activity.token,
            due_at
        );
        true
    }

    /// Release every entry whose delay has passed
    pub fn drain_due(&mut self, registry: &WalletRegistry, now: DateTime<Utc>) -> Vec<ActivitySignal> {
        let mut released = Vec::new();
        let mut still_pending = VecDeque::with_capacity(self.pending.len());

        for entry in self.pending.drain(..) {
            if entry.due_at <= now {
                self.queued_ids.remove(&entry.activity.id);
                released.push(entry);
            } else {
                still_pending.push_back(entry);
            }
        }
        self.pending = still_pending;

        released
            .into_iter()
            .map(|entry| mirror_signal(entry, registry, now))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

fn due_time(at: DateTime<Utc>, delay_secs: u64) -> Option<DateTime<Utc>> {
    let delay = Duration::try_seconds(i64::try_from(delay_secs).ok()?)?;
    at.checked_add_signed(delay)
}

fn mirror_signal(entry: PendingMirror, registry: &WalletRegistry, now: DateTime<Utc>) -> ActivitySignal {
    let activity = entry.activity;
    let wallet = registry.get_wallet(&activity.wallet);
    let risk_tier = wallet.map(|w| w.risk_tier).unwrap_or(RiskTier::Moderate);
    let label = wallet
        .map(|w| w.label.clone())
        .unwrap_or_else(|| short_addr(&activity.wallet).to_string());

    ActivitySignal {
        id: signal_id("mirror", &activity.token),
        signal_type: SignalType::SmartMoneyEntry,
        token: activity.token.clone(),
        token_name: activity.token_name.clone(),
        price: activity.price,
        confidence: activity.scoring.confidence,
        urgency: if activity.scoring.impact >= Impact::High {
            Urgency::High
        } else {
            Urgency::Medium
        },
        description: format!(
            "{} entered {} (${:.0}), mirrored after {}s",
            label, activity.token, activity.usd_value, entry.delay_secs
        ),
        whales_involved: vec![activity.wallet.clone()],
        volume_impact: (activity.usd_value / 1000.0).min(100.0),
        price_impact: 5.0,
        estimated_profit: activity.scoring.profit_potential.clamp(0.0, 100.0),
        time_window: "1-12 hours".to_string(),
        auto_buy_recommended: true,
        risk_level: risk_tier.signal_risk(),
        generated_at: now,
        expires_at: now + Duration::hours(EXPIRY_HOURS),
        evidence: SignalEvidence::MirroredEntry {
            wallet: activity.wallet,
            activity_id: activity.id,
            delay_secs: entry.delay_secs,
        },
    }
}
