//! 🚨 Signal detection
//!
//! Detectors are pure: recent ledger window in, candidate signals out. The
//! `SignalBook` owns emitted signals and decides what gets in (suppression)
//! and what stays (retention).

pub mod accumulation;
pub mod coordination;
pub mod exit;
pub mod mirror;

use chrono::{DateTime, Duration, Utc};
use std::collections::{BTreeMap, VecDeque};
use tracing::debug;
use uuid::Uuid;

use crate::config::DetectionConfig;
use crate::ledger::ActivityLedger;
use crate::types::{ActivityKind, ActivitySignal, SignalType, WalletActivity};

pub use mirror::CopyTradeMirror;

/// Per-token aggregate of one side of the flow (buys or sells)
#[derive(Debug)]
pub(crate) struct TokenFlow<'a> {
    pub token_name: &'a str,
    /// Price of the newest contributing activity
    pub price: f64,
    /// Distinct wallets, in order of their newest activity
    pub wallets: Vec<&'a str>,
    pub count: usize,
    pub volume_usd: f64,
    pub profit_sum: f64,
}

impl TokenFlow<'_> {
    pub fn mean_profit(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.profit_sum / self.count as f64
        }
    }
}

/// Group a newest-first window by token, keeping only `kind`
pub(crate) fn group_by_token<'a>(
    recent: &[&'a WalletActivity],
    kind: ActivityKind,
) -> BTreeMap<&'a str, TokenFlow<'a>> {
    let mut groups: BTreeMap<&'a str, TokenFlow<'a>> = BTreeMap::new();

    for activity in recent.iter().filter(|a| a.kind == kind) {
        let flow = groups.entry(activity.token.as_str()).or_insert_with(|| TokenFlow {
            token_name: activity.token_name.as_str(),
            price: activity.price,
            wallets: Vec::new(),
            count: 0,
            volume_usd: 0.0,
            profit_sum: 0.0,
        });
        flow.count += 1;
        flow.volume_usd += activity.usd_value;
        flow.profit_sum += activity.scoring.profit_potential;
        if !flow.wallets.contains(&activity.wallet.as_str()) {
            flow.wallets.push(activity.wallet.as_str());
        }
    }

    groups
}

pub(crate) fn signal_id(prefix: &str, token: &str) -> String {
    format!("{}-{}-{}", prefix, token, Uuid::new_v4().simple())
}

/// Run every window detector over the ledger's recent entries
pub fn detect(ledger: &ActivityLedger, config: &DetectionConfig, now: DateTime<Utc>) -> Vec<ActivitySignal> {
    let recent = ledger.recent(config.window(), now);
    if recent.is_empty() {
        return Vec::new();
    }

    let mut candidates = accumulation::detect(&recent, config, now);
    candidates.extend(coordination::detect(&recent, config, now));
    candidates.extend(exit::detect(&recent, config, now));
    candidates
}

/// Result of admitting candidates into the book
#[derive(Debug, Default)]
pub struct Admission {
    pub emitted: Vec<ActivitySignal>,
    pub suppressed: Vec<(SignalType, String)>,
    pub evicted: usize,
}

/// Retention-bounded signal store, newest first
pub struct SignalBook {
    signals: VecDeque<ActivitySignal>,
    retention: usize,
}

impl SignalBook {
    pub fn new(retention: usize) -> Self {
        Self {
            signals: VecDeque::with_capacity(retention + 1),
            retention,
        }
    }

    /// True if a live signal of this type/token was generated inside `window`
    pub fn is_suppressed(
        &self,
        signal_type: SignalType,
        token: &str,
        now: DateTime<Utc>,
        window: Duration,
    ) -> bool {
        let cutoff = now - window;
        self.signals.iter().any(|s| {
            s.signal_type == signal_type && s.token == token && s.is_active(now) && s.generated_at > cutoff
        })
    }

    /// Insert without checks; enforces retention. Returns evicted count.
    pub fn emit(&mut self, signal: ActivitySignal) -> usize {
        self.signals.push_front(signal);
        let mut evicted = 0;
        while self.signals.len() > self.retention {
            self.signals.pop_back();
            evicted += 1;
        }
        evicted
    }

    /// Emit candidates in order, each checked against what is already in
    pub fn admit(
        &mut self,
        candidates: Vec<ActivitySignal>,
        suppression: Duration,
        now: DateTime<Utc>,
    ) -> Admission {
        let mut admission = Admission::default();

        for signal in candidates {
            if self.is_suppressed(signal.signal_type, &signal.token, now, suppression) {
                debug!("🔇 Suppressed {} for {}", signal.signal_type.as_str(), signal.token);
                admission.suppressed.push((signal.signal_type, signal.token));
                continue;
            }
            admission.evicted += self.emit(signal.clone());
            admission.emitted.push(signal);
        }

        admission
    }

    /// Unexpired signals, highest confidence first (newest first on ties)
    pub fn active(&self, now: DateTime<Utc>) -> Vec<ActivitySignal> {
        let mut active: Vec<ActivitySignal> =
            self.signals.iter().filter(|s| s.is_active(now)).cloned().collect();
        active.sort_by(|a, b| {
            b.confidence
                .cmp(&a.confidence)
                .then_with(|| b.generated_at.cmp(&a.generated_at))
        });
        active
    }

    pub fn get(&self, id: &str) -> Option<&ActivitySignal> {
        self.signals.iter().find(|s| s.id == id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ActivitySignal> {
        self.signals.iter()
    }

    pub fn len(&self) -> usize {
        self.signals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.signals.is_empty()
    }
}
