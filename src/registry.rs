//! 👛 Wallet Registry
//!
//! Known tracked wallets keyed by address. Append-only: wallets are inserted
//! or replaced, never removed.

use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use std::collections::HashMap;
use tracing::debug;

use crate::error::RegistryError;
use crate::ledger::ActivityLedger;
use crate::types::{short_addr, TrackedWallet, WalletActivity};

pub struct WalletRegistry {
    wallets: HashMap<String, TrackedWallet>,
    auto_register: bool,
}

impl WalletRegistry {
    pub fn new(auto_register: bool) -> Self {
        Self {
            wallets: HashMap::new(),
            auto_register,
        }
    }

    /// Insert or replace a wallet by address
    pub fn upsert_wallet(&mut self, wallet: TrackedWallet) -> Result<(), RegistryError> {
        if wallet.address.trim().is_empty() {
            return Err(RegistryError::EmptyAddress);
        }
        self.wallets.insert(wallet.address.clone(), wallet);
        Ok(())
    }

    pub fn get_wallet(&self, address: &str) -> Option<&TrackedWallet> {
        self.wallets.get(address)
    }

    pub fn contains(&self, address: &str) -> bool {
        self.wallets.contains_key(address)
    }

    /// Influence descending, address ascending on ties
    pub fn list_wallets(&self) -> Vec<TrackedWallet> {
        let mut wallets: Vec<TrackedWallet> = self.wallets.values().cloned().collect();
        wallets.sort_by(|a, b| b.influence.cmp(&a.influence).then_with(|| a.address.cmp(&b.address)));
        wallets
    }

    /// Addresses in ascending order (stable pair iteration for inference)
    pub fn addresses(&self) -> Vec<&str> {
        let mut addresses: Vec<&str> = self.wallets.keys().map(|a| a.as_str()).collect();
        addresses.sort_unstable();
        addresses
    }

    pub fn len(&self) -> usize {
        self.wallets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.wallets.is_empty()
    }

    /// Account for a freshly appended activity. Returns true if the wallet
    /// was registered by this call.
    pub fn observe_activity(&mut self, activity: &WalletActivity) -> bool {
        if let Some(wallet) = self.wallets.get_mut(&activity.wallet) {
            wallet.total_tx_count += 1;
            if activity.timestamp > wallet.last_activity {
                wallet.last_activity = activity.timestamp;
            }
            return false;
        }

        if !self.auto_register {
            return false;
        }

        let mut wallet = TrackedWallet::discovered(&activity.wallet, activity.timestamp);
        wallet.total_tx_count = 1;
        wallet.preferred_tokens.push(activity.token.clone());
        debug!("🆕 Registered wallet {} on first activity", short_addr(&activity.wallet));
        self.wallets.insert(activity.wallet.clone(), wallet);
        true
    }

    /// Periodic bookkeeping: balance drift and `last_activity` refresh
    pub fn refresh_metrics<R: Rng>(
        &mut self,
        ledger: &ActivityLedger,
        activity_window: Duration,
        rng: &mut R,
        now: DateTime<Utc>,
    ) {
        let recent = ledger.recent(activity_window, now);

        for (address, wallet) in self.wallets.iter_mut() {
            // Slight positive bias, bounded to +/-2.5% per tick
            let change = (rng.gen::<f64>() - 0.48) * 0.05;
            wallet.balance = (wallet.balance * (1.0 + change)).max(0.0);

            if let Some(latest) = recent.iter().find(|a| &a.wallet == address) {
                if latest.timestamp > wallet.last_activity {
                    wallet.last_activity = latest.timestamp;
                }
            }
        }

        debug!("🔄 Refreshed metrics for {} wallets", self.wallets.len());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ActivityKind, ActivityScoring, Impact, RiskTier};
    use chrono::TimeZone;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
    }

    fn wallet(address: &str, influence: u8) -> TrackedWallet {
        let mut w = TrackedWallet::discovered(address, t0() - Duration::days(1));
        w.influence = influence;
        w.balance = 1000.0;
        w.risk_tier = RiskTier::Aggressive;
        w
    }

    fn activity(wallet: &str, at: DateTime<Utc>) -> WalletActivity {
        WalletActivity {
            id: format!("{}-{}", wallet, at.timestamp()),
            wallet: wallet.to_string(),
            kind: ActivityKind::Buy,
            token: "BONK".to_string(),
            token_name: "BONK Token".to_string(),
            amount: 1.0,
            usd_value: 100.0,
            price: 0.01,
            timestamp: at,
            tx_ref: "sig".to_string(),
            scoring: ActivityScoring {
                confidence: 50,
                impact: Impact::Low,
                profit_potential: 10.0,
                time_to_profit_hours: 24.0,
            },
        }
    }

    #[test]
    fn test_upsert_rejects_empty_address() {
        let mut registry = WalletRegistry::new(true);
        assert_eq!(registry.upsert_wallet(wallet("", 10)), Err(RegistryError::EmptyAddress));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_upsert_replaces_by_address() {
        let mut registry = WalletRegistry::new(true);
        registry.upsert_wallet(wallet("W1", 10)).unwrap();
        registry.upsert_wallet(wallet("W1", 80)).unwrap();
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get_wallet("W1").unwrap().influence, 80);
        assert!(registry.get_wallet("missing").is_none());
    }

    #[test]
    fn test_list_sorted_by_influence() {
        let mut registry = WalletRegistry::new(true);
        registry.upsert_wallet(wallet("W1", 50)).unwrap();
        registry.upsert_wallet(wallet("W2", 99)).unwrap();
        registry.upsert_wallet(wallet("W3", 75)).unwrap();

        let order: Vec<String> = registry.list_wallets().into_iter().map(|w| w.address).collect();
        assert_eq!(order, vec!["W2", "W3", "W1"]);
    }

    #[test]
    fn test_observe_activity_auto_registers() {
        let mut registry = WalletRegistry::new(true);
        assert!(registry.observe_activity(&activity("NEW1", t0())));
        assert!(!registry.observe_activity(&activity("NEW1", t0() + Duration::minutes(1))));

        let w = registry.get_wallet("NEW1").unwrap();
        assert_eq!(w.total_tx_count, 2);
        assert_eq!(w.last_activity, t0() + Duration::minutes(1));
    }

    #[test]
    fn test_observe_activity_without_auto_register() {
        let mut registry = WalletRegistry::new(false);
        assert!(!registry.observe_activity(&activity("NEW1", t0())));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_refresh_metrics_bounded_walk_and_last_activity() {
        let mut registry = WalletRegistry::new(true);
        registry.upsert_wallet(wallet("W1", 50)).unwrap();
        registry.upsert_wallet(wallet("W2", 50)).unwrap();

        let mut ledger = ActivityLedger::new(100);
        let seen = t0() - Duration::minutes(5);
        ledger.append(activity("W1", seen)).unwrap();

        let mut rng = StdRng::seed_from_u64(7);
        registry.refresh_metrics(&ledger, Duration::minutes(60), &mut rng, t0());

        let w1 = registry.get_wallet("W1").unwrap();
        assert!(w1.balance >= 1000.0 * 0.976 && w1.balance <= 1000.0 * 1.026);
        assert_eq!(w1.last_activity, seen);

        let w2 = registry.get_wallet("W2").unwrap();
        assert_eq!(w2.last_activity, t0() - Duration::days(1));
    }
}
