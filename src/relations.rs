//! 🔗 Relationship Inference
//!
//! Pairwise co-movement detection over the registry and ledger. Each wallet's
//! newest activities are reduced to a token set; pairs sharing enough tokens
//! become (or reinforce) a `WalletRelation`.
//!
//! Records are keyed by the unordered pair and never deleted. Reinforcement is
//! monotone: shared tokens only grow, strength/confidence follow the shared
//! set, `last_confirmed` only moves forward and the relation type only
//! escalates (coordinated -> whale_group -> insider_group).

use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use tracing::debug;

use crate::config::RelationConfig;
use crate::ledger::ActivityLedger;
use crate::registry::WalletRegistry;
use crate::types::{short_addr, PairKey, RelationType, WalletRelation};

/// What a pass of inference did to a pair
#[derive(Debug, Clone, PartialEq)]
pub enum RelationOutcome {
    Created(WalletRelation),
    /// Shared set grew or the type escalated
    Reinforced {
        previous_type: RelationType,
        relation: WalletRelation,
    },
}

#[derive(Debug, Default)]
pub struct RelationSet {
    relations: BTreeMap<PairKey, WalletRelation>,
}

pub fn strength_for(shared: usize) -> u8 {
    (shared * 25).min(100) as u8
}

pub fn confidence_for(shared: usize) -> u8 {
    (shared * 30).min(95) as u8
}

impl RelationSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Same record regardless of argument order
    pub fn get(&self, a: &str, b: &str) -> Option<&WalletRelation> {
        self.relations.get(&PairKey::new(a, b))
    }

    /// Strongest first, pair key ascending on ties
    pub fn list(&self) -> Vec<WalletRelation> {
        let mut list: Vec<WalletRelation> = self.relations.values().cloned().collect();
        list.sort_by(|a, b| b.strength.cmp(&a.strength).then_with(|| a.key().cmp(&b.key())));
        list
    }

    pub fn iter(&self) -> impl Iterator<Item = &WalletRelation> {
        self.relations.values()
    }

    pub fn len(&self) -> usize {
        self.relations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.relations.is_empty()
    }

    /// One pass over every unordered registry pair
    pub fn infer(
        &mut self,
        registry: &WalletRegistry,
        ledger: &ActivityLedger,
        config: &RelationConfig,
        now: DateTime<Utc>,
    ) -> Vec<RelationOutcome> {
        let addresses = registry.addresses();

        let token_sets: HashMap<&str, BTreeSet<&str>> = addresses
            .iter()
            .map(|&address| {
                let tokens = ledger
                    .by_wallet(address)
                    .into_iter()
                    .take(config.lookback_activities)
                    .map(|a| a.token.as_str())
                    .collect();
                (address, tokens)
            })
            .collect();

        let mut outcomes = Vec::new();

        for (i, &w1) in addresses.iter().enumerate() {
            let tokens1 = &token_sets[w1];
            if tokens1.len() < config.min_shared_tokens {
                continue;
            }

            for &w2 in &addresses[i + 1..] {
                let tokens2 = &token_sets[w2];
                let shared: BTreeSet<String> =
                    tokens1.intersection(tokens2).map(|t| t.to_string()).collect();
                if shared.len() < config.min_shared_tokens {
                    continue;
                }

                let union = tokens1.union(tokens2).count();
                let jaccard = shared.len() as f64 / union as f64;
                let correlation = 40.0 + 60.0 * jaccard;

                let both_whales = [w1, w2].iter().all(|w| {
                    registry
                        .get_wallet(w)
                        .map(|wallet| wallet.influence >= config.whale_group_min_influence)
                        .unwrap_or(false)
                });
                let observed_type = if both_whales {
                    RelationType::WhaleGroup
                } else {
                    RelationType::Coordinated
                };

                if let Some(outcome) = self.record(w1, w2, shared, correlation, observed_type, now) {
                    outcomes.push(outcome);
                }
            }
        }

        debug!(
            "🔗 Relation pass over {} wallets: {} changes, {} total",
            addresses.len(),
            outcomes.len(),
            self.relations.len()
        );
        outcomes
    }

    fn record(
        &mut self,
        w1: &str,
        w2: &str,
        shared: BTreeSet<String>,
        correlation: f64,
        observed_type: RelationType,
        now: DateTime<Utc>,
    ) -> Option<RelationOutcome> {
        let key = PairKey::new(w1, w2);

        match self.relations.get_mut(&key) {
            Some(existing) => {
                let previous_type = existing.relation_type;
                let before = existing.shared_tokens.len();

                existing.shared_tokens.extend(shared);
                let count = existing.shared_tokens.len();
                existing.strength = existing.strength.max(strength_for(count));
                existing.confidence = existing.confidence.max(confidence_for(count));
                existing.correlation = correlation;
                if now > existing.last_confirmed {
                    existing.last_confirmed = now;
                }
                if observed_type.rank() > previous_type.rank() {
                    existing.relation_type = observed_type;
                }

                if count > before || existing.relation_type != previous_type {
                    Some(RelationOutcome::Reinforced {
                        previous_type,
                        relation: existing.clone(),
                    })
                } else {
                    None
                }
            }
            None => {
                let count = shared.len();
                let relation = WalletRelation {
                    wallet1: key.first().to_string(),
                    wallet2: key.second().to_string(),
                    relation_type: observed_type,
                    strength: strength_for(count),
                    correlation,
                    shared_tokens: shared,
                    confidence: confidence_for(count),
                    first_detected: now,
                    last_confirmed: now,
                };
                debug!(
                    "🔗 New {} relation {} <-> {} ({} shared tokens)",
                    observed_type.as_str(),
                    short_addr(&relation.wallet1),
                    short_addr(&relation.wallet2),
                    count
                );
                self.relations.insert(key, relation.clone());
                Some(RelationOutcome::Created(relation))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ActivityKind, ActivityScoring, Impact, TrackedWallet, WalletActivity};
    use chrono::{Duration, TimeZone};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
    }

    fn registry(wallets: &[(&str, u8)]) -> WalletRegistry {
        let mut registry = WalletRegistry::new(false);
        for (address, influence) in wallets {
            let mut w = TrackedWallet::discovered(address, t0());
            w.influence = *influence;
            registry.upsert_wallet(w).unwrap();
        }
        registry
    }

    fn push(ledger: &mut ActivityLedger, n: &mut i64, wallet: &str, token: &str) {
        *n += 1;
        ledger
            .append(WalletActivity {
                id: format!("a{}", n),
                wallet: wallet.to_string(),
                kind: ActivityKind::Buy,
                token: token.to_string(),
                token_name: token.to_string(),
                amount: 1.0,
                usd_value: 1_000.0,
                price: 1.0,
                timestamp: t0() - Duration::minutes(60) + Duration::seconds(*n),
                tx_ref: format!("tx{}", n),
                scoring: ActivityScoring {
                    confidence: 80,
                    impact: Impact::High,
                    profit_potential: 30.0,
                    time_to_profit_hours: 12.0,
                },
            })
            .unwrap();
    }

    #[test]
    fn test_two_shared_tokens_create_single_relation() {
        let registry = registry(&[("W1", 50), ("W2", 60)]);
        let mut ledger = ActivityLedger::new(100);
        let mut n = 0;
        for token in ["BONK", "WIF", "POPCAT"] {
            push(&mut ledger, &mut n, "W1", token);
        }
        for token in ["BONK", "WIF", "MYRO"] {
            push(&mut ledger, &mut n, "W2", token);
        }

        let mut set = RelationSet::new();
        let outcomes = set.infer(&registry, &ledger, &RelationConfig::default(), t0());

        assert_eq!(outcomes.len(), 1);
        assert_eq!(set.len(), 1);
        let relation = set.get("W1", "W2").unwrap();
        assert!(relation.strength >= 50);
        assert_eq!(relation.confidence, 60);
        assert_eq!(relation.relation_type, RelationType::Coordinated);
        // 2 shared over 4 distinct
        assert!((relation.correlation - 70.0).abs() < 1e-9);
    }

    #[test]
    fn test_lookup_is_symmetric_and_rerun_does_not_duplicate() {
        let registry = registry(&[("W1", 50), ("W2", 60)]);
        let mut ledger = ActivityLedger::new(100);
        let mut n = 0;
        for token in ["BONK", "WIF"] {
            push(&mut ledger, &mut n, "W2", token);
            push(&mut ledger, &mut n, "W1", token);
        }

        let mut set = RelationSet::new();
        set.infer(&registry, &ledger, &RelationConfig::default(), t0());
        let second = set.infer(&registry, &ledger, &RelationConfig::default(), t0() + Duration::seconds(5));

        assert!(second.is_empty());
        assert_eq!(set.len(), 1);
        assert_eq!(set.get("W1", "W2"), set.get("W2", "W1"));
        assert_eq!(set.get("W2", "W1").unwrap().last_confirmed, t0() + Duration::seconds(5));
    }

    #[test]
    fn test_single_shared_token_is_skipped() {
        let registry = registry(&[("W1", 50), ("W2", 60)]);
        let mut ledger = ActivityLedger::new(100);
        let mut n = 0;
        push(&mut ledger, &mut n, "W1", "BONK");
        push(&mut ledger, &mut n, "W1", "WIF");
        push(&mut ledger, &mut n, "W2", "BONK");
        push(&mut ledger, &mut n, "W2", "MYRO");

        let mut set = RelationSet::new();
        assert!(set.infer(&registry, &ledger, &RelationConfig::default(), t0()).is_empty());
        assert!(set.is_empty());
    }

    #[test]
    fn test_shared_tokens_never_shrink() {
        let registry = registry(&[("W1", 50), ("W2", 60)]);
        let mut ledger = ActivityLedger::new(100);
        let mut n = 0;
        for token in ["BONK", "WIF", "POPCAT"] {
            push(&mut ledger, &mut n, "W1", token);
            push(&mut ledger, &mut n, "W2", token);
        }

        let config = RelationConfig {
            lookback_activities: 3,
            ..RelationConfig::default()
        };
        let mut set = RelationSet::new();
        set.infer(&registry, &ledger, &config, t0());
        assert_eq!(set.get("W1", "W2").unwrap().shared_tokens.len(), 3);

        // Newer activity pushes BONK and WIF out of both lookbacks
        for token in ["MYRO", "BOME"] {
            push(&mut ledger, &mut n, "W1", token);
            push(&mut ledger, &mut n, "W2", token);
        }
        let outcomes = set.infer(&registry, &ledger, &config, t0() + Duration::minutes(1));

        let relation = set.get("W1", "W2").unwrap();
        assert_eq!(relation.shared_tokens.len(), 5);
        assert_eq!(relation.strength, 100);
        assert_eq!(relation.confidence, 95);
        assert_eq!(relation.first_detected, t0());
        assert!(matches!(outcomes[0], RelationOutcome::Reinforced { .. }));
    }

    #[test]
    fn test_high_influence_pair_escalates_never_regresses() {
        let mut registry = registry(&[("W1", 95), ("W2", 70)]);
        let mut ledger = ActivityLedger::new(100);
        let mut n = 0;
        for token in ["BONK", "WIF"] {
            push(&mut ledger, &mut n, "W1", token);
            push(&mut ledger, &mut n, "W2", token);
        }

        let mut set = RelationSet::new();
        set.infer(&registry, &ledger, &RelationConfig::default(), t0());
        assert_eq!(set.get("W1", "W2").unwrap().relation_type, RelationType::Coordinated);

        let mut w2 = registry.get_wallet("W2").unwrap().clone();
        w2.influence = 92;
        registry.upsert_wallet(w2.clone()).unwrap();
        let outcomes = set.infer(&registry, &ledger, &RelationConfig::default(), t0() + Duration::minutes(1));
        assert_eq!(
            outcomes,
            vec![RelationOutcome::Reinforced {
                previous_type: RelationType::Coordinated,
                relation: set.get("W1", "W2").unwrap().clone(),
            }]
        );
        assert_eq!(set.get("W1", "W2").unwrap().relation_type, RelationType::WhaleGroup);

        // Influence drops again: the type stays escalated
        w2.influence = 10;
        registry.upsert_wallet(w2).unwrap();
        set.infer(&registry, &ledger, &RelationConfig::default(), t0() + Duration::minutes(2));
        assert_eq!(set.get("W1", "W2").unwrap().relation_type, RelationType::WhaleGroup);
    }

    #[test]
    fn test_last_confirmed_never_moves_backwards() {
        let registry = registry(&[("W1", 50), ("W2", 60)]);
        let mut ledger = ActivityLedger::new(100);
        let mut n = 0;
        for token in ["BONK", "WIF"] {
            push(&mut ledger, &mut n, "W1", token);
            push(&mut ledger, &mut n, "W2", token);
        }

        let mut set = RelationSet::new();
        set.infer(&registry, &ledger, &RelationConfig::default(), t0());
        set.infer(&registry, &ledger, &RelationConfig::default(), t0() - Duration::hours(1));
        assert_eq!(set.get("W1", "W2").unwrap().last_confirmed, t0());
    }
}
