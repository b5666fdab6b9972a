//! 🕸️ Network Graph Builder
//!
//! Derives the wallet/token graph from the registry, ledger and relation set.
//! Every rebuild replaces the previous snapshot wholesale.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use tracing::{debug, error};

use crate::ledger::ActivityLedger;
use crate::registry::WalletRegistry;
use crate::relations::RelationSet;
use crate::types::{ActivityKind, RelationType, RiskTier};

const TOKEN_NODE_LOOKBACK: usize = 50;
const TRADE_EDGE_LOOKBACK: usize = 30;
const TOKEN_COLOR: &str = "#ffff44";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NodeMeta {
    Wallet {
        balance: f64,
        win_rate: f64,
        influence: u8,
        risk_tier: RiskTier,
    },
    Token {
        volume_usd: f64,
        trades: usize,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphNode {
    pub id: String,
    pub label: String,
    pub size: f64,
    pub color: String,
    pub metadata: NodeMeta,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EdgeMeta {
    Relation {
        relation_type: RelationType,
        correlation: f64,
        shared_tokens: usize,
    },
    Trade {
        kind: ActivityKind,
        usd_value: f64,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphEdge {
    pub source: String,
    pub target: String,
    pub weight: f64,
    pub color: String,
    pub metadata: EdgeMeta,
}

/// Wallets connected through relation edges
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cluster {
    pub id: String,
    pub wallets: Vec<String>,
    pub relation_count: usize,
    pub avg_strength: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NetworkGraph {
    pub nodes: Vec<GraphNode>,
    pub edges: Vec<GraphEdge>,
    pub clusters: Vec<Cluster>,
    pub built_at: Option<DateTime<Utc>>,
}

/// Relation whose endpoint is not in the registry
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GraphViolation {
    pub wallet1: String,
    pub wallet2: String,
    pub missing: String,
}

pub fn tier_color(tier: RiskTier) -> &'static str {
    match tier {
        RiskTier::Degen => "#ff4444",
        RiskTier::Aggressive => "#ff8844",
        RiskTier::Moderate => "#44ff88",
        RiskTier::Conservative => "#4488ff",
    }
}

pub fn token_node_id(token: &str) -> String {
    format!("token-{}", token)
}

pub fn build(
    registry: &WalletRegistry,
    ledger: &ActivityLedger,
    relations: &RelationSet,
    now: DateTime<Utc>,
) -> (NetworkGraph, Vec<GraphViolation>) {
    let mut nodes = Vec::new();
    let mut edges = Vec::new();
    let mut violations = Vec::new();

    for wallet in registry.list_wallets() {
        nodes.push(GraphNode {
            id: wallet.address.clone(),
            label: wallet.label.clone(),
            size: wallet.influence.min(100) as f64,
            color: tier_color(wallet.risk_tier).to_string(),
            metadata: NodeMeta::Wallet {
                balance: wallet.balance,
                win_rate: wallet.win_rate,
                influence: wallet.influence,
                risk_tier: wallet.risk_tier,
            },
        });
    }

    // Tokens seen in the newest entries, sized by their ledger volume
    let recent_tokens: BTreeSet<&str> = ledger
        .latest(TOKEN_NODE_LOOKBACK)
        .map(|a| a.token.as_str())
        .collect();
    for token in recent_tokens {
        let trades = ledger.by_token(token);
        let volume_usd: f64 = trades.iter().map(|a| a.usd_value).sum();
        nodes.push(GraphNode {
            id: token_node_id(token),
            label: token.to_string(),
            size: (volume_usd / 1000.0).min(80.0),
            color: TOKEN_COLOR.to_string(),
            metadata: NodeMeta::Token {
                volume_usd,
                trades: trades.len(),
            },
        });
    }

    for relation in relations.iter() {
        let missing = [&relation.wallet1, &relation.wallet2]
            .into_iter()
            .find(|w| !registry.contains(w));
        if let Some(missing) = missing {
            error!(
                "❌ Relation {} <-> {} references unknown wallet {}",
                relation.wallet1, relation.wallet2, missing
            );
            violations.push(GraphViolation {
                wallet1: relation.wallet1.clone(),
                wallet2: relation.wallet2.clone(),
                missing: missing.clone(),
            });
            continue;
        }

        edges.push(GraphEdge {
            source: relation.wallet1.clone(),
            target: relation.wallet2.clone(),
            weight: relation.strength as f64,
            color: if relation.relation_type == RelationType::WhaleGroup {
                "#ff44ff"
            } else {
                "#44ffff"
            }
            .to_string(),
            metadata: EdgeMeta::Relation {
                relation_type: relation.relation_type,
                correlation: relation.correlation,
                shared_tokens: relation.shared_tokens.len(),
            },
        });
    }

    // One trade edge per wallet-token pair, newest activity wins
    let mut seen_pairs = BTreeSet::new();
    for activity in ledger.latest(TRADE_EDGE_LOOKBACK) {
        if !registry.contains(&activity.wallet) {
            continue;
        }
        if !seen_pairs.insert((activity.wallet.as_str(), activity.token.as_str())) {
            continue;
        }
        edges.push(GraphEdge {
            source: activity.wallet.clone(),
            target: token_node_id(&activity.token),
            weight: (activity.usd_value / 5000.0).min(10.0),
            color: if activity.kind == ActivityKind::Buy {
                "#44ff44"
            } else {
                "#ff4444"
            }
            .to_string(),
            metadata: EdgeMeta::Trade {
                kind: activity.kind,
                usd_value: activity.usd_value,
            },
        });
    }

    let clusters = find_clusters(&edges);

    debug!(
        "🕸️ Graph rebuilt: {} nodes, {} edges, {} clusters",
        nodes.len(),
        edges.len(),
        clusters.len()
    );

    let graph = NetworkGraph {
        nodes,
        edges,
        clusters,
        built_at: Some(now),
    };
    (graph, violations)
}

/// Connected components over relation edges (union-find)
fn find_clusters(edges: &[GraphEdge]) -> Vec<Cluster> {
    let relation_edges: Vec<&GraphEdge> = edges
        .iter()
        .filter(|e| matches!(e.metadata, EdgeMeta::Relation { .. }))
        .collect();

    let mut parent: HashMap<&str, &str> = HashMap::new();

    fn root<'a>(parent: &mut HashMap<&'a str, &'a str>, node: &'a str) -> &'a str {
        let mut current = node;
        while let Some(&next) = parent.get(current) {
            if next == current {
                break;
            }
            current = next;
        }
        // Path compression
        let mut walk = node;
        while walk != current {
            let next = parent[walk];
            parent.insert(walk, current);
            walk = next;
        }
        current
    }

    for edge in &relation_edges {
        parent.entry(edge.source.as_str()).or_insert(edge.source.as_str());
        parent.entry(edge.target.as_str()).or_insert(edge.target.as_str());
        let a = root(&mut parent, edge.source.as_str());
        let b = root(&mut parent, edge.target.as_str());
        if a != b {
            // Smaller address becomes the root
            let (keep, merge) = if a < b { (a, b) } else { (b, a) };
            parent.insert(merge, keep);
        }
    }

    let mut members: BTreeMap<&str, BTreeSet<&str>> = BTreeMap::new();
    let nodes: Vec<&str> = parent.keys().copied().collect();
    for node in nodes {
        let r = root(&mut parent, node);
        members.entry(r).or_default().insert(node);
    }

    let mut stats: HashMap<&str, (usize, f64)> = HashMap::new();
    for edge in &relation_edges {
        let r = root(&mut parent, edge.source.as_str());
        let entry = stats.entry(r).or_insert((0, 0.0));
        entry.0 += 1;
        entry.1 += edge.weight;
    }

    let mut clusters: Vec<Cluster> = members
        .into_iter()
        .map(|(r, wallets)| {
            let (count, total) = stats.get(r).copied().unwrap_or((0, 0.0));
            Cluster {
                id: String::new(),
                wallets: wallets.into_iter().map(|w| w.to_string()).collect(),
                relation_count: count,
                avg_strength: if count > 0 { total / count as f64 } else { 0.0 },
            }
        })
        .collect();

    clusters.sort_by(|a, b| b.wallets.len().cmp(&a.wallets.len()).then_with(|| a.wallets.cmp(&b.wallets)));
    for (i, cluster) in clusters.iter_mut().enumerate() {
        cluster.id = format!("cluster-{}", i + 1);
    }
    clusters
}
