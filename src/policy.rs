//! 🛡️ Auto-Buy Policy
//!
//! Evaluates a signal against the configured policy. Checks run in a fixed
//! order and the first failure is the reported reason:
//! 1. enabled
//! 2. confidence >= min_confidence
//! 3. risk <= max_risk
//! 4. token not blocked
//! 5. token allowed (when an allow list is set)
//!
//! An accepted signal yields a pending `ExecutionRecord`; nothing is sent to
//! an execution backend from here.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::error::PolicyError;
use crate::registry::WalletRegistry;
use crate::types::ActivitySignal;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AutoBuyPolicy {
    pub enabled: bool,
    pub max_position_size_usd: f64,
    pub min_confidence: u8,
    pub max_risk: u8,
    /// Empty means every non-blocked token is allowed
    pub allowed_tokens: Vec<String>,
    pub blocked_tokens: Vec<String>,
    pub max_slippage_pct: f64,
    pub stop_loss_pct: f64,
    pub take_profit_pct: f64,
    /// Wallets whose buys are mirrored as smart-money entries
    pub follow_whales: Vec<String>,
    pub copy_trade_delay_secs: u64,
}

impl Default for AutoBuyPolicy {
    fn default() -> Self {
        Self {
            enabled: false,
            max_position_size_usd: 1000.0,
            min_confidence: 75,
            max_risk: 60,
            allowed_tokens: Vec::new(),
            blocked_tokens: Vec::new(),
            max_slippage_pct: 3.0,
            stop_loss_pct: 20.0,
            take_profit_pct: 50.0,
            follow_whales: Vec::new(),
            copy_trade_delay_secs: 30,
        }
    }
}

/// Longest copy-trade delay accepted (one day)
pub const MAX_COPY_TRADE_DELAY_SECS: u64 = 86_400;

fn percent(field: &'static str, value: f64) -> Result<(), PolicyError> {
    if !value.is_finite() || !(0.0..=100.0).contains(&value) {
        return Err(PolicyError::OutOfRange { field, value });
    }
    Ok(())
}

fn non_negative(field: &'static str, value: f64) -> Result<(), PolicyError> {
    if !value.is_finite() || value < 0.0 {
        return Err(PolicyError::Negative { field, value });
    }
    Ok(())
}

impl AutoBuyPolicy {
    /// Range checks that don't need the registry
    pub fn check(&self) -> Result<(), PolicyError> {
        percent("min_confidence", self.min_confidence as f64)?;
        percent("max_risk", self.max_risk as f64)?;
        non_negative("max_position_size_usd", self.max_position_size_usd)?;
        percent("max_slippage_pct", self.max_slippage_pct)?;
        percent("stop_loss_pct", self.stop_loss_pct)?;
        non_negative("take_profit_pct", self.take_profit_pct)?;
        if self.copy_trade_delay_secs > MAX_COPY_TRADE_DELAY_SECS {
            return Err(PolicyError::DelayTooLong {
                value: self.copy_trade_delay_secs,
                max: MAX_COPY_TRADE_DELAY_SECS,
            });
        }
        Ok(())
    }

    /// Build the updated policy on a copy; `self` is untouched on error
    pub fn apply_update(&self, update: PolicyUpdate, registry: &WalletRegistry) -> Result<Self, PolicyError> {
        let mut next = self.clone();

        if let Some(v) = update.enabled {
            next.enabled = v;
        }
        if let Some(v) = update.max_position_size_usd {
            next.max_position_size_usd = v;
        }
        if let Some(v) = update.min_confidence {
            percent("min_confidence", v)?;
            next.min_confidence = v.round() as u8;
        }
        if let Some(v) = update.max_risk {
            percent("max_risk", v)?;
            next.max_risk = v.round() as u8;
        }
        if let Some(v) = update.allowed_tokens {
            next.allowed_tokens = v;
        }
        if let Some(v) = update.blocked_tokens {
            next.blocked_tokens = v;
        }
        if let Some(v) = update.max_slippage_pct {
            next.max_slippage_pct = v;
        }
        if let Some(v) = update.stop_loss_pct {
            next.stop_loss_pct = v;
        }
        if let Some(v) = update.take_profit_pct {
            next.take_profit_pct = v;
        }
        if let Some(v) = update.follow_whales {
            if let Some(unknown) = v.iter().find(|w| !registry.contains(w)) {
                return Err(PolicyError::UnknownWallet(unknown.clone()));
            }
            next.follow_whales = v;
        }
        if let Some(v) = update.copy_trade_delay_secs {
            next.copy_trade_delay_secs = v;
        }

        next.check()?;
        Ok(next)
    }
}

/// Partial policy update; absent fields keep their current value
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct PolicyUpdate {
    pub enabled: Option<bool>,
    pub max_position_size_usd: Option<f64>,
    /// Accepted as a number so out-of-range input is reported, not truncated
    pub min_confidence: Option<f64>,
    pub max_risk: Option<f64>,
    pub allowed_tokens: Option<Vec<String>>,
    pub blocked_tokens: Option<Vec<String>>,
    pub max_slippage_pct: Option<f64>,
    pub stop_loss_pct: Option<f64>,
    pub take_profit_pct: Option<f64>,
    pub follow_whales: Option<Vec<String>>,
    pub copy_trade_delay_secs: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    Disabled,
    LowConfidence,
    RiskTooHigh,
    TokenBlocked,
    TokenNotAllowed,
    Expired,
}

impl RejectReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            RejectReason::Disabled => "disabled",
            RejectReason::LowConfidence => "confidence below threshold",
            RejectReason::RiskTooHigh => "risk too high",
            RejectReason::TokenBlocked => "token blocked",
            RejectReason::TokenNotAllowed => "token not allowed",
            RejectReason::Expired => "signal expired",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ExecutionStatus {
    Pending,
    Filled {
        reference: String,
        completed_at: DateTime<Utc>,
    },
    Failed {
        reason: String,
        completed_at: DateTime<Utc>,
    },
}

/// Simulated fill placeholder, updated once the backend answers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionRecord {
    pub id: String,
    pub signal_id: String,
    pub token: String,
    pub position_size_usd: f64,
    pub created_at: DateTime<Utc>,
    pub status: ExecutionStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AutoBuyDecision {
    pub signal_id: String,
    pub token: String,
    pub accepted: bool,
    pub reason: String,
    pub execution: Option<ExecutionRecord>,
}

impl AutoBuyDecision {
    pub fn rejected(signal: &ActivitySignal, reason: RejectReason) -> Self {
        Self {
            signal_id: signal.id.clone(),
            token: signal.token.clone(),
            accepted: false,
            reason: reason.as_str().to_string(),
            execution: None,
        }
    }
}

/// First failing check, in order
pub fn first_failure(signal: &ActivitySignal, policy: &AutoBuyPolicy) -> Option<RejectReason> {
    if !policy.enabled {
        return Some(RejectReason::Disabled);
    }
    if signal.confidence < policy.min_confidence {
        return Some(RejectReason::LowConfidence);
    }
    if signal.risk_level > policy.max_risk {
        return Some(RejectReason::RiskTooHigh);
    }
    if policy.blocked_tokens.iter().any(|t| t == &signal.token) {
        return Some(RejectReason::TokenBlocked);
    }
    if !policy.allowed_tokens.is_empty() && !policy.allowed_tokens.iter().any(|t| t == &signal.token) {
        return Some(RejectReason::TokenNotAllowed);
    }
    None
}

pub fn position_size(signal: &ActivitySignal, policy: &AutoBuyPolicy) -> f64 {
    let max = policy.max_position_size_usd;
    max.min(max * signal.confidence as f64 / 100.0)
}

pub fn evaluate(signal: &ActivitySignal, policy: &AutoBuyPolicy, now: DateTime<Utc>) -> AutoBuyDecision {
    if let Some(reason) = first_failure(signal, policy) {
        info!(
            "🚫 Auto-buy rejected: {} {} (conf {}, risk {}): {}",
            signal.signal_type.as_str(),
            signal.token,
            signal.confidence,
            signal.risk_level,
            reason.as_str()
        );
        return AutoBuyDecision::rejected(signal, reason);
    }

    let size = position_size(signal, policy);
    let record = ExecutionRecord {
        id: format!("autobuy-{}", Uuid::new_v4()),
        signal_id: signal.id.clone(),
        token: signal.token.clone(),
        position_size_usd: size,
        created_at: now,
        status: ExecutionStatus::Pending,
    };

    info!(
        "🤖 Auto-buy accepted: ${:.2} {} ({}% confidence, {})",
        size,
        signal.token,
        signal.confidence,
        signal.signal_type.as_str()
    );

    AutoBuyDecision {
        signal_id: signal.id.clone(),
        token: signal.token.clone(),
        accepted: true,
        reason: "accepted".to_string(),
        execution: Some(record),
    }
}
