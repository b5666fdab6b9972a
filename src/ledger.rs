//! Activity Ledger - bounded, newest-first log of observed wallet actions
//!
//! Entries are kept ordered by timestamp (newest first). Once the capacity is
//! exceeded the oldest entries are evicted on the same append.

use chrono::{DateTime, Duration, Utc};
use std::collections::VecDeque;
use tracing::debug;

use crate::error::IngestError;
use crate::types::WalletActivity;

/// Feed timestamps may run ahead of the local clock by at most this much
const MAX_FUTURE_SKEW_HOURS: i64 = 24;

pub struct ActivityLedger {
    entries: VecDeque<WalletActivity>,
    capacity: usize,
}

impl ActivityLedger {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity + 1),
            capacity,
        }
    }

    /// Validate and insert. Returns the number of evicted entries.
    pub fn append(&mut self, activity: WalletActivity) -> Result<usize, IngestError> {
        validate(&activity)?;

        // Ties go in front: the latest append of a given timestamp is "newer"
        let pos = self
            .entries
            .iter()
            .position(|e| e.timestamp <= activity.timestamp)
            .unwrap_or(self.entries.len());
        self.entries.insert(pos, activity);

        let mut evicted = 0;
        while self.entries.len() > self.capacity {
            if let Some(old) = self.entries.pop_back() {
                debug!("🧹 Ledger full, evicted {} ({})", old.id, old.timestamp);
                evicted += 1;
            }
        }
        Ok(evicted)
    }

    /// Entries with `timestamp >= now - window`, newest first
    pub fn recent(&self, window: Duration, now: DateTime<Utc>) -> Vec<&WalletActivity> {
        let cutoff = now - window;
        self.entries.iter().filter(|a| a.timestamp >= cutoff).collect()
    }

    pub fn by_token(&self, token: &str) -> Vec<&WalletActivity> {
        self.entries.iter().filter(|a| a.token == token).collect()
    }

    pub fn by_wallet(&self, address: &str) -> Vec<&WalletActivity> {
        self.entries.iter().filter(|a| a.wallet == address).collect()
    }

    /// `n` newest entries
    pub fn latest(&self, n: usize) -> impl Iterator<Item = &WalletActivity> {
        self.entries.iter().take(n)
    }

    pub fn get(&self, id: &str) -> Option<&WalletActivity> {
        self.entries.iter().find(|a| a.id == id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &WalletActivity> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

fn validate(activity: &WalletActivity) -> Result<(), IngestError> {
    if activity.id.is_empty() {
        return Err(IngestError::MissingField("id"));
    }
    if activity.wallet.trim().is_empty() {
        return Err(IngestError::MissingField("wallet"));
    }
    if activity.token.trim().is_empty() {
        return Err(IngestError::MissingField("token"));
    }
    if activity.tx_ref.trim().is_empty() {
        return Err(IngestError::MissingField("tx_ref"));
    }
    for (field, value) in [
        ("amount", activity.amount),
        ("usd_value", activity.usd_value),
        ("price", activity.price),
    ] {
        if !value.is_finite() || value < 0.0 {
            return Err(IngestError::InvalidValue { field, value });
        }
    }
    if activity.scoring.confidence > 100 {
        return Err(IngestError::ConfidenceOutOfRange(activity.scoring.confidence));
    }
    if activity.timestamp > Utc::now() + Duration::hours(MAX_FUTURE_SKEW_HOURS) {
        return Err(IngestError::TimestampInFuture(activity.timestamp));
    }
    Ok(())
}
