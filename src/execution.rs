//! ⚡ Execution backend seam
//!
//! `ExecutionBackend` is the boundary to whatever places orders. The only
//! implementation here is `SimulatedExecutor`; nothing real is sent anywhere.
//! `ExecutionLog` keeps the most recent execution records, newest first.

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::ExecutionError;
use crate::policy::{ExecutionRecord, ExecutionStatus};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionReceipt {
    pub reference: String,
    pub token: String,
    pub size_usd: f64,
    pub filled_at: DateTime<Utc>,
}

pub trait ExecutionBackend: Send + Sync + 'static {
    fn execute(
        &self,
        token: String,
        size_usd: f64,
    ) -> impl Future<Output = Result<ExecutionReceipt, ExecutionError>> + Send;
}

/// Fills after a fixed latency, failing with the configured probability
#[derive(Debug, Clone)]
pub struct SimulatedExecutor {
    latency: Duration,
    failure_rate: f64,
}

impl SimulatedExecutor {
    pub fn new(latency: Duration, failure_rate: f64) -> Self {
        Self {
            latency,
            failure_rate: failure_rate.clamp(0.0, 1.0),
        }
    }
}

impl Default for SimulatedExecutor {
    fn default() -> Self {
        Self::new(Duration::from_millis(250), 0.0)
    }
}

impl ExecutionBackend for SimulatedExecutor {
    fn execute(
        &self,
        token: String,
        size_usd: f64,
    ) -> impl Future<Output = Result<ExecutionReceipt, ExecutionError>> + Send {
        let latency = self.latency;
        let fail = rand::thread_rng().gen_bool(self.failure_rate);

        async move {
            tokio::time::sleep(latency).await;
            if fail {
                return Err(ExecutionError::Rejected(format!("simulated fill failure for {}", token)));
            }
            debug!("✅ Simulated fill: ${:.2} {}", size_usd, token);
            Ok(ExecutionReceipt {
                reference: format!("sim-{}", Uuid::new_v4().simple()),
                token,
                size_usd,
                filled_at: Utc::now(),
            })
        }
    }
}

pub struct ExecutionLog {
    records: VecDeque<ExecutionRecord>,
    capacity: usize,
}

impl ExecutionLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            records: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Store a record, returning how many old records were evicted
    pub fn record(&mut self, record: ExecutionRecord) -> usize {
        self.records.push_front(record);
        let mut evicted = 0;
        while self.records.len() > self.capacity {
            self.records.pop_back();
            evicted += 1;
        }
        evicted
    }

    /// Set the final status of a record. False if it is unknown or already settled.
    pub fn settle(&mut self, id: &str, status: ExecutionStatus) -> bool {
        match self.records.iter_mut().find(|r| r.id == id) {
            Some(record) if record.status == ExecutionStatus::Pending => {
                record.status = status;
                true
            }
            Some(_) => {
                warn!("⚠️  Execution {} already settled, ignoring update", id);
                false
            }
            None => {
                warn!("⚠️  Execution {} no longer in log", id);
                false
            }
        }
    }

    pub fn get(&self, id: &str) -> Option<&ExecutionRecord> {
        self.records.iter().find(|r| r.id == id)
    }

    pub fn list(&self) -> Vec<ExecutionRecord> {
        self.records.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
