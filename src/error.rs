//! Error types for the engine boundaries.
//!
//! Rejections here are never partially applied: the call either mutates state
//! completely or not at all.

use chrono::{DateTime, Utc};
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum RegistryError {
    #[error("wallet address must not be empty")]
    EmptyAddress,
}

#[derive(Debug, Error, PartialEq)]
pub enum IngestError {
    #[error("missing required field: {0}")]
    MissingField(&'static str),
    #[error("field {field} must be finite and non-negative (got {value})")]
    InvalidValue { field: &'static str, value: f64 },
    #[error("confidence {0} out of range (0-100)")]
    ConfidenceOutOfRange(u8),
    #[error("timestamp {0} is too far in the future")]
    TimestampInFuture(DateTime<Utc>),
    #[error("ingestion queue full ({capacity} pending events)")]
    QueueFull { capacity: usize },
    #[error("ingestion queue closed")]
    QueueClosed,
}

#[derive(Debug, Error, PartialEq)]
pub enum PolicyError {
    #[error("{field} must be between 0 and 100 (got {value})")]
    OutOfRange { field: &'static str, value: f64 },
    #[error("{field} must be non-negative (got {value})")]
    Negative { field: &'static str, value: f64 },
    #[error("unknown wallet in follow list: {0}")]
    UnknownWallet(String),
    #[error("copy_trade_delay_secs must be at most {max} (got {value})")]
    DelayTooLong { value: u64, max: u64 },
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ExecutionError {
    #[error("execution backend unavailable: {0}")]
    Unavailable(String),
    #[error("execution timed out after {0}s")]
    Timeout(u64),
    #[error("order rejected: {0}")]
    Rejected(String),
}

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("engine task is not running")]
    EngineStopped,
    #[error(transparent)]
    Ingest(#[from] IngestError),
    #[error(transparent)]
    Policy(#[from] PolicyError),
}
