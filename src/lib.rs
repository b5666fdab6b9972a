// Whale Tracker - Activity Correlation & Signal Engine
// Wallet registry, activity ledger, relation inference, signal detection,
// network graph, coin reports and a simulated auto-buy policy

pub mod api;
pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod execution;
pub mod graph;
pub mod ledger;
pub mod metrics;
pub mod policy;
pub mod registry;
pub mod relations;
pub mod report;
pub mod scoring;
pub mod service;
pub mod signals;
pub mod simulator;
pub mod types;

pub use config::Config;
pub use engine::WhaleEngine;
pub use service::{spawn_engine, EngineHandle};
