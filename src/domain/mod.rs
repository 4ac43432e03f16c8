//! Core engine: bar series, ledger, statistics, strategies and optimization.

pub mod backtest;
pub mod config_validation;
pub mod curves;
pub mod error;
pub mod instrument;
pub mod metrics;
pub mod ohlcv;
pub mod optimizer;
pub mod portfolio;
pub mod position;
pub mod stats;
pub mod strategies;
pub mod strategy;
