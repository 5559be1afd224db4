//! Core domain types and logic.

pub mod allocation;
pub mod backtest;
pub mod config_validation;
pub mod conversion;
pub mod error;
pub mod ledger;
pub mod market_data;
pub mod metrics;
pub mod ohlcv;
pub mod rebalance;
pub mod schedule;
pub mod selection;
pub mod strategies;
pub mod strategy;
pub mod sweep;
pub mod trade;
pub mod universe;
