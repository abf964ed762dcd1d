//! riskpilot: autonomous leveraged-trading risk and execution engine
//!
//! This library provides the core components for:
//! - Signal validation and risk-budgeted position sizing
//! - Dynamic leverage from confidence/volatility/correlation/drawdown
//! - Circuit breakers guarding daily loss, drawdown, and losing streaks
//! - A single-writer position ledger with a continuous monitoring loop
//! - Order routing with dedup and a failure-rate breaker
//! - Mean-variance portfolio optimization and graduated rebalancing
//! - Daily performance rollups (Sharpe/Sortino/Calmar)
//! - Full observability stack

pub mod cli;
pub mod config;
pub mod events;
pub mod exchange;
pub mod ledger;
pub mod marketdata;
pub mod metrics;
pub mod portfolio;
pub mod risk;
pub mod router;
pub mod signal;
pub mod store;
pub mod telemetry;
