//! Risk management module
//!
//! Signal validation, position sizing, circuit breakers, dynamic leverage,
//! VaR/CVaR, and stress scenarios.

mod breakers;
mod engine;
mod leverage;
mod types;
pub mod var;

pub use breakers::{BreakerReason, BreakerState};
pub use engine::{RiskEngine, SizeRequest};
pub use leverage::{LeverageCalculator, LeverageInputs, LeverageResult, MarketRegime};
pub use types::{RejectReason, RiskDecision, RiskError, TrailingConfig};
