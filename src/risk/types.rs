//! Risk engine types

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::risk::BreakerReason;

/// Risk engine errors (truly exceptional conditions only; expected
/// rejections travel inside `RiskDecision`)
#[derive(Debug, Error)]
pub enum RiskError {
    /// Symbol missing from configuration
    #[error("unknown symbol: {0}")]
    UnknownSymbol(String),
    /// Not enough return history for the requested calculation
    #[error("insufficient history for {symbol}: {have} observations, need {need}")]
    InsufficientHistory {
        symbol: String,
        have: usize,
        need: usize,
    },
}

/// Why a signal was rejected rather than sized
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RejectReason {
    /// Confidence below the configured floor
    LowConfidence,
    /// Direction was hold (or otherwise non-actionable)
    NotActionable,
    /// Non-positive price or balance
    InvalidInput,
    /// A session circuit breaker is active
    BreakerActive(BreakerReason),
    /// Cannot reach minimum notional without breaching the exposure cap
    BelowMinNotional,
}

/// Trailing-stop configuration attached to a decision
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TrailingConfig {
    /// Unrealized profit fraction that activates the trail
    pub trigger_pct: Decimal,
    /// Trail distance as a fraction of current price
    pub distance_pct: Decimal,
}

/// Sizing decision for one accepted signal; immutable once produced
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskDecision {
    pub symbol: String,
    /// Quantity in base units; zero when rejected
    pub quantity: Decimal,
    /// Entry reference price
    pub entry_price: Decimal,
    /// Protective stop
    pub stop_price: Decimal,
    /// Profit target
    pub target_price: Decimal,
    /// Leverage for the position
    pub leverage: u32,
    /// Exposure cap that bounded the size
    pub max_notional: Decimal,
    /// Currency at risk between entry and stop
    pub risk_amount: Decimal,
    /// Risk as a fraction of balance
    pub risk_fraction: Decimal,
    /// Trailing-stop parameters for the ledger
    pub trailing: TrailingConfig,
    /// Set when the signal was rejected
    pub reject_reason: Option<RejectReason>,
}

impl RiskDecision {
    /// A zero-quantity rejection carrying its reason
    pub fn rejected(symbol: impl Into<String>, reason: RejectReason) -> Self {
        Self {
            symbol: symbol.into(),
            quantity: Decimal::ZERO,
            entry_price: Decimal::ZERO,
            stop_price: Decimal::ZERO,
            target_price: Decimal::ZERO,
            leverage: 1,
            max_notional: Decimal::ZERO,
            risk_amount: Decimal::ZERO,
            risk_fraction: Decimal::ZERO,
            trailing: TrailingConfig {
                trigger_pct: Decimal::ZERO,
                distance_pct: Decimal::ZERO,
            },
            reject_reason: Some(reason),
        }
    }

    /// Whether the decision authorizes a trade
    pub fn accepted(&self) -> bool {
        self.reject_reason.is_none() && self.quantity > Decimal::ZERO
    }

    /// Notional exposure of the sized position
    pub fn notional(&self) -> Decimal {
        self.quantity * self.entry_price
    }
}
