//! Trading signal types
//!
//! Signals are produced by the prediction collaborator and consumed once.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Signal direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Long,
    Short,
    Hold,
}

/// A trading signal
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Signal {
    /// Unique signal identifier
    pub id: Uuid,
    /// Symbol, e.g. "BTCUSDT"
    pub symbol: String,
    /// Trade direction
    pub direction: Direction,
    /// Model confidence in [0, 1]
    pub confidence: Decimal,
    /// Reference price at signal time
    pub price: Decimal,
    /// Optional model-suggested protective stop
    pub stop: Option<Decimal>,
    /// Optional model-suggested target
    pub target: Option<Decimal>,
    /// Signal generation timestamp
    pub timestamp: DateTime<Utc>,
}

impl Signal {
    /// Create a new signal
    pub fn new(symbol: impl Into<String>, direction: Direction, confidence: Decimal, price: Decimal) -> Self {
        Self {
            id: Uuid::new_v4(),
            symbol: symbol.into(),
            direction,
            confidence,
            price,
            stop: None,
            target: None,
            timestamp: Utc::now(),
        }
    }

    /// Attach model-suggested stop/target levels
    pub fn with_levels(mut self, stop: Option<Decimal>, target: Option<Decimal>) -> Self {
        self.stop = stop;
        self.target = target;
        self
    }

    /// Whether the signal asks for a position at all
    pub fn is_actionable(&self) -> bool {
        matches!(self.direction, Direction::Long | Direction::Short)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_signal_new() {
        let signal = Signal::new("BTCUSDT", Direction::Long, dec!(0.8), dec!(50000));
        assert_eq!(signal.symbol, "BTCUSDT");
        assert_eq!(signal.direction, Direction::Long);
        assert!(signal.stop.is_none());
        assert!(signal.is_actionable());
    }

    #[test]
    fn test_hold_not_actionable() {
        let signal = Signal::new("BTCUSDT", Direction::Hold, dec!(0.9), dec!(50000));
        assert!(!signal.is_actionable());
    }

    #[test]
    fn test_with_levels() {
        let signal = Signal::new("ETHUSDT", Direction::Short, dec!(0.7), dec!(3000))
            .with_levels(Some(dec!(3060)), Some(dec!(2880)));
        assert_eq!(signal.stop, Some(dec!(3060)));
        assert_eq!(signal.target, Some(dec!(2880)));
    }

    #[test]
    fn test_direction_serde() {
        let json = serde_json::to_string(&Direction::Long).unwrap();
        assert_eq!(json, "\"long\"");
        let parsed: Direction = serde_json::from_str("\"short\"").unwrap();
        assert_eq!(parsed, Direction::Short);
    }
}
