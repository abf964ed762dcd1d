//! Candle types

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// One OHLCV bar
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Candle {
    /// Bar open timestamp
    pub timestamp: DateTime<Utc>,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: Decimal,
}

impl Candle {
    /// Bar range as a fraction of the close
    pub fn range_pct(&self) -> Decimal {
        if self.close.is_zero() {
            return Decimal::ZERO;
        }
        (self.high - self.low) / self.close
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_range_pct() {
        let candle = Candle {
            timestamp: Utc::now(),
            open: dec!(100),
            high: dec!(102),
            low: dec!(98),
            close: dec!(100),
            volume: dec!(10),
        };
        assert_eq!(candle.range_pct(), dec!(0.04));
    }

    #[test]
    fn test_range_pct_zero_close() {
        let candle = Candle {
            timestamp: Utc::now(),
            open: dec!(0),
            high: dec!(0),
            low: dec!(0),
            close: dec!(0),
            volume: dec!(0),
        };
        assert_eq!(candle.range_pct(), dec!(0));
    }
}
