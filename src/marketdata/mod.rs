//! Market data module
//!
//! OHLCV candles from the market-data collaborator, plus the volatility
//! helpers (ATR, simple returns, realized volatility) built on them.

mod types;

pub use types::Candle;

use async_trait::async_trait;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

/// Trait for the market-data collaborator
#[async_trait]
pub trait MarketDataSource: Send + Sync {
    /// Trailing OHLCV series for a symbol, oldest first
    async fn get_candles(&self, symbol: &str, limit: usize) -> anyhow::Result<Vec<Candle>>;
}

/// Average True Range over a candle series
///
/// True range = max(high - low, |high - prev close|, |low - prev close|).
/// Returns `None` with fewer than two candles.
pub fn average_true_range(candles: &[Candle], period: usize) -> Option<Decimal> {
    if candles.len() < 2 || period == 0 {
        return None;
    }
    let start = candles.len().saturating_sub(period + 1);
    let window = &candles[start..];

    let mut ranges = Vec::with_capacity(window.len() - 1);
    for pair in window.windows(2) {
        let prev_close = pair[0].close;
        let c = &pair[1];
        let tr = (c.high - c.low)
            .max((c.high - prev_close).abs())
            .max((c.low - prev_close).abs());
        ranges.push(tr);
    }
    let sum: Decimal = ranges.iter().copied().sum();
    Some(sum / Decimal::from(ranges.len()))
}

/// Simple close-to-close returns as f64, oldest first
pub fn simple_returns(candles: &[Candle]) -> Vec<f64> {
    let mut returns = Vec::new();
    for pair in candles.windows(2) {
        let prev = pair[0].close.to_f64().unwrap_or(0.0);
        let cur = pair[1].close.to_f64().unwrap_or(0.0);
        if prev > 0.0 {
            returns.push(cur / prev - 1.0);
        }
    }
    returns
}

/// Sample standard deviation of a return series
pub fn realized_volatility(returns: &[f64]) -> Option<f64> {
    if returns.len() < 2 {
        return None;
    }
    let n = returns.len() as f64;
    let mean = returns.iter().sum::<f64>() / n;
    let var = returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / (n - 1.0);
    Some(var.sqrt())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rust_decimal_macros::dec;

    fn candle(close: Decimal) -> Candle {
        Candle {
            timestamp: Utc::now(),
            open: close,
            high: close + dec!(10),
            low: close - dec!(10),
            close,
            volume: dec!(100),
        }
    }

    #[test]
    fn test_atr_flat_series() {
        let candles: Vec<Candle> = (0..15).map(|_| candle(dec!(50000))).collect();
        // Every candle spans 20 with an unchanged close
        let atr = average_true_range(&candles, 14).unwrap();
        assert_eq!(atr, dec!(20));
    }

    #[test]
    fn test_atr_needs_two_candles() {
        assert!(average_true_range(&[candle(dec!(100))], 14).is_none());
        assert!(average_true_range(&[], 14).is_none());
    }

    #[test]
    fn test_simple_returns() {
        let candles = vec![candle(dec!(100)), candle(dec!(110)), candle(dec!(99))];
        let returns = simple_returns(&candles);
        assert_eq!(returns.len(), 2);
        assert!((returns[0] - 0.10).abs() < 1e-12);
        assert!((returns[1] + 0.10).abs() < 1e-12);
    }

    #[test]
    fn test_realized_volatility() {
        let returns = vec![0.01, -0.01, 0.01, -0.01];
        let vol = realized_volatility(&returns).unwrap();
        assert!(vol > 0.0);
        assert!(realized_volatility(&[0.01]).is_none());
    }
}
