//! Session circuit breakers
//!
//! Explicit, injectable breaker state with a daily-reset lifecycle. Every
//! sizing and routing attempt checks it; every closed trade mutates it.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::config::RiskConfig;

/// Reason a breaker is blocking new risk
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum BreakerReason {
    /// Daily loss limit reached
    DailyLossLimit,
    /// Drawdown from session peak equity exceeded
    MaxDrawdown,
    /// Too many consecutive losing trades
    ConsecutiveLosses,
    /// Router failure-rate breaker is open until the given time
    RouterErrors(DateTime<Utc>),
}

impl BreakerReason {
    /// Human-readable description
    pub fn describe(&self) -> String {
        match self {
            Self::DailyLossLimit => "daily loss limit reached".to_string(),
            Self::MaxDrawdown => "max drawdown from peak equity reached".to_string(),
            Self::ConsecutiveLosses => "consecutive loss limit reached".to_string(),
            Self::RouterErrors(until) => format!("order failure rate too high until {until}"),
        }
    }
}

/// Process-wide circuit-breaker state
///
/// Daily loss and the consecutive-loss counter reset at each new trading
/// day; drawdown resets only when a new equity peak is set.
#[derive(Debug, Clone)]
pub struct BreakerState {
    /// Trading day the daily accumulators belong to
    trading_day: NaiveDate,
    /// Net realized P&L for the day (negative when losing)
    daily_pnl: Decimal,
    /// Session peak equity (high-water mark)
    peak_equity: Decimal,
    /// Latest known equity
    current_equity: Decimal,
    /// Current losing streak
    consecutive_losses: u32,
}

impl BreakerState {
    /// Create breaker state at session start
    pub fn new(initial_equity: Decimal, now: DateTime<Utc>) -> Self {
        Self {
            trading_day: now.date_naive(),
            daily_pnl: Decimal::ZERO,
            peak_equity: initial_equity,
            current_equity: initial_equity,
            consecutive_losses: 0,
        }
    }

    /// Roll daily accumulators when the trading day changes
    pub fn roll_day(&mut self, now: DateTime<Utc>) {
        let today = now.date_naive();
        if today != self.trading_day {
            self.trading_day = today;
            self.daily_pnl = Decimal::ZERO;
            self.consecutive_losses = 0;
        }
    }

    /// Record a closed trade's realized P&L
    pub fn record_trade(&mut self, pnl: Decimal, now: DateTime<Utc>) {
        self.roll_day(now);
        self.daily_pnl += pnl;
        if pnl < Decimal::ZERO {
            self.consecutive_losses += 1;
        } else {
            self.consecutive_losses = 0;
        }
    }

    /// Record the latest account equity; a new peak resets the drawdown
    pub fn update_equity(&mut self, equity: Decimal) {
        self.current_equity = equity;
        if equity > self.peak_equity {
            self.peak_equity = equity;
        }
    }

    /// Net daily loss as a positive number (zero when the day is profitable)
    pub fn daily_loss(&self) -> Decimal {
        (-self.daily_pnl).max(Decimal::ZERO)
    }

    /// Drawdown fraction from the session peak
    pub fn drawdown(&self) -> Decimal {
        if self.peak_equity <= Decimal::ZERO {
            return Decimal::ZERO;
        }
        ((self.peak_equity - self.current_equity) / self.peak_equity).max(Decimal::ZERO)
    }

    pub fn consecutive_losses(&self) -> u32 {
        self.consecutive_losses
    }

    pub fn peak_equity(&self) -> Decimal {
        self.peak_equity
    }

    /// First breaker blocking new risk, if any
    pub fn check(
        &mut self,
        balance: Decimal,
        config: &RiskConfig,
        now: DateTime<Utc>,
    ) -> Option<BreakerReason> {
        self.roll_day(now);
        if balance > Decimal::ZERO && self.daily_loss() >= balance * config.max_daily_loss_pct {
            return Some(BreakerReason::DailyLossLimit);
        }
        if self.drawdown() >= config.max_drawdown_pct {
            return Some(BreakerReason::MaxDrawdown);
        }
        if self.consecutive_losses >= config.max_consecutive_losses {
            return Some(BreakerReason::ConsecutiveLosses);
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use rust_decimal_macros::dec;

    fn config() -> RiskConfig {
        RiskConfig::default()
    }

    #[test]
    fn test_daily_loss_blocks_at_threshold() {
        let now = Utc::now();
        let mut state = BreakerState::new(dec!(10000), now);

        // 450 of losses against a 500 limit: still trading
        state.record_trade(dec!(-450), now);
        assert!(state.check(dec!(10000), &config(), now).is_none());

        // 550 total: blocked
        state.record_trade(dec!(-100), now);
        assert_eq!(
            state.check(dec!(10000), &config(), now),
            Some(BreakerReason::DailyLossLimit)
        );
    }

    #[test]
    fn test_daily_loss_resets_next_day() {
        let now = Utc::now();
        let mut state = BreakerState::new(dec!(10000), now);
        state.record_trade(dec!(-600), now);
        assert!(state.check(dec!(10000), &config(), now).is_some());

        let tomorrow = now + Duration::days(1);
        assert!(state.check(dec!(10000), &config(), tomorrow).is_none());
        assert_eq!(state.daily_loss(), dec!(0));
    }

    #[test]
    fn test_profitable_day_never_counts_as_loss() {
        let now = Utc::now();
        let mut state = BreakerState::new(dec!(10000), now);
        state.record_trade(dec!(800), now);
        state.record_trade(dec!(-300), now);
        assert_eq!(state.daily_loss(), dec!(0));
    }

    #[test]
    fn test_drawdown_blocks_and_resets_on_new_peak() {
        let now = Utc::now();
        let mut state = BreakerState::new(dec!(10000), now);

        state.update_equity(dec!(12000)); // new peak
        state.update_equity(dec!(10000)); // ~16.7% drawdown
        assert_eq!(
            state.check(dec!(10000), &config(), now),
            Some(BreakerReason::MaxDrawdown)
        );

        // A fresh peak clears it
        state.update_equity(dec!(12500));
        assert!(state.check(dec!(12500), &config(), now).is_none());
    }

    #[test]
    fn test_consecutive_losses() {
        let now = Utc::now();
        let mut state = BreakerState::new(dec!(10000), now);
        for _ in 0..4 {
            state.record_trade(dec!(-10), now);
        }
        assert!(state.check(dec!(10000), &config(), now).is_none());

        state.record_trade(dec!(-10), now);
        assert_eq!(
            state.check(dec!(10000), &config(), now),
            Some(BreakerReason::ConsecutiveLosses)
        );

        // A winner resets the streak
        state.record_trade(dec!(5), now);
        assert_eq!(state.consecutive_losses(), 0);
    }

    #[test]
    fn test_streak_resets_at_day_boundary() {
        let now = Utc::now();
        let mut state = BreakerState::new(dec!(10000), now);
        for _ in 0..5 {
            state.record_trade(dec!(-10), now);
        }
        let tomorrow = now + Duration::days(1);
        state.roll_day(tomorrow);
        assert_eq!(state.consecutive_losses(), 0);
    }
}
