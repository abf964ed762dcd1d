//! Daily P&L rollups and risk-adjusted performance ratios
//!
//! Trades land in per-day and per-symbol buckets; a rolling window of daily
//! returns drives volatility, Sharpe, Sortino, and Calmar. The aggregates
//! feed back into the optimizer and the leverage risk scores.

use chrono::NaiveDate;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

use crate::config::MetricsConfig;
use crate::ledger::ClosedTrade;

/// One day's totals across symbols
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DailyStats {
    pub pnl: Decimal,
    pub fees: Decimal,
    pub trades: u64,
    pub wins: u64,
}

impl DailyStats {
    pub fn win_rate(&self) -> f64 {
        if self.trades == 0 {
            return 0.0;
        }
        self.wins as f64 / self.trades as f64
    }
}

/// Running totals for one symbol
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SymbolPerformance {
    pub pnl: Decimal,
    pub trades: u64,
    pub wins: u64,
    pub losses: u64,
}

impl SymbolPerformance {
    pub fn win_rate(&self) -> f64 {
        if self.trades == 0 {
            return 0.0;
        }
        self.wins as f64 / self.trades as f64
    }
}

/// Snapshot of the aggregate performance picture
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerformanceReport {
    pub total_pnl: Decimal,
    pub total_trades: u64,
    pub win_rate: f64,
    pub daily_volatility: f64,
    pub sharpe: f64,
    pub sortino: f64,
    pub calmar: f64,
    pub max_drawdown: f64,
}

/// Rolls trades up into daily and per-symbol aggregates
#[derive(Debug, Clone)]
pub struct MetricsAggregator {
    config: MetricsConfig,
    /// Equity base used to express daily P&L as a return
    equity_base: Decimal,
    days: BTreeMap<NaiveDate, DailyStats>,
    symbols: HashMap<String, SymbolPerformance>,
}

impl MetricsAggregator {
    pub fn new(config: MetricsConfig, equity_base: Decimal) -> Self {
        Self {
            config,
            equity_base,
            days: BTreeMap::new(),
            symbols: HashMap::new(),
        }
    }

    /// Record one closed trade
    pub fn record_trade(&mut self, trade: &ClosedTrade) {
        let day = self.days.entry(trade.exit_time.date_naive()).or_default();
        day.pnl += trade.realized_pnl;
        day.fees += trade.fees;
        day.trades += 1;
        if trade.realized_pnl >= Decimal::ZERO {
            day.wins += 1;
        }

        let perf = self.symbols.entry(trade.symbol.clone()).or_default();
        perf.pnl += trade.realized_pnl;
        perf.trades += 1;
        if trade.realized_pnl >= Decimal::ZERO {
            perf.wins += 1;
        } else {
            perf.losses += 1;
        }
    }

    pub fn day(&self, date: NaiveDate) -> Option<&DailyStats> {
        self.days.get(&date)
    }

    pub fn symbol(&self, symbol: &str) -> Option<&SymbolPerformance> {
        self.symbols.get(symbol)
    }

    /// Daily returns over the configured rolling window, oldest first
    pub fn daily_returns(&self) -> Vec<f64> {
        if self.equity_base <= Decimal::ZERO {
            return vec![];
        }
        let base = self.equity_base.to_f64().unwrap_or(1.0);
        self.days
            .values()
            .rev()
            .take(self.config.window_days)
            .map(|d| d.pnl.to_f64().unwrap_or(0.0) / base)
            .collect::<Vec<_>>()
            .into_iter()
            .rev()
            .collect()
    }

    /// Sample standard deviation of daily returns
    pub fn daily_volatility(&self) -> f64 {
        let returns = self.daily_returns();
        if returns.len() < 2 {
            return 0.0;
        }
        let n = returns.len() as f64;
        let mean = returns.iter().sum::<f64>() / n;
        (returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / (n - 1.0)).sqrt()
    }

    /// Annualized Sharpe ratio over the rolling window
    pub fn sharpe(&self) -> f64 {
        let returns = self.daily_returns();
        let vol = self.daily_volatility();
        if returns.is_empty() || vol == 0.0 {
            return 0.0;
        }
        let mean = returns.iter().sum::<f64>() / returns.len() as f64;
        let daily_rf = self.config.risk_free_rate / self.config.periods_per_year;
        (mean - daily_rf) / vol * self.config.periods_per_year.sqrt()
    }

    /// Sortino ratio: downside deviation only
    pub fn sortino(&self) -> f64 {
        let returns = self.daily_returns();
        if returns.is_empty() {
            return 0.0;
        }
        let mean = returns.iter().sum::<f64>() / returns.len() as f64;
        let daily_rf = self.config.risk_free_rate / self.config.periods_per_year;
        // Downside deviation over the full window, upside clipped to zero
        let downside_sum: f64 = returns
            .iter()
            .map(|r| (r - daily_rf).min(0.0).powi(2))
            .sum();
        let downside_dev = (downside_sum / returns.len() as f64).sqrt();
        if downside_dev == 0.0 {
            return 0.0;
        }
        (mean - daily_rf) / downside_dev * self.config.periods_per_year.sqrt()
    }

    /// Maximum drawdown of the cumulative return curve
    pub fn max_drawdown(&self) -> f64 {
        let returns = self.daily_returns();
        let mut equity = 1.0;
        let mut peak = 1.0;
        let mut max_dd = 0.0;
        for r in returns {
            equity *= 1.0 + r;
            if equity > peak {
                peak = equity;
            }
            let dd = (peak - equity) / peak;
            if dd > max_dd {
                max_dd = dd;
            }
        }
        max_dd
    }

    /// Calmar ratio: annualized return over max drawdown
    pub fn calmar(&self) -> f64 {
        let returns = self.daily_returns();
        if returns.is_empty() {
            return 0.0;
        }
        let mean = returns.iter().sum::<f64>() / returns.len() as f64;
        let annualized = mean * self.config.periods_per_year;
        let dd = self.max_drawdown();
        if dd == 0.0 {
            return 0.0;
        }
        annualized / dd
    }

    pub fn total_pnl(&self) -> Decimal {
        self.days.values().map(|d| d.pnl).sum()
    }

    pub fn total_trades(&self) -> u64 {
        self.days.values().map(|d| d.trades).sum()
    }

    pub fn win_rate(&self) -> f64 {
        let trades = self.total_trades();
        if trades == 0 {
            return 0.0;
        }
        let wins: u64 = self.days.values().map(|d| d.wins).sum();
        wins as f64 / trades as f64
    }

    /// Symbols ranked by P&L-weighted win rate, best first
    pub fn rankings(&self) -> Vec<(String, f64)> {
        let mut ranked: Vec<(String, f64)> = self
            .symbols
            .iter()
            .map(|(name, perf)| {
                let pnl = perf.pnl.to_f64().unwrap_or(0.0);
                (name.clone(), pnl * perf.win_rate().max(0.1))
            })
            .collect();
        ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        ranked
    }

    /// Risk score in [0, 1] per symbol for the leverage feedback loop:
    /// loss-heavy symbols score high
    pub fn symbol_risk_score(&self, symbol: &str) -> f64 {
        match self.symbols.get(symbol) {
            Some(perf) if perf.trades >= 5 => {
                let loss_rate = perf.losses as f64 / perf.trades as f64;
                let losing_money = if perf.pnl < Decimal::ZERO { 0.3 } else { 0.0 };
                (loss_rate * 0.7 + losing_money).clamp(0.0, 1.0)
            }
            _ => 0.0,
        }
    }

    pub fn report(&self) -> PerformanceReport {
        PerformanceReport {
            total_pnl: self.total_pnl(),
            total_trades: self.total_trades(),
            win_rate: self.win_rate(),
            daily_volatility: self.daily_volatility(),
            sharpe: self.sharpe(),
            sortino: self.sortino(),
            calmar: self.calmar(),
            max_drawdown: self.max_drawdown(),
        }
    }
}
