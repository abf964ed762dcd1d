//! Position book
//!
//! Owns the active-position set and the session trade counters. All
//! mutation goes through the monitor task; see `monitor.rs`.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;
use uuid::Uuid;

use super::position::{ClosedTrade, ExitReason, Position, PositionStatus};

/// Ledger errors
#[derive(Debug, Error)]
pub enum LedgerError {
    /// Adding would exceed the per-symbol cap
    #[error("position cap reached for {0}")]
    SymbolCapExceeded(String),
    /// Position not found
    #[error("unknown position {0}")]
    UnknownPosition(Uuid),
    /// Lifecycle violation
    #[error("invalid transition {from:?} -> {to:?}")]
    InvalidTransition {
        from: PositionStatus,
        to: PositionStatus,
    },
}

/// Session aggregate counters, updated on every close
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LedgerStats {
    pub total_trades: u64,
    pub wins: u64,
    pub losses: u64,
    pub realized_pnl: Decimal,
    pub best_trade: Decimal,
    pub worst_trade: Decimal,
}

impl LedgerStats {
    pub fn win_rate(&self) -> f64 {
        if self.total_trades == 0 {
            return 0.0;
        }
        self.wins as f64 / self.total_trades as f64
    }
}

/// The set of open positions plus session counters
#[derive(Debug, Default)]
pub struct PositionBook {
    positions: HashMap<Uuid, Position>,
    stats: LedgerStats,
}

impl PositionBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a new position, enforcing the per-symbol cap
    pub fn add(&mut self, position: Position, cap: usize) -> Result<(), LedgerError> {
        if self.open_count_for(&position.symbol) >= cap {
            return Err(LedgerError::SymbolCapExceeded(position.symbol.clone()));
        }
        self.positions.insert(position.id, position);
        Ok(())
    }

    /// Rebuild from durable storage at startup
    pub fn restore(&mut self, positions: Vec<Position>) {
        for position in positions {
            self.positions.insert(position.id, position);
        }
    }

    pub fn get(&self, id: &Uuid) -> Option<&Position> {
        self.positions.get(id)
    }

    pub fn get_mut(&mut self, id: &Uuid) -> Option<&mut Position> {
        self.positions.get_mut(id)
    }

    /// Open positions for one symbol
    pub fn open_for_symbol(&self, symbol: &str) -> Vec<&Position> {
        self.positions
            .values()
            .filter(|p| p.symbol == symbol && p.status == PositionStatus::Open)
            .collect()
    }

    pub fn open_count_for(&self, symbol: &str) -> usize {
        self.open_for_symbol(symbol).len()
    }

    /// IDs of positions the monitor should evaluate
    pub fn open_ids(&self) -> Vec<Uuid> {
        self.positions
            .values()
            .filter(|p| p.status == PositionStatus::Open)
            .map(|p| p.id)
            .collect()
    }

    /// All live (non-error) positions
    pub fn active(&self) -> Vec<&Position> {
        self.positions
            .values()
            .filter(|p| p.status != PositionStatus::Error)
            .collect()
    }

    pub fn all(&self) -> Vec<Position> {
        self.positions.values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    pub fn stats(&self) -> &LedgerStats {
        &self.stats
    }

    /// Total notional exposure of open positions
    pub fn total_exposure(&self) -> Decimal {
        self.positions
            .values()
            .filter(|p| p.status == PositionStatus::Open)
            .map(|p| p.quantity * p.current_price)
            .sum()
    }

    /// Sum of unrealized P&L over open positions
    pub fn unrealized_pnl(&self) -> Decimal {
        self.positions
            .values()
            .filter(|p| p.status == PositionStatus::Open)
            .map(|p| p.unrealized_pnl)
            .sum()
    }

    /// Notional per symbol (for VaR weights and stress tests)
    pub fn notionals(&self) -> HashMap<String, Decimal> {
        let mut map: HashMap<String, Decimal> = HashMap::new();
        for p in self.positions.values() {
            if p.status == PositionStatus::Open {
                *map.entry(p.symbol.clone()).or_default() += p.quantity * p.current_price;
            }
        }
        map
    }

    /// Unrealized P&L per symbol
    pub fn unrealized_by_symbol(&self) -> HashMap<String, Decimal> {
        let mut map: HashMap<String, Decimal> = HashMap::new();
        for p in self.positions.values() {
            if p.status == PositionStatus::Open {
                *map.entry(p.symbol.clone()).or_default() += p.unrealized_pnl;
            }
        }
        map
    }

    /// Begin closing: open -> closing
    pub fn begin_close(&mut self, id: &Uuid) -> Result<(), LedgerError> {
        let position = self
            .positions
            .get_mut(id)
            .ok_or(LedgerError::UnknownPosition(*id))?;
        position
            .transition(PositionStatus::Closing)
            .map_err(|(from, to)| LedgerError::InvalidTransition { from, to })
    }

    /// Mark a position failed: open -> error
    pub fn mark_error(&mut self, id: &Uuid) -> Result<(), LedgerError> {
        let position = self
            .positions
            .get_mut(id)
            .ok_or(LedgerError::UnknownPosition(*id))?;
        position
            .transition(PositionStatus::Error)
            .map_err(|(from, to)| LedgerError::InvalidTransition { from, to })
    }

    /// Finalize a close: closing -> closed, remove, update counters
    pub fn finalize_close(
        &mut self,
        id: &Uuid,
        exit_price: Decimal,
        fees: Decimal,
        reason: ExitReason,
        now: DateTime<Utc>,
    ) -> Result<ClosedTrade, LedgerError> {
        {
            let position = self
                .positions
                .get_mut(id)
                .ok_or(LedgerError::UnknownPosition(*id))?;
            position
                .transition(PositionStatus::Closed)
                .map_err(|(from, to)| LedgerError::InvalidTransition { from, to })?;
        }
        let position = self
            .positions
            .remove(id)
            .ok_or(LedgerError::UnknownPosition(*id))?;

        let realized_pnl = position.pnl_at(exit_price) - fees;
        self.stats.total_trades += 1;
        if realized_pnl >= Decimal::ZERO {
            self.stats.wins += 1;
        } else {
            self.stats.losses += 1;
        }
        self.stats.realized_pnl += realized_pnl;
        if realized_pnl > self.stats.best_trade {
            self.stats.best_trade = realized_pnl;
        }
        if realized_pnl < self.stats.worst_trade {
            self.stats.worst_trade = realized_pnl;
        }

        Ok(ClosedTrade {
            position_id: position.id,
            symbol: position.symbol.clone(),
            side: position.side,
            quantity: position.quantity,
            leverage: position.leverage,
            entry_price: position.entry_price,
            exit_price,
            realized_pnl,
            fees,
            reason,
            confidence: position.confidence,
            entry_time: position.entry_time,
            exit_time: now,
        })
    }
}
