//! Position state machine
//!
//! Positions move `open -> closing -> closed`, or `open -> error`. Closed is
//! terminal and removes the position from the active set; no other
//! transitions are permitted.

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::exchange::OrderSide;
use crate::risk::{RiskDecision, TrailingConfig};
use crate::signal::Direction;

/// Position side
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PositionSide {
    Long,
    Short,
}

impl PositionSide {
    /// Order side that opens a position of this side
    pub fn entry_order(self) -> OrderSide {
        match self {
            Self::Long => OrderSide::Buy,
            Self::Short => OrderSide::Sell,
        }
    }

    /// Order side that closes it
    pub fn exit_order(self) -> OrderSide {
        self.entry_order().opposite()
    }
}

impl TryFrom<Direction> for PositionSide {
    type Error = ();

    fn try_from(direction: Direction) -> Result<Self, ()> {
        match direction {
            Direction::Long => Ok(Self::Long),
            Direction::Short => Ok(Self::Short),
            Direction::Hold => Err(()),
        }
    }
}

/// Position lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PositionStatus {
    Open,
    Closing,
    Closed,
    Error,
}

/// Why a position was closed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitReason {
    StopLoss,
    TakeProfit,
    TrailingStop,
    MaxLossBreached,
    MaxDurationReached,
    EmergencyVolatility,
    SymbolCapReplaced,
    Rebalance,
    Manual,
}

/// Per-position risk limits fixed at entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PositionLimits {
    /// Maximum tolerated loss in currency
    pub max_loss_currency: Decimal,
    /// Maximum tolerated loss as a fraction of entry balance
    pub max_loss_pct: Decimal,
    /// Maximum holding duration
    pub max_duration_mins: i64,
    /// Trailing-stop parameters
    pub trailing: TrailingConfig,
}

/// An open leveraged position; owned exclusively by the ledger
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    pub id: Uuid,
    pub symbol: String,
    pub side: PositionSide,
    pub quantity: Decimal,
    pub entry_price: Decimal,
    pub current_price: Decimal,
    pub leverage: u32,
    pub stop_price: Decimal,
    pub target_price: Decimal,
    /// Ratcheting stop; set once the trail activates
    pub trailing_stop: Option<Decimal>,
    pub entry_time: DateTime<Utc>,
    pub last_update: DateTime<Utc>,
    pub unrealized_pnl: Decimal,
    /// Best unrealized P&L seen
    pub high_water_pnl: Decimal,
    /// Worst unrealized P&L seen (max adverse excursion)
    pub max_adverse_pnl: Decimal,
    /// Confidence of the originating signal
    pub confidence: Decimal,
    pub status: PositionStatus,
    pub limits: PositionLimits,
}

impl Position {
    /// Build a position from an accepted decision and its fill price
    pub fn from_decision(
        decision: &RiskDecision,
        side: PositionSide,
        fill_price: Decimal,
        confidence: Decimal,
        limits: PositionLimits,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            symbol: decision.symbol.clone(),
            side,
            quantity: decision.quantity,
            entry_price: fill_price,
            current_price: fill_price,
            leverage: decision.leverage,
            stop_price: decision.stop_price,
            target_price: decision.target_price,
            trailing_stop: None,
            entry_time: now,
            last_update: now,
            unrealized_pnl: Decimal::ZERO,
            high_water_pnl: Decimal::ZERO,
            max_adverse_pnl: Decimal::ZERO,
            confidence,
            status: PositionStatus::Open,
            limits,
        }
    }

    /// Unrealized P&L at a price, scaled by leverage
    pub fn pnl_at(&self, price: Decimal) -> Decimal {
        let diff = match self.side {
            PositionSide::Long => price - self.entry_price,
            PositionSide::Short => self.entry_price - price,
        };
        diff * self.quantity * Decimal::from(self.leverage)
    }

    /// Signed price move fraction in the position's favor
    pub fn favorable_move_pct(&self, price: Decimal) -> Decimal {
        if self.entry_price.is_zero() {
            return Decimal::ZERO;
        }
        let diff = match self.side {
            PositionSide::Long => price - self.entry_price,
            PositionSide::Short => self.entry_price - price,
        };
        diff / self.entry_price
    }

    /// Mark to a new price, updating P&L extremes
    pub fn mark(&mut self, price: Decimal, now: DateTime<Utc>) {
        self.current_price = price;
        self.unrealized_pnl = self.pnl_at(price);
        if self.unrealized_pnl > self.high_water_pnl {
            self.high_water_pnl = self.unrealized_pnl;
        }
        if self.unrealized_pnl < self.max_adverse_pnl {
            self.max_adverse_pnl = self.unrealized_pnl;
        }
        self.last_update = now;
    }

    /// Enforce the monotonic lifecycle
    pub fn transition(&mut self, next: PositionStatus) -> Result<(), (PositionStatus, PositionStatus)> {
        let allowed = matches!(
            (self.status, next),
            (PositionStatus::Open, PositionStatus::Closing)
                | (PositionStatus::Closing, PositionStatus::Closed)
                | (PositionStatus::Open, PositionStatus::Error)
        );
        if allowed {
            self.status = next;
            Ok(())
        } else {
            Err((self.status, next))
        }
    }

    pub fn is_stop_hit(&self, price: Decimal) -> bool {
        match self.side {
            PositionSide::Long => price <= self.stop_price,
            PositionSide::Short => price >= self.stop_price,
        }
    }

    pub fn is_target_hit(&self, price: Decimal) -> bool {
        match self.side {
            PositionSide::Long => price >= self.target_price,
            PositionSide::Short => price <= self.target_price,
        }
    }

    pub fn is_trailing_hit(&self, price: Decimal) -> bool {
        match (self.trailing_stop, self.side) {
            (Some(trail), PositionSide::Long) => price <= trail,
            (Some(trail), PositionSide::Short) => price >= trail,
            (None, _) => false,
        }
    }

    /// Loss-limit or duration breach
    pub fn is_risk_limit_breached(&self, entry_balance: Decimal, now: DateTime<Utc>) -> bool {
        let loss = -self.unrealized_pnl;
        if loss >= self.limits.max_loss_currency && self.limits.max_loss_currency > Decimal::ZERO {
            return true;
        }
        if entry_balance > Decimal::ZERO
            && loss / entry_balance >= self.limits.max_loss_pct
            && self.limits.max_loss_pct > Decimal::ZERO
        {
            return true;
        }
        now - self.entry_time >= Duration::minutes(self.limits.max_duration_mins)
    }

    /// Ratchet the trailing stop; never loosens
    ///
    /// Activates once the favorable move reaches the trigger. The candidate
    /// must be strictly better than both the protective stop and any prior
    /// trailing stop.
    pub fn update_trailing(&mut self, price: Decimal) -> Option<Decimal> {
        let trailing = self.limits.trailing;
        if self.favorable_move_pct(price) < trailing.trigger_pct {
            return None;
        }
        match self.side {
            PositionSide::Long => {
                let candidate = price * (Decimal::ONE - trailing.distance_pct);
                let floor = self.trailing_stop.unwrap_or(self.stop_price);
                if candidate > floor {
                    self.trailing_stop = Some(candidate);
                    return Some(candidate);
                }
            }
            PositionSide::Short => {
                let candidate = price * (Decimal::ONE + trailing.distance_pct);
                let ceiling = self.trailing_stop.unwrap_or(self.stop_price);
                if candidate < ceiling {
                    self.trailing_stop = Some(candidate);
                    return Some(candidate);
                }
            }
        }
        None
    }

    /// Crude win-probability estimate from where price sits between stop
    /// and target
    pub fn win_probability(&self) -> Decimal {
        let span = (self.target_price - self.stop_price).abs();
        if span.is_zero() {
            return Decimal::new(5, 1);
        }
        let progress = match self.side {
            PositionSide::Long => self.current_price - self.stop_price,
            PositionSide::Short => self.stop_price - self.current_price,
        };
        (progress / span).clamp(Decimal::ZERO, Decimal::ONE)
    }
}

/// A finalized trade emitted on close
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClosedTrade {
    pub position_id: Uuid,
    pub symbol: String,
    pub side: PositionSide,
    pub quantity: Decimal,
    pub leverage: u32,
    pub entry_price: Decimal,
    pub exit_price: Decimal,
    pub realized_pnl: Decimal,
    pub fees: Decimal,
    pub reason: ExitReason,
    pub confidence: Decimal,
    pub entry_time: DateTime<Utc>,
    pub exit_time: DateTime<Utc>,
}
