//! Position ledger
//!
//! The position state machine, the book that owns every position, and the
//! monitoring task that marks them to market and drives exits.

mod book;
mod monitor;
mod position;

pub use book::{LedgerError, LedgerStats, PositionBook};
pub use monitor::{LedgerCommand, LedgerHandle, LedgerSnapshot, PositionMonitor};
pub use position::{
    ClosedTrade, ExitReason, Position, PositionLimits, PositionSide, PositionStatus,
};
