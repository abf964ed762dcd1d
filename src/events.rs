//! Engine event bus
//!
//! Discrete events for the observability/notification collaborators, plus
//! the on-demand health snapshot.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::ledger::{ClosedTrade, Position};

/// Bus capacity; slow subscribers lag rather than block the engine
pub const EVENT_BUS_CAPACITY: usize = 256;

/// Discrete engine events
#[derive(Debug, Clone)]
pub enum EngineEvent {
    PositionOpened(Box<Position>),
    PositionClosed(Box<ClosedTrade>),
    BreakerTripped { reason: String },
    OrderRejected { symbol: String, reason: String },
    RebalanceStep { step: usize, total_steps: usize, symbol: String, delta_pct: f64 },
}

/// Fan-out sender for engine events
pub type EventBus = broadcast::Sender<EngineEvent>;

/// Create the event bus
pub fn event_bus() -> (EventBus, broadcast::Receiver<EngineEvent>) {
    broadcast::channel(EVENT_BUS_CAPACITY)
}

/// Point-in-time engine health for the observability collaborator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthSnapshot {
    pub timestamp: DateTime<Utc>,
    pub open_positions: usize,
    pub error_positions: usize,
    pub total_exposure: Decimal,
    pub unrealized_pnl: Decimal,
    /// Active breaker description, if any
    pub breaker: Option<String>,
    /// Rolling order failure rate
    pub order_failure_rate: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_event_fanout() {
        let (bus, mut rx1) = event_bus();
        let mut rx2 = bus.subscribe();

        bus.send(EngineEvent::BreakerTripped {
            reason: "daily loss".to_string(),
        })
        .unwrap();

        assert!(matches!(
            rx1.recv().await.unwrap(),
            EngineEvent::BreakerTripped { .. }
        ));
        assert!(matches!(
            rx2.recv().await.unwrap(),
            EngineEvent::BreakerTripped { .. }
        ));
    }
}
