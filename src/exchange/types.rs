//! Exchange order types

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Order identifier
pub type OrderId = Uuid;

/// Order side
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    /// The side that unwinds this one
    pub fn opposite(self) -> Self {
        match self {
            Self::Buy => Self::Sell,
            Self::Sell => Self::Buy,
        }
    }
}

/// Order type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderType {
    /// Market order (immediate execution)
    Market,
    /// Limit order (price specified)
    Limit,
}

/// An order to be submitted
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderRequest {
    /// Symbol, e.g. "BTCUSDT"
    pub symbol: String,
    /// Order side
    pub side: OrderSide,
    /// Quantity in base units
    pub quantity: Decimal,
    /// Order type
    pub order_type: OrderType,
    /// Limit price (limit orders)
    pub price: Option<Decimal>,
    /// Attached protective stop (informational for the paper engine)
    pub stop_price: Option<Decimal>,
}

/// A fill returned by the exchange
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderFill {
    /// Order ID assigned by the exchange
    pub order_id: OrderId,
    /// Symbol
    pub symbol: String,
    /// Order side
    pub side: OrderSide,
    /// Filled quantity
    pub filled_qty: Decimal,
    /// Average fill price
    pub fill_price: Decimal,
    /// Fee charged
    pub fee: Decimal,
    /// Fill timestamp
    pub timestamp: DateTime<Utc>,
}
