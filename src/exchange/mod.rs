//! Exchange connectivity boundary
//!
//! The real exchange client is an external collaborator; this module defines
//! the narrow trait the engine consumes and a paper implementation with
//! simulated fills.

mod paper;
mod types;

pub use paper::PaperExchange;
pub use types::{OrderFill, OrderId, OrderRequest, OrderSide, OrderType};

use async_trait::async_trait;
use rust_decimal::Decimal;

/// Trait for exchange client implementations
#[async_trait]
pub trait ExchangeClient: Send + Sync {
    /// Latest traded price for a symbol
    async fn get_price(&self, symbol: &str) -> anyhow::Result<Decimal>;
    /// Place an order and return the fill
    async fn place_order(&self, request: OrderRequest) -> anyhow::Result<OrderFill>;
    /// Current account balance
    async fn get_balance(&self) -> anyhow::Result<Decimal>;
}
