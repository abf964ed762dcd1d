//! Paper trading exchange with simulated fills

use super::{ExchangeClient, OrderFill, OrderId, OrderRequest};
use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Paper exchange: fills at the quoted price, charges the taker fee,
/// and tracks balance as margin flows in and out
pub struct PaperExchange {
    fee_rate: Decimal,
    prices: Arc<RwLock<HashMap<String, Decimal>>>,
    balance: Arc<RwLock<Decimal>>,
    fills: Arc<RwLock<Vec<OrderFill>>>,
}

impl PaperExchange {
    /// Create a new paper exchange
    pub fn new(initial_balance: Decimal, fee_rate: Decimal) -> Self {
        Self {
            fee_rate,
            prices: Arc::new(RwLock::new(HashMap::new())),
            balance: Arc::new(RwLock::new(initial_balance)),
            fills: Arc::new(RwLock::new(vec![])),
        }
    }

    /// Inject a quote (tests and replay drivers)
    pub async fn set_price(&self, symbol: &str, price: Decimal) {
        let mut prices = self.prices.write().await;
        prices.insert(symbol.to_string(), price);
    }

    /// Apply realized P&L to the simulated balance
    pub async fn settle(&self, pnl: Decimal) {
        let mut balance = self.balance.write().await;
        *balance += pnl;
    }

    /// All fills so far
    pub async fn fills(&self) -> Vec<OrderFill> {
        self.fills.read().await.clone()
    }
}

#[async_trait]
impl ExchangeClient for PaperExchange {
    async fn get_price(&self, symbol: &str) -> anyhow::Result<Decimal> {
        let prices = self.prices.read().await;
        prices
            .get(symbol)
            .copied()
            .ok_or_else(|| anyhow::anyhow!("no quote for {symbol}"))
    }

    async fn place_order(&self, request: OrderRequest) -> anyhow::Result<OrderFill> {
        let fill_price = match request.price {
            Some(p) => p,
            None => self.get_price(&request.symbol).await?,
        };
        if request.quantity <= Decimal::ZERO {
            anyhow::bail!("order quantity must be positive");
        }

        let fee = request.quantity * fill_price * self.fee_rate;
        let fill = OrderFill {
            order_id: OrderId::new_v4(),
            symbol: request.symbol,
            side: request.side,
            filled_qty: request.quantity,
            fill_price,
            fee,
            timestamp: Utc::now(),
        };

        {
            let mut balance = self.balance.write().await;
            *balance -= fee;
        }
        let mut fills = self.fills.write().await;
        fills.push(fill.clone());

        tracing::info!(order_id = %fill.order_id, symbol = %fill.symbol, "paper order filled");
        Ok(fill)
    }

    async fn get_balance(&self) -> anyhow::Result<Decimal> {
        Ok(*self.balance.read().await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exchange::{OrderSide, OrderType};
    use rust_decimal_macros::dec;

    fn market_order(symbol: &str, qty: Decimal) -> OrderRequest {
        OrderRequest {
            symbol: symbol.to_string(),
            side: OrderSide::Buy,
            quantity: qty,
            order_type: OrderType::Market,
            price: None,
            stop_price: None,
        }
    }

    #[tokio::test]
    async fn test_fill_at_quote() {
        let exchange = PaperExchange::new(dec!(10000), dec!(0.001));
        exchange.set_price("BTCUSDT", dec!(50000)).await;

        let fill = exchange
            .place_order(market_order("BTCUSDT", dec!(0.1)))
            .await
            .unwrap();

        assert_eq!(fill.fill_price, dec!(50000));
        assert_eq!(fill.filled_qty, dec!(0.1));
        assert_eq!(fill.fee, dec!(5)); // 0.1 * 50000 * 0.001
        assert_eq!(exchange.fills().await.len(), 1);
    }

    #[tokio::test]
    async fn test_fee_deducted_from_balance() {
        let exchange = PaperExchange::new(dec!(10000), dec!(0.001));
        exchange.set_price("BTCUSDT", dec!(50000)).await;
        exchange
            .place_order(market_order("BTCUSDT", dec!(0.1)))
            .await
            .unwrap();
        assert_eq!(exchange.get_balance().await.unwrap(), dec!(9995));
    }

    #[tokio::test]
    async fn test_no_quote_errors() {
        let exchange = PaperExchange::new(dec!(10000), dec!(0.001));
        let result = exchange.get_price("DOGEUSDT").await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_rejects_non_positive_quantity() {
        let exchange = PaperExchange::new(dec!(10000), dec!(0.001));
        exchange.set_price("BTCUSDT", dec!(50000)).await;
        let result = exchange.place_order(market_order("BTCUSDT", dec!(0))).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_settle_adjusts_balance() {
        let exchange = PaperExchange::new(dec!(10000), dec!(0));
        exchange.settle(dec!(-250)).await;
        assert_eq!(exchange.get_balance().await.unwrap(), dec!(9750));
    }
}
