//! Position monitoring loop
//!
//! A single task owns the position book; everything else talks to it over a
//! command channel and reads state from a watch snapshot. Each cycle marks
//! every active position to market, checks exits in priority order, and
//! drives any close through the exchange.

use chrono::Utc;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::{Config, PositionCapPolicy};
use crate::events::{EngineEvent, EventBus};
use crate::exchange::{ExchangeClient, OrderRequest, OrderType};
use crate::ledger::book::{LedgerStats, PositionBook};
use crate::ledger::position::{
    ExitReason, Position, PositionLimits, PositionSide, PositionStatus,
};
use crate::marketdata::{average_true_range, MarketDataSource};
use crate::metrics::MetricsAggregator;
use crate::risk::{BreakerState, RiskDecision, TrailingConfig};
use crate::store::TradeStore;
use crate::telemetry::{record_latency, set_gauge, GaugeMetric, LatencyMetric};
use rust_decimal::prelude::ToPrimitive;

const COMMAND_BUFFER: usize = 64;
const ATR_CANDLES: usize = 30;
const ATR_PERIOD: usize = 14;

/// Commands accepted by the monitor task
#[derive(Debug)]
pub enum LedgerCommand {
    /// Open a position from an accepted decision and its fill
    Open {
        decision: Box<RiskDecision>,
        side: PositionSide,
        confidence: Decimal,
        fill_price: Decimal,
    },
    /// Close one position
    Close { id: Uuid, reason: ExitReason },
    /// Close every open position in a symbol
    CloseSymbol { symbol: String, reason: ExitReason },
    /// Finish the current cycle and stop
    Shutdown,
}

/// Published state of the ledger, refreshed every cycle
#[derive(Debug, Clone, Default)]
pub struct LedgerSnapshot {
    pub open_positions: usize,
    pub error_positions: usize,
    pub total_exposure: Decimal,
    pub unrealized_pnl: Decimal,
    pub exposure_by_symbol: HashMap<String, Decimal>,
    pub pnl_by_symbol: HashMap<String, Decimal>,
    pub stats: LedgerStats,
}

/// Client half of the monitor: command sender plus snapshot receiver
#[derive(Clone)]
pub struct LedgerHandle {
    tx: mpsc::Sender<LedgerCommand>,
    snapshot: watch::Receiver<LedgerSnapshot>,
}

impl LedgerHandle {
    pub async fn send(&self, command: LedgerCommand) -> anyhow::Result<()> {
        self.tx
            .send(command)
            .await
            .map_err(|_| anyhow::anyhow!("position monitor is gone"))
    }

    pub fn snapshot(&self) -> LedgerSnapshot {
        self.snapshot.borrow().clone()
    }

    /// Raw command sender for collaborators that submit opens directly
    pub fn command_sender(&self) -> mpsc::Sender<LedgerCommand> {
        self.tx.clone()
    }

    pub async fn shutdown(&self) -> anyhow::Result<()> {
        self.send(LedgerCommand::Shutdown).await
    }
}

/// The monitor task; sole owner of the position book
pub struct PositionMonitor {
    config: Config,
    book: PositionBook,
    exchange: Arc<dyn ExchangeClient>,
    data: Arc<dyn MarketDataSource>,
    store: Arc<dyn TradeStore>,
    breakers: Arc<Mutex<BreakerState>>,
    metrics: Arc<Mutex<MetricsAggregator>>,
    bus: EventBus,
    entry_balance: Decimal,
    rx: mpsc::Receiver<LedgerCommand>,
    snapshot_tx: watch::Sender<LedgerSnapshot>,
}

impl PositionMonitor {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: Config,
        exchange: Arc<dyn ExchangeClient>,
        data: Arc<dyn MarketDataSource>,
        store: Arc<dyn TradeStore>,
        breakers: Arc<Mutex<BreakerState>>,
        metrics: Arc<Mutex<MetricsAggregator>>,
        bus: EventBus,
    ) -> (Self, LedgerHandle) {
        let (tx, rx) = mpsc::channel(COMMAND_BUFFER);
        let (snapshot_tx, snapshot_rx) = watch::channel(LedgerSnapshot::default());
        let entry_balance = config.execution.initial_balance;
        let monitor = Self {
            config,
            book: PositionBook::new(),
            exchange,
            data,
            store,
            breakers,
            metrics,
            bus,
            entry_balance,
            rx,
            snapshot_tx,
        };
        let handle = LedgerHandle {
            tx,
            snapshot: snapshot_rx,
        };
        (monitor, handle)
    }

    /// Reload positions persisted by a previous run
    pub async fn restore(&mut self) -> anyhow::Result<()> {
        let positions = self.store.load_open_positions().await?;
        if !positions.is_empty() {
            info!(count = positions.len(), "restored open positions");
            self.book.restore(positions);
        }
        Ok(())
    }

    /// Run until shutdown; each tick marks positions and works exits
    pub async fn run(mut self) {
        let mut interval = tokio::time::interval(Duration::from_secs(
            self.config.capital.monitor_interval_secs,
        ));
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    self.cycle().await;
                }
                command = self.rx.recv() => {
                    match command {
                        Some(LedgerCommand::Open { decision, side, confidence, fill_price }) => {
                            self.handle_open(&decision, side, confidence, fill_price).await;
                        }
                        Some(LedgerCommand::Close { id, reason }) => {
                            self.close_position(&id, reason).await;
                        }
                        Some(LedgerCommand::CloseSymbol { symbol, reason }) => {
                            let ids: Vec<Uuid> = self
                                .book
                                .open_for_symbol(&symbol)
                                .iter()
                                .map(|p| p.id)
                                .collect();
                            for id in ids {
                                self.close_position(&id, reason).await;
                            }
                        }
                        Some(LedgerCommand::Shutdown) | None => {
                            info!("position monitor shutting down");
                            self.cycle().await;
                            break;
                        }
                    }
                    self.publish();
                }
            }
        }
    }

    /// One monitoring pass over every open position
    async fn cycle(&mut self) {
        let started = std::time::Instant::now();
        let ids = self.book.open_ids();
        for id in ids {
            let symbol = match self.book.get(&id) {
                Some(p) if p.status == PositionStatus::Open => p.symbol.clone(),
                _ => continue,
            };

            // I/O first, no book state held across the await
            let timeout = Duration::from_secs(self.config.execution.data_timeout_secs);
            let price = match tokio::time::timeout(timeout, self.exchange.get_price(&symbol)).await
            {
                Ok(Ok(price)) => price,
                Ok(Err(err)) => {
                    warn!(%symbol, %err, "price fetch failed, skipping position");
                    continue;
                }
                Err(_) => {
                    warn!(%symbol, "price fetch timed out, skipping position");
                    continue;
                }
            };
            let atr_pct = self.current_atr_pct(&symbol, price).await;

            let exit = {
                let position = match self.book.get_mut(&id) {
                    Some(p) => p,
                    None => continue,
                };
                position.mark(price, Utc::now());
                if let Some(stop) = position.update_trailing(price) {
                    debug!(%symbol, %stop, "trailing stop ratcheted");
                }
                Self::exit_reason(position, self.entry_balance, atr_pct, self.config.capital.emergency_atr_pct)
            };

            if let Some(reason) = exit {
                self.close_position(&id, reason).await;
            }
        }

        if let Err(err) = self
            .store
            .save_open_positions(&self.book.all())
            .await
        {
            warn!(%err, "open-position snapshot failed");
        }
        self.publish();
        record_latency(LatencyMetric::MonitorCycle, started.elapsed());
    }

    /// Exit checks in priority order
    fn exit_reason(
        position: &Position,
        entry_balance: Decimal,
        atr_pct: Option<Decimal>,
        emergency_atr_pct: Decimal,
    ) -> Option<ExitReason> {
        let price = position.current_price;
        if position.is_stop_hit(price) {
            return Some(ExitReason::StopLoss);
        }
        if position.is_target_hit(price) {
            return Some(ExitReason::TakeProfit);
        }
        if position.is_trailing_hit(price) {
            return Some(ExitReason::TrailingStop);
        }
        if position.is_risk_limit_breached(entry_balance, Utc::now()) {
            let loss = -position.unrealized_pnl;
            if loss >= position.limits.max_loss_currency && position.limits.max_loss_currency > Decimal::ZERO
            {
                return Some(ExitReason::MaxLossBreached);
            }
            if entry_balance > Decimal::ZERO
                && position.limits.max_loss_pct > Decimal::ZERO
                && loss / entry_balance >= position.limits.max_loss_pct
            {
                return Some(ExitReason::MaxLossBreached);
            }
            return Some(ExitReason::MaxDurationReached);
        }
        if let Some(atr_pct) = atr_pct {
            if atr_pct >= emergency_atr_pct {
                return Some(ExitReason::EmergencyVolatility);
            }
        }
        None
    }

    /// ATR as a fraction of price; `None` when candles are unavailable
    async fn current_atr_pct(&self, symbol: &str, price: Decimal) -> Option<Decimal> {
        if price <= Decimal::ZERO {
            return None;
        }
        let timeout = Duration::from_secs(self.config.execution.data_timeout_secs);
        match tokio::time::timeout(timeout, self.data.get_candles(symbol, ATR_CANDLES)).await {
            Ok(Ok(candles)) => average_true_range(&candles, ATR_PERIOD).map(|atr| atr / price),
            Ok(Err(err)) => {
                debug!(%symbol, %err, "candle fetch failed, skipping volatility exit");
                None
            }
            Err(_) => {
                debug!(%symbol, "candle fetch timed out, skipping volatility exit");
                None
            }
        }
    }

    /// Open a new position; the symbol cap is enforced per policy
    async fn handle_open(
        &mut self,
        decision: &RiskDecision,
        side: PositionSide,
        confidence: Decimal,
        fill_price: Decimal,
    ) {
        let cap = self.config.position_cap(&decision.symbol);
        if self.book.open_count_for(&decision.symbol) >= cap {
            match self.config.capital.cap_policy {
                PositionCapPolicy::CloseExisting => {
                    let ids: Vec<Uuid> = self
                        .book
                        .open_for_symbol(&decision.symbol)
                        .iter()
                        .map(|p| p.id)
                        .collect();
                    for id in ids {
                        self.close_position(&id, ExitReason::SymbolCapReplaced).await;
                    }
                }
                PositionCapPolicy::Reject => {
                    warn!(symbol = %decision.symbol, "symbol position cap hit, dropping open");
                    let _ = self.bus.send(EngineEvent::OrderRejected {
                        symbol: decision.symbol.clone(),
                        reason: "symbol position cap".to_string(),
                    });
                    return;
                }
            }
        }

        let limits = PositionLimits {
            max_loss_currency: decision.risk_amount,
            max_loss_pct: self.config.capital.max_loss_per_position_pct,
            max_duration_mins: self.config.capital.max_position_duration_mins,
            trailing: TrailingConfig {
                trigger_pct: decision.trailing.trigger_pct,
                distance_pct: decision.trailing.distance_pct,
            },
        };
        let position = Position::from_decision(decision, side, fill_price, confidence, limits, Utc::now());

        match self.book.add(position.clone(), cap) {
            Ok(()) => {
                info!(
                    symbol = %position.symbol,
                    quantity = %position.quantity,
                    leverage = position.leverage,
                    entry = %fill_price,
                    "position opened"
                );
                let _ = self.bus.send(EngineEvent::PositionOpened(Box::new(position)));
            }
            Err(err) => {
                error!(%err, "failed to add position");
            }
        }
    }

    /// Drive one close through the exchange: open -> closing -> closed,
    /// or open -> error when the exit order fails
    async fn close_position(&mut self, id: &Uuid, reason: ExitReason) {
        let (symbol, request) = match self.book.get(id) {
            Some(p) if p.status == PositionStatus::Open => (
                p.symbol.clone(),
                OrderRequest {
                    symbol: p.symbol.clone(),
                    side: p.side.exit_order(),
                    quantity: p.quantity,
                    order_type: OrderType::Market,
                    price: None,
                    stop_price: None,
                },
            ),
            _ => return,
        };

        if let Err(err) = self.book.begin_close(id) {
            error!(%symbol, %err, "close transition rejected");
            return;
        }

        let timeout = Duration::from_secs(self.config.router.order_timeout_secs);
        let fill = match tokio::time::timeout(timeout, self.exchange.place_order(request)).await {
            Ok(Ok(fill)) => fill,
            Ok(Err(err)) => {
                error!(%symbol, %err, reason = ?reason, "exit order failed");
                let _ = self.book.mark_error(id);
                return;
            }
            Err(_) => {
                error!(%symbol, reason = ?reason, "exit order timed out");
                let _ = self.book.mark_error(id);
                return;
            }
        };

        let trade = match self
            .book
            .finalize_close(id, fill.fill_price, fill.fee, reason, Utc::now())
        {
            Ok(trade) => trade,
            Err(err) => {
                error!(%symbol, %err, "close finalization rejected");
                return;
            }
        };

        info!(
            symbol = %trade.symbol,
            pnl = %trade.realized_pnl,
            reason = ?trade.reason,
            "position closed"
        );

        {
            let mut breakers = self.breakers.lock().expect("breaker lock poisoned");
            breakers.record_trade(trade.realized_pnl, Utc::now());
        }
        {
            let mut metrics = self.metrics.lock().expect("metrics lock poisoned");
            metrics.record_trade(&trade);
        }
        if let Err(err) = self.store.save_trade(&trade).await {
            warn!(%err, "trade journal write failed");
        }
        let _ = self.bus.send(EngineEvent::PositionClosed(Box::new(trade)));
    }

    fn publish(&self) {
        let error_positions = self
            .book
            .all()
            .iter()
            .filter(|p| p.status == PositionStatus::Error)
            .count();
        let snapshot = LedgerSnapshot {
            open_positions: self.book.open_ids().len(),
            error_positions,
            total_exposure: self.book.total_exposure(),
            unrealized_pnl: self.book.unrealized_pnl(),
            exposure_by_symbol: self.book.notionals(),
            pnl_by_symbol: self.book.unrealized_by_symbol(),
            stats: self.book.stats().clone(),
        };
        set_gauge(GaugeMetric::OpenPositions, snapshot.open_positions as f64);
        set_gauge(GaugeMetric::ErrorPositions, snapshot.error_positions as f64);
        set_gauge(
            GaugeMetric::TotalExposure,
            snapshot.total_exposure.to_f64().unwrap_or(0.0),
        );
        set_gauge(
            GaugeMetric::UnrealizedPnl,
            snapshot.unrealized_pnl.to_f64().unwrap_or(0.0),
        );
        set_gauge(
            GaugeMetric::RealizedPnl,
            snapshot.stats.realized_pnl.to_f64().unwrap_or(0.0),
        );
        let _ = self.snapshot_tx.send(snapshot);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::events::event_bus;
    use crate::exchange::PaperExchange;
    use crate::marketdata::Candle;
    use crate::store::NullStore;
    use async_trait::async_trait;
    use rust_decimal_macros::dec;

    struct FlatCandles;

    #[async_trait]
    impl MarketDataSource for FlatCandles {
        async fn get_candles(&self, _symbol: &str, limit: usize) -> anyhow::Result<Vec<Candle>> {
            let mut candles = Vec::with_capacity(limit);
            for i in 0..limit {
                candles.push(Candle {
                    timestamp: Utc::now(),
                    open: dec!(100),
                    high: dec!(100.5),
                    low: dec!(99.5),
                    close: dec!(100) + Decimal::from(i % 2),
                    volume: dec!(10),
                });
            }
            Ok(candles)
        }
    }

    fn harness(config: Config) -> (PositionMonitor, LedgerHandle, Arc<PaperExchange>, EventBus) {
        let exchange = Arc::new(PaperExchange::new(dec!(10000), dec!(0.001)));
        let breakers = Arc::new(Mutex::new(BreakerState::new(dec!(10000), Utc::now())));
        let metrics = Arc::new(Mutex::new(MetricsAggregator::new(
            config.metrics.clone(),
            dec!(10000),
        )));
        let (bus, _rx) = event_bus();
        let (monitor, handle) = PositionMonitor::new(
            config,
            exchange.clone(),
            Arc::new(FlatCandles),
            Arc::new(NullStore),
            breakers,
            metrics,
            bus.clone(),
        );
        (monitor, handle, exchange, bus)
    }

    fn decision(symbol: &str) -> RiskDecision {
        RiskDecision {
            symbol: symbol.to_string(),
            quantity: dec!(1),
            entry_price: dec!(100),
            stop_price: dec!(98),
            target_price: dec!(104),
            leverage: 1,
            max_notional: dec!(5000),
            risk_amount: dec!(2),
            risk_fraction: dec!(0.0002),
            trailing: TrailingConfig {
                trigger_pct: dec!(0.01),
                distance_pct: dec!(0.02),
            },
            reject_reason: None,
        }
    }

    #[tokio::test]
    async fn test_open_then_stop_loss_close() {
        let config = Config::for_tests();
        let (mut monitor, _handle, exchange, _bus) = harness(config);
        exchange.set_price("BTCUSDT", dec!(100)).await;

        monitor
            .handle_open(&decision("BTCUSDT"), PositionSide::Long, dec!(0.8), dec!(100))
            .await;
        assert_eq!(monitor.book.open_ids().len(), 1);

        exchange.set_price("BTCUSDT", dec!(97)).await;
        monitor.cycle().await;

        assert_eq!(monitor.book.open_ids().len(), 0);
        assert_eq!(monitor.book.stats().total_trades, 1);
        assert_eq!(monitor.book.stats().losses, 1);
    }

    #[tokio::test]
    async fn test_take_profit_close_records_metrics() {
        let config = Config::for_tests();
        let (mut monitor, _handle, exchange, _bus) = harness(config);
        exchange.set_price("BTCUSDT", dec!(100)).await;

        monitor
            .handle_open(&decision("BTCUSDT"), PositionSide::Long, dec!(0.8), dec!(100))
            .await;
        exchange.set_price("BTCUSDT", dec!(105)).await;
        monitor.cycle().await;

        assert_eq!(monitor.book.stats().wins, 1);
        let metrics = monitor.metrics.lock().unwrap();
        assert_eq!(metrics.total_trades(), 1);
    }

    #[tokio::test]
    async fn test_cap_close_existing_replaces() {
        let config = Config::for_tests();
        let (mut monitor, _handle, exchange, _bus) = harness(config);
        exchange.set_price("BTCUSDT", dec!(100)).await;

        monitor
            .handle_open(&decision("BTCUSDT"), PositionSide::Long, dec!(0.8), dec!(100))
            .await;
        monitor
            .handle_open(&decision("BTCUSDT"), PositionSide::Long, dec!(0.7), dec!(100))
            .await;

        // Old one closed as replaced, new one open
        assert_eq!(monitor.book.open_count_for("BTCUSDT"), 1);
        assert_eq!(monitor.book.stats().total_trades, 1);
    }

    #[tokio::test]
    async fn test_cap_reject_policy_drops_open() {
        let mut config = Config::for_tests();
        config.capital.cap_policy = PositionCapPolicy::Reject;
        let (mut monitor, _handle, exchange, _bus) = harness(config);
        exchange.set_price("BTCUSDT", dec!(100)).await;

        monitor
            .handle_open(&decision("BTCUSDT"), PositionSide::Long, dec!(0.8), dec!(100))
            .await;
        monitor
            .handle_open(&decision("BTCUSDT"), PositionSide::Long, dec!(0.7), dec!(100))
            .await;

        assert_eq!(monitor.book.open_count_for("BTCUSDT"), 1);
        assert_eq!(monitor.book.stats().total_trades, 0);
    }

    #[tokio::test]
    async fn test_exit_order_failure_marks_error() {
        let config = Config::for_tests();
        let (mut monitor, _handle, _exchange, _bus) = harness(config);

        // No quote injected, so the paper engine fails the exit order
        monitor
            .handle_open(&decision("BTCUSDT"), PositionSide::Long, dec!(0.8), dec!(100))
            .await;
        let id = monitor.book.open_ids()[0];

        monitor.close_position(&id, ExitReason::Manual).await;

        let position = monitor.book.get(&id).unwrap();
        assert_eq!(position.status, PositionStatus::Error);
        assert_eq!(monitor.book.open_ids().len(), 0);
    }

    struct StalledExchange;

    #[async_trait]
    impl ExchangeClient for StalledExchange {
        async fn get_price(&self, _symbol: &str) -> anyhow::Result<Decimal> {
            std::future::pending().await
        }
        async fn place_order(
            &self,
            _request: OrderRequest,
        ) -> anyhow::Result<crate::exchange::OrderFill> {
            std::future::pending().await
        }
        async fn get_balance(&self) -> anyhow::Result<Decimal> {
            std::future::pending().await
        }
    }

    #[tokio::test]
    async fn test_hung_price_fetch_does_not_stall_cycle() {
        let mut config = Config::for_tests();
        config.execution.data_timeout_secs = 0;
        let (bus, _rx) = event_bus();
        let breakers = Arc::new(Mutex::new(BreakerState::new(dec!(10000), Utc::now())));
        let metrics = Arc::new(Mutex::new(MetricsAggregator::new(
            config.metrics.clone(),
            dec!(10000),
        )));
        let (mut monitor, _handle) = PositionMonitor::new(
            config,
            Arc::new(StalledExchange),
            Arc::new(FlatCandles),
            Arc::new(NullStore),
            breakers,
            metrics,
            bus,
        );

        monitor
            .handle_open(&decision("BTCUSDT"), PositionSide::Long, dec!(0.8), dec!(100))
            .await;

        // The cycle must return despite the exchange never answering,
        // leaving the position untouched
        monitor.cycle().await;
        assert_eq!(monitor.book.open_ids().len(), 1);
        assert_eq!(monitor.book.stats().total_trades, 0);
    }

    #[tokio::test]
    async fn test_trailing_ratchets_during_cycle() {
        let config = Config::for_tests();
        let (mut monitor, _handle, exchange, _bus) = harness(config);
        exchange.set_price("BTCUSDT", dec!(100)).await;

        monitor
            .handle_open(&decision("BTCUSDT"), PositionSide::Long, dec!(0.8), dec!(100))
            .await;
        let id = monitor.book.open_ids()[0];

        exchange.set_price("BTCUSDT", dec!(102)).await;
        monitor.cycle().await;

        let position = monitor.book.get(&id).unwrap();
        assert_eq!(position.trailing_stop, Some(dec!(99.96)));
    }
}
