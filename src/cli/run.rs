//! Run command implementation
//!
//! Wires the full engine together and runs it until interrupted. Signals
//! arrive from the prediction collaborator; the demo loop here only feeds
//! the paper exchange, it never fabricates signals.

use clap::Args;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::{info, warn};

use crate::config::{Config, ExecutionMode};
use crate::events::{event_bus, EngineEvent, EventBus, HealthSnapshot};
use crate::exchange::{ExchangeClient, PaperExchange};
use crate::ledger::{LedgerHandle, PositionMonitor};
use crate::marketdata::{
    average_true_range, realized_volatility, simple_returns, Candle, MarketDataSource,
};
use crate::metrics::MetricsAggregator;
use crate::portfolio::{PortfolioOptimizer, PortfolioState, SymbolExposure, SymbolInput};
use crate::risk::{
    BreakerState, LeverageCalculator, LeverageInputs, MarketRegime, RiskEngine, SizeRequest,
};
use crate::router::{OrderRouter, RouteResult};
use crate::signal::Signal;
use crate::store::JsonlStore;
use crate::telemetry::{record_latency, set_gauge, GaugeMetric, LatencyMetric};

const SIZING_CANDLES: usize = 60;
const ATR_PERIOD: usize = 14;

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Data directory for the trade journal
    #[arg(short, long, default_value = "data")]
    pub data_dir: String,
}

impl RunArgs {
    pub async fn execute(&self, config: Config) -> anyhow::Result<()> {
        if config.execution.mode == ExecutionMode::Live {
            anyhow::bail!("live execution requires an exchange client; run in paper mode");
        }
        std::fs::create_dir_all(&self.data_dir)?;

        let exchange = Arc::new(PaperExchange::new(
            config.execution.initial_balance,
            config.risk.taker_fee,
        ));
        let store = Arc::new(JsonlStore::new(&self.data_dir));
        let data: Arc<dyn MarketDataSource> = Arc::new(NoCandles);

        let mut engine = Engine::new(config, exchange, data, store).await?;
        engine.restore().await?;
        engine.run().await
    }
}

/// Market-data stub for paper runs without a feed attached
struct NoCandles;

#[async_trait::async_trait]
impl MarketDataSource for NoCandles {
    async fn get_candles(
        &self,
        _symbol: &str,
        _limit: usize,
    ) -> anyhow::Result<Vec<crate::marketdata::Candle>> {
        Ok(vec![])
    }
}

/// The assembled engine: sizing, routing, and the position monitor
pub struct Engine {
    config: Config,
    risk: RiskEngine,
    leverage: LeverageCalculator,
    optimizer: PortfolioOptimizer,
    router: OrderRouter,
    exchange: Arc<dyn ExchangeClient>,
    data: Arc<dyn MarketDataSource>,
    breakers: Arc<Mutex<BreakerState>>,
    metrics: Arc<Mutex<MetricsAggregator>>,
    ledger: LedgerHandle,
    monitor: Option<PositionMonitor>,
    bus: EventBus,
    /// Latest signal confidence per symbol, fed back into the optimizer
    last_confidence: HashMap<String, f64>,
    /// Per-symbol average pairwise correlation from the last portfolio pass
    correlations: HashMap<String, f64>,
    /// Portfolio volatility relative to the ceiling, in [0, 1]
    portfolio_risk: f64,
    portfolio: Option<PortfolioState>,
}

impl Engine {
    pub async fn new(
        config: Config,
        exchange: Arc<dyn ExchangeClient>,
        data: Arc<dyn MarketDataSource>,
        store: Arc<dyn crate::store::TradeStore>,
    ) -> anyhow::Result<Self> {
        let data_timeout = std::time::Duration::from_secs(config.execution.data_timeout_secs);
        let balance = tokio::time::timeout(data_timeout, exchange.get_balance())
            .await
            .map_err(|_| anyhow::anyhow!("initial balance fetch timed out"))??;
        let breakers = Arc::new(Mutex::new(BreakerState::new(balance, chrono::Utc::now())));
        let metrics = Arc::new(Mutex::new(MetricsAggregator::new(
            config.metrics.clone(),
            balance,
        )));
        let (bus, _events) = event_bus();

        let (monitor, ledger) = PositionMonitor::new(
            config.clone(),
            exchange.clone(),
            data.clone(),
            store,
            breakers.clone(),
            metrics.clone(),
            bus.clone(),
        );
        let router = OrderRouter::new(
            config.router.clone(),
            config.risk.clone(),
            exchange.clone(),
            breakers.clone(),
            ledger.command_sender(),
            bus.clone(),
        );

        Ok(Self {
            risk: RiskEngine::new(config.risk.clone(), config.capital.clone()),
            leverage: LeverageCalculator::new(config.leverage.clone()),
            optimizer: PortfolioOptimizer::new(config.portfolio.clone()),
            router,
            exchange,
            data,
            breakers,
            metrics,
            ledger,
            monitor: Some(monitor),
            bus,
            last_confidence: HashMap::new(),
            correlations: HashMap::new(),
            portfolio_risk: 0.0,
            portfolio: None,
            config,
        })
    }

    async fn fetch_balance(&self) -> anyhow::Result<Decimal> {
        let timeout = std::time::Duration::from_secs(self.config.execution.data_timeout_secs);
        match tokio::time::timeout(timeout, self.exchange.get_balance()).await {
            Ok(result) => result,
            Err(_) => anyhow::bail!("balance fetch timed out"),
        }
    }

    async fn fetch_candles(&self, symbol: &str, limit: usize) -> anyhow::Result<Vec<Candle>> {
        let timeout = std::time::Duration::from_secs(self.config.execution.data_timeout_secs);
        match tokio::time::timeout(timeout, self.data.get_candles(symbol, limit)).await {
            Ok(result) => result,
            Err(_) => anyhow::bail!("candle fetch for {symbol} timed out"),
        }
    }

    /// Reload open positions persisted by a previous run
    pub async fn restore(&mut self) -> anyhow::Result<()> {
        if let Some(monitor) = self.monitor.as_mut() {
            monitor.restore().await?;
        }
        Ok(())
    }

    pub fn ledger(&self) -> &LedgerHandle {
        &self.ledger
    }

    /// Point-in-time health for status surfaces
    pub fn health(&self) -> HealthSnapshot {
        let snapshot = self.ledger.snapshot();
        let breaker = {
            let mut breakers = self.breakers.lock().expect("breaker lock poisoned");
            breakers
                .check(
                    self.config.execution.initial_balance,
                    &self.config.risk,
                    chrono::Utc::now(),
                )
                .map(|reason| reason.describe())
        };
        HealthSnapshot {
            timestamp: chrono::Utc::now(),
            open_positions: snapshot.open_positions,
            error_positions: snapshot.error_positions,
            total_exposure: snapshot.total_exposure,
            unrealized_pnl: snapshot.unrealized_pnl,
            breaker,
            order_failure_rate: self.router.failure_rate(),
        }
    }

    /// Full signal pipeline: validate, compute leverage, size, route
    pub async fn handle_signal(&mut self, signal: &Signal) -> anyhow::Result<RouteResult> {
        let rules = self
            .config
            .symbol(&signal.symbol)
            .ok_or_else(|| anyhow::anyhow!("unknown symbol {}", signal.symbol))?
            .clone();
        if !self.risk.validate(signal) {
            return Ok(RouteResult::Rejected("below confidence floor".to_string()));
        }
        let started = std::time::Instant::now();
        self.last_confidence.insert(
            signal.symbol.clone(),
            signal.confidence.to_f64().unwrap_or(0.0),
        );

        let balance = self.fetch_balance().await?;
        let candles = self.fetch_candles(&signal.symbol, SIZING_CANDLES).await?;
        let atr = average_true_range(&candles, ATR_PERIOD);
        let returns = simple_returns(&candles);
        let volatility = realized_volatility(&returns).unwrap_or(0.0);

        let (drawdown, symbol_risk) = {
            let breakers = self.breakers.lock().expect("breaker lock poisoned");
            let metrics = self.metrics.lock().expect("metrics lock poisoned");
            (
                breakers.drawdown().to_f64().unwrap_or(0.0),
                metrics.symbol_risk_score(&signal.symbol),
            )
        };
        set_gauge(GaugeMetric::Equity, balance.to_f64().unwrap_or(0.0));
        set_gauge(GaugeMetric::Drawdown, drawdown);
        let leverage = self.leverage.compute(&LeverageInputs {
            symbol: signal.symbol.clone(),
            confidence: signal.confidence.to_f64().unwrap_or(0.0),
            volatility,
            correlation: self
                .correlations
                .get(&signal.symbol)
                .copied()
                .unwrap_or(0.0),
            drawdown,
            regime: MarketRegime::from_volatility(volatility),
            symbol_risk,
            portfolio_risk: self.portfolio_risk,
            symbol_cap: rules.max_leverage,
        });
        info!(
            symbol = %signal.symbol,
            leverage = leverage.leverage,
            risk_score = leverage.risk_score,
            "leverage computed"
        );

        // A model-provided stop level overrides the configured stop distance
        let stop_loss_pct = signal
            .stop
            .filter(|_| signal.price > Decimal::ZERO)
            .map(|stop| (signal.price - stop).abs() / signal.price);
        let request = SizeRequest {
            price: signal.price,
            atr,
            balance,
            side: signal.direction,
            confidence: signal.confidence,
            leverage: leverage.leverage,
            stop_loss_pct,
        };
        let decision = {
            let mut breakers = self.breakers.lock().expect("breaker lock poisoned");
            self.risk
                .size_position(&rules, &request, &mut breakers, chrono::Utc::now())
        };
        record_latency(LatencyMetric::Sizing, started.elapsed());
        if let Some(reason) = &decision.reject_reason {
            warn!(symbol = %signal.symbol, ?reason, "signal rejected at sizing");
            return Ok(RouteResult::Rejected(format!("{reason:?}")));
        }

        Ok(self.router.route(signal, &decision).await)
    }

    /// Latest portfolio state, once a rebalance pass has run
    pub fn portfolio(&self) -> Option<&PortfolioState> {
        self.portfolio.as_ref()
    }

    pub fn events(&self) -> tokio::sync::broadcast::Receiver<EngineEvent> {
        self.bus.subscribe()
    }

    /// Periodic portfolio pass: optimize, refresh cached risk inputs,
    /// and rebalance when the allocation has drifted out of band
    pub async fn rebalance_pass(&mut self) -> anyhow::Result<()> {
        if self.config.symbols.len() < 2 {
            return Ok(());
        }
        let balance = self.fetch_balance().await?;
        let snapshot = self.ledger.snapshot();

        let mut inputs = Vec::with_capacity(self.config.symbols.len());
        let mut exposures = Vec::with_capacity(self.config.symbols.len());
        for rules in &self.config.symbols {
            let candles = self
                .fetch_candles(&rules.name, self.config.portfolio.lookback_days + 1)
                .await?;
            let returns = simple_returns(&candles);
            if returns.is_empty() {
                info!(symbol = %rules.name, "no market data, skipping rebalance pass");
                return Ok(());
            }
            let exposure = snapshot
                .exposure_by_symbol
                .get(&rules.name)
                .copied()
                .unwrap_or(Decimal::ZERO);
            let current_pct = if balance > Decimal::ZERO {
                (exposure / balance).to_f64().unwrap_or(0.0)
            } else {
                0.0
            };
            inputs.push(SymbolInput {
                symbol: rules.name.clone(),
                returns,
                confidence: self
                    .last_confidence
                    .get(&rules.name)
                    .copied()
                    .unwrap_or(0.5),
                current_pct,
            });
            exposures.push(SymbolExposure {
                symbol: rules.name.clone(),
                allocation_pct: current_pct,
                exposure,
                unrealized_pnl: snapshot
                    .pnl_by_symbol
                    .get(&rules.name)
                    .copied()
                    .unwrap_or(Decimal::ZERO),
            });
        }

        let targets = self.optimizer.optimize(&inputs);
        let mut state = self.optimizer.state(&inputs, exposures, balance);
        let (needed, reasons) = self.optimizer.should_rebalance(&targets, &mut state);

        self.correlations = targets
            .iter()
            .map(|t| (t.symbol.clone(), t.correlation_penalty))
            .collect();
        self.portfolio_risk = if self.config.portfolio.volatility_ceiling > 0.0 {
            (state.volatility / self.config.portfolio.volatility_ceiling).clamp(0.0, 1.0)
        } else {
            0.0
        };

        if needed {
            info!(?reasons, "allocation out of band, rebalancing");
            let moved = self.optimizer.execute_rebalance(&targets, &self.bus).await;
            info!(moved, "rebalance pass complete");
        }
        self.portfolio = Some(state);
        Ok(())
    }

    /// Spawn the monitor task
    pub fn start(&mut self) -> anyhow::Result<tokio::task::JoinHandle<()>> {
        let monitor = self
            .monitor
            .take()
            .ok_or_else(|| anyhow::anyhow!("engine already running"))?;
        Ok(tokio::spawn(monitor.run()))
    }

    /// Run the monitor until interrupted, then drain and stop
    pub async fn run(mut self) -> anyhow::Result<()> {
        let monitor_task = self.start()?;

        let mut rebalance = tokio::time::interval(std::time::Duration::from_secs(
            self.config.portfolio.rebalance_interval_secs.max(1),
        ));
        rebalance.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        info!("engine running, ctrl-c to stop");
        loop {
            tokio::select! {
                result = tokio::signal::ctrl_c() => {
                    result?;
                    info!("shutdown requested");
                    break;
                }
                _ = rebalance.tick() => {
                    if let Err(err) = self.rebalance_pass().await {
                        warn!(%err, "rebalance pass failed");
                    }
                }
            }
        }

        self.ledger.shutdown().await?;
        monitor_task.await?;

        let balance = match self.fetch_balance().await {
            Ok(balance) => balance,
            Err(err) => {
                warn!(%err, "final balance unavailable");
                Decimal::ZERO
            }
        };
        let report = self
            .metrics
            .lock()
            .expect("metrics lock poisoned")
            .report();
        info!(
            %balance,
            total_trades = report.total_trades,
            pnl = %report.total_pnl,
            "session closed"
        );
        Ok(())
    }
}
