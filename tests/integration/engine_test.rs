//! End-to-end engine tests: signal in, sized order out, monitored close

use async_trait::async_trait;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;
use std::time::Duration;

use riskpilot::cli::Engine;
use riskpilot::config::Config;
use riskpilot::events::EngineEvent;
use riskpilot::exchange::PaperExchange;
use riskpilot::marketdata::{Candle, MarketDataSource};
use riskpilot::router::RouteResult;
use riskpilot::signal::{Direction, Signal};
use riskpilot::store::NullStore;

struct NoCandles;

#[async_trait]
impl MarketDataSource for NoCandles {
    async fn get_candles(&self, _symbol: &str, _limit: usize) -> anyhow::Result<Vec<Candle>> {
        Ok(vec![])
    }
}

fn test_config() -> Config {
    let mut config = Config::for_tests();
    config.capital.monitor_interval_secs = 1;
    config
}

async fn wait_for(
    engine: &Engine,
    deadline: Duration,
    predicate: impl Fn(&riskpilot::ledger::LedgerSnapshot) -> bool,
) -> bool {
    let start = tokio::time::Instant::now();
    while start.elapsed() < deadline {
        if predicate(&engine.ledger().snapshot()) {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    false
}

#[tokio::test]
async fn test_signal_to_open_position() {
    let exchange = Arc::new(PaperExchange::new(dec!(10000), dec!(0.001)));
    exchange.set_price("BTCUSDT", dec!(50000)).await;

    let mut engine = Engine::new(
        test_config(),
        exchange.clone(),
        Arc::new(NoCandles),
        Arc::new(NullStore),
    )
    .await
    .unwrap();
    let task = engine.start().unwrap();

    let signal = Signal::new("BTCUSDT", Direction::Long, dec!(0.8), dec!(50000));
    let fill = match engine.handle_signal(&signal).await.unwrap() {
        RouteResult::Placed(fill) => fill,
        other => panic!("expected a fill, got {other:?}"),
    };
    let order_id: riskpilot::exchange::OrderId = fill.order_id;
    assert!(!order_id.is_nil());

    assert!(
        wait_for(&engine, Duration::from_secs(3), |s| s.open_positions == 1).await,
        "position never reached the ledger"
    );
    let snapshot = engine.ledger().snapshot();
    assert!(snapshot.total_exposure > dec!(0));

    let health = engine.health();
    assert_eq!(health.open_positions, 1);
    assert!(health.breaker.is_none());
    assert_eq!(health.order_failure_rate, 0.0);

    engine.ledger().shutdown().await.unwrap();
    task.await.unwrap();
}

#[tokio::test]
async fn test_stop_loss_round_trip() {
    let exchange = Arc::new(PaperExchange::new(dec!(10000), dec!(0.001)));
    exchange.set_price("BTCUSDT", dec!(50000)).await;

    let mut engine = Engine::new(
        test_config(),
        exchange.clone(),
        Arc::new(NoCandles),
        Arc::new(NullStore),
    )
    .await
    .unwrap();
    let task = engine.start().unwrap();

    let signal = Signal::new("BTCUSDT", Direction::Long, dec!(0.8), dec!(50000));
    assert!(engine.handle_signal(&signal).await.unwrap().is_placed());
    assert!(wait_for(&engine, Duration::from_secs(3), |s| s.open_positions == 1).await);

    // Gap through the 2% stop
    exchange.set_price("BTCUSDT", dec!(48500)).await;
    assert!(
        wait_for(&engine, Duration::from_secs(5), |s| {
            s.open_positions == 0 && s.stats.total_trades == 1
        })
        .await,
        "stop loss never fired"
    );
    let snapshot = engine.ledger().snapshot();
    assert_eq!(snapshot.stats.losses, 1);
    assert!(snapshot.stats.realized_pnl < dec!(0));

    engine.ledger().shutdown().await.unwrap();
    task.await.unwrap();
}

#[tokio::test]
async fn test_signal_stop_overrides_configured_stop() {
    let exchange = Arc::new(PaperExchange::new(dec!(10000), dec!(0.001)));
    exchange.set_price("BTCUSDT", dec!(50000)).await;

    let mut engine = Engine::new(
        test_config(),
        exchange.clone(),
        Arc::new(NoCandles),
        Arc::new(NullStore),
    )
    .await
    .unwrap();
    let task = engine.start().unwrap();

    // Model stop at 49500 (1%), tighter than the configured 2% stop
    let signal = Signal::new("BTCUSDT", Direction::Long, dec!(0.8), dec!(50000))
        .with_levels(Some(dec!(49500)), None);
    assert!(engine.handle_signal(&signal).await.unwrap().is_placed());
    assert!(wait_for(&engine, Duration::from_secs(3), |s| s.open_positions == 1).await);

    // Above the configured 49000 stop; only the model stop can fire here
    exchange.set_price("BTCUSDT", dec!(49400)).await;
    assert!(
        wait_for(&engine, Duration::from_secs(5), |s| {
            s.open_positions == 0 && s.stats.total_trades == 1
        })
        .await,
        "model stop never fired"
    );
    assert_eq!(engine.ledger().snapshot().stats.losses, 1);

    engine.ledger().shutdown().await.unwrap();
    task.await.unwrap();
}

#[tokio::test]
async fn test_duplicate_signal_same_bar_rejected() {
    let exchange = Arc::new(PaperExchange::new(dec!(10000), dec!(0.001)));
    exchange.set_price("BTCUSDT", dec!(50000)).await;

    let mut engine = Engine::new(
        test_config(),
        exchange.clone(),
        Arc::new(NoCandles),
        Arc::new(NullStore),
    )
    .await
    .unwrap();
    let task = engine.start().unwrap();

    let signal = Signal::new("BTCUSDT", Direction::Long, dec!(0.8), dec!(50000));
    assert!(engine.handle_signal(&signal).await.unwrap().is_placed());

    let mut again = Signal::new("BTCUSDT", Direction::Long, dec!(0.9), dec!(50100));
    again.timestamp = signal.timestamp;
    assert!(matches!(
        engine.handle_signal(&again).await.unwrap(),
        RouteResult::Rejected(_)
    ));

    engine.ledger().shutdown().await.unwrap();
    task.await.unwrap();
}

/// Same oscillating series for every symbol, so pairwise correlation is 1
struct WigglyCandles;

#[async_trait]
impl MarketDataSource for WigglyCandles {
    async fn get_candles(&self, _symbol: &str, limit: usize) -> anyhow::Result<Vec<Candle>> {
        let now = chrono::Utc::now();
        let mut candles = Vec::with_capacity(limit);
        for i in 0..limit {
            let close = dec!(100) + Decimal::from((i % 5) as i64);
            candles.push(Candle {
                timestamp: now - chrono::Duration::days((limit - i) as i64),
                open: close,
                high: close + dec!(1),
                low: close - dec!(1),
                close,
                volume: dec!(10),
            });
        }
        Ok(candles)
    }
}

#[tokio::test]
async fn test_rebalance_pass_moves_allocations() {
    let mut config = test_config();
    let mut eth = config.symbols[0].clone();
    eth.name = "ETHUSDT".to_string();
    config.symbols.push(eth);
    config.portfolio.rebalance_pause_secs = 0;

    let exchange = Arc::new(PaperExchange::new(dec!(10000), dec!(0.001)));
    let mut engine = Engine::new(
        config,
        exchange,
        Arc::new(WigglyCandles),
        Arc::new(NullStore),
    )
    .await
    .unwrap();

    assert!(engine.portfolio().is_none());
    let mut events = engine.events();
    engine.rebalance_pass().await.unwrap();

    let state = engine.portfolio().expect("portfolio state after pass");
    assert!(state.rebalance_needed);
    assert!(state.max_correlation > 0.9);
    assert_eq!(state.total_balance, dec!(10000));

    let mut steps = 0;
    while let Ok(event) = events.try_recv() {
        if matches!(event, EngineEvent::RebalanceStep { .. }) {
            steps += 1;
        }
    }
    assert!(steps > 0, "no rebalance steps emitted");
}

#[tokio::test]
async fn test_low_confidence_rejected_before_sizing() {
    let exchange = Arc::new(PaperExchange::new(dec!(10000), dec!(0.001)));
    let mut engine = Engine::new(
        test_config(),
        exchange.clone(),
        Arc::new(NoCandles),
        Arc::new(NullStore),
    )
    .await
    .unwrap();

    let signal = Signal::new("BTCUSDT", Direction::Long, dec!(0.3), dec!(50000));
    assert!(matches!(
        engine.handle_signal(&signal).await.unwrap(),
        RouteResult::Rejected(_)
    ));
    assert!(exchange.fills().await.is_empty());
}
