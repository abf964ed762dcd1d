//! Cross-component checks of the documented sizing and breaker behavior

use chrono::Utc;
use rust_decimal_macros::dec;

use riskpilot::config::{CapitalConfig, Config, LeverageConfig, RiskConfig};
use riskpilot::risk::{
    BreakerReason, BreakerState, LeverageCalculator, LeverageInputs, MarketRegime, RiskEngine,
    SizeRequest,
};
use riskpilot::signal::Direction;

#[test]
fn test_example_config_parses() {
    let config: Config = toml::from_str(include_str!("../../config.toml.example")).unwrap();
    config.validate().unwrap();
    assert_eq!(config.symbols.len(), 2);
    assert_eq!(config.position_cap("BTCUSDT"), 1);
    assert_eq!(config.risk.max_consecutive_losses, 5);
}

#[test]
fn test_btc_long_sizing_reference_case() {
    // 10k balance, 50k entry, 2% stop, full confidence, 1x leverage
    let engine = RiskEngine::new(RiskConfig::default(), CapitalConfig::default());
    let config = Config::for_tests();
    let rules = config.symbol("BTCUSDT").unwrap();
    let mut breakers = BreakerState::new(dec!(10000), Utc::now());

    let decision = engine.size_position(
        rules,
        &SizeRequest {
            price: dec!(50000),
            atr: Some(dec!(500)),
            balance: dec!(10000),
            side: Direction::Long,
            confidence: dec!(1.0),
            leverage: 1,
            stop_loss_pct: Some(dec!(0.02)),
        },
        &mut breakers,
        Utc::now(),
    );

    assert!(decision.accepted());
    assert_eq!(decision.quantity, dec!(0.1));
    assert_eq!(decision.stop_price, dec!(49000));
    assert_eq!(decision.target_price, dec!(52000));
}

#[test]
fn test_leverage_mid_confidence_with_drawdown() {
    // Mid tier times a 6% drawdown penalty, floored to an integer
    let calc = LeverageCalculator::new(LeverageConfig::default());
    let result = calc.compute(&LeverageInputs {
        symbol: "BTCUSDT".to_string(),
        confidence: 0.75,
        volatility: 0.005,
        correlation: 0.2,
        drawdown: 0.06,
        regime: MarketRegime::Normal,
        symbol_risk: 0.1,
        portfolio_risk: 0.1,
        symbol_cap: 125,
    });
    assert_eq!(result.leverage, 10);
    assert!(!result.reasoning.is_empty());
}

#[test]
fn test_daily_loss_breaker_across_sizing() {
    let engine = RiskEngine::new(RiskConfig::default(), CapitalConfig::default());
    let config = Config::for_tests();
    let rules = config.symbol("BTCUSDT").unwrap();
    let now = Utc::now();
    let mut breakers = BreakerState::new(dec!(10000), now);

    let request = SizeRequest {
        price: dec!(50000),
        atr: None,
        balance: dec!(10000),
        side: Direction::Long,
        confidence: dec!(0.8),
        leverage: 2,
        stop_loss_pct: None,
    };

    // 450 lost against a 500 daily limit still sizes
    breakers.record_trade(dec!(-450), now);
    assert!(engine
        .size_position(rules, &request, &mut breakers, now)
        .accepted());

    // 550 total blocks with the daily-loss reason
    breakers.record_trade(dec!(-100), now);
    let decision = engine.size_position(rules, &request, &mut breakers, now);
    assert!(!decision.accepted());
    assert!(matches!(
        decision.reject_reason,
        Some(riskpilot::risk::RejectReason::BreakerActive(
            BreakerReason::DailyLossLimit
        ))
    ));
}
