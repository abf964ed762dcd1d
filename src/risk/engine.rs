//! Risk engine: signal validation and position sizing
//!
//! Sizing turns a validated signal into an immutable `RiskDecision` through
//! a fixed pipeline: breaker gate, risk budget, stop geometry, fee buffer,
//! volatility scaling, exposure cap, lot/min-notional rounding.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::collections::HashMap;

use crate::config::{CapitalConfig, RiskConfig, SymbolRules};
use crate::risk::var::{
    historical_var, portfolio_var, stress_test, PortfolioVarReport, StressResult, SymbolVar,
};
use crate::risk::{BreakerState, RejectReason, RiskDecision, TrailingConfig};
use crate::signal::{Direction, Signal};

/// One sizing request
#[derive(Debug, Clone)]
pub struct SizeRequest {
    pub price: Decimal,
    /// Current ATR in price units, when available
    pub atr: Option<Decimal>,
    pub balance: Decimal,
    pub side: Direction,
    pub confidence: Decimal,
    /// Leverage computed for this decision
    pub leverage: u32,
    /// Per-signal stop override; falls back to the configured stop
    pub stop_loss_pct: Option<Decimal>,
}

/// Validates signals and produces sizing decisions
#[derive(Debug, Clone)]
pub struct RiskEngine {
    risk: RiskConfig,
    capital: CapitalConfig,
}

impl RiskEngine {
    pub fn new(risk: RiskConfig, capital: CapitalConfig) -> Self {
        Self { risk, capital }
    }

    pub fn config(&self) -> &RiskConfig {
        &self.risk
    }

    /// Whether a signal clears the confidence floor
    pub fn validate(&self, signal: &Signal) -> bool {
        signal.confidence >= self.risk.min_confidence
            && signal.confidence <= Decimal::ONE
            && signal.price > Decimal::ZERO
    }

    /// Size a position for a validated signal
    ///
    /// Breaker state is injected by the caller and checked before any math;
    /// an active breaker yields a zero-quantity decision with its reason.
    pub fn size_position(
        &self,
        rules: &SymbolRules,
        request: &SizeRequest,
        breakers: &mut BreakerState,
        now: DateTime<Utc>,
    ) -> RiskDecision {
        if let Some(reason) = breakers.check(request.balance, &self.risk, now) {
            return RiskDecision::rejected(&rules.name, RejectReason::BreakerActive(reason));
        }
        if request.price <= Decimal::ZERO || request.balance <= Decimal::ZERO {
            return RiskDecision::rejected(&rules.name, RejectReason::InvalidInput);
        }
        if !matches!(request.side, Direction::Long | Direction::Short) {
            return RiskDecision::rejected(&rules.name, RejectReason::NotActionable);
        }

        let price = request.price;
        let balance = request.balance;

        // Risk budget in currency
        let conf_scale = decimal_pow(request.confidence, self.risk.confidence_gamma);
        let risk_budget = balance * self.risk.max_risk_per_trade * conf_scale;

        // Effective stop distance, widened to the ATR floor when enabled
        let mut stop_pct = request.stop_loss_pct.unwrap_or(self.risk.stop_loss_pct);
        if self.risk.atr_stop_enabled {
            if let Some(atr) = request.atr {
                if atr > Decimal::ZERO {
                    let atr_min = self.risk.atr_stop_mult * atr / price;
                    stop_pct = stop_pct.max(atr_min);
                }
            }
        }
        let stop_distance = stop_pct * price;

        // Per-unit risk includes a round-trip fee buffer
        let fee_rate = self.risk.maker_fee.max(self.risk.taker_fee);
        let per_unit_risk = stop_distance + Decimal::TWO * fee_rate * price;
        if per_unit_risk <= Decimal::ZERO {
            return RiskDecision::rejected(&rules.name, RejectReason::InvalidInput);
        }
        let mut quantity = risk_budget / per_unit_risk;

        // Scale down when realized ATR exceeds the target
        if let Some(atr) = request.atr {
            if atr > Decimal::ZERO {
                let atr_ratio = atr / price;
                let vol_factor = (self.risk.target_atr_pct / atr_ratio).min(Decimal::ONE);
                quantity *= vol_factor;
            }
        }

        // Exposure cap
        let max_notional =
            balance * self.risk.max_exposure_pct * Decimal::from(request.leverage);
        let max_quantity = max_notional / price;
        quantity = quantity.min(max_quantity);

        // Lot rounding, then the minimum-notional floor
        quantity = round_down_to_step(quantity, rules.lot_step);
        let notional = quantity * price;
        if notional < rules.min_notional {
            let needed = round_up_to_step(rules.min_notional / price, rules.lot_step);
            if needed <= max_quantity && needed * price >= rules.min_notional {
                quantity = needed;
            } else {
                return RiskDecision::rejected(&rules.name, RejectReason::BelowMinNotional);
            }
        }
        if quantity <= Decimal::ZERO {
            return RiskDecision::rejected(&rules.name, RejectReason::BelowMinNotional);
        }

        // Stop and target bracket the entry per side
        let reward = self.risk.reward_multiple;
        let (stop_price, target_price) = match request.side {
            Direction::Long => (
                price * (Decimal::ONE - stop_pct),
                price * (Decimal::ONE + reward * stop_pct),
            ),
            Direction::Short => (
                price * (Decimal::ONE + stop_pct),
                price * (Decimal::ONE - reward * stop_pct),
            ),
            Direction::Hold => unreachable!("hold rejected above"),
        };
        let stop_price = round_to_tick(stop_price, rules.tick_size);
        let target_price = round_to_tick(target_price, rules.tick_size);

        let risk_amount = quantity * (price - stop_price).abs();
        let risk_fraction = risk_amount / balance;

        RiskDecision {
            symbol: rules.name.clone(),
            quantity,
            entry_price: price,
            stop_price,
            target_price,
            leverage: request.leverage,
            max_notional,
            risk_amount,
            risk_fraction,
            trailing: TrailingConfig {
                trigger_pct: self.capital.trailing_trigger_pct,
                distance_pct: self.capital.trailing_distance_pct,
            },
            reject_reason: None,
        }
    }

    /// Historical-simulation VaR across the portfolio
    ///
    /// `symbols` fixes the row order of `correlations`; `weights` are
    /// allocation fractions by notional.
    pub fn portfolio_var(
        &self,
        symbols: &[String],
        returns_by_symbol: &HashMap<String, Vec<f64>>,
        weights: &HashMap<String, f64>,
        correlations: &[Vec<f64>],
        confidence_level: f64,
    ) -> PortfolioVarReport {
        let mut per_symbol = HashMap::new();
        for symbol in symbols {
            if let Some(returns) = returns_by_symbol.get(symbol) {
                if let Some(sv) =
                    historical_var(returns, confidence_level, self.risk.var_min_observations)
                {
                    per_symbol.insert(symbol.clone(), sv);
                }
            }
        }
        let combined = portfolio_var(symbols, weights, &per_symbol, correlations);
        PortfolioVarReport {
            confidence_level,
            portfolio_var: combined,
            per_symbol,
        }
    }

    /// Worst-case loss per shock scenario
    pub fn stress_test(
        &self,
        notionals: &HashMap<String, Decimal>,
        portfolio_value: Decimal,
        shocks: &[Decimal],
    ) -> Vec<StressResult> {
        stress_test(notionals, portfolio_value, shocks)
    }

    /// Per-symbol VaR for a single return series
    pub fn symbol_var(&self, returns: &[f64], confidence_level: f64) -> Option<SymbolVar> {
        historical_var(returns, confidence_level, self.risk.var_min_observations)
    }
}

/// confidence^gamma with a small integer exponent
fn decimal_pow(base: Decimal, exp: u32) -> Decimal {
    let mut result = Decimal::ONE;
    for _ in 0..exp {
        result *= base;
    }
    result
}

fn round_down_to_step(value: Decimal, step: Decimal) -> Decimal {
    if step <= Decimal::ZERO {
        return value;
    }
    (value / step).floor() * step
}

fn round_up_to_step(value: Decimal, step: Decimal) -> Decimal {
    if step <= Decimal::ZERO {
        return value;
    }
    (value / step).ceil() * step
}

fn round_to_tick(price: Decimal, tick: Decimal) -> Decimal {
    if tick <= Decimal::ZERO {
        return price;
    }
    (price / tick).round() * tick
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn rules() -> SymbolRules {
        SymbolRules {
            name: "BTCUSDT".to_string(),
            lot_step: dec!(0.001),
            tick_size: dec!(0.1),
            min_notional: dec!(10),
            max_leverage: 125,
            max_positions: None,
        }
    }

    fn engine() -> RiskEngine {
        RiskEngine::new(RiskConfig::default(), CapitalConfig::default())
    }

    fn request() -> SizeRequest {
        SizeRequest {
            price: dec!(50000),
            atr: Some(dec!(500)),
            balance: dec!(10000),
            side: Direction::Long,
            confidence: dec!(1.0),
            leverage: 1,
            stop_loss_pct: Some(dec!(0.02)),
        }
    }

    fn fresh_breakers() -> BreakerState {
        BreakerState::new(dec!(10000), Utc::now())
    }

    #[test]
    fn test_scenario_a_btc_long() {
        // price=50000, ATR=500, balance=10000, long, confidence=1.0,
        // stop 2%, max risk 2%, fees 0.1% each way, max exposure 50%
        let decision = engine().size_position(&rules(), &request(), &mut fresh_breakers(), Utc::now());

        assert!(decision.accepted());
        assert_eq!(decision.quantity, dec!(0.1));
        assert_eq!(decision.stop_price, dec!(49000));
        assert_eq!(decision.target_price, dec!(52000));
        assert_eq!(decision.risk_amount, dec!(100)); // 0.1 x 1000
        assert_eq!(decision.risk_fraction, dec!(0.01));
    }

    #[test]
    fn test_short_brackets_mirrored() {
        let mut req = request();
        req.side = Direction::Short;
        let decision = engine().size_position(&rules(), &req, &mut fresh_breakers(), Utc::now());
        assert!(decision.accepted());
        // target < entry < stop for shorts
        assert!(decision.target_price < decision.entry_price);
        assert!(decision.stop_price > decision.entry_price);
        assert_eq!(decision.stop_price, dec!(51000));
        assert_eq!(decision.target_price, dec!(48000));
    }

    #[test]
    fn test_risk_amount_within_budget() {
        let eng = engine();
        for conf in [dec!(0.6), dec!(0.75), dec!(0.9), dec!(1.0)] {
            let mut req = request();
            req.confidence = conf;
            let decision = eng.size_position(&rules(), &req, &mut fresh_breakers(), Utc::now());
            if decision.accepted() {
                let budget = req.balance * dec!(0.02) * conf;
                // Tick rounding of the stop allows a tiny overshoot
                assert!(decision.risk_amount <= budget + dec!(0.01));
            }
        }
    }

    #[test]
    fn test_quantity_on_lot_step() {
        let decision = engine().size_position(&rules(), &request(), &mut fresh_breakers(), Utc::now());
        let lots = decision.quantity / dec!(0.001);
        assert_eq!(lots, lots.floor());
    }

    #[test]
    fn test_rejects_non_positive_inputs() {
        let eng = engine();
        let mut req = request();
        req.price = dec!(0);
        let d = eng.size_position(&rules(), &req, &mut fresh_breakers(), Utc::now());
        assert_eq!(d.reject_reason, Some(RejectReason::InvalidInput));

        let mut req = request();
        req.balance = dec!(-5);
        let d = eng.size_position(&rules(), &req, &mut fresh_breakers(), Utc::now());
        assert_eq!(d.reject_reason, Some(RejectReason::InvalidInput));
    }

    #[test]
    fn test_zero_stop_and_fees_rejected() {
        // Zero per-unit risk must reject, not divide by zero
        let mut config = RiskConfig::default();
        config.stop_loss_pct = dec!(0);
        config.maker_fee = dec!(0);
        config.taker_fee = dec!(0);
        let eng = RiskEngine::new(config, CapitalConfig::default());

        let mut req = request();
        req.stop_loss_pct = None;
        req.atr = None;
        let d = eng.size_position(&rules(), &req, &mut fresh_breakers(), Utc::now());
        assert_eq!(d.reject_reason, Some(RejectReason::InvalidInput));
    }

    #[test]
    fn test_rejects_hold() {
        let mut req = request();
        req.side = Direction::Hold;
        let d = engine().size_position(&rules(), &req, &mut fresh_breakers(), Utc::now());
        assert_eq!(d.reject_reason, Some(RejectReason::NotActionable));
    }

    #[test]
    fn test_breaker_blocks_sizing() {
        let now = Utc::now();
        let mut breakers = fresh_breakers();
        breakers.record_trade(dec!(-550), now); // beyond the 5% daily limit

        let d = engine().size_position(&rules(), &request(), &mut breakers, now);
        assert_eq!(d.quantity, dec!(0));
        assert!(matches!(
            d.reject_reason,
            Some(RejectReason::BreakerActive(_))
        ));
    }

    #[test]
    fn test_daily_loss_scenario_thresholds() {
        let now = Utc::now();
        let eng = engine();

        // 450 of 500 lost: still sizing
        let mut breakers = fresh_breakers();
        breakers.record_trade(dec!(-450), now);
        assert!(eng
            .size_position(&rules(), &request(), &mut breakers, now)
            .accepted());

        // 550 lost: every call blocked until day reset
        breakers.record_trade(dec!(-100), now);
        for _ in 0..3 {
            let d = eng.size_position(&rules(), &request(), &mut breakers, now);
            assert_eq!(d.quantity, dec!(0));
        }
    }

    #[test]
    fn test_min_notional_raise() {
        // Raw size rounds to a notional below the minimum, but the
        // exposure cap still has room to raise it
        let mut req = request();
        req.balance = dec!(15);
        req.price = dec!(100);
        req.confidence = dec!(0.7);
        req.leverage = 2;
        req.atr = None;
        let small_rules = SymbolRules {
            name: "XRPUSDT".to_string(),
            lot_step: dec!(0.01),
            tick_size: dec!(0.001),
            min_notional: dec!(10),
            max_leverage: 20,
            max_positions: None,
        };
        let decision = engine().size_position(&small_rules, &req, &mut fresh_breakers(), Utc::now());
        assert!(decision.accepted());
        assert_eq!(decision.quantity, dec!(0.1));
        assert_eq!(decision.notional(), dec!(10));
    }

    #[test]
    fn test_min_notional_infeasible() {
        // Exposure cap of 50% x 10 leaves no room for the 10 minimum notional
        let mut req = request();
        req.balance = dec!(1);
        req.price = dec!(100);
        req.atr = None;
        let small_rules = SymbolRules {
            name: "XRPUSDT".to_string(),
            lot_step: dec!(0.01),
            tick_size: dec!(0.001),
            min_notional: dec!(10),
            max_leverage: 20,
            max_positions: None,
        };
        let decision = engine().size_position(&small_rules, &req, &mut fresh_breakers(), Utc::now());
        assert_eq!(decision.reject_reason, Some(RejectReason::BelowMinNotional));
    }

    #[test]
    fn test_atr_widens_stop() {
        // ATR floor of 1.5 x ATR/price exceeds the 2% configured stop
        let mut req = request();
        req.atr = Some(dec!(2000)); // 4% of price, floor = 6%
        let decision = engine().size_position(&rules(), &req, &mut fresh_breakers(), Utc::now());
        assert!(decision.accepted());
        assert_eq!(decision.stop_price, dec!(47000)); // 50000 x (1 - 0.06)
    }

    #[test]
    fn test_validate_confidence_floor() {
        let eng = engine();
        let ok = Signal::new("BTCUSDT", Direction::Long, dec!(0.7), dec!(50000));
        let low = Signal::new("BTCUSDT", Direction::Long, dec!(0.3), dec!(50000));
        assert!(eng.validate(&ok));
        assert!(!eng.validate(&low));
    }

    #[test]
    fn test_decimal_pow() {
        assert_eq!(decimal_pow(dec!(0.5), 0), dec!(1));
        assert_eq!(decimal_pow(dec!(0.5), 1), dec!(0.5));
        assert_eq!(decimal_pow(dec!(0.5), 2), dec!(0.25));
    }

    #[test]
    fn test_rounding_helpers() {
        assert_eq!(round_down_to_step(dec!(0.1234), dec!(0.001)), dec!(0.123));
        assert_eq!(round_up_to_step(dec!(0.1231), dec!(0.001)), dec!(0.124));
        assert_eq!(round_to_tick(dec!(49000.04), dec!(0.1)), dec!(49000.0));
    }
}
