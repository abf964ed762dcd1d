//! Dynamic leverage calculation
//!
//! Base leverage scaled by a confidence tier, then penalized multiplicatively
//! for volatility, correlation, drawdown, and the market regime, then clamped
//! to global and per-symbol bounds. Each adjustment that fires is recorded in
//! a reasoning trail for auditability.

use serde::{Deserialize, Serialize};

use crate::config::LeverageConfig;

/// Broad market regime classification from the market-data collaborator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarketRegime {
    ExtremeVolatility,
    HighVolatility,
    Normal,
    LowVolatility,
    Stable,
}

impl MarketRegime {
    /// Classify the regime from realized volatility
    pub fn from_volatility(volatility: f64) -> Self {
        if volatility > 0.06 {
            Self::ExtremeVolatility
        } else if volatility > 0.04 {
            Self::HighVolatility
        } else if volatility > 0.015 {
            Self::Normal
        } else if volatility > 0.005 {
            Self::LowVolatility
        } else {
            Self::Stable
        }
    }

    /// Leverage multiplier for the regime
    pub fn multiplier(self) -> f64 {
        match self {
            Self::ExtremeVolatility => 0.3,
            Self::HighVolatility => 0.6,
            Self::Normal => 1.0,
            Self::LowVolatility => 1.2,
            Self::Stable => 1.1,
        }
    }
}

/// Inputs to one leverage computation
#[derive(Debug, Clone)]
pub struct LeverageInputs {
    pub symbol: String,
    /// Signal confidence in [0, 1]
    pub confidence: f64,
    /// Realized volatility as a fraction of price
    pub volatility: f64,
    /// Average pairwise correlation with current holdings
    pub correlation: f64,
    /// Current drawdown fraction from peak equity
    pub drawdown: f64,
    pub regime: MarketRegime,
    /// Risk scores in [0, 1] from the metrics feedback loop
    pub symbol_risk: f64,
    pub portfolio_risk: f64,
    /// Hard per-symbol leverage cap from exchange rules
    pub symbol_cap: u32,
}

/// Result of one leverage computation; recomputed per decision
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeverageResult {
    pub symbol: String,
    /// Final integer leverage
    pub leverage: u32,
    pub confidence: f64,
    pub volatility: f64,
    pub correlation: f64,
    pub drawdown: f64,
    pub regime: MarketRegime,
    pub symbol_risk: f64,
    pub portfolio_risk: f64,
    /// Composite risk score in [0, 1]
    pub risk_score: f64,
    /// Which adjustments fired, in order
    pub reasoning: Vec<String>,
}

/// Computes bounded dynamic leverage
#[derive(Debug, Clone)]
pub struct LeverageCalculator {
    config: LeverageConfig,
}

impl LeverageCalculator {
    pub fn new(config: LeverageConfig) -> Self {
        Self { config }
    }

    /// Compute leverage for one decision
    pub fn compute(&self, inputs: &LeverageInputs) -> LeverageResult {
        let cfg = &self.config;
        let mut reasoning = Vec::new();

        let (tier_mult, tier) = if inputs.confidence >= 0.9 {
            (cfg.high_confidence_mult, "high")
        } else if inputs.confidence >= 0.7 {
            (cfg.mid_confidence_mult, "mid")
        } else if inputs.confidence >= 0.5 {
            (cfg.low_confidence_mult, "low")
        } else {
            (cfg.floor_confidence_mult, "floor")
        };
        let mut leverage = cfg.base_leverage * tier_mult;
        reasoning.push(format!(
            "confidence {:.2} in {tier} tier: base {} x {tier_mult}",
            inputs.confidence, cfg.base_leverage
        ));

        let vol_mult = if inputs.volatility > 0.05 {
            0.5
        } else if inputs.volatility > 0.03 {
            0.7
        } else if inputs.volatility > 0.01 {
            0.9
        } else {
            1.0
        };
        if vol_mult < 1.0 {
            leverage *= vol_mult;
            reasoning.push(format!(
                "volatility {:.2}% penalty x{vol_mult}",
                inputs.volatility * 100.0
            ));
        }

        let corr_mult = if inputs.correlation > 0.8 {
            0.6
        } else if inputs.correlation > 0.6 {
            0.8
        } else if inputs.correlation > 0.4 {
            0.9
        } else {
            1.0
        };
        if corr_mult < 1.0 {
            leverage *= corr_mult;
            reasoning.push(format!(
                "correlation {:.2} penalty x{corr_mult}",
                inputs.correlation
            ));
        }

        let dd_mult = if inputs.drawdown > 0.15 {
            0.5
        } else if inputs.drawdown > 0.10 {
            0.7
        } else if inputs.drawdown > 0.05 {
            0.9
        } else {
            1.0
        };
        if dd_mult < 1.0 {
            leverage *= dd_mult;
            reasoning.push(format!(
                "drawdown {:.2}% penalty x{dd_mult}",
                inputs.drawdown * 100.0
            ));
        }

        let regime_mult = inputs.regime.multiplier();
        if (regime_mult - 1.0).abs() > f64::EPSILON {
            leverage *= regime_mult;
            reasoning.push(format!("regime {:?} x{regime_mult}", inputs.regime));
        }

        let mut result = leverage.floor() as u32;
        result = result.clamp(cfg.min_leverage, cfg.max_leverage);
        if result > inputs.symbol_cap {
            result = inputs.symbol_cap.max(1);
            reasoning.push(format!("capped to symbol limit {}", inputs.symbol_cap));
        }

        if inputs.symbol_risk > cfg.risk_score_threshold && result > cfg.risk_capped_leverage {
            result = cfg.risk_capped_leverage;
            reasoning.push(format!(
                "symbol risk {:.2} above {:.2}: capped to {}",
                inputs.symbol_risk, cfg.risk_score_threshold, cfg.risk_capped_leverage
            ));
        }
        if inputs.portfolio_risk > cfg.risk_score_threshold && result > cfg.risk_capped_leverage {
            result = cfg.risk_capped_leverage;
            reasoning.push(format!(
                "portfolio risk {:.2} above {:.2}: capped to {}",
                inputs.portfolio_risk, cfg.risk_score_threshold, cfg.risk_capped_leverage
            ));
        }
        result = result.max(cfg.min_leverage);

        let risk_score = Self::risk_score(inputs);

        LeverageResult {
            symbol: inputs.symbol.clone(),
            leverage: result,
            confidence: inputs.confidence,
            volatility: inputs.volatility,
            correlation: inputs.correlation,
            drawdown: inputs.drawdown,
            regime: inputs.regime,
            symbol_risk: inputs.symbol_risk,
            portfolio_risk: inputs.portfolio_risk,
            risk_score,
            reasoning,
        }
    }

    /// Composite risk score: weighted blend of the normalized inputs
    fn risk_score(inputs: &LeverageInputs) -> f64 {
        let vol_norm = (inputs.volatility / 0.05).min(1.0);
        let dd_norm = (inputs.drawdown / 0.15).min(1.0);
        let score = 0.3 * vol_norm
            + 0.25 * inputs.correlation.clamp(0.0, 1.0)
            + 0.25 * dd_norm
            + 0.2 * (1.0 - inputs.confidence.clamp(0.0, 1.0));
        score.clamp(0.0, 1.0)
    }
}
