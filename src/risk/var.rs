//! Value at Risk and stress testing
//!
//! Historical-simulation VaR per symbol from the empirical return
//! distribution, with CVaR as the tail mean. Portfolio VaR combines
//! per-symbol VaR through a quadratic form over the correlation matrix.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// VaR for one symbol
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SymbolVar {
    /// Loss fraction not exceeded at the confidence level (positive)
    pub var: f64,
    /// Mean loss fraction in the tail at or beyond the VaR percentile
    pub cvar: f64,
    /// Observations used
    pub observations: usize,
}

/// Portfolio-level VaR report
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortfolioVarReport {
    /// Confidence level used, e.g. 0.95
    pub confidence_level: f64,
    /// Combined portfolio VaR as a fraction of portfolio value
    pub portfolio_var: f64,
    /// Per-symbol VaR
    pub per_symbol: HashMap<String, SymbolVar>,
}

/// One stress scenario result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StressResult {
    /// Shock applied as a signed fraction of price
    pub shock: Decimal,
    /// Worst-case loss in currency (direction-agnostic)
    pub loss: Decimal,
    /// Loss as a fraction of portfolio value
    pub loss_pct: f64,
}

/// Historical-simulation VaR from a return series
///
/// Returns `None` below `min_observations`. VaR is the loss at the
/// `1 - confidence` percentile of the sorted returns; CVaR is the mean of
/// the tail at or below that percentile.
pub fn historical_var(
    returns: &[f64],
    confidence_level: f64,
    min_observations: usize,
) -> Option<SymbolVar> {
    if returns.len() < min_observations || returns.is_empty() {
        return None;
    }
    let mut sorted: Vec<f64> = returns.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

    let n = sorted.len();
    let alpha = 1.0 - confidence_level;
    let index = ((alpha * n as f64).floor() as usize)
        .saturating_sub(1)
        .min(n - 1);

    let var = -sorted[index];
    let tail = &sorted[..=index];
    let cvar = -tail.iter().sum::<f64>() / tail.len() as f64;

    Some(SymbolVar {
        var: var.max(0.0),
        cvar: cvar.max(0.0),
        observations: n,
    })
}

/// Combine per-symbol VaR into portfolio VaR
///
/// Quadratic form over the correlation matrix with allocation-weighted
/// per-symbol VaR: sqrt(sum_ij w_i v_i rho_ij w_j v_j). `symbols` fixes the
/// row/column order of `correlations`.
pub fn portfolio_var(
    symbols: &[String],
    weights: &HashMap<String, f64>,
    per_symbol: &HashMap<String, SymbolVar>,
    correlations: &[Vec<f64>],
) -> f64 {
    let terms: Vec<f64> = symbols
        .iter()
        .map(|s| {
            let w = weights.get(s).copied().unwrap_or(0.0);
            let v = per_symbol.get(s).map(|sv| sv.var).unwrap_or(0.0);
            w * v
        })
        .collect();

    let mut sum = 0.0;
    for (i, a) in terms.iter().enumerate() {
        for (j, b) in terms.iter().enumerate() {
            let rho = correlations
                .get(i)
                .and_then(|row| row.get(j))
                .copied()
                .unwrap_or(if i == j { 1.0 } else { 0.0 });
            sum += a * b * rho;
        }
    }
    sum.max(0.0).sqrt()
}

/// Direction-agnostic stress test over position notionals
///
/// For each shock fraction the loss is the sum of notionals times the shock
/// magnitude: the worst case regardless of position direction.
pub fn stress_test(
    notionals: &HashMap<String, Decimal>,
    portfolio_value: Decimal,
    shocks: &[Decimal],
) -> Vec<StressResult> {
    let total_notional: Decimal = notionals.values().copied().sum();
    shocks
        .iter()
        .map(|shock| {
            let loss = total_notional * shock.abs();
            let loss_pct = if portfolio_value > Decimal::ZERO {
                (loss / portfolio_value).to_f64().unwrap_or(0.0)
            } else {
                0.0
            };
            StressResult {
                shock: *shock,
                loss,
                loss_pct,
            }
        })
        .collect()
}
