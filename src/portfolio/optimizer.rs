//! Mean-variance allocation with a confidence overlay
//!
//! A projected-gradient solve of `min w'Cw - lambda mu'w` on the simplex,
//! blended with model-confidence weights, then clamped to the per-symbol
//! bounds. A volatility ceiling scales the whole book down into cash.

use rust_decimal::Decimal;
use tracing::{debug, info};

use crate::config::PortfolioConfig;
use crate::events::{EngineEvent, EventBus};
use crate::portfolio::stats;

const GRADIENT_ITERATIONS: usize = 500;
const GRADIENT_STEP: f64 = 0.01;
const PERIODS_PER_YEAR: f64 = 365.0;

/// What the rebalancer should do with a symbol
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllocationAction {
    Increase,
    Decrease,
    Hold,
}

/// Per-symbol estimation inputs
#[derive(Debug, Clone)]
pub struct SymbolInput {
    pub symbol: String,
    /// Daily returns, oldest first
    pub returns: Vec<f64>,
    /// Latest model confidence in [0, 1]
    pub confidence: f64,
    /// Current allocation as a fraction of equity
    pub current_pct: f64,
}

/// One symbol's target allocation
#[derive(Debug, Clone)]
pub struct AllocationTarget {
    pub symbol: String,
    pub current_pct: f64,
    pub target_pct: f64,
    /// Allocation band the target was clamped into
    pub min_pct: f64,
    pub max_pct: f64,
    pub expected_return: f64,
    pub volatility: f64,
    /// Average pairwise correlation against the rest of the set
    pub correlation_penalty: f64,
    /// Cumulative return over the lookback window
    pub momentum_score: f64,
    pub action: AllocationAction,
    /// target - current
    pub delta_pct: f64,
    /// |delta| x expected return; larger moves on better symbols first
    pub priority: f64,
}

/// Per-symbol live exposure feeding the portfolio state
#[derive(Debug, Clone, Default)]
pub struct SymbolExposure {
    pub symbol: String,
    /// Exposure as a fraction of total balance
    pub allocation_pct: f64,
    pub exposure: Decimal,
    pub unrealized_pnl: Decimal,
}

/// Aggregate health of the current allocation; recomputed on demand
#[derive(Debug, Clone, Default)]
pub struct PortfolioState {
    pub total_balance: Decimal,
    pub invested_balance: Decimal,
    pub available_balance: Decimal,
    /// Live per-symbol exposure, in input order
    pub symbols: Vec<SymbolExposure>,
    /// Pairwise correlation matrix, in input order
    pub correlation: Vec<Vec<f64>>,
    /// Inverse HHI of the weights; N for an equal-weight book of N
    pub diversification_ratio: f64,
    /// Herfindahl concentration of the weights
    pub hhi: f64,
    /// Largest pairwise correlation
    pub max_correlation: f64,
    /// Annualized portfolio volatility
    pub volatility: f64,
    /// Set by the rebalance decision; false until one runs
    pub rebalance_needed: bool,
}

/// Mean-variance optimizer over the configured symbol set
pub struct PortfolioOptimizer {
    config: PortfolioConfig,
}

impl PortfolioOptimizer {
    pub fn new(config: PortfolioConfig) -> Self {
        Self { config }
    }

    /// Solve for target allocations across the symbol set
    pub fn optimize(&self, inputs: &[SymbolInput]) -> Vec<AllocationTarget> {
        if inputs.is_empty() {
            return vec![];
        }
        let series: Vec<Vec<f64>> = inputs
            .iter()
            .map(|i| i.returns.iter().copied().take(self.config.lookback_days).collect())
            .collect();
        let expected: Vec<f64> = series.iter().map(|r| stats::mean(r)).collect();
        let covariance = stats::covariance_matrix(&series);
        let correlation = stats::correlation_matrix(&series);

        let optimized = self.solve(&expected, &covariance);
        let confidence = Self::confidence_weights(inputs);

        // Blend, then clamp into the per-symbol band
        let blend = self.config.optimizer_weight;
        let mut weights: Vec<f64> = optimized
            .iter()
            .zip(&confidence)
            .map(|(o, c)| blend * o + (1.0 - blend) * c)
            .collect();
        self.clamp_weights(&mut weights);

        // Volatility ceiling: shrink the whole book, remainder stays cash
        let annual_vol =
            (stats::portfolio_variance(&weights, &covariance) * PERIODS_PER_YEAR).sqrt();
        if annual_vol > self.config.volatility_ceiling && annual_vol > 0.0 {
            let scale = self.config.volatility_ceiling / annual_vol;
            debug!(annual_vol, scale, "volatility ceiling hit, scaling book down");
            for w in &mut weights {
                *w *= scale;
            }
        }

        let min_pct = self.config.min_allocation.min(1.0 / inputs.len() as f64);
        inputs
            .iter()
            .enumerate()
            .map(|(i, input)| {
                let target_pct = weights[i];
                let delta_pct = target_pct - input.current_pct;
                let action = if delta_pct.abs() < self.config.rebalance_threshold {
                    AllocationAction::Hold
                } else if delta_pct > 0.0 {
                    AllocationAction::Increase
                } else {
                    AllocationAction::Decrease
                };
                AllocationTarget {
                    symbol: input.symbol.clone(),
                    current_pct: input.current_pct,
                    target_pct,
                    min_pct,
                    max_pct: self.config.max_allocation,
                    expected_return: expected[i],
                    volatility: (stats::variance(&series[i]) * PERIODS_PER_YEAR).sqrt(),
                    correlation_penalty: average_off_diagonal(&correlation, i),
                    momentum_score: series[i].iter().sum(),
                    action,
                    delta_pct,
                    priority: delta_pct.abs() * expected[i],
                }
            })
            .collect()
    }

    /// Projected gradient descent on the simplex
    fn solve(&self, expected: &[f64], covariance: &[Vec<f64>]) -> Vec<f64> {
        let n = expected.len();
        let mut w = vec![1.0 / n as f64; n];
        for _ in 0..GRADIENT_ITERATIONS {
            // grad = 2Cw - lambda mu
            let mut grad = vec![0.0; n];
            for i in 0..n {
                for j in 0..n {
                    grad[i] += 2.0 * covariance[i][j] * w[j];
                }
                grad[i] -= self.config.risk_aversion * expected[i];
            }
            for i in 0..n {
                w[i] -= GRADIENT_STEP * grad[i];
            }
            project_simplex(&mut w);
        }
        w
    }

    fn confidence_weights(inputs: &[SymbolInput]) -> Vec<f64> {
        let total: f64 = inputs.iter().map(|i| i.confidence.max(0.0)).sum();
        if total <= 0.0 {
            return vec![1.0 / inputs.len() as f64; inputs.len()];
        }
        inputs
            .iter()
            .map(|i| i.confidence.max(0.0) / total)
            .collect()
    }

    /// Clamp each weight into [min, max] without giving up the invested total
    ///
    /// Water-filling: after the initial clamp, the shortfall (or surplus)
    /// against the pre-clamp total is spread evenly over the weights that
    /// still have headroom, pinning any that reach a bound, until the sum
    /// matches or every weight is pinned.
    fn clamp_weights(&self, weights: &mut [f64]) {
        let n = weights.len();
        if n == 0 {
            return;
        }
        let min = self.config.min_allocation.min(1.0 / n as f64);
        let max = self.config.max_allocation;
        let total: f64 = weights.iter().sum();
        let target = total.clamp(n as f64 * min, n as f64 * max);
        for w in weights.iter_mut() {
            *w = w.clamp(min, max);
        }
        for _ in 0..(n + 1) {
            let sum: f64 = weights.iter().sum();
            let remaining = target - sum;
            if remaining.abs() < 1e-12 {
                break;
            }
            if remaining > 0.0 {
                let open = weights.iter().filter(|w| **w < max - 1e-12).count();
                if open == 0 {
                    break;
                }
                let share = remaining / open as f64;
                for w in weights.iter_mut() {
                    if *w < max - 1e-12 {
                        *w = (*w + share).min(max);
                    }
                }
            } else {
                let open = weights.iter().filter(|w| **w > min + 1e-12).count();
                if open == 0 {
                    break;
                }
                let share = -remaining / open as f64;
                for w in weights.iter_mut() {
                    if *w > min + 1e-12 {
                        *w = (*w - share).max(min);
                    }
                }
            }
        }
    }

    /// Derived view of the current book: balances, concentration, volatility
    pub fn state(
        &self,
        inputs: &[SymbolInput],
        exposures: Vec<SymbolExposure>,
        total_balance: Decimal,
    ) -> PortfolioState {
        let weights: Vec<f64> = inputs.iter().map(|i| i.current_pct).collect();
        let series: Vec<Vec<f64>> = inputs.iter().map(|i| i.returns.clone()).collect();
        let hhi: f64 = weights.iter().map(|w| w * w).sum();
        let correlation = stats::correlation_matrix(&series);
        let mut max_correlation: f64 = 0.0;
        for i in 0..correlation.len() {
            for j in (i + 1)..correlation.len() {
                max_correlation = max_correlation.max(correlation[i][j]);
            }
        }
        let covariance = stats::covariance_matrix(&series);
        let invested_balance: Decimal = exposures.iter().map(|e| e.exposure).sum();
        PortfolioState {
            total_balance,
            invested_balance,
            available_balance: total_balance - invested_balance,
            symbols: exposures,
            correlation,
            diversification_ratio: if hhi > 0.0 { 1.0 / hhi } else { 0.0 },
            hhi,
            max_correlation,
            volatility: (stats::portfolio_variance(&weights, &covariance) * PERIODS_PER_YEAR)
                .sqrt(),
            rebalance_needed: false,
        }
    }

    /// Whether the book should be rebalanced, with every firing trigger
    pub fn should_rebalance(
        &self,
        targets: &[AllocationTarget],
        state: &mut PortfolioState,
    ) -> (bool, Vec<String>) {
        let mut reasons = vec![];
        for t in targets {
            if t.delta_pct.abs() >= self.config.rebalance_threshold {
                reasons.push(format!(
                    "{} deviates {:.1}% from target",
                    t.symbol,
                    t.delta_pct.abs() * 100.0
                ));
            }
        }
        if state.max_correlation > self.config.correlation_risk_cap {
            reasons.push(format!(
                "max pairwise correlation {:.2} above cap",
                state.max_correlation
            ));
        }
        if state.diversification_ratio < self.config.diversification_floor {
            reasons.push(format!(
                "diversification ratio {:.2} below floor",
                state.diversification_ratio
            ));
        }
        if state.volatility > self.config.volatility_ceiling {
            reasons.push(format!(
                "portfolio volatility {:.2} above ceiling",
                state.volatility
            ));
        }
        state.rebalance_needed = !reasons.is_empty();
        (state.rebalance_needed, reasons)
    }

    /// Execute a rebalance plan in graduated steps, largest moves first
    ///
    /// Emits one event per adjustment; the engine loop turns each into
    /// closes and resized entries. Pauses between steps so fills settle.
    pub async fn execute_rebalance(&self, targets: &[AllocationTarget], bus: &EventBus) -> usize {
        let mut moves: Vec<&AllocationTarget> = targets
            .iter()
            .filter(|t| t.action != AllocationAction::Hold)
            .collect();
        moves.sort_by(|a, b| {
            b.priority
                .partial_cmp(&a.priority)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        if moves.is_empty() {
            return 0;
        }

        let steps = self.config.rebalance_steps.max(1);
        let per_step = moves.len().div_ceil(steps);
        let total_steps = moves.len().div_ceil(per_step);
        for (step, chunk) in moves.chunks(per_step).enumerate() {
            for target in chunk {
                info!(
                    symbol = %target.symbol,
                    delta = target.delta_pct,
                    "rebalance adjustment"
                );
                let _ = bus.send(EngineEvent::RebalanceStep {
                    step: step + 1,
                    total_steps,
                    symbol: target.symbol.clone(),
                    delta_pct: target.delta_pct,
                });
            }
            if step + 1 < total_steps {
                tokio::time::sleep(std::time::Duration::from_secs(
                    self.config.rebalance_pause_secs,
                ))
                .await;
            }
        }
        moves.len()
    }
}

/// Mean of row `i` excluding the diagonal, floored at zero
fn average_off_diagonal(matrix: &[Vec<f64>], i: usize) -> f64 {
    if matrix.len() < 2 {
        return 0.0;
    }
    let sum: f64 = matrix[i]
        .iter()
        .enumerate()
        .filter(|(j, _)| *j != i)
        .map(|(_, c)| c)
        .sum();
    (sum / (matrix.len() - 1) as f64).max(0.0)
}

/// Euclidean projection onto the probability simplex
fn project_simplex(w: &mut [f64]) {
    let n = w.len();
    let mut sorted = w.to_vec();
    sorted.sort_by(|a, b| b.partial_cmp(a).unwrap_or(std::cmp::Ordering::Equal));
    let mut cumulative = 0.0;
    let mut theta = 0.0;
    for (i, value) in sorted.iter().enumerate() {
        cumulative += value;
        let candidate = (cumulative - 1.0) / (i + 1) as f64;
        if value - candidate > 0.0 {
            theta = candidate;
        }
    }
    for x in w.iter_mut() {
        *x = (*x - theta).max(0.0);
    }
}
