//! Configuration types for riskpilot

use rust_decimal::Decimal;
use serde::Deserialize;

/// Root configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub execution: ExecutionConfig,
    pub symbols: Vec<SymbolRules>,
    pub risk: RiskConfig,
    #[serde(default)]
    pub leverage: LeverageConfig,
    #[serde(default)]
    pub capital: CapitalConfig,
    #[serde(default)]
    pub router: RouterConfig,
    #[serde(default)]
    pub portfolio: PortfolioConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

/// Execution engine configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ExecutionConfig {
    pub mode: ExecutionMode,
    pub initial_balance: Decimal,
    /// Timeout applied to price, candle, and balance fetches
    #[serde(default = "default_data_timeout_secs")]
    pub data_timeout_secs: u64,
}

fn default_data_timeout_secs() -> u64 {
    5
}

/// Execution mode: paper trading or live
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
    Paper,
    Live,
}

/// Per-symbol exchange rules and caps
#[derive(Debug, Clone, Deserialize)]
pub struct SymbolRules {
    /// Symbol name, e.g. "BTCUSDT"
    pub name: String,
    /// Minimum tradable quantity increment
    pub lot_step: Decimal,
    /// Minimum price increment
    pub tick_size: Decimal,
    /// Minimum order notional (quantity x price)
    pub min_notional: Decimal,
    /// Hard per-symbol leverage cap
    #[serde(default = "default_symbol_max_leverage")]
    pub max_leverage: u32,
    /// Per-symbol open-position cap (overrides capital.max_positions_per_symbol)
    #[serde(default)]
    pub max_positions: Option<usize>,
}

fn default_symbol_max_leverage() -> u32 {
    125
}

/// Risk engine configuration
#[derive(Debug, Clone, Deserialize)]
pub struct RiskConfig {
    /// Minimum signal confidence to accept
    #[serde(default = "default_min_confidence")]
    pub min_confidence: Decimal,
    /// Maximum fraction of balance risked per trade
    #[serde(default = "default_max_risk_per_trade")]
    pub max_risk_per_trade: Decimal,
    /// Exponent applied to confidence when scaling the risk budget
    #[serde(default = "default_confidence_gamma")]
    pub confidence_gamma: u32,
    /// Default protective stop distance as a fraction of entry price
    #[serde(default = "default_stop_loss_pct")]
    pub stop_loss_pct: Decimal,
    /// Reward multiple for target placement (target = R x stop distance)
    #[serde(default = "default_reward_multiple")]
    pub reward_multiple: Decimal,
    /// Widen the stop to at least this multiple of ATR when ATR is available
    #[serde(default = "default_true")]
    pub atr_stop_enabled: bool,
    #[serde(default = "default_atr_stop_mult")]
    pub atr_stop_mult: Decimal,
    /// Target ATR as a fraction of price; sizes shrink when realized ATR exceeds it
    #[serde(default = "default_target_atr_pct")]
    pub target_atr_pct: Decimal,
    /// Maximum fraction of balance deployable as margin on one position
    #[serde(default = "default_max_exposure_pct")]
    pub max_exposure_pct: Decimal,
    /// Exchange fee rates
    #[serde(default = "default_fee")]
    pub maker_fee: Decimal,
    #[serde(default = "default_fee")]
    pub taker_fee: Decimal,
    /// Circuit breakers
    #[serde(default = "default_max_daily_loss_pct")]
    pub max_daily_loss_pct: Decimal,
    #[serde(default = "default_max_drawdown_pct")]
    pub max_drawdown_pct: Decimal,
    #[serde(default = "default_max_consecutive_losses")]
    pub max_consecutive_losses: u32,
    /// VaR settings
    #[serde(default = "default_var_confidence")]
    pub var_confidence: f64,
    #[serde(default = "default_var_min_observations")]
    pub var_min_observations: usize,
}

fn default_min_confidence() -> Decimal {
    Decimal::new(55, 2) // 0.55
}
fn default_max_risk_per_trade() -> Decimal {
    Decimal::new(2, 2) // 0.02
}
fn default_confidence_gamma() -> u32 {
    1
}
fn default_stop_loss_pct() -> Decimal {
    Decimal::new(2, 2) // 0.02
}
fn default_reward_multiple() -> Decimal {
    Decimal::TWO
}
fn default_true() -> bool {
    true
}
fn default_atr_stop_mult() -> Decimal {
    Decimal::new(15, 1) // 1.5
}
fn default_target_atr_pct() -> Decimal {
    Decimal::new(2, 2) // 0.02
}
fn default_max_exposure_pct() -> Decimal {
    Decimal::new(5, 1) // 0.5
}
fn default_fee() -> Decimal {
    Decimal::new(1, 3) // 0.001
}
fn default_max_daily_loss_pct() -> Decimal {
    Decimal::new(5, 2) // 0.05
}
fn default_max_drawdown_pct() -> Decimal {
    Decimal::new(15, 2) // 0.15
}
fn default_max_consecutive_losses() -> u32 {
    5
}
fn default_var_confidence() -> f64 {
    0.95
}
fn default_var_min_observations() -> usize {
    30
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            min_confidence: default_min_confidence(),
            max_risk_per_trade: default_max_risk_per_trade(),
            confidence_gamma: default_confidence_gamma(),
            stop_loss_pct: default_stop_loss_pct(),
            reward_multiple: default_reward_multiple(),
            atr_stop_enabled: true,
            atr_stop_mult: default_atr_stop_mult(),
            target_atr_pct: default_target_atr_pct(),
            max_exposure_pct: default_max_exposure_pct(),
            maker_fee: default_fee(),
            taker_fee: default_fee(),
            max_daily_loss_pct: default_max_daily_loss_pct(),
            max_drawdown_pct: default_max_drawdown_pct(),
            max_consecutive_losses: default_max_consecutive_losses(),
            var_confidence: default_var_confidence(),
            var_min_observations: default_var_min_observations(),
        }
    }
}

/// Dynamic leverage configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LeverageConfig {
    /// Base leverage before adjustments
    #[serde(default = "default_base_leverage")]
    pub base_leverage: f64,
    /// Global bounds on the final leverage
    #[serde(default = "default_min_leverage")]
    pub min_leverage: u32,
    #[serde(default = "default_max_leverage")]
    pub max_leverage: u32,
    /// Confidence tier multipliers (>= 0.9, >= 0.7, >= 0.5, below)
    #[serde(default = "default_high_conf_mult")]
    pub high_confidence_mult: f64,
    #[serde(default = "default_mid_conf_mult")]
    pub mid_confidence_mult: f64,
    #[serde(default = "default_low_conf_mult")]
    pub low_confidence_mult: f64,
    #[serde(default = "default_floor_conf_mult")]
    pub floor_confidence_mult: f64,
    /// Cap applied when the symbol or portfolio risk score exceeds this
    #[serde(default = "default_risk_score_threshold")]
    pub risk_score_threshold: f64,
    #[serde(default = "default_risk_capped_leverage")]
    pub risk_capped_leverage: u32,
}

fn default_base_leverage() -> f64 {
    10.0
}
fn default_min_leverage() -> u32 {
    1
}
fn default_max_leverage() -> u32 {
    20
}
fn default_high_conf_mult() -> f64 {
    1.5
}
fn default_mid_conf_mult() -> f64 {
    1.2
}
fn default_low_conf_mult() -> f64 {
    1.0
}
fn default_floor_conf_mult() -> f64 {
    0.7
}
fn default_risk_score_threshold() -> f64 {
    0.7
}
fn default_risk_capped_leverage() -> u32 {
    5
}

impl Default for LeverageConfig {
    fn default() -> Self {
        Self {
            base_leverage: default_base_leverage(),
            min_leverage: default_min_leverage(),
            max_leverage: default_max_leverage(),
            high_confidence_mult: default_high_conf_mult(),
            mid_confidence_mult: default_mid_conf_mult(),
            low_confidence_mult: default_low_conf_mult(),
            floor_confidence_mult: default_floor_conf_mult(),
            risk_score_threshold: default_risk_score_threshold(),
            risk_capped_leverage: default_risk_capped_leverage(),
        }
    }
}

/// Per-symbol position cap policy when a new signal arrives for an occupied symbol
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum PositionCapPolicy {
    /// Close the existing position, then open the new one
    #[default]
    CloseExisting,
    /// Reject the new signal
    Reject,
}

/// Capital management: per-position risk limits and the monitoring loop
#[derive(Debug, Clone, Deserialize)]
pub struct CapitalConfig {
    #[serde(default = "default_max_positions_per_symbol")]
    pub max_positions_per_symbol: usize,
    #[serde(default)]
    pub cap_policy: PositionCapPolicy,
    /// Maximum loss per position as a fraction of balance at entry
    #[serde(default = "default_max_loss_per_position_pct")]
    pub max_loss_per_position_pct: Decimal,
    /// Forced-exit holding time limit
    #[serde(default = "default_max_position_duration_mins")]
    pub max_position_duration_mins: i64,
    /// Trailing stop: activation profit threshold and trail distance
    #[serde(default = "default_trailing_trigger_pct")]
    pub trailing_trigger_pct: Decimal,
    #[serde(default = "default_trailing_distance_pct")]
    pub trailing_distance_pct: Decimal,
    /// Monitoring loop cadence
    #[serde(default = "default_monitor_interval_secs")]
    pub monitor_interval_secs: u64,
    /// Emergency exit when ATR/price exceeds this fraction
    #[serde(default = "default_emergency_atr_pct")]
    pub emergency_atr_pct: Decimal,
}

fn default_max_positions_per_symbol() -> usize {
    1
}
fn default_max_loss_per_position_pct() -> Decimal {
    Decimal::new(5, 2) // 0.05
}
fn default_max_position_duration_mins() -> i64 {
    1440
}
fn default_trailing_trigger_pct() -> Decimal {
    Decimal::new(1, 2) // 0.01
}
fn default_trailing_distance_pct() -> Decimal {
    Decimal::new(2, 2) // 0.02
}
fn default_monitor_interval_secs() -> u64 {
    5
}
fn default_emergency_atr_pct() -> Decimal {
    Decimal::new(8, 2) // 0.08
}

impl Default for CapitalConfig {
    fn default() -> Self {
        Self {
            max_positions_per_symbol: default_max_positions_per_symbol(),
            cap_policy: PositionCapPolicy::CloseExisting,
            max_loss_per_position_pct: default_max_loss_per_position_pct(),
            max_position_duration_mins: default_max_position_duration_mins(),
            trailing_trigger_pct: default_trailing_trigger_pct(),
            trailing_distance_pct: default_trailing_distance_pct(),
            monitor_interval_secs: default_monitor_interval_secs(),
            emergency_atr_pct: default_emergency_atr_pct(),
        }
    }
}

/// Order router configuration
#[derive(Debug, Clone, Deserialize)]
pub struct RouterConfig {
    /// Trading bar length used for order dedup
    #[serde(default = "default_bar_secs")]
    pub bar_secs: i64,
    /// Timeout applied to each order placement
    #[serde(default = "default_order_timeout_secs")]
    pub order_timeout_secs: u64,
    /// Failure-rate breaker: rate threshold over a minimum sample
    #[serde(default = "default_failure_rate_threshold")]
    pub failure_rate_threshold: f64,
    #[serde(default = "default_min_failure_sample")]
    pub min_failure_sample: usize,
    /// Rolling outcome window size
    #[serde(default = "default_error_window")]
    pub error_window: usize,
    /// How long a tripped router breaker blocks routing
    #[serde(default = "default_breaker_cooldown_secs")]
    pub breaker_cooldown_secs: i64,
}

fn default_bar_secs() -> i64 {
    900
}
fn default_order_timeout_secs() -> u64 {
    10
}
fn default_failure_rate_threshold() -> f64 {
    0.5
}
fn default_min_failure_sample() -> usize {
    4
}
fn default_error_window() -> usize {
    20
}
fn default_breaker_cooldown_secs() -> i64 {
    300
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            bar_secs: default_bar_secs(),
            order_timeout_secs: default_order_timeout_secs(),
            failure_rate_threshold: default_failure_rate_threshold(),
            min_failure_sample: default_min_failure_sample(),
            error_window: default_error_window(),
            breaker_cooldown_secs: default_breaker_cooldown_secs(),
        }
    }
}

/// Portfolio optimizer configuration
#[derive(Debug, Clone, Deserialize)]
pub struct PortfolioConfig {
    /// Mean-variance risk aversion (lambda)
    #[serde(default = "default_risk_aversion")]
    pub risk_aversion: f64,
    /// Weight of the optimizer output when blending with confidence weights
    #[serde(default = "default_optimizer_weight")]
    pub optimizer_weight: f64,
    /// Per-symbol allocation bounds
    #[serde(default = "default_min_allocation")]
    pub min_allocation: f64,
    #[serde(default = "default_max_allocation")]
    pub max_allocation: f64,
    /// Rebalance triggers
    #[serde(default = "default_rebalance_threshold")]
    pub rebalance_threshold: f64,
    #[serde(default = "default_correlation_risk_cap")]
    pub correlation_risk_cap: f64,
    #[serde(default = "default_diversification_floor")]
    pub diversification_floor: f64,
    /// Annualized portfolio volatility ceiling
    #[serde(default = "default_volatility_ceiling")]
    pub volatility_ceiling: f64,
    /// Graduated rebalance execution
    #[serde(default = "default_rebalance_steps")]
    pub rebalance_steps: usize,
    #[serde(default = "default_rebalance_pause_secs")]
    pub rebalance_pause_secs: u64,
    /// How often the engine loop runs an optimize/rebalance pass
    #[serde(default = "default_rebalance_interval_secs")]
    pub rebalance_interval_secs: u64,
    /// Trailing window (days) for return/volatility estimation
    #[serde(default = "default_lookback_days")]
    pub lookback_days: usize,
}

fn default_risk_aversion() -> f64 {
    2.0
}
fn default_optimizer_weight() -> f64 {
    0.6
}
fn default_min_allocation() -> f64 {
    0.05
}
fn default_max_allocation() -> f64 {
    0.40
}
fn default_rebalance_threshold() -> f64 {
    0.05
}
fn default_correlation_risk_cap() -> f64 {
    0.7
}
fn default_diversification_floor() -> f64 {
    1.5
}
fn default_volatility_ceiling() -> f64 {
    0.8
}
fn default_rebalance_steps() -> usize {
    3
}
fn default_rebalance_pause_secs() -> u64 {
    30
}
fn default_rebalance_interval_secs() -> u64 {
    3600
}
fn default_lookback_days() -> usize {
    30
}

impl Default for PortfolioConfig {
    fn default() -> Self {
        Self {
            risk_aversion: default_risk_aversion(),
            optimizer_weight: default_optimizer_weight(),
            min_allocation: default_min_allocation(),
            max_allocation: default_max_allocation(),
            rebalance_threshold: default_rebalance_threshold(),
            correlation_risk_cap: default_correlation_risk_cap(),
            diversification_floor: default_diversification_floor(),
            volatility_ceiling: default_volatility_ceiling(),
            rebalance_steps: default_rebalance_steps(),
            rebalance_pause_secs: default_rebalance_pause_secs(),
            rebalance_interval_secs: default_rebalance_interval_secs(),
            lookback_days: default_lookback_days(),
        }
    }
}

/// Metrics aggregation configuration
#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    /// Rolling window of daily returns
    #[serde(default = "default_window_days")]
    pub window_days: usize,
    /// Annualized risk-free rate for Sharpe/Sortino
    #[serde(default = "default_risk_free_rate")]
    pub risk_free_rate: f64,
    /// Return periods per year for annualization
    #[serde(default = "default_periods_per_year")]
    pub periods_per_year: f64,
}

fn default_window_days() -> usize {
    30
}
fn default_risk_free_rate() -> f64 {
    0.04
}
fn default_periods_per_year() -> f64 {
    365.0
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            window_days: default_window_days(),
            risk_free_rate: default_risk_free_rate(),
            periods_per_year: default_periods_per_year(),
        }
    }
}

/// Telemetry configuration
#[derive(Debug, Clone, Deserialize)]
pub struct TelemetryConfig {
    #[serde(default = "default_metrics_port")]
    pub metrics_port: u16,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_metrics_port() -> u16 {
    9100
}
fn default_log_level() -> String {
    "info".to_string()
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            metrics_port: default_metrics_port(),
            log_level: default_log_level(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn load(path: impl AsRef<std::path::Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate cross-field constraints once at construction
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.symbols.is_empty() {
            anyhow::bail!("at least one symbol must be configured");
        }
        for s in &self.symbols {
            if s.lot_step <= Decimal::ZERO || s.tick_size <= Decimal::ZERO {
                anyhow::bail!("symbol {}: lot_step and tick_size must be positive", s.name);
            }
        }
        if self.execution.initial_balance <= Decimal::ZERO {
            anyhow::bail!("execution.initial_balance must be positive");
        }
        if self.risk.max_risk_per_trade <= Decimal::ZERO
            || self.risk.max_risk_per_trade >= Decimal::ONE
        {
            anyhow::bail!("risk.max_risk_per_trade must be in (0, 1)");
        }
        if self.risk.stop_loss_pct <= Decimal::ZERO {
            anyhow::bail!("risk.stop_loss_pct must be positive");
        }
        if self.leverage.min_leverage == 0 || self.leverage.min_leverage > self.leverage.max_leverage
        {
            anyhow::bail!("leverage bounds invalid: min must be >= 1 and <= max");
        }
        if self.portfolio.min_allocation > self.portfolio.max_allocation {
            anyhow::bail!("portfolio.min_allocation must not exceed max_allocation");
        }
        if !(0.0..=1.0).contains(&self.portfolio.optimizer_weight) {
            anyhow::bail!("portfolio.optimizer_weight must be in [0, 1]");
        }
        if self.router.failure_rate_threshold <= 0.0 || self.router.failure_rate_threshold > 1.0 {
            anyhow::bail!("router.failure_rate_threshold must be in (0, 1]");
        }
        Ok(())
    }

    /// Look up the rules for a symbol
    pub fn symbol(&self, name: &str) -> Option<&SymbolRules> {
        self.symbols.iter().find(|s| s.name == name)
    }

    /// Paper config with one liquid symbol; used throughout the test suites
    pub fn for_tests() -> Self {
        Self {
            execution: ExecutionConfig {
                mode: ExecutionMode::Paper,
                initial_balance: Decimal::from(10_000),
                data_timeout_secs: default_data_timeout_secs(),
            },
            symbols: vec![SymbolRules {
                name: "BTCUSDT".to_string(),
                lot_step: Decimal::new(1, 3),
                tick_size: Decimal::new(5, 1),
                min_notional: Decimal::from(10),
                max_leverage: default_symbol_max_leverage(),
                max_positions: None,
            }],
            risk: RiskConfig::default(),
            leverage: LeverageConfig::default(),
            capital: CapitalConfig::default(),
            router: RouterConfig::default(),
            portfolio: PortfolioConfig::default(),
            metrics: MetricsConfig::default(),
            telemetry: TelemetryConfig::default(),
        }
    }

    /// Effective open-position cap for a symbol
    pub fn position_cap(&self, name: &str) -> usize {
        self.symbol(name)
            .and_then(|s| s.max_positions)
            .unwrap_or(self.capital.max_positions_per_symbol)
    }
}
