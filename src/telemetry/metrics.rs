//! Prometheus metrics

use std::time::Duration;

/// Latency metric types
#[derive(Debug, Clone, Copy)]
pub enum LatencyMetric {
    /// Signal-to-decision sizing latency
    Sizing,
    /// Order submission latency
    OrderSubmission,
    /// Full monitor cycle latency
    MonitorCycle,
}

/// Gauge metric types
#[derive(Debug, Clone, Copy)]
pub enum GaugeMetric {
    /// Current equity
    Equity,
    /// Unrealized P&L
    UnrealizedPnl,
    /// Realized P&L
    RealizedPnl,
    /// Open position count
    OpenPositions,
    /// Positions stuck in the error state
    ErrorPositions,
    /// Total exposure
    TotalExposure,
    /// Current drawdown fraction
    Drawdown,
    /// Rolling order failure rate
    OrderFailureRate,
}

/// Record a latency measurement
pub fn record_latency(metric: LatencyMetric, duration: Duration) {
    let name = match metric {
        LatencyMetric::Sizing => "riskpilot_sizing_latency_ms",
        LatencyMetric::OrderSubmission => "riskpilot_order_submission_latency_ms",
        LatencyMetric::MonitorCycle => "riskpilot_monitor_cycle_latency_ms",
    };
    metrics::histogram!(name).record(duration.as_millis() as f64);
}

/// Set a gauge value
pub fn set_gauge(metric: GaugeMetric, value: f64) {
    let name = match metric {
        GaugeMetric::Equity => "riskpilot_equity_usd",
        GaugeMetric::UnrealizedPnl => "riskpilot_unrealized_pnl_usd",
        GaugeMetric::RealizedPnl => "riskpilot_realized_pnl_usd",
        GaugeMetric::OpenPositions => "riskpilot_open_positions",
        GaugeMetric::ErrorPositions => "riskpilot_error_positions",
        GaugeMetric::TotalExposure => "riskpilot_total_exposure_usd",
        GaugeMetric::Drawdown => "riskpilot_drawdown",
        GaugeMetric::OrderFailureRate => "riskpilot_order_failure_rate",
    };
    metrics::gauge!(name).set(value);
}
