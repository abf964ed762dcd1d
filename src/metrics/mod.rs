//! Performance metrics module
//!
//! Daily rollups and risk-adjusted return ratios

mod aggregator;

pub use aggregator::{DailyStats, MetricsAggregator, PerformanceReport, SymbolPerformance};
