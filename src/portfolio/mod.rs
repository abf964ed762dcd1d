//! Portfolio allocation
//!
//! Return statistics, the mean-variance optimizer, and the graduated
//! rebalance planner built on top of it.

mod optimizer;
pub mod stats;

pub use optimizer::{
    AllocationAction, AllocationTarget, PortfolioOptimizer, PortfolioState, SymbolExposure,
    SymbolInput,
};
