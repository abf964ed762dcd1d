//! Order routing
//!
//! Takes accepted sizing decisions to the exchange: per-bar deduplication,
//! a final breaker check, bounded submission, and a failure-rate breaker
//! that halts routing when the exchange keeps rejecting orders.

use chrono::{DateTime, Duration, Utc};
use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::config::{RiskConfig, RouterConfig};
use crate::events::{EngineEvent, EventBus};
use crate::exchange::{ExchangeClient, OrderFill, OrderRequest, OrderSide, OrderType};
use crate::ledger::{LedgerCommand, PositionSide};
use crate::risk::{BreakerReason, BreakerState, RiskDecision};
use crate::signal::Signal;
use crate::telemetry::{record_latency, set_gauge, GaugeMetric, LatencyMetric};

/// Outcome of one routing attempt
#[derive(Debug)]
pub enum RouteResult {
    /// Order filled and handed to the ledger
    Placed(OrderFill),
    /// Dropped before submission
    Rejected(String),
    /// Submitted but failed or timed out
    Failed(String),
}

impl RouteResult {
    pub fn is_placed(&self) -> bool {
        matches!(self, Self::Placed(_))
    }
}

/// Routes accepted decisions to the exchange and opens ledger positions
pub struct OrderRouter {
    config: RouterConfig,
    risk_config: RiskConfig,
    exchange: Arc<dyn ExchangeClient>,
    breakers: Arc<Mutex<BreakerState>>,
    ledger_tx: mpsc::Sender<LedgerCommand>,
    bus: EventBus,
    /// (bar, symbol, side) keys already routed this bar
    routed: HashSet<(i64, String, OrderSide)>,
    /// Rolling submission outcomes, newest last; `false` is a failure
    outcomes: VecDeque<bool>,
    /// Failure-rate breaker open until this time
    halted_until: Option<DateTime<Utc>>,
}

impl OrderRouter {
    pub fn new(
        config: RouterConfig,
        risk_config: RiskConfig,
        exchange: Arc<dyn ExchangeClient>,
        breakers: Arc<Mutex<BreakerState>>,
        ledger_tx: mpsc::Sender<LedgerCommand>,
        bus: EventBus,
    ) -> Self {
        Self {
            config,
            risk_config,
            exchange,
            breakers,
            ledger_tx,
            bus,
            routed: HashSet::new(),
            outcomes: VecDeque::new(),
            halted_until: None,
        }
    }

    /// Rolling failure rate over the outcome window
    pub fn failure_rate(&self) -> f64 {
        if self.outcomes.is_empty() {
            return 0.0;
        }
        let failures = self.outcomes.iter().filter(|ok| !**ok).count();
        failures as f64 / self.outcomes.len() as f64
    }

    /// Route one decision; the caller has already sized and validated it
    pub async fn route(&mut self, signal: &Signal, decision: &RiskDecision) -> RouteResult {
        let now = Utc::now();
        if !decision.accepted() {
            return self.reject(&decision.symbol, "decision not accepted".to_string());
        }
        let side = match PositionSide::try_from(signal.direction) {
            Ok(side) => side,
            Err(_) => return self.reject(&decision.symbol, "hold signal".to_string()),
        };

        // One order per (bar, symbol, side)
        let bar = signal.timestamp.timestamp() / self.config.bar_secs;
        let key = (bar, decision.symbol.clone(), side.entry_order());
        if self.routed.contains(&key) {
            return self.reject(&decision.symbol, format!("duplicate order for bar {bar}"));
        }

        if let Some(until) = self.halted_until {
            if now < until {
                return self.reject(
                    &decision.symbol,
                    BreakerReason::RouterErrors(until).describe(),
                );
            }
            info!("order failure breaker cooled down, resuming");
            self.halted_until = None;
            self.outcomes.clear();
        }

        // Conditions can change between sizing and routing; re-check
        let timeout = std::time::Duration::from_secs(self.config.order_timeout_secs);
        let balance = match tokio::time::timeout(timeout, self.exchange.get_balance()).await {
            Ok(Ok(balance)) => balance,
            Ok(Err(err)) => {
                self.record_outcome(false, now);
                return self.fail(&decision.symbol, format!("balance fetch: {err}"));
            }
            Err(_) => {
                self.record_outcome(false, now);
                return self.fail(&decision.symbol, "balance fetch timed out".to_string());
            }
        };
        let breaker = {
            let mut breakers = self.breakers.lock().expect("breaker lock poisoned");
            breakers.update_equity(balance);
            breakers.check(balance, &self.risk_config, now)
        };
        if let Some(reason) = breaker {
            let _ = self.bus.send(EngineEvent::BreakerTripped {
                reason: reason.describe(),
            });
            return self.reject(&decision.symbol, reason.describe());
        }

        self.routed.retain(|(b, _, _)| *b >= bar);
        self.routed.insert(key);

        let request = OrderRequest {
            symbol: decision.symbol.clone(),
            side: side.entry_order(),
            quantity: decision.quantity,
            order_type: OrderType::Market,
            price: None,
            stop_price: Some(decision.stop_price),
        };
        let started = std::time::Instant::now();
        let fill = match tokio::time::timeout(timeout, self.exchange.place_order(request)).await {
            Ok(Ok(fill)) => {
                record_latency(LatencyMetric::OrderSubmission, started.elapsed());
                self.record_outcome(true, now);
                fill
            }
            Ok(Err(err)) => {
                self.record_outcome(false, now);
                return self.fail(&decision.symbol, format!("order rejected: {err}"));
            }
            Err(_) => {
                self.record_outcome(false, now);
                return self.fail(&decision.symbol, "order timed out".to_string());
            }
        };

        info!(
            symbol = %fill.symbol,
            qty = %fill.filled_qty,
            price = %fill.fill_price,
            "entry order filled"
        );

        let open = LedgerCommand::Open {
            decision: Box::new(decision.clone()),
            side,
            confidence: signal.confidence,
            fill_price: fill.fill_price,
        };
        if let Err(err) = self.ledger_tx.send(open).await {
            warn!(%err, "ledger handoff failed");
        }
        RouteResult::Placed(fill)
    }

    /// Record a submission outcome and open the breaker on a bad streak
    fn record_outcome(&mut self, ok: bool, now: DateTime<Utc>) {
        self.outcomes.push_back(ok);
        while self.outcomes.len() > self.config.error_window {
            self.outcomes.pop_front();
        }
        set_gauge(GaugeMetric::OrderFailureRate, self.failure_rate());
        if self.outcomes.len() >= self.config.min_failure_sample
            && self.failure_rate() >= self.config.failure_rate_threshold
        {
            let until = now + Duration::seconds(self.config.breaker_cooldown_secs);
            warn!(
                failure_rate = self.failure_rate(),
                %until,
                "order failure rate breaker opened"
            );
            self.halted_until = Some(until);
            let _ = self.bus.send(EngineEvent::BreakerTripped {
                reason: BreakerReason::RouterErrors(until).describe(),
            });
        }
    }

    fn reject(&self, symbol: &str, reason: String) -> RouteResult {
        warn!(%symbol, %reason, "order rejected before submission");
        let _ = self.bus.send(EngineEvent::OrderRejected {
            symbol: symbol.to_string(),
            reason: reason.clone(),
        });
        RouteResult::Rejected(reason)
    }

    fn fail(&self, symbol: &str, reason: String) -> RouteResult {
        warn!(%symbol, %reason, "order submission failed");
        let _ = self.bus.send(EngineEvent::OrderRejected {
            symbol: symbol.to_string(),
            reason: reason.clone(),
        });
        RouteResult::Failed(reason)
    }
}
