//! Trade persistence boundary
//!
//! Closed trades are appended to an external store; open positions can be
//! reloaded on startup so a restart does not orphan live exposure.

use async_trait::async_trait;
use std::io::Write as _;
use std::path::PathBuf;
use tokio::sync::Mutex;

use crate::ledger::{ClosedTrade, Position};

/// Trait for the trade-store collaborator
#[async_trait]
pub trait TradeStore: Send + Sync {
    /// Append a closed trade to the journal
    async fn save_trade(&self, trade: &ClosedTrade) -> anyhow::Result<()>;
    /// Persist the current open-position set
    async fn save_open_positions(&self, positions: &[Position]) -> anyhow::Result<()>;
    /// Load the open-position set persisted by a previous run
    async fn load_open_positions(&self) -> anyhow::Result<Vec<Position>>;
}

/// File-backed store: trades as a JSONL journal, open positions as a JSON
/// snapshot rewritten on every save
pub struct JsonlStore {
    trades_path: PathBuf,
    positions_path: PathBuf,
    lock: Mutex<()>,
}

impl JsonlStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        Self {
            trades_path: dir.join("trades.jsonl"),
            positions_path: dir.join("open_positions.json"),
            lock: Mutex::new(()),
        }
    }
}

#[async_trait]
impl TradeStore for JsonlStore {
    async fn save_trade(&self, trade: &ClosedTrade) -> anyhow::Result<()> {
        let _guard = self.lock.lock().await;
        let line = serde_json::to_string(trade)?;
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.trades_path)?;
        writeln!(file, "{}", line)?;
        Ok(())
    }

    async fn save_open_positions(&self, positions: &[Position]) -> anyhow::Result<()> {
        let _guard = self.lock.lock().await;
        let json = serde_json::to_string_pretty(positions)?;
        std::fs::write(&self.positions_path, json)?;
        Ok(())
    }

    async fn load_open_positions(&self) -> anyhow::Result<Vec<Position>> {
        let _guard = self.lock.lock().await;
        if !self.positions_path.exists() {
            return Ok(vec![]);
        }
        let json = std::fs::read_to_string(&self.positions_path)?;
        Ok(serde_json::from_str(&json)?)
    }
}

/// No-op store for tests and dry runs
pub struct NullStore;

#[async_trait]
impl TradeStore for NullStore {
    async fn save_trade(&self, _trade: &ClosedTrade) -> anyhow::Result<()> {
        Ok(())
    }

    async fn save_open_positions(&self, _positions: &[Position]) -> anyhow::Result<()> {
        Ok(())
    }

    async fn load_open_positions(&self) -> anyhow::Result<Vec<Position>> {
        Ok(vec![])
    }
}
