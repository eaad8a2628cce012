//! Process-local history.

use async_trait::async_trait;
use parking_lot::Mutex;
use uuid::Uuid;

use super::{HistoryStore, Ledger};
use crate::error::Result;
use crate::model::{AggregateStats, SessionRecord, SessionStats};

/// History kept in memory only. Forgotten on exit.
#[derive(Default)]
pub struct MemoryHistory {
    ledger: Ledger,
    records: Mutex<Vec<SessionRecord>>,
}

impl MemoryHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every record appended so far, in append order.
    pub fn records(&self) -> Vec<SessionRecord> {
        self.records.lock().clone()
    }
}

#[async_trait]
impl HistoryStore for MemoryHistory {
    async fn has_watched(&self, item_id: &str) -> Result<bool> {
        Ok(self.ledger.has_watched(item_id))
    }

    async fn record_session(&self, record: SessionRecord) -> Result<()> {
        self.ledger.apply(&record);
        self.records.lock().push(record);
        Ok(())
    }

    async fn aggregate_stats(&self) -> AggregateStats {
        self.ledger.aggregate()
    }

    async fn session_stats(&self, session_id: Uuid) -> SessionStats {
        self.ledger.session(session_id)
    }
}
