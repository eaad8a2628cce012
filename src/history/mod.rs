//! Watch history: de-duplication and session metrics.
//!
//! The engine treats the store as an opaque sink. Both implementations keep
//! a [`Ledger`] in memory; [`JsonlHistory`] additionally persists every
//! record so de-duplication survives restarts.

mod jsonl;
mod memory;

pub use jsonl::{JsonlHistory, RECORDS_FILE, STATS_FILE};
pub use memory::MemoryHistory;

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use parking_lot::Mutex;
use uuid::Uuid;

use crate::error::Result;
use crate::model::{AggregateStats, SessionRecord, SessionStats};

/// De-dup and metrics sink shared by all workers.
#[async_trait]
pub trait HistoryStore: Send + Sync + 'static {
    /// Whether any session for `item_id` was ever recorded.
    async fn has_watched(&self, item_id: &str) -> Result<bool>;

    /// Append a record. Safe under concurrent calls; once this returns,
    /// `has_watched` is true for the record's item.
    async fn record_session(&self, record: SessionRecord) -> Result<()>;

    async fn aggregate_stats(&self) -> AggregateStats;

    /// Stats of one engine run. Empty if the run recorded nothing.
    async fn session_stats(&self, session_id: Uuid) -> SessionStats;
}

/// In-memory index over every record applied so far.
///
/// One lock covers the watched set and all counters, so concurrent
/// increments are serialized.
#[derive(Default)]
pub struct Ledger {
    inner: Mutex<LedgerState>,
}

#[derive(Default)]
struct LedgerState {
    watched: HashSet<String>,
    aggregate: AggregateStats,
    sessions: HashMap<Uuid, SessionStats>,
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn has_watched(&self, item_id: &str) -> bool {
        self.inner.lock().watched.contains(item_id)
    }

    pub fn apply(&self, record: &SessionRecord) {
        let mut state = self.inner.lock();
        state.watched.insert(record.item.id.clone());
        state.aggregate.apply(record);
        state
            .sessions
            .entry(record.session_id)
            .or_insert_with(|| SessionStats::empty(record.session_id))
            .apply(record);
    }

    pub fn aggregate(&self) -> AggregateStats {
        self.inner.lock().aggregate.clone()
    }

    pub fn session(&self, session_id: Uuid) -> SessionStats {
        self.inner
            .lock()
            .sessions
            .get(&session_id)
            .cloned()
            .unwrap_or_else(|| SessionStats::empty(session_id))
    }

    /// Known engine runs, oldest first.
    pub fn session_ids(&self) -> Vec<Uuid> {
        let state = self.inner.lock();
        let mut sessions: Vec<&SessionStats> = state.sessions.values().collect();
        sessions.sort_by_key(|s| s.first_at);
        sessions.iter().map(|s| s.session_id).collect()
    }
}
