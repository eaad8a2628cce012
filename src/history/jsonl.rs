//! File-backed history: one JSON record per line plus a derived stats file.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, warn};
use uuid::Uuid;

use super::{HistoryStore, Ledger};
use crate::error::Result;
use crate::model::{AggregateStats, SessionRecord, SessionStats};

pub const RECORDS_FILE: &str = "history.jsonl";
pub const STATS_FILE: &str = "stats.json";

/// Append-only history under a directory:
///
/// - `history.jsonl`: every [`SessionRecord`], one per line.
/// - `stats.json`: [`AggregateStats`], rewritten after each append.
///
/// Counters are rebuilt from `history.jsonl` on open; `stats.json` is only
/// an export for other tools.
pub struct JsonlHistory {
    records_path: PathBuf,
    stats_path: PathBuf,
    ledger: Ledger,
    /// Serializes appends so lines never interleave.
    writer: Mutex<tokio::fs::File>,
}

impl JsonlHistory {
    /// Open (or create) the history in `dir` and replay existing records.
    pub async fn open(dir: &Path) -> Result<Self> {
        tokio::fs::create_dir_all(dir).await?;
        let records_path = dir.join(RECORDS_FILE);
        let stats_path = dir.join(STATS_FILE);

        let ledger = Ledger::new();
        let replayed = replay(&records_path, &ledger).await?;
        debug!(path = %records_path.display(), replayed, "history loaded");

        let file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&records_path)
            .await?;

        Ok(Self {
            records_path,
            stats_path,
            ledger,
            writer: Mutex::new(file),
        })
    }

    pub fn records_path(&self) -> &Path {
        &self.records_path
    }

    /// Engine runs found in the history, oldest first.
    pub fn session_ids(&self) -> Vec<Uuid> {
        self.ledger.session_ids()
    }

    async fn write_stats(&self, stats: &AggregateStats) -> Result<()> {
        let tmp = self.stats_path.with_extension("json.tmp");
        tokio::fs::write(&tmp, serde_json::to_vec_pretty(stats)?).await?;
        tokio::fs::rename(&tmp, &self.stats_path).await?;
        Ok(())
    }
}

/// Apply every readable line of `path` to `ledger`. Returns the count.
async fn replay(path: &Path, ledger: &Ledger) -> Result<usize> {
    let content = match tokio::fs::read_to_string(path).await {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(e.into()),
    };

    let mut count = 0;
    for (lineno, line) in content.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<SessionRecord>(line) {
            Ok(record) => {
                ledger.apply(&record);
                count += 1;
            }
            Err(e) => {
                warn!(path = %path.display(), line = lineno + 1, "skipping bad history line: {e}");
            }
        }
    }
    Ok(count)
}

#[async_trait]
impl HistoryStore for JsonlHistory {
    async fn has_watched(&self, item_id: &str) -> Result<bool> {
        Ok(self.ledger.has_watched(item_id))
    }

    async fn record_session(&self, record: SessionRecord) -> Result<()> {
        let mut line = serde_json::to_vec(&record)?;
        line.push(b'\n');

        let mut writer = self.writer.lock().await;
        writer.write_all(&line).await?;
        writer.flush().await?;
        self.ledger.apply(&record);

        // Still under the writer lock so stats files land in append order.
        let stats = self.ledger.aggregate();
        if let Err(e) = self.write_stats(&stats).await {
            warn!(path = %self.stats_path.display(), "failed to write stats: {e}");
        }
        Ok(())
    }

    async fn aggregate_stats(&self) -> AggregateStats {
        self.ledger.aggregate()
    }

    async fn session_stats(&self, session_id: Uuid) -> SessionStats {
        self.ledger.session(session_id)
    }
}
