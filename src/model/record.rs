//! Session records and the statistics derived from them.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::content::{ContentItem, SourceKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionOutcome {
    Completed,
    Failed,
}

/// One finished (or failed) simulated watch. Immutable once appended.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionRecord {
    pub timestamp: DateTime<Utc>,
    pub item: ContentItem,
    /// Playback position claimed to the platform, in seconds. Zero on failure.
    pub reported_duration_secs: f64,
    /// Wall-clock time the worker spent on the task.
    pub real_elapsed_secs: f64,
    pub keywords: Vec<String>,
    pub source: SourceKind,
    /// Engine run that produced the record.
    pub session_id: Uuid,
    pub simulated: bool,
    pub speed_factor: f64,
    pub outcome: SessionOutcome,
}

impl SessionRecord {
    pub fn is_completed(&self) -> bool {
        self.outcome == SessionOutcome::Completed
    }

    /// UTC calendar day the record falls on, `YYYY-MM-DD`.
    pub fn day(&self) -> String {
        self.timestamp.format("%Y-%m-%d").to_string()
    }
}

/// Counters across every record the store has seen.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AggregateStats {
    pub total_sessions: u64,
    pub completed: u64,
    pub failed: u64,
    pub total_reported_secs: f64,
    pub total_real_secs: f64,
    pub by_keyword: BTreeMap<String, u64>,
    pub by_source: BTreeMap<String, u64>,
    pub by_day: BTreeMap<String, u64>,
    pub by_author: BTreeMap<String, u64>,
}

impl AggregateStats {
    /// Fold one record into the counters.
    pub fn apply(&mut self, record: &SessionRecord) {
        self.total_sessions += 1;
        if record.is_completed() {
            self.completed += 1;
        } else {
            self.failed += 1;
        }
        self.total_reported_secs += record.reported_duration_secs;
        self.total_real_secs += record.real_elapsed_secs;

        for keyword in &record.keywords {
            *self.by_keyword.entry(keyword.clone()).or_default() += 1;
        }
        *self.by_source.entry(record.source.to_string()).or_default() += 1;
        *self.by_day.entry(record.day()).or_default() += 1;
        if !record.item.author.is_empty() {
            *self.by_author.entry(record.item.author.clone()).or_default() += 1;
        }
    }

    /// Sessions recorded for `keyword`, zero if never seen.
    pub fn keyword_count(&self, keyword: &str) -> u64 {
        self.by_keyword.get(keyword).copied().unwrap_or(0)
    }
}

/// Partial statistics for one engine run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionStats {
    pub session_id: Uuid,
    pub sessions: u64,
    pub completed: u64,
    pub failed: u64,
    pub reported_secs: f64,
    pub real_secs: f64,
    pub first_at: Option<DateTime<Utc>>,
    pub last_at: Option<DateTime<Utc>>,
    pub by_keyword: BTreeMap<String, u64>,
}

impl SessionStats {
    pub fn empty(session_id: Uuid) -> Self {
        Self {
            session_id,
            sessions: 0,
            completed: 0,
            failed: 0,
            reported_secs: 0.0,
            real_secs: 0.0,
            first_at: None,
            last_at: None,
            by_keyword: BTreeMap::new(),
        }
    }

    pub fn apply(&mut self, record: &SessionRecord) {
        self.sessions += 1;
        if record.is_completed() {
            self.completed += 1;
        } else {
            self.failed += 1;
        }
        self.reported_secs += record.reported_duration_secs;
        self.real_secs += record.real_elapsed_secs;
        self.first_at = Some(match self.first_at {
            Some(first) => first.min(record.timestamp),
            None => record.timestamp,
        });
        self.last_at = Some(match self.last_at {
            Some(last) => last.max(record.timestamp),
            None => record.timestamp,
        });
        for keyword in &record.keywords {
            *self.by_keyword.entry(keyword.clone()).or_default() += 1;
        }
    }
}
