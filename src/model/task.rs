//! Engagement tasks: one simulated watch of one item.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::content::ContentItem;
use crate::error::{Error, Result};

/// Newtype for engagement task IDs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TaskId(pub Uuid);

impl TaskId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Short display: first 8 chars of UUID
        write!(f, "{}", &self.0.to_string()[..8])
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

/// Lifecycle state of an engagement task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Admitted, waiting in the session queue.
    Pending,
    /// Held by a worker, playback in progress.
    Active,
    /// Finished, or skipped because the item was already watched.
    Done,
    /// Playback aborted. Terminal, never retried.
    Failed,
}

impl TaskStatus {
    /// Can transition from self to `to`?
    pub fn can_transition_to(self, to: TaskStatus) -> bool {
        use TaskStatus::*;
        matches!(
            (self, to),
            (Pending, Active)
                | (Pending, Done) // already watched, short-circuit
                | (Active, Done)
                | (Active, Failed)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, TaskStatus::Done | TaskStatus::Failed)
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Active => "active",
            TaskStatus::Done => "done",
            TaskStatus::Failed => "failed",
        };
        write!(f, "{s}")
    }
}

/// A unit of work for the worker pool.
///
/// Owned by the queue while pending and by exactly one worker afterwards;
/// moving the value is what enforces single ownership.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngagementTask {
    pub id: TaskId,
    pub item: ContentItem,
    /// Keywords that caused admission. For search nudges this is the
    /// search keyword even when the item itself did not match.
    pub matched_keywords: Vec<String>,
    pub status: TaskStatus,
    pub assigned_worker: Option<usize>,
    pub started_at: Option<DateTime<Utc>>,
    pub measured_duration: Option<Duration>,
}

impl EngagementTask {
    pub fn new(item: ContentItem, matched_keywords: Vec<String>) -> Self {
        Self {
            id: TaskId::new(),
            item,
            matched_keywords,
            status: TaskStatus::Pending,
            assigned_worker: None,
            started_at: None,
            measured_duration: None,
        }
    }

    fn transition(&mut self, to: TaskStatus) -> Result<()> {
        if !self.status.can_transition_to(to) {
            return Err(Error::InvalidTransition {
                from: self.status.to_string(),
                to: to.to_string(),
            });
        }
        self.status = to;
        Ok(())
    }

    /// Pending → Active, bound to `worker`.
    pub fn activate(&mut self, worker: usize) -> Result<()> {
        self.transition(TaskStatus::Active)?;
        self.assigned_worker = Some(worker);
        self.started_at = Some(Utc::now());
        Ok(())
    }

    /// Pending → Done without any playback.
    pub fn skip(&mut self) -> Result<()> {
        self.transition(TaskStatus::Done)
    }

    /// Active → Done | Failed.
    pub fn finish(&mut self, success: bool, measured: Duration) -> Result<()> {
        let to = if success {
            TaskStatus::Done
        } else {
            TaskStatus::Failed
        };
        self.transition(to)?;
        self.measured_duration = Some(measured);
        Ok(())
    }
}
