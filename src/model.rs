//! Core data model.
//!
//! A content item is something a platform offered us. An engagement task is
//! the intent to watch one of them; a session record is what happened.

pub mod content;
pub mod record;
pub mod task;

pub use content::{ContentItem, SourceKind};
pub use record::{AggregateStats, SessionOutcome, SessionRecord, SessionStats};
pub use task::{EngagementTask, TaskId, TaskStatus};
