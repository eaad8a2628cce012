//! Engagement session span helpers.
//!
//! Provides span creation and state-transition recording for engagement
//! tasks flowing through the worker pool.

use tracing::Span;

use crate::model::TaskId;

/// Start a span for one engagement task.
///
/// The `engagement.status` field is declared empty and can be updated via
/// [`record_state_transition`].
pub fn start_session_span(platform: &str, task_id: &TaskId, worker: usize) -> Span {
    tracing::info_span!(
        "engagement.session",
        "engagement.platform" = platform,
        "engagement.task_id" = %task_id.0,
        "engagement.worker" = worker,
        "engagement.status" = tracing::field::Empty,
    )
}

/// Record a state transition event on the given span.
///
/// Emits a tracing `info` event scoped to the span and stores the new status.
pub fn record_state_transition(span: &Span, from: &str, to: &str) {
    span.record("engagement.status", to);
    span.in_scope(|| {
        tracing::info!(from = from, to = to, "state_transition");
    });
}
