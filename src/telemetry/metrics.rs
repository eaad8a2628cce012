//! Metric instrument factories for feedshaper.
//!
//! Uses the OTel Meter API with the globally-registered `MeterProvider`.
//! All instruments are created lazily from the `"feedshaper"` meter.

use opentelemetry::metrics::{Counter, Histogram, Meter};

/// Returns the shared meter for feedshaper instruments.
fn meter() -> Meter {
    opentelemetry::global::meter("feedshaper")
}

/// Counter: engagement tasks admitted to the session queue.
/// Labels: `source`, `reason` ("match" | "nudge").
pub fn tasks_admitted() -> Counter<u64> {
    meter()
        .u64_counter("feedshaper.tasks.admitted")
        .with_description("Engagement tasks admitted to the session queue")
        .build()
}

/// Counter: discovery cycles skipped because the queue was full.
pub fn backpressure_skips() -> Counter<u64> {
    meter()
        .u64_counter("feedshaper.cycles.backpressure")
        .with_description("Discovery cycles skipped because the session queue was full")
        .build()
}

/// Counter: failed discovery polls.
/// Labels: `source`.
pub fn discovery_failures() -> Counter<u64> {
    meter()
        .u64_counter("feedshaper.discovery.failures")
        .with_description("Discovery polls that failed at the platform")
        .build()
}

/// Counter: active searches.
/// Labels: `strategy`, `result` ("admitted" | "empty" | "error").
pub fn active_searches() -> Counter<u64> {
    meter()
        .u64_counter("feedshaper.search.active")
        .with_description("Active searches issued after repeated discovery misses")
        .build()
}

/// Counter: session records appended to history.
/// Labels: `outcome` ("completed" | "failed").
pub fn sessions_recorded() -> Counter<u64> {
    meter()
        .u64_counter("feedshaper.sessions.recorded")
        .with_description("Session records appended to history")
        .build()
}

/// Counter: tasks skipped because the item was already watched.
pub fn sessions_skipped() -> Counter<u64> {
    meter()
        .u64_counter("feedshaper.sessions.skipped")
        .with_description("Tasks short-circuited by the history de-dup check")
        .build()
}

/// Counter: playback heartbeats sent.
/// Labels: `kind` ("progress" | "resume" | "seek" | "final").
pub fn heartbeats_emitted() -> Counter<u64> {
    meter()
        .u64_counter("feedshaper.playback.heartbeats")
        .with_description("Playback heartbeats sent to the platform")
        .build()
}

/// Histogram: claimed watch time per completed session.
pub fn reported_duration_secs() -> Histogram<f64> {
    meter()
        .f64_histogram("feedshaper.playback.reported_duration")
        .with_description("Claimed watch time per completed session")
        .with_unit("s")
        .build()
}
