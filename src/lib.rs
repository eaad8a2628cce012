//! # feedshaper
//!
//! Keyword-driven engagement simulation against a content platform.
//!
//! An orchestrator polls a platform feed, admits items matching the
//! configured keywords into a bounded session queue, and falls back to
//! direct search when the feed keeps coming up empty. A fixed pool of
//! workers replays each item as a simulated playback (paced heartbeats,
//! occasional pauses and seeks) and records the session in an append-only
//! history that also drives de-duplication.

pub mod adapter;
pub mod config;
pub mod engine;
pub mod error;
pub mod history;
pub mod jitter;
pub mod matcher;
pub mod model;
pub mod playback;
pub mod telemetry;
