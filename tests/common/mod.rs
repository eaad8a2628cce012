//! Shared fakes for integration tests.
#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use feedshaper::adapter::{
    AdapterError, AdapterResult, ContentSource, Heartbeat, Platform, PlaybackChannel,
    PlaybackTarget,
};
use feedshaper::model::{ContentItem, SessionOutcome, SessionRecord, SourceKind};
use parking_lot::Mutex;
use uuid::Uuid;

pub fn item(id: &str, title: &str) -> ContentItem {
    ContentItem::new(id, title).duration(120.0)
}

pub fn record(item: ContentItem, keywords: &[&str], session_id: Uuid) -> SessionRecord {
    SessionRecord {
        timestamp: Utc::now(),
        source: item.source,
        item,
        reported_duration_secs: 30.0,
        real_elapsed_secs: 30.0,
        keywords: keywords.iter().map(|k| k.to_string()).collect(),
        session_id,
        simulated: true,
        speed_factor: 1.0,
        outcome: SessionOutcome::Completed,
    }
}

/// Scripted content source.
///
/// `discover` pops the next scripted response; once the script runs out it
/// returns the fallback feed. `search` answers from a per-keyword table.
#[derive(Clone, Default)]
pub struct FakeSource {
    script: Arc<Mutex<VecDeque<AdapterResult<Vec<ContentItem>>>>>,
    fallback: Arc<Mutex<Vec<ContentItem>>>,
    search_results: Arc<Mutex<HashMap<String, Vec<ContentItem>>>>,
    fail_search: Arc<AtomicBool>,
    discover_calls: Arc<Mutex<Vec<SourceKind>>>,
    search_calls: Arc<Mutex<Vec<String>>>,
    starts: Arc<Mutex<Vec<String>>>,
}

impl FakeSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_feed(feed: Vec<ContentItem>) -> Self {
        let source = Self::new();
        *source.fallback.lock() = feed;
        source
    }

    pub fn push_feed(&self, feed: Vec<ContentItem>) {
        self.script.lock().push_back(Ok(feed));
    }

    pub fn push_error(&self, error: AdapterError) {
        self.script.lock().push_back(Err(error));
    }

    pub fn set_search(&self, keyword: &str, results: Vec<ContentItem>) {
        self.search_results
            .lock()
            .insert(keyword.to_string(), results);
    }

    pub fn set_fail_search(&self, fail: bool) {
        self.fail_search.store(fail, Ordering::SeqCst);
    }

    pub fn discover_calls(&self) -> Vec<SourceKind> {
        self.discover_calls.lock().clone()
    }

    pub fn search_calls(&self) -> Vec<String> {
        self.search_calls.lock().clone()
    }

    pub fn starts(&self) -> Vec<String> {
        self.starts.lock().clone()
    }
}

#[async_trait]
impl ContentSource for FakeSource {
    async fn discover(&self, kind: SourceKind) -> AdapterResult<Vec<ContentItem>> {
        self.discover_calls.lock().push(kind);
        if let Some(next) = self.script.lock().pop_front() {
            return next;
        }
        Ok(self.fallback.lock().clone())
    }

    async fn search(&self, keyword: &str, limit: usize) -> AdapterResult<Vec<ContentItem>> {
        self.search_calls.lock().push(keyword.to_string());
        if self.fail_search.load(Ordering::SeqCst) {
            return Err(AdapterError::Request("search unavailable".into()));
        }
        let mut results = self
            .search_results
            .lock()
            .get(keyword)
            .cloned()
            .unwrap_or_default();
        results.truncate(limit);
        Ok(results)
    }

    async fn report_playback_start(&self, item: &ContentItem) -> AdapterResult<()> {
        self.starts.lock().push(item.id.clone());
        Ok(())
    }
}

/// Playback channel that records every call.
#[derive(Clone)]
pub struct FakePlayback {
    duration_secs: f64,
    /// Fail the heartbeat with this 1-based call index.
    fail_heartbeat_at: Arc<Mutex<Option<usize>>>,
    /// Never answer heartbeats.
    hang: Arc<AtomicBool>,
    beats: Arc<Mutex<Vec<(String, Heartbeat)>>>,
    progress: Arc<Mutex<Vec<(String, f64)>>>,
}

impl FakePlayback {
    pub fn new(duration_secs: f64) -> Self {
        Self {
            duration_secs,
            fail_heartbeat_at: Arc::new(Mutex::new(None)),
            hang: Arc::new(AtomicBool::new(false)),
            beats: Arc::new(Mutex::new(Vec::new())),
            progress: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn fail_heartbeat_at(&self, call: usize) {
        *self.fail_heartbeat_at.lock() = Some(call);
    }

    pub fn set_hang(&self, hang: bool) {
        self.hang.store(hang, Ordering::SeqCst);
    }

    pub fn beats(&self) -> Vec<(String, Heartbeat)> {
        self.beats.lock().clone()
    }

    pub fn progress(&self) -> Vec<(String, f64)> {
        self.progress.lock().clone()
    }
}

#[async_trait]
impl PlaybackChannel for FakePlayback {
    async fn resolve(&self, item: &ContentItem) -> AdapterResult<PlaybackTarget> {
        Ok(PlaybackTarget {
            item_id: item.id.clone(),
            duration_secs: self.duration_secs,
            identifiers: Default::default(),
        })
    }

    async fn heartbeat(&self, target: &PlaybackTarget, beat: &Heartbeat) -> AdapterResult<()> {
        if self.hang.load(Ordering::SeqCst) {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        }
        let call = {
            let mut beats = self.beats.lock();
            beats.push((target.item_id.clone(), *beat));
            beats.len()
        };
        if *self.fail_heartbeat_at.lock() == Some(call) {
            return Err(AdapterError::Status {
                status: 500,
                endpoint: "heartbeat".into(),
            });
        }
        Ok(())
    }

    async fn report_progress(
        &self,
        target: &PlaybackTarget,
        position_secs: f64,
    ) -> AdapterResult<()> {
        self.progress
            .lock()
            .push((target.item_id.clone(), position_secs));
        Ok(())
    }
}

pub fn platform(source: &FakeSource, playback: &FakePlayback) -> Platform {
    Platform::from_parts(
        "fake",
        Arc::new(source.clone()),
        Arc::new(playback.clone()),
    )
}
