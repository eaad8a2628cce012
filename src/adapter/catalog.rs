//! Dry-run platform backed by a local JSON catalog.
//!
//! Discovery rotates through the catalog in fixed-size pages; playback calls
//! are logged and counted but go nowhere.

use std::path::Path;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use async_trait::async_trait;
use tracing::{debug, info};

use super::{
    AdapterError, AdapterResult, ContentSource, Heartbeat, Platform, PlaybackChannel,
    PlaybackTarget,
};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::model::{ContentItem, SourceKind};

pub const DEFAULT_PAGE_SIZE: usize = 20;

/// Calls observed by a [`CatalogPlatform`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CatalogCounters {
    pub starts: u64,
    pub heartbeats: u64,
    pub progress_reports: u64,
}

pub struct CatalogPlatform {
    items: Vec<ContentItem>,
    page_size: usize,
    cursor: AtomicUsize,
    starts: AtomicU64,
    heartbeats: AtomicU64,
    progress_reports: AtomicU64,
}

impl CatalogPlatform {
    pub fn new(items: Vec<ContentItem>) -> Self {
        Self {
            items,
            page_size: DEFAULT_PAGE_SIZE,
            cursor: AtomicUsize::new(0),
            starts: AtomicU64::new(0),
            heartbeats: AtomicU64::new(0),
            progress_reports: AtomicU64::new(0),
        }
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Read a JSON array of items.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let items: Vec<ContentItem> = serde_json::from_str(&content)?;
        info!(path = %path.display(), items = items.len(), "catalog loaded");
        Ok(Self::new(items))
    }

    /// [`PlatformFactory`](super::PlatformFactory) for the `catalog` platform.
    pub fn from_config(config: &Config) -> Result<Platform> {
        let path = config
            .catalog_path
            .as_deref()
            .ok_or_else(|| Error::Config("platform `catalog` requires catalog_path".into()))?;
        Ok(Platform::new("catalog", Self::load(path)?))
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn counters(&self) -> CatalogCounters {
        CatalogCounters {
            starts: self.starts.load(Ordering::Relaxed),
            heartbeats: self.heartbeats.load(Ordering::Relaxed),
            progress_reports: self.progress_reports.load(Ordering::Relaxed),
        }
    }

    fn find(&self, item_id: &str) -> Option<&ContentItem> {
        self.items.iter().find(|i| i.id == item_id)
    }
}

#[async_trait]
impl ContentSource for CatalogPlatform {
    async fn discover(&self, kind: SourceKind) -> AdapterResult<Vec<ContentItem>> {
        let pool: Vec<&ContentItem> = self
            .items
            .iter()
            .filter(|i| kind == SourceKind::Search || i.source == kind)
            .collect();
        if pool.is_empty() {
            return Ok(Vec::new());
        }

        let take = self.page_size.min(pool.len());
        let start = self.cursor.fetch_add(take, Ordering::Relaxed) % pool.len();
        let page = pool
            .iter()
            .cycle()
            .skip(start)
            .take(take)
            .map(|&item| ContentItem {
                source: kind,
                ..item.clone()
            })
            .collect();
        Ok(page)
    }

    async fn search(&self, keyword: &str, limit: usize) -> AdapterResult<Vec<ContentItem>> {
        let needle = keyword.to_lowercase();
        let (mut hits, rest): (Vec<&ContentItem>, Vec<&ContentItem>) =
            self.items.iter().partition(|i| {
                i.title.to_lowercase().contains(&needle)
                    || i.tags.iter().any(|t| t.to_lowercase().contains(&needle))
            });
        // Real search pads weak queries with loosely related results.
        hits.extend(rest);

        Ok(hits
            .into_iter()
            .take(limit)
            .map(|item| ContentItem {
                source: SourceKind::Search,
                ..item.clone()
            })
            .collect())
    }

    async fn report_playback_start(&self, item: &ContentItem) -> AdapterResult<()> {
        self.starts.fetch_add(1, Ordering::Relaxed);
        debug!(item_id = %item.id, "dry-run playback start");
        Ok(())
    }
}

#[async_trait]
impl PlaybackChannel for CatalogPlatform {
    async fn resolve(&self, item: &ContentItem) -> AdapterResult<PlaybackTarget> {
        let duration_secs = self
            .find(&item.id)
            .and_then(|i| i.duration_secs)
            .or(item.duration_secs)
            .ok_or_else(|| AdapterError::NotFound(format!("duration of {}", item.id)))?;

        Ok(PlaybackTarget {
            item_id: item.id.clone(),
            duration_secs,
            identifiers: Default::default(),
        })
    }

    async fn heartbeat(&self, target: &PlaybackTarget, beat: &Heartbeat) -> AdapterResult<()> {
        self.heartbeats.fetch_add(1, Ordering::Relaxed);
        debug!(
            item_id = %target.item_id,
            step = beat.step,
            position_secs = beat.position_secs,
            kind = ?beat.kind,
            "dry-run heartbeat"
        );
        Ok(())
    }

    async fn report_progress(
        &self,
        target: &PlaybackTarget,
        position_secs: f64,
    ) -> AdapterResult<()> {
        self.progress_reports.fetch_add(1, Ordering::Relaxed);
        debug!(item_id = %target.item_id, position_secs, "dry-run progress");
        Ok(())
    }
}
