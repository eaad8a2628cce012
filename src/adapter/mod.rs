//! Platform adapters.
//!
//! A platform is two capabilities: a [`ContentSource`] that yields candidate
//! items, and a [`PlaybackChannel`] that carries simulated playback
//! progress. The engine only talks to these traits; adding a platform means
//! implementing them and registering a factory in [`PlatformRegistry`].

mod catalog;
mod http;

pub use catalog::CatalogPlatform;
pub use http::HttpGateway;

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::model::{ContentItem, SourceKind};

/// Errors from platform calls.
#[derive(Debug, Error)]
pub enum AdapterError {
    #[error("request failed: {0}")]
    Request(String),

    #[error("unexpected status {status} from {endpoint}")]
    Status { status: u16, endpoint: String },

    #[error("bad response: {0}")]
    Decode(String),

    #[error("{operation} timed out after {secs:.1}s")]
    Timeout { operation: &'static str, secs: f64 },

    #[error("not found: {0}")]
    NotFound(String),

    #[error("unsupported: {0}")]
    Unsupported(String),
}

pub type AdapterResult<T> = std::result::Result<T, AdapterError>;

/// Yields candidate content.
#[async_trait]
pub trait ContentSource: Send + Sync + 'static {
    /// Poll one feed surface for candidates.
    async fn discover(&self, kind: SourceKind) -> AdapterResult<Vec<ContentItem>>;

    /// Direct keyword search, best results first.
    async fn search(&self, keyword: &str, limit: usize) -> AdapterResult<Vec<ContentItem>>;

    /// Tell the platform a playback is starting.
    async fn report_playback_start(&self, item: &ContentItem) -> AdapterResult<()>;
}

/// Playback metadata resolved before a simulated session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaybackTarget {
    pub item_id: String,
    /// True content length in seconds.
    pub duration_secs: f64,
    /// Platform-internal identifiers (playback tokens, channel ids...).
    #[serde(default)]
    pub identifiers: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HeartbeatKind {
    /// Regular periodic progress.
    Progress,
    /// Repeat of the previous position after a synthetic pause.
    Resume,
    /// Position jumped backwards.
    Seek,
    /// Last beat at the exact target position.
    Final,
}

/// One periodic progress message.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Heartbeat {
    pub step: u32,
    pub position_secs: f64,
    pub kind: HeartbeatKind,
}

/// Carries a simulated playback to the platform.
#[async_trait]
pub trait PlaybackChannel: Send + Sync + 'static {
    /// Resolve true duration and internal identifiers for `item`.
    async fn resolve(&self, item: &ContentItem) -> AdapterResult<PlaybackTarget>;

    async fn heartbeat(&self, target: &PlaybackTarget, beat: &Heartbeat) -> AdapterResult<()>;

    /// Closing progress report with the final claimed position.
    async fn report_progress(&self, target: &PlaybackTarget, position_secs: f64)
    -> AdapterResult<()>;
}

/// A connected platform: both capabilities behind shared handles.
#[derive(Clone)]
pub struct Platform {
    pub name: String,
    pub source: Arc<dyn ContentSource>,
    pub playback: Arc<dyn PlaybackChannel>,
}

impl Platform {
    /// Wrap one adapter implementing both capabilities.
    pub fn new<A>(name: impl Into<String>, adapter: A) -> Self
    where
        A: ContentSource + PlaybackChannel,
    {
        let shared = Arc::new(adapter);
        Self {
            name: name.into(),
            source: shared.clone(),
            playback: shared,
        }
    }

    /// Combine separate source and playback implementations.
    pub fn from_parts(
        name: impl Into<String>,
        source: Arc<dyn ContentSource>,
        playback: Arc<dyn PlaybackChannel>,
    ) -> Self {
        Self {
            name: name.into(),
            source,
            playback,
        }
    }
}

impl std::fmt::Debug for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Platform").field("name", &self.name).finish()
    }
}

/// Builds a platform from configuration.
pub type PlatformFactory = fn(&Config) -> Result<Platform>;

/// Registry of platform factories, indexed by platform identifier.
pub struct PlatformRegistry {
    factories: HashMap<String, PlatformFactory>,
}

impl PlatformRegistry {
    /// Create an empty registry with no platforms.
    pub fn empty() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Registry with the built-in `http` and `catalog` platforms.
    pub fn builtin() -> Self {
        let mut registry = Self::empty();
        registry.register("http", HttpGateway::from_config);
        registry.register("catalog", CatalogPlatform::from_config);
        registry
    }

    pub fn register(&mut self, name: impl Into<String>, factory: PlatformFactory) {
        self.factories.insert(name.into().to_ascii_lowercase(), factory);
    }

    /// Registered platform identifiers, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.factories.keys().cloned().collect();
        names.sort();
        names
    }

    /// Build the platform selected by `config.platform`.
    pub fn build(&self, config: &Config) -> Result<Platform> {
        let key = config.platform.to_ascii_lowercase();
        let factory = self.factories.get(&key).ok_or_else(|| {
            Error::Config(format!(
                "unknown platform {:?} (known: {})",
                config.platform,
                self.names().join(", ")
            ))
        })?;
        factory(config)
    }
}

impl Default for PlatformRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}
