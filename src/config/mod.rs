//! Typed runtime configuration.
//!
//! Loaded once at startup: defaults, then an optional TOML file, then
//! `FEEDSHAPER_*` environment variables. Validation fails fast on values
//! outside their supported ranges. The platform token is wrapped in
//! [`SecretString`] to prevent log leaks.

pub mod secrets;

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;

use crate::engine::SearchStrategy;
use crate::error::{Error, Result};
use crate::matcher::{KeywordMatcher, MatchMode};
use crate::model::SourceKind;
use secrets::SecretString;

pub const MAX_WORKERS: usize = 10;
pub const MAX_SPEED_FACTOR: f64 = 5.0;

#[derive(Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Platform identifier, resolved through the platform registry.
    pub platform: String,
    /// Base URL of the `http` platform gateway.
    pub platform_url: Option<String>,
    pub platform_token: Option<SecretString>,
    /// JSON item catalog for the `catalog` platform.
    pub catalog_path: Option<PathBuf>,

    pub keywords: Vec<String>,
    pub match_mode: MatchMode,
    pub case_sensitive: bool,
    pub include_tags: bool,

    /// Feed surface polled each discovery cycle.
    pub source_kind: SourceKind,
    #[serde(with = "secs")]
    pub poll_interval: Duration,
    /// Maximum tasks admitted per discovery cycle.
    pub admission_cap: usize,
    pub queue_capacity: usize,
    pub workers: usize,
    #[serde(with = "secs")]
    pub worker_stagger: Duration,

    /// Nominal claimed watch time per session, seconds.
    pub nominal_duration_secs: f64,
    /// Total jitter band around the nominal duration, percent.
    pub jitter_percent: f64,
    /// Real time runs this many times faster than claimed time (1–5).
    pub speed_factor: f64,

    pub active_search: bool,
    /// Consecutive empty cycles before an active search.
    pub search_threshold: u32,
    pub search_strategy: SearchStrategy,
    pub search_limit: usize,

    #[serde(with = "secs")]
    pub idle_poll: Duration,
    #[serde(with = "secs")]
    pub error_backoff: Duration,
    #[serde(with = "secs")]
    pub drain_timeout: Duration,
    #[serde(with = "secs")]
    pub call_timeout: Duration,
    /// Failed sessions shorter than this are dropped instead of recorded.
    #[serde(with = "secs")]
    pub failure_record_threshold: Duration,
    pub rng_seed: Option<u64>,

    pub history_dir: PathBuf,
    pub otel_endpoint: Option<String>,
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            platform: "catalog".to_string(),
            platform_url: None,
            platform_token: None,
            catalog_path: None,
            keywords: Vec::new(),
            match_mode: MatchMode::Any,
            case_sensitive: false,
            include_tags: true,
            source_kind: SourceKind::Discovery,
            poll_interval: Duration::from_secs(60),
            admission_cap: 5,
            queue_capacity: 20,
            workers: 3,
            worker_stagger: Duration::from_secs(2),
            nominal_duration_secs: 30.0,
            jitter_percent: 10.0,
            speed_factor: 1.0,
            active_search: true,
            search_threshold: 3,
            search_strategy: SearchStrategy::Random,
            search_limit: 10,
            idle_poll: Duration::from_secs(1),
            error_backoff: Duration::from_secs(120),
            drain_timeout: Duration::from_secs(30),
            call_timeout: Duration::from_secs(20),
            failure_record_threshold: Duration::from_secs(5),
            rng_seed: None,
            history_dir: PathBuf::from("data/history"),
            otel_endpoint: None,
            log_level: "info".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from environment variables over defaults.
    ///
    /// In local dev, call `dotenvy::dotenv().ok()` before this.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        config.apply_env()?;
        config.validate()?;
        Ok(config)
    }

    /// Load from an optional TOML file, then apply environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = Self::read(path)?;
        config.validate()?;
        Ok(config)
    }

    /// Like [`load`](Self::load) but without validation, for callers that
    /// patch fields before validating.
    pub fn read(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => {
                let content = std::fs::read_to_string(path).map_err(|e| {
                    Error::Config(format!("cannot read config {}: {e}", path.display()))
                })?;
                Self::from_toml_str(&content)?
            }
            None => Self::default(),
        };
        config.apply_env()?;
        Ok(config)
    }

    /// Parse a TOML document. Missing keys take their defaults.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Override fields from `FEEDSHAPER_*` variables that are set.
    pub fn apply_env(&mut self) -> Result<()> {
        if let Some(v) = env_var("FEEDSHAPER_PLATFORM") {
            self.platform = v;
        }
        if let Some(v) = env_var("FEEDSHAPER_PLATFORM_URL") {
            self.platform_url = Some(v);
        }
        if let Some(v) = env_var("FEEDSHAPER_PLATFORM_TOKEN") {
            self.platform_token = Some(SecretString::from(v));
        }
        if let Some(v) = env_var("FEEDSHAPER_CATALOG") {
            self.catalog_path = Some(PathBuf::from(v));
        }
        if let Some(v) = env_var("FEEDSHAPER_KEYWORDS") {
            self.keywords = split_list(&v);
        }
        set_parsed(&mut self.match_mode, "FEEDSHAPER_MATCH_MODE")?;
        set_parsed(&mut self.case_sensitive, "FEEDSHAPER_CASE_SENSITIVE")?;
        set_parsed(&mut self.include_tags, "FEEDSHAPER_INCLUDE_TAGS")?;
        set_parsed(&mut self.source_kind, "FEEDSHAPER_SOURCE")?;
        set_secs(&mut self.poll_interval, "FEEDSHAPER_POLL_INTERVAL")?;
        set_parsed(&mut self.admission_cap, "FEEDSHAPER_ADMISSION_CAP")?;
        set_parsed(&mut self.queue_capacity, "FEEDSHAPER_QUEUE_CAPACITY")?;
        set_parsed(&mut self.workers, "FEEDSHAPER_WORKERS")?;
        set_secs(&mut self.worker_stagger, "FEEDSHAPER_WORKER_STAGGER")?;
        set_parsed(&mut self.nominal_duration_secs, "FEEDSHAPER_DURATION")?;
        set_parsed(&mut self.jitter_percent, "FEEDSHAPER_JITTER")?;
        set_parsed(&mut self.speed_factor, "FEEDSHAPER_SPEED")?;
        set_parsed(&mut self.active_search, "FEEDSHAPER_ACTIVE_SEARCH")?;
        set_parsed(&mut self.search_threshold, "FEEDSHAPER_SEARCH_THRESHOLD")?;
        set_parsed(&mut self.search_strategy, "FEEDSHAPER_SEARCH_STRATEGY")?;
        set_parsed(&mut self.search_limit, "FEEDSHAPER_SEARCH_LIMIT")?;
        if let Some(seed) = parse_var::<u64>("FEEDSHAPER_SEED")? {
            self.rng_seed = Some(seed);
        }
        if let Some(v) = env_var("FEEDSHAPER_HISTORY_DIR") {
            self.history_dir = PathBuf::from(v);
        }
        if let Some(v) = env_var("OTEL_ENDPOINT") {
            self.otel_endpoint = Some(v);
        }
        if let Some(v) = env_var("LOG_LEVEL") {
            self.log_level = v;
        }
        Ok(())
    }

    /// Normalize keywords and check every value is within range.
    pub fn validate(&mut self) -> Result<()> {
        self.keywords = self
            .keywords
            .iter()
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty())
            .collect();

        if self.keywords.is_empty() {
            return Err(Error::Config("at least one keyword is required".into()));
        }
        if !(1..=MAX_WORKERS).contains(&self.workers) {
            return Err(Error::Config(format!(
                "workers must be between 1 and {MAX_WORKERS}, got {}",
                self.workers
            )));
        }
        if !(1.0..=MAX_SPEED_FACTOR).contains(&self.speed_factor) {
            return Err(Error::Config(format!(
                "speed_factor must be between 1 and {MAX_SPEED_FACTOR}, got {}",
                self.speed_factor
            )));
        }
        if self.queue_capacity == 0 {
            return Err(Error::Config("queue_capacity must be at least 1".into()));
        }
        if self.admission_cap == 0 {
            return Err(Error::Config("admission_cap must be at least 1".into()));
        }
        if self.nominal_duration_secs.is_nan() || self.nominal_duration_secs <= 0.0 {
            return Err(Error::Config(format!(
                "nominal_duration_secs must be positive, got {}",
                self.nominal_duration_secs
            )));
        }
        if !(0.0..=100.0).contains(&self.jitter_percent) {
            return Err(Error::Config(format!(
                "jitter_percent must be between 0 and 100, got {}",
                self.jitter_percent
            )));
        }
        if self.active_search && self.search_threshold == 0 {
            return Err(Error::Config("search_threshold must be at least 1".into()));
        }
        if self.search_limit == 0 {
            return Err(Error::Config("search_limit must be at least 1".into()));
        }
        Ok(())
    }

    /// Match evaluator for the configured keywords.
    pub fn matcher(&self) -> KeywordMatcher {
        KeywordMatcher::new(self.keywords.clone(), self.match_mode, self.case_sensitive)
            .include_tags(self.include_tags)
    }
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn parse_var<T>(name: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env_var(name) {
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e| Error::Config(format!("invalid {name}={raw:?}: {e}"))),
        None => Ok(None),
    }
}

fn set_parsed<T>(field: &mut T, name: &str) -> Result<()>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    if let Some(value) = parse_var(name)? {
        *field = value;
    }
    Ok(())
}

fn set_secs(field: &mut Duration, name: &str) -> Result<()> {
    if let Some(secs) = parse_var::<f64>(name)? {
        *field = secs::from_f64(secs)
            .ok_or_else(|| Error::Config(format!("invalid {name}: {secs} is not a duration")))?;
    }
    Ok(())
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

/// Durations written as (fractional) seconds.
mod secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer};

    pub fn from_f64(secs: f64) -> Option<Duration> {
        Duration::try_from_secs_f64(secs).ok()
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = f64::deserialize(deserializer)?;
        from_f64(secs).ok_or_else(|| {
            serde::de::Error::custom(format!("{secs} is not a valid duration in seconds"))
        })
    }
}
