//! Feeding loop: discovery cadence, queue admission, active search fallback.

use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use opentelemetry::KeyValue;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::queue::SessionQueue;
use crate::adapter::{AdapterError, AdapterResult, ContentSource};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::history::HistoryStore;
use crate::jitter::Jitter;
use crate::matcher::KeywordMatcher;
use crate::model::{AggregateStats, ContentItem, EngagementTask, SourceKind};
use crate::telemetry::metrics;

/// How active search picks its keyword.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchStrategy {
    #[default]
    Random,
    RoundRobin,
    /// Favors keywords with fewer recorded sessions.
    Weighted,
}

impl SearchStrategy {
    fn label(self) -> &'static str {
        match self {
            SearchStrategy::Random => "random",
            SearchStrategy::RoundRobin => "round_robin",
            SearchStrategy::Weighted => "weighted",
        }
    }
}

impl std::str::FromStr for SearchStrategy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "random" => Ok(SearchStrategy::Random),
            "round_robin" | "roundrobin" => Ok(SearchStrategy::RoundRobin),
            "weighted" => Ok(SearchStrategy::Weighted),
            other => Err(format!("unknown search strategy: {other}")),
        }
    }
}

/// Configuration for the feeding loop.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub source_kind: SourceKind,
    pub poll_interval: Duration,
    pub admission_cap: usize,
    /// Sleep after an unexpected cycle error.
    pub error_backoff: Duration,
    pub call_timeout: Duration,
    pub active_search: bool,
    pub search_threshold: u32,
    pub search_strategy: SearchStrategy,
    pub search_limit: usize,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            source_kind: SourceKind::Discovery,
            poll_interval: Duration::from_secs(60),
            admission_cap: 5,
            error_backoff: Duration::from_secs(120),
            call_timeout: Duration::from_secs(20),
            active_search: true,
            search_threshold: 3,
            search_strategy: SearchStrategy::Random,
            search_limit: 10,
        }
    }
}

impl From<&Config> for OrchestratorConfig {
    fn from(config: &Config) -> Self {
        Self {
            source_kind: config.source_kind,
            poll_interval: config.poll_interval,
            admission_cap: config.admission_cap,
            error_backoff: config.error_backoff,
            call_timeout: config.call_timeout,
            active_search: config.active_search,
            search_threshold: config.search_threshold,
            search_strategy: config.search_strategy,
            search_limit: config.search_limit,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Phase {
    #[default]
    Discovering,
    Queuing,
    Waiting,
    ActiveSearching,
}

/// Loop state carried from cycle to cycle.
#[derive(Debug, Clone, Default)]
pub struct FeedState {
    pub phase: Phase,
    /// Cycles in a row that admitted nothing.
    pub consecutive_misses: u32,
    pub round_robin_index: usize,
    pub cycles: u64,
    pub admitted_total: u64,
}

/// What one discovery cycle did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleReport {
    /// Queue full, admission skipped.
    Backpressure,
    DiscoveryFailed,
    Admitted {
        candidates: usize,
        matched: usize,
        admitted: usize,
    },
    /// Nothing admitted; `search` is set when an active search ran.
    Missed {
        candidates: usize,
        matched: usize,
        search: Option<SearchReport>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchReport {
    /// `nudged` when nothing matched and the top result was queued anyway.
    Admitted {
        keyword: String,
        admitted: usize,
        nudged: bool,
    },
    /// Search succeeded but nothing was admittable.
    Empty { keyword: String },
    Failed { keyword: String },
}

/// Drives discovery and admission. Owns no mutable state itself: the loop
/// state lives in a [`FeedState`] passed through every cycle.
pub struct Orchestrator {
    config: OrchestratorConfig,
    source: Arc<dyn ContentSource>,
    queue: Arc<SessionQueue>,
    history: Arc<dyn HistoryStore>,
    matcher: KeywordMatcher,
    jitter: Arc<dyn Jitter>,
}

impl Orchestrator {
    pub fn new(
        config: OrchestratorConfig,
        source: Arc<dyn ContentSource>,
        queue: Arc<SessionQueue>,
        history: Arc<dyn HistoryStore>,
        matcher: KeywordMatcher,
        jitter: Arc<dyn Jitter>,
    ) -> Self {
        Self {
            config,
            source,
            queue,
            history,
            matcher,
            jitter,
        }
    }

    /// Run cycles until `shutdown` is cancelled. Errors never end the loop.
    pub async fn run(&self, shutdown: CancellationToken) -> FeedState {
        let mut state = FeedState::default();
        info!(
            source = %self.config.source_kind,
            keywords = ?self.matcher.keywords(),
            "orchestrator started"
        );

        loop {
            let result = tokio::select! {
                _ = shutdown.cancelled() => break,
                result = self.run_cycle(&mut state) => result,
            };

            let pause = match result {
                Ok(report) => {
                    debug!(
                        cycle = state.cycles,
                        ?report,
                        misses = state.consecutive_misses,
                        "cycle finished"
                    );
                    self.config.poll_interval
                }
                Err(e) => {
                    error!(
                        cycle = state.cycles,
                        backoff_secs = self.config.error_backoff.as_secs_f64(),
                        "cycle error, backing off: {e}"
                    );
                    self.config.error_backoff
                }
            };

            state.phase = Phase::Waiting;
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(pause) => {}
            }
        }

        info!(
            cycles = state.cycles,
            admitted = state.admitted_total,
            "orchestrator stopped"
        );
        state
    }

    /// One discovery cycle.
    pub async fn run_cycle(&self, state: &mut FeedState) -> Result<CycleReport> {
        state.cycles += 1;

        if self.queue.is_full() {
            state.phase = Phase::Waiting;
            metrics::backpressure_skips().add(1, &[]);
            debug!(capacity = self.queue.capacity(), "queue full, skipping admission");
            return Ok(CycleReport::Backpressure);
        }

        state.phase = Phase::Discovering;
        let kind = self.config.source_kind;
        let candidates = match self.bounded("discover", self.source.discover(kind)).await {
            Ok(items) => items,
            Err(e) => {
                warn!(source = %kind, "discovery failed: {e}");
                metrics::discovery_failures().add(1, &[KeyValue::new("source", kind.to_string())]);
                return Ok(CycleReport::DiscoveryFailed);
            }
        };

        let total = candidates.len();
        let matched: Vec<(ContentItem, Vec<String>)> = candidates
            .into_iter()
            .filter_map(|item| {
                let keywords = self.matcher.matches(&item);
                (!keywords.is_empty()).then_some((item, keywords))
            })
            .collect();
        let matched_count = matched.len();

        state.phase = Phase::Queuing;
        let admitted = self.admit(matched, self.admission_room(), "match").await?;
        debug!(candidates = total, matched = matched_count, admitted, "discovery polled");

        if admitted > 0 {
            state.consecutive_misses = 0;
            state.admitted_total += admitted as u64;
            return Ok(CycleReport::Admitted {
                candidates: total,
                matched: matched_count,
                admitted,
            });
        }

        state.consecutive_misses += 1;
        let search = if self.config.active_search
            && state.consecutive_misses >= self.config.search_threshold
        {
            Some(self.active_search(state).await?)
        } else {
            None
        };

        Ok(CycleReport::Missed {
            candidates: total,
            matched: matched_count,
            search,
        })
    }

    /// Search directly for a keyword after repeated misses.
    ///
    /// Admits matching results, or failing that the single top result
    /// tagged with the search keyword. Success clears the miss counter,
    /// failure halves it.
    pub async fn active_search(&self, state: &mut FeedState) -> Result<SearchReport> {
        state.phase = Phase::ActiveSearching;
        let strategy = self.config.search_strategy;

        let stats = match strategy {
            SearchStrategy::Weighted => self.history.aggregate_stats().await,
            _ => AggregateStats::default(),
        };
        let keyword = self.pick_keyword(state, &stats)?;
        info!(
            keyword = %keyword,
            strategy = strategy.label(),
            misses = state.consecutive_misses,
            "active search"
        );

        let results = match self
            .bounded("search", self.source.search(&keyword, self.config.search_limit))
            .await
        {
            Ok(results) => results,
            Err(e) => {
                warn!(keyword = %keyword, "active search failed: {e}");
                state.consecutive_misses /= 2;
                self.count_search(strategy, "error");
                return Ok(SearchReport::Failed { keyword });
            }
        };

        let results: Vec<ContentItem> = results
            .into_iter()
            .map(|item| item.source(SourceKind::Search))
            .collect();

        let matching: Vec<(ContentItem, Vec<String>)> = results
            .iter()
            .filter_map(|item| {
                let keywords = self.matcher.matches(item);
                (!keywords.is_empty()).then(|| (item.clone(), keywords))
            })
            .collect();

        let mut nudged = false;
        let mut admitted = self.admit(matching, self.admission_room(), "match").await?;
        if admitted == 0 {
            let nudge = results
                .into_iter()
                .map(|item| (item, vec![keyword.clone()]))
                .collect();
            admitted = self.admit(nudge, 1, "nudge").await?;
            nudged = admitted > 0;
        }

        if admitted > 0 {
            state.consecutive_misses = 0;
            state.admitted_total += admitted as u64;
            self.count_search(strategy, "admitted");
            Ok(SearchReport::Admitted {
                keyword,
                admitted,
                nudged,
            })
        } else {
            state.consecutive_misses /= 2;
            self.count_search(strategy, "empty");
            Ok(SearchReport::Empty { keyword })
        }
    }

    /// Choose the next search keyword according to the configured strategy.
    pub fn pick_keyword(&self, state: &mut FeedState, stats: &AggregateStats) -> Result<String> {
        let keywords = self.matcher.keywords();
        if keywords.is_empty() {
            return Err(Error::Config("no keywords configured for active search".into()));
        }

        let index = match self.config.search_strategy {
            SearchStrategy::Random => self.jitter.index(keywords.len()),
            SearchStrategy::RoundRobin => {
                let index = state.round_robin_index % keywords.len();
                state.round_robin_index = (index + 1) % keywords.len();
                index
            }
            SearchStrategy::Weighted => {
                let weights: Vec<f64> = keywords
                    .iter()
                    .map(|k| 1.0 / (1.0 + stats.keyword_count(k) as f64))
                    .collect();
                let total: f64 = weights.iter().sum();
                weighted_index(&weights, self.jitter.uniform(0.0, total))
            }
        };
        Ok(keywords[index].clone())
    }

    /// Slots this cycle may fill: the per-cycle cap, bounded by free space.
    fn admission_room(&self) -> usize {
        self.config.admission_cap.min(self.queue.remaining())
    }

    /// Queue up to `limit` candidates, skipping anything already watched,
    /// already queued or repeated within the batch. Candidates past the
    /// limit are dropped, not carried over.
    async fn admit(
        &self,
        candidates: Vec<(ContentItem, Vec<String>)>,
        limit: usize,
        reason: &'static str,
    ) -> Result<usize> {
        let mut admitted = 0;
        let mut seen = HashSet::new();

        for (item, keywords) in candidates {
            if admitted >= limit {
                break;
            }
            if !seen.insert(item.id.clone()) || self.queue.contains(&item.id) {
                continue;
            }
            if self.history.has_watched(&item.id).await? {
                debug!(item_id = %item.id, "already watched");
                continue;
            }

            let source = item.source;
            let (item_id, title) = (item.id.clone(), item.title.clone());
            if !self.queue.try_push(EngagementTask::new(item, keywords.clone())) {
                break;
            }
            admitted += 1;
            metrics::tasks_admitted().add(
                1,
                &[
                    KeyValue::new("source", source.to_string()),
                    KeyValue::new("reason", reason),
                ],
            );
            info!(item_id = %item_id, title = %title, keywords = ?keywords, reason, "admitted");
        }

        Ok(admitted)
    }

    async fn bounded<T>(
        &self,
        operation: &'static str,
        call: impl Future<Output = AdapterResult<T>>,
    ) -> Result<T> {
        match tokio::time::timeout(self.config.call_timeout, call).await {
            Ok(result) => Ok(result?),
            Err(_) => Err(AdapterError::Timeout {
                operation,
                secs: self.config.call_timeout.as_secs_f64(),
            }
            .into()),
        }
    }

    fn count_search(&self, strategy: SearchStrategy, result: &'static str) {
        metrics::active_searches().add(
            1,
            &[
                KeyValue::new("strategy", strategy.label()),
                KeyValue::new("result", result),
            ],
        );
    }
}

/// Index whose cumulative weight first exceeds `point`. Points at or past
/// the total select the last index.
pub fn weighted_index(weights: &[f64], point: f64) -> usize {
    let mut cumulative = 0.0;
    for (index, weight) in weights.iter().enumerate() {
        cumulative += weight;
        if point < cumulative {
            return index;
        }
    }
    weights.len().saturating_sub(1)
}
