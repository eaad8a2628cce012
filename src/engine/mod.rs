//! Engagement engine: feeding loop, session queue, worker pool.

pub mod orchestrator;
pub mod queue;
pub mod worker;

pub use orchestrator::{
    CycleReport, FeedState, Orchestrator, OrchestratorConfig, Phase, SearchReport,
    SearchStrategy,
};
pub use queue::SessionQueue;
pub use worker::{
    PoolStats, TaskOutcome, WorkerConfig, WorkerContext, WorkerHandle, WorkerPool,
};

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

use crate::adapter::Platform;
use crate::config::Config;
use crate::history::HistoryStore;
use crate::jitter::Jitter;
use crate::model::SessionStats;
use crate::playback::{PlaybackConfig, PlaybackSimulator};

/// Summary of one engine run, returned after shutdown.
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub session_id: Uuid,
    pub cycles: u64,
    pub admitted: u64,
    pub pool: PoolStats,
    /// Workers still busy when the drain timeout ran out.
    pub aborted_workers: usize,
    /// Tasks left in the queue at shutdown, never started.
    pub discarded: usize,
    pub stats: SessionStats,
}

/// One orchestrator plus a fixed worker pool over a shared session queue.
#[derive(Clone)]
pub struct FeedEngine {
    session_id: Uuid,
    orchestrator: Arc<Orchestrator>,
    worker_ctx: WorkerContext,
    workers: usize,
    drain_timeout: Duration,
    shutdown: CancellationToken,
}

impl FeedEngine {
    pub fn new(
        config: &Config,
        platform: Platform,
        history: Arc<dyn HistoryStore>,
        jitter: Arc<dyn Jitter>,
    ) -> Self {
        let session_id = Uuid::new_v4();
        let queue = Arc::new(SessionQueue::new(config.queue_capacity));

        let orchestrator = Orchestrator::new(
            OrchestratorConfig::from(config),
            Arc::clone(&platform.source),
            Arc::clone(&queue),
            Arc::clone(&history),
            config.matcher(),
            Arc::clone(&jitter),
        );

        let simulator = PlaybackSimulator::new(
            Arc::clone(&platform.playback),
            jitter,
            PlaybackConfig::from(config),
        );

        let worker_ctx = WorkerContext {
            session_id,
            platform,
            queue,
            history,
            simulator: Arc::new(simulator),
            config: WorkerConfig::from(config),
        };

        Self {
            session_id,
            orchestrator: Arc::new(orchestrator),
            worker_ctx,
            workers: config.workers,
            drain_timeout: config.drain_timeout,
            shutdown: CancellationToken::new(),
        }
    }

    /// Identifier stamped on every record this engine produces.
    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    pub fn queue(&self) -> &Arc<SessionQueue> {
        &self.worker_ctx.queue
    }

    /// Stop admitting, let busy workers finish, then return from [`run`](Self::run).
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    /// Run until [`shutdown`](Self::shutdown) is called.
    pub async fn run(&self) -> RunSummary {
        info!(
            session_id = %self.session_id,
            platform = %self.worker_ctx.platform.name,
            workers = self.workers,
            "engine started"
        );

        let mut pool = WorkerPool::spawn(
            self.workers,
            self.worker_ctx.clone(),
            self.shutdown.clone(),
        );
        let state = self.orchestrator.run(self.shutdown.clone()).await;

        let aborted_workers = pool.drain(self.drain_timeout).await;
        let pool_stats = pool.stats();

        let discarded = self.worker_ctx.queue.drain().len();
        if discarded > 0 {
            warn!(discarded, "discarding queued tasks at shutdown");
        }

        let stats = self.worker_ctx.history.session_stats(self.session_id).await;
        info!(
            session_id = %self.session_id,
            sessions = stats.sessions,
            completed = stats.completed,
            failed = stats.failed,
            "engine stopped"
        );

        RunSummary {
            session_id: self.session_id,
            cycles: state.cycles,
            admitted: state.admitted_total,
            pool: pool_stats,
            aborted_workers,
            discarded,
            stats,
        }
    }
}
