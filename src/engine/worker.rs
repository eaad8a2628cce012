//! Engagement workers: pop tasks, simulate playback, record sessions.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use chrono::Utc;
use opentelemetry::KeyValue;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, error, info, warn};
use uuid::Uuid;

use super::queue::SessionQueue;
use crate::adapter::Platform;
use crate::config::Config;
use crate::error::Result;
use crate::history::HistoryStore;
use crate::model::{EngagementTask, SessionOutcome, SessionRecord, TaskId};
use crate::playback::{PlaybackOutcome, PlaybackSimulator};
use crate::telemetry::metrics;
use crate::telemetry::session::{record_state_transition, start_session_span};

/// Configuration for pool workers.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Recheck interval while the queue is empty.
    pub idle_poll: Duration,
    /// Worker `n` starts `n × stagger` after the pool.
    pub stagger: Duration,
    /// Failed sessions that ran shorter than this leave no record.
    pub failure_record_threshold: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            idle_poll: Duration::from_secs(1),
            stagger: Duration::from_secs(2),
            failure_record_threshold: Duration::from_secs(5),
        }
    }
}

impl From<&Config> for WorkerConfig {
    fn from(config: &Config) -> Self {
        Self {
            idle_poll: config.idle_poll,
            stagger: config.worker_stagger,
            failure_record_threshold: config.failure_record_threshold,
        }
    }
}

/// Everything a worker needs, shared by the whole pool.
#[derive(Clone)]
pub struct WorkerContext {
    /// Engine run the produced records belong to.
    pub session_id: Uuid,
    pub platform: Platform,
    pub queue: Arc<SessionQueue>,
    pub history: Arc<dyn HistoryStore>,
    pub simulator: Arc<PlaybackSimulator>,
    pub config: WorkerConfig,
}

/// Observable state of one pool slot.
#[derive(Debug)]
pub struct WorkerHandle {
    pub id: usize,
    busy: AtomicBool,
    current: Mutex<Option<TaskId>>,
}

impl WorkerHandle {
    fn new(id: usize) -> Self {
        Self {
            id,
            busy: AtomicBool::new(false),
            current: Mutex::new(None),
        }
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    pub fn current_task(&self) -> Option<TaskId> {
        *self.current.lock()
    }

    fn claim(&self, task: TaskId) {
        *self.current.lock() = Some(task);
        self.busy.store(true, Ordering::Release);
    }

    fn release(&self) {
        self.busy.store(false, Ordering::Release);
        *self.current.lock() = None;
    }
}

/// How a single task ended.
#[derive(Debug, Clone)]
pub enum TaskOutcome {
    /// Item already in history; nothing was sent.
    Skipped,
    Completed(SessionRecord),
    /// Playback aborted. `recorded` is false when it ended too quickly to
    /// be worth a record.
    Failed { error: String, recorded: bool },
}

/// Task outcome counts across the pool.
#[derive(Debug, Default)]
struct PoolCounters {
    completed: AtomicUsize,
    failed: AtomicUsize,
    skipped: AtomicUsize,
}

impl PoolCounters {
    fn count(&self, outcome: &TaskOutcome) {
        let counter = match outcome {
            TaskOutcome::Skipped => &self.skipped,
            TaskOutcome::Completed(_) => &self.completed,
            TaskOutcome::Failed { .. } => &self.failed,
        };
        counter.fetch_add(1, Ordering::AcqRel);
    }
}

/// Snapshot of [`WorkerPool`] outcome counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    pub completed: usize,
    pub failed: usize,
    pub skipped: usize,
}

/// Fixed-size set of independent worker loops.
pub struct WorkerPool {
    handles: Vec<Arc<WorkerHandle>>,
    tasks: Vec<JoinHandle<()>>,
    active: Arc<AtomicUsize>,
    counters: Arc<PoolCounters>,
}

impl WorkerPool {
    /// Start `size` workers. They run until `shutdown` is cancelled, always
    /// finishing the task in hand first.
    pub fn spawn(size: usize, ctx: WorkerContext, shutdown: CancellationToken) -> Self {
        let ctx = Arc::new(ctx);
        let active = Arc::new(AtomicUsize::new(0));
        let counters = Arc::new(PoolCounters::default());
        let mut handles = Vec::with_capacity(size);
        let mut tasks = Vec::with_capacity(size);

        for id in 0..size {
            let handle = Arc::new(WorkerHandle::new(id));
            let worker = Worker {
                handle: Arc::clone(&handle),
                ctx: Arc::clone(&ctx),
                active: Arc::clone(&active),
                counters: Arc::clone(&counters),
            };
            tasks.push(tokio::spawn(worker.run(shutdown.clone())));
            handles.push(handle);
        }

        Self {
            handles,
            tasks,
            active,
            counters,
        }
    }

    pub fn size(&self) -> usize {
        self.handles.len()
    }

    /// Workers currently running a playback.
    pub fn active_count(&self) -> usize {
        self.active.load(Ordering::Acquire)
    }

    pub fn handles(&self) -> &[Arc<WorkerHandle>] {
        &self.handles
    }

    pub fn stats(&self) -> PoolStats {
        PoolStats {
            completed: self.counters.completed.load(Ordering::Acquire),
            failed: self.counters.failed.load(Ordering::Acquire),
            skipped: self.counters.skipped.load(Ordering::Acquire),
        }
    }

    /// Wait up to `timeout` for every worker to exit, then abort the rest.
    /// Returns how many were aborted.
    pub async fn drain(&mut self, timeout: Duration) -> usize {
        let joined = tokio::time::timeout(timeout, async {
            for task in self.tasks.iter_mut() {
                if let Err(e) = task.await {
                    warn!("worker exited abnormally: {e}");
                }
            }
        })
        .await;

        if joined.is_ok() {
            return 0;
        }

        let mut aborted = 0;
        for task in &self.tasks {
            if !task.is_finished() {
                task.abort();
                aborted += 1;
            }
        }
        warn!(aborted, "drain timeout reached, aborting busy workers");
        aborted
    }
}

struct Worker {
    handle: Arc<WorkerHandle>,
    ctx: Arc<WorkerContext>,
    active: Arc<AtomicUsize>,
    counters: Arc<PoolCounters>,
}

impl Worker {
    async fn run(self, shutdown: CancellationToken) {
        let id = self.handle.id;
        let delay = self.ctx.config.stagger.saturating_mul(id as u32);
        if !delay.is_zero() {
            tokio::select! {
                _ = shutdown.cancelled() => return,
                _ = tokio::time::sleep(delay) => {}
            }
        }
        info!(worker = id, "worker started");

        while !shutdown.is_cancelled() {
            let Some(task) = self.ctx.queue.pop() else {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = self.ctx.queue.notified() => {}
                    _ = tokio::time::sleep(self.ctx.config.idle_poll) => {}
                }
                continue;
            };
            let outcome = self.execute(task).await;
            self.counters.count(&outcome);
        }

        info!(worker = id, "worker stopped");
    }

    async fn execute(&self, mut task: EngagementTask) -> TaskOutcome {
        let ctx = &self.ctx;

        match ctx.history.has_watched(&task.item.id).await {
            Ok(false) => {}
            Ok(true) => {
                if let Err(e) = task.skip() {
                    warn!(task_id = %task.id, "{e}");
                }
                ctx.queue.settle(&task.item.id, false);
                metrics::sessions_skipped().add(1, &[]);
                debug!(worker = self.handle.id, item_id = %task.item.id, "already watched, skipping");
                return TaskOutcome::Skipped;
            }
            Err(e) => {
                // Without a reliable de-dup answer the item is dropped
                // rather than risk a second watch.
                error!(item_id = %task.item.id, "history lookup failed, dropping task: {e}");
                ctx.queue.settle(&task.item.id, true);
                return TaskOutcome::Failed {
                    error: e.to_string(),
                    recorded: false,
                };
            }
        }

        let span = start_session_span(&ctx.platform.name, &task.id, self.handle.id);
        self.handle.claim(task.id);
        self.active.fetch_add(1, Ordering::AcqRel);

        let outcome = async {
            if let Err(e) = task.activate(self.handle.id) {
                ctx.queue.settle(&task.item.id, true);
                return TaskOutcome::Failed {
                    error: e.to_string(),
                    recorded: false,
                };
            }
            record_state_transition(&span, "pending", "active");
            info!(
                item_id = %task.item.id,
                title = %task.item.title,
                keywords = ?task.matched_keywords,
                "engagement started"
            );

            let started = Instant::now();
            let result = self.play(&task).await;
            let elapsed = started.elapsed();

            let success = result.is_ok();
            if let Err(e) = task.finish(success, elapsed) {
                warn!(task_id = %task.id, "{e}");
            }
            record_state_transition(&span, "active", &task.status.to_string());

            match result {
                Ok(playback) => {
                    let record = self.session_record(&task, &playback, elapsed);
                    metrics::reported_duration_secs().record(playback.reported_secs, &[]);
                    let stored = self.store(record.clone()).await;
                    ctx.queue.settle(&task.item.id, !stored);
                    TaskOutcome::Completed(record)
                }
                Err(e) => {
                    warn!(
                        item_id = %task.item.id,
                        elapsed_secs = elapsed.as_secs_f64(),
                        "engagement failed: {e}"
                    );
                    let recorded = elapsed >= ctx.config.failure_record_threshold;
                    let stored = recorded && self.store(self.failed_record(&task, elapsed)).await;
                    // Failures never retry; unrecorded ones stay known to the queue.
                    ctx.queue.settle(&task.item.id, !stored);
                    TaskOutcome::Failed {
                        error: e.to_string(),
                        recorded,
                    }
                }
            }
        }
        .instrument(span.clone())
        .await;

        self.active.fetch_sub(1, Ordering::AcqRel);
        self.handle.release();
        outcome
    }

    async fn play(&self, task: &EngagementTask) -> Result<PlaybackOutcome> {
        let ctx = &self.ctx;
        let timeout = ctx.simulator.config().call_timeout;
        match tokio::time::timeout(timeout, ctx.platform.source.report_playback_start(&task.item))
            .await
        {
            Ok(result) => result?,
            Err(_) => {
                return Err(crate::adapter::AdapterError::Timeout {
                    operation: "report_playback_start",
                    secs: timeout.as_secs_f64(),
                }
                .into());
            }
        }
        ctx.simulator.simulate(&task.item).await
    }

    fn session_record(
        &self,
        task: &EngagementTask,
        playback: &PlaybackOutcome,
        elapsed: Duration,
    ) -> SessionRecord {
        SessionRecord {
            timestamp: Utc::now(),
            item: task.item.clone(),
            reported_duration_secs: playback.reported_secs,
            real_elapsed_secs: elapsed.as_secs_f64(),
            keywords: task.matched_keywords.clone(),
            source: task.item.source,
            session_id: self.ctx.session_id,
            simulated: true,
            speed_factor: self.ctx.simulator.config().speed_factor,
            outcome: SessionOutcome::Completed,
        }
    }

    fn failed_record(&self, task: &EngagementTask, elapsed: Duration) -> SessionRecord {
        SessionRecord {
            reported_duration_secs: 0.0,
            outcome: SessionOutcome::Failed,
            ..self.session_record(
                task,
                &PlaybackOutcome {
                    reported_secs: 0.0,
                    heartbeats: 0,
                    pauses: 0,
                    seeks: 0,
                },
                elapsed,
            )
        }
    }

    /// Persist `record`. Returns whether history now holds it.
    async fn store(&self, record: SessionRecord) -> bool {
        let outcome = match record.outcome {
            SessionOutcome::Completed => "completed",
            SessionOutcome::Failed => "failed",
        };
        let item_id = record.item.id.clone();
        match self.ctx.history.record_session(record).await {
            Ok(()) => {
                metrics::sessions_recorded().add(1, &[KeyValue::new("outcome", outcome)]);
                true
            }
            Err(e) => {
                error!(item_id = %item_id, "failed to record session: {e}");
                false
            }
        }
    }
}
