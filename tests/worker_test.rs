//! Worker pool: de-dup short-circuit, recording, failure handling, drain.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{FakePlayback, FakeSource, item, platform, record};
use feedshaper::engine::{SessionQueue, WorkerConfig, WorkerContext, WorkerPool};
use feedshaper::history::{HistoryStore, MemoryHistory};
use feedshaper::jitter::NoJitter;
use feedshaper::model::{EngagementTask, SessionOutcome};
use feedshaper::playback::{PlaybackConfig, PlaybackSimulator};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

struct Harness {
    source: FakeSource,
    playback: FakePlayback,
    history: Arc<MemoryHistory>,
    queue: Arc<SessionQueue>,
    ctx: WorkerContext,
}

fn harness(duration_secs: f64) -> Harness {
    let source = FakeSource::new();
    let playback = FakePlayback::new(duration_secs);
    let history = Arc::new(MemoryHistory::new());
    let queue = Arc::new(SessionQueue::new(20));
    let simulator = PlaybackSimulator::new(
        Arc::new(playback.clone()),
        Arc::new(NoJitter),
        PlaybackConfig::default(),
    );
    let ctx = WorkerContext {
        session_id: Uuid::new_v4(),
        platform: platform(&source, &playback),
        queue: Arc::clone(&queue),
        history: history.clone(),
        simulator: Arc::new(simulator),
        config: WorkerConfig::default(),
    };
    Harness {
        source,
        playback,
        history,
        queue,
        ctx,
    }
}

fn task(id: &str) -> EngagementTask {
    EngagementTask::new(item(id, "cat video"), vec!["cat".into()])
}

async fn wait_until(mut done: impl FnMut() -> bool) {
    for _ in 0..3600 {
        if done() {
            return;
        }
        tokio::time::sleep(Duration::from_secs(1)).await;
    }
    panic!("condition not reached within an hour of virtual time");
}

#[tokio::test(start_paused = true)]
async fn watched_items_short_circuit() {
    let h = harness(120.0);
    let earlier = Uuid::new_v4();
    for id in ["item-3", "item-7"] {
        h.history
            .record_session(record(item(id, "cat video"), &["cat"], earlier))
            .await
            .unwrap();
    }
    for i in 0..10 {
        assert!(h.queue.try_push(task(&format!("item-{i}"))));
    }

    let shutdown = CancellationToken::new();
    let mut pool = WorkerPool::spawn(3, h.ctx.clone(), shutdown.clone());
    assert_eq!(pool.size(), 3);

    let stats_done = {
        let pool_ref = &pool;
        move || pool_ref.stats().completed + pool_ref.stats().skipped == 10
    };
    wait_until(stats_done).await;

    let stats = pool.stats();
    assert_eq!(stats.completed, 8);
    assert_eq!(stats.skipped, 2);
    assert_eq!(stats.failed, 0);

    let run = h.history.session_stats(h.ctx.session_id).await;
    assert_eq!(run.sessions, 8);
    assert_eq!(run.completed, 8);

    let touched: Vec<String> = h.playback.beats().into_iter().map(|(id, _)| id).collect();
    assert!(!touched.iter().any(|id| id == "item-3" || id == "item-7"));
    assert!(!h.source.starts().iter().any(|id| id == "item-3" || id == "item-7"));
    assert_eq!(h.source.starts().len(), 8);

    shutdown.cancel();
    assert_eq!(pool.drain(Duration::from_secs(60)).await, 0);
}

#[tokio::test(start_paused = true)]
async fn completed_record_carries_session_details() {
    let h = harness(120.0);
    h.queue.try_push(task("v1"));

    let shutdown = CancellationToken::new();
    let mut pool = WorkerPool::spawn(1, h.ctx.clone(), shutdown.clone());
    let history = h.history.clone();
    wait_until(move || history.records().len() == 1).await;

    let record = &h.history.records()[0];
    assert_eq!(record.item.id, "v1");
    assert_eq!(record.keywords, vec!["cat"]);
    assert_eq!(record.session_id, h.ctx.session_id);
    assert_eq!(record.outcome, SessionOutcome::Completed);
    assert_eq!(record.reported_duration_secs, 30.0);
    assert!(record.real_elapsed_secs >= 30.0);
    assert!(record.simulated);
    assert!(h.history.has_watched("v1").await.unwrap());

    shutdown.cancel();
    pool.drain(Duration::from_secs(60)).await;
}

#[tokio::test(start_paused = true)]
async fn claimed_item_stays_known_while_playing() {
    let h = harness(120.0);
    h.queue.try_push(task("v1"));

    let shutdown = CancellationToken::new();
    let mut pool = WorkerPool::spawn(1, h.ctx.clone(), shutdown.clone());

    tokio::time::sleep(Duration::from_secs(5)).await;
    assert!(h.queue.is_empty());
    assert_eq!(h.queue.in_flight(), 1);
    assert!(h.queue.contains("v1"));
    assert!(!h.history.has_watched("v1").await.unwrap());

    let pool_ref = &pool;
    wait_until(|| pool_ref.stats().completed == 1).await;
    assert_eq!(h.queue.in_flight(), 0);
    assert!(!h.queue.contains("v1"));
    assert!(h.history.has_watched("v1").await.unwrap());

    shutdown.cancel();
    pool.drain(Duration::from_secs(60)).await;
}

#[tokio::test(start_paused = true)]
async fn failure_after_threshold_is_recorded() {
    let h = harness(120.0);
    h.playback.fail_heartbeat_at(1);
    h.queue.try_push(task("v1"));

    let shutdown = CancellationToken::new();
    let mut pool = WorkerPool::spawn(1, h.ctx.clone(), shutdown.clone());
    let history = h.history.clone();
    wait_until(move || history.records().len() == 1).await;

    let record = &h.history.records()[0];
    assert_eq!(record.outcome, SessionOutcome::Failed);
    assert_eq!(record.reported_duration_secs, 0.0);
    assert_eq!(pool.stats().failed, 1);

    shutdown.cancel();
    pool.drain(Duration::from_secs(60)).await;
}

#[tokio::test(start_paused = true)]
async fn quick_failure_leaves_no_record() {
    // Content shorter than the safety buffer fails before any wait.
    let h = harness(2.0);
    h.queue.try_push(task("v1"));

    let shutdown = CancellationToken::new();
    let mut pool = WorkerPool::spawn(1, h.ctx.clone(), shutdown.clone());
    let pool_ref = &pool;
    wait_until(|| pool_ref.stats().failed == 1).await;

    assert!(h.history.records().is_empty());
    assert!(!h.history.has_watched("v1").await.unwrap());
    assert_eq!(h.queue.in_flight(), 0);
    assert!(h.queue.contains("v1"));

    shutdown.cancel();
    pool.drain(Duration::from_secs(60)).await;
}

#[tokio::test(start_paused = true)]
async fn busy_worker_finishes_before_exit() {
    let h = harness(120.0);
    h.queue.try_push(task("v1"));

    let shutdown = CancellationToken::new();
    let mut pool = WorkerPool::spawn(1, h.ctx.clone(), shutdown.clone());
    let pool_ref = &pool;
    wait_until(|| pool_ref.active_count() == 1).await;
    assert!(pool.handles()[0].is_busy());
    assert!(pool.handles()[0].current_task().is_some());

    shutdown.cancel();
    assert_eq!(pool.drain(Duration::from_secs(120)).await, 0);
    assert_eq!(h.history.records().len(), 1);
    assert_eq!(pool.active_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn drain_timeout_aborts_busy_worker() {
    let h = harness(120.0);
    h.playback.set_hang(true);
    h.queue.try_push(task("v1"));

    let shutdown = CancellationToken::new();
    let mut pool = WorkerPool::spawn(1, h.ctx.clone(), shutdown.clone());
    let pool_ref = &pool;
    wait_until(|| pool_ref.active_count() == 1).await;

    shutdown.cancel();
    assert_eq!(pool.drain(Duration::from_secs(1)).await, 1);
    assert!(h.history.records().is_empty());
}

#[tokio::test(start_paused = true)]
async fn workers_start_staggered() {
    let h = harness(120.0);
    let shutdown = CancellationToken::new();
    let mut pool = WorkerPool::spawn(3, h.ctx.clone(), shutdown.clone());

    // Worker 2 starts after 4s; queue work just before then.
    tokio::time::sleep(Duration::from_millis(3500)).await;
    for id in ["a", "b", "c"] {
        h.queue.try_push(task(id));
    }
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(pool.active_count(), 2);

    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(pool.active_count(), 3);

    shutdown.cancel();
    pool.drain(Duration::from_secs(120)).await;
}
