//! History stores: de-dup, stats, persistence.

mod common;

use std::sync::Arc;

use common::{item, record};
use feedshaper::history::{
    HistoryStore, JsonlHistory, MemoryHistory, RECORDS_FILE, STATS_FILE,
};
use feedshaper::model::{AggregateStats, SessionOutcome, SourceKind};
use uuid::Uuid;

#[tokio::test]
async fn memory_history_marks_watched() {
    let history = MemoryHistory::new();
    assert!(!history.has_watched("v1").await.unwrap());

    history
        .record_session(record(item("v1", "cat"), &["cat"], Uuid::new_v4()))
        .await
        .unwrap();
    assert!(history.has_watched("v1").await.unwrap());
    assert!(!history.has_watched("v2").await.unwrap());
    assert_eq!(history.records().len(), 1);
}

#[tokio::test]
async fn aggregate_counts_by_dimension() {
    let history = MemoryHistory::new();
    let session = Uuid::new_v4();

    let mut failed = record(
        item("v2", "dog").author("bob").source(SourceKind::Search),
        &["dog"],
        session,
    );
    failed.outcome = SessionOutcome::Failed;
    failed.reported_duration_secs = 0.0;

    history
        .record_session(record(item("v1", "cat").author("alice"), &["cat"], session))
        .await
        .unwrap();
    history.record_session(failed).await.unwrap();

    let stats = history.aggregate_stats().await;
    assert_eq!(stats.total_sessions, 2);
    assert_eq!(stats.completed, 1);
    assert_eq!(stats.failed, 1);
    assert_eq!(stats.total_reported_secs, 30.0);
    assert_eq!(stats.keyword_count("cat"), 1);
    assert_eq!(stats.keyword_count("dog"), 1);
    assert_eq!(stats.keyword_count("eel"), 0);
    assert_eq!(stats.by_author.get("alice"), Some(&1));
    assert_eq!(stats.by_source.get("search"), Some(&1));
    assert_eq!(stats.by_day.values().sum::<u64>(), 2);

    let run = history.session_stats(session).await;
    assert_eq!(run.sessions, 2);
    assert_eq!(run.failed, 1);
    assert!(run.first_at.is_some());

    let other = history.session_stats(Uuid::new_v4()).await;
    assert_eq!(other.sessions, 0);
}

#[tokio::test]
async fn jsonl_history_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let session = Uuid::new_v4();

    {
        let history = JsonlHistory::open(dir.path()).await.unwrap();
        history
            .record_session(record(item("v1", "cat"), &["cat"], session))
            .await
            .unwrap();
        history
            .record_session(record(item("v2", "cat"), &["cat"], session))
            .await
            .unwrap();
    }

    let reopened = JsonlHistory::open(dir.path()).await.unwrap();
    assert!(reopened.has_watched("v1").await.unwrap());
    assert!(reopened.has_watched("v2").await.unwrap());
    assert_eq!(reopened.aggregate_stats().await.total_sessions, 2);
    assert_eq!(reopened.session_ids(), vec![session]);

    let content = std::fs::read_to_string(reopened.records_path()).unwrap();
    assert_eq!(content.lines().count(), 2);

    let stats: AggregateStats =
        serde_json::from_str(&std::fs::read_to_string(dir.path().join(STATS_FILE)).unwrap())
            .unwrap();
    assert_eq!(stats.total_sessions, 2);
}

#[tokio::test]
async fn jsonl_history_skips_corrupt_lines() {
    let dir = tempfile::tempdir().unwrap();
    let good = serde_json::to_string(&record(item("v1", "cat"), &["cat"], Uuid::new_v4())).unwrap();
    std::fs::write(
        dir.path().join(RECORDS_FILE),
        format!("{good}\nnot json at all\n\n"),
    )
    .unwrap();

    let history = JsonlHistory::open(dir.path()).await.unwrap();
    assert!(history.has_watched("v1").await.unwrap());
    assert_eq!(history.aggregate_stats().await.total_sessions, 1);
}

#[tokio::test]
async fn concurrent_records_are_all_kept() {
    let dir = tempfile::tempdir().unwrap();
    let history = Arc::new(JsonlHistory::open(dir.path()).await.unwrap());
    let session = Uuid::new_v4();

    let mut handles = Vec::new();
    for i in 0..20 {
        let history = Arc::clone(&history);
        handles.push(tokio::spawn(async move {
            history
                .record_session(record(item(&format!("v{i}"), "cat"), &["cat"], session))
                .await
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    assert_eq!(history.aggregate_stats().await.total_sessions, 20);
    assert_eq!(history.session_stats(session).await.sessions, 20);

    let content = std::fs::read_to_string(history.records_path()).unwrap();
    assert_eq!(content.lines().count(), 20);
    for line in content.lines() {
        serde_json::from_str::<serde_json::Value>(line).unwrap();
    }
}
