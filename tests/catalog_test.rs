//! Dry-run catalog platform and the platform registry.

use std::io::Write;

use feedshaper::adapter::{
    CatalogPlatform, ContentSource, Heartbeat, HeartbeatKind, PlatformRegistry, PlaybackChannel,
};
use feedshaper::config::Config;
use feedshaper::error::Error;
use feedshaper::model::{ContentItem, SourceKind};

fn catalog() -> CatalogPlatform {
    CatalogPlatform::new(vec![
        ContentItem::new("a", "Cat Rescue").duration(60.0),
        ContentItem::new("b", "Boat tour").duration(90.0),
        ContentItem::new("c", "Untitled").tags(["cat"]),
        ContentItem::new("d", "Short cat").source(SourceKind::Shorts),
    ])
}

#[tokio::test]
async fn discover_rotates_pages_per_kind() {
    let platform = catalog().with_page_size(2);

    let first = platform.discover(SourceKind::Discovery).await.unwrap();
    let second = platform.discover(SourceKind::Discovery).await.unwrap();
    let ids = |items: &[ContentItem]| items.iter().map(|i| i.id.clone()).collect::<Vec<_>>();
    assert_eq!(ids(&first), vec!["a", "b"]);
    assert_eq!(ids(&second), vec!["c", "a"]);

    let shorts = platform.discover(SourceKind::Shorts).await.unwrap();
    assert_eq!(ids(&shorts), vec!["d"]);
    assert!(shorts.iter().all(|i| i.source == SourceKind::Shorts));

    assert!(platform.discover(SourceKind::Related).await.unwrap().is_empty());
}

#[tokio::test]
async fn search_ranks_hits_first_and_pads() {
    let platform = catalog();
    let results = platform.search("cat", 4).await.unwrap();
    let ids: Vec<&str> = results.iter().map(|i| i.id.as_str()).collect();
    assert_eq!(ids, vec!["a", "c", "d", "b"]);
    assert!(results.iter().all(|i| i.source == SourceKind::Search));

    assert_eq!(platform.search("cat", 1).await.unwrap().len(), 1);
}

#[tokio::test]
async fn resolve_needs_a_duration() {
    let platform = catalog();
    let target = platform
        .resolve(&ContentItem::new("a", "Cat Rescue"))
        .await
        .unwrap();
    assert_eq!(target.duration_secs, 60.0);

    assert!(platform.resolve(&ContentItem::new("c", "Untitled")).await.is_err());
}

#[tokio::test]
async fn playback_calls_are_counted() {
    let platform = catalog();
    let item = ContentItem::new("a", "Cat Rescue");
    let target = platform.resolve(&item).await.unwrap();

    platform.report_playback_start(&item).await.unwrap();
    for step in 1..=3 {
        let beat = Heartbeat {
            step,
            position_secs: f64::from(step) * 15.0,
            kind: HeartbeatKind::Progress,
        };
        platform.heartbeat(&target, &beat).await.unwrap();
    }
    platform.report_progress(&target, 45.0).await.unwrap();

    let counters = platform.counters();
    assert_eq!(counters.starts, 1);
    assert_eq!(counters.heartbeats, 3);
    assert_eq!(counters.progress_reports, 1);
}

#[test]
fn registry_builds_catalog_from_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(
        file,
        r#"[{{"id": "a", "title": "Cat Rescue", "duration_secs": 60}}]"#
    )
    .unwrap();

    let mut config = Config::default();
    config.catalog_path = Some(file.path().to_path_buf());

    let platform = PlatformRegistry::builtin().build(&config).unwrap();
    assert_eq!(platform.name, "catalog");
}

#[test]
fn registry_rejects_unknown_platform() {
    let mut config = Config::default();
    config.platform = "myspace".into();
    let Err(Error::Config(message)) = PlatformRegistry::builtin().build(&config) else {
        panic!("expected a config error");
    };
    assert!(message.contains("catalog"));
    assert!(message.contains("http"));
}

#[test]
fn catalog_requires_path() {
    let config = Config::default();
    assert!(matches!(
        PlatformRegistry::builtin().build(&config),
        Err(Error::Config(_))
    ));
}

#[test]
fn http_platform_builds_with_url() {
    let mut config = Config::default();
    config.platform = "HTTP".into();
    config.platform_url = Some("http://127.0.0.1:9/api".into());
    let platform = PlatformRegistry::builtin().build(&config).unwrap();
    assert_eq!(platform.name, "http");
}
