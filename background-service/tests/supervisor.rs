mod support;

use background_service::{MonitorState, Supervisor};
use std::time::Duration;
use subwatch_core::AppConfig;
use support::{post, Harness};
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

fn config(sources: &[&str], requests_per_minute: u32, poll_interval_secs: u64) -> AppConfig {
    AppConfig {
        sources: sources.iter().map(|s| s.to_string()).collect(),
        keywords: vec!["Goroutine".to_string()],
        requests_per_minute,
        poll_interval_secs,
        ..AppConfig::default()
    }
}

#[tokio::test(start_paused = true)]
async fn starts_one_monitor_per_source_and_drains_on_shutdown() {
    let h = Harness::new(&["Goroutine"]);
    h.forum
        .set_page("golang", vec![post("g1", "Goroutine leak", None, 0)]);
    h.forum.set_page(
        "programming",
        vec![post("p1", "Rust vs Go", None, 0), post("p2", "Goroutine cost", None, 0)],
    );

    let supervisor = Supervisor::start(&config(&["golang", "programming"], 6000, 30), h.deps.clone());
    assert_eq!(supervisor.monitor_count(), 2);

    sleep(Duration::from_secs(1)).await;
    assert!(supervisor
        .states()
        .iter()
        .all(|(_, state)| *state == MonitorState::Running));

    let mut reports = supervisor.shutdown().await;
    reports.sort_by(|a, b| a.source.cmp(&b.source));

    assert_eq!(reports.len(), 2);
    assert!(reports
        .iter()
        .all(|r| r.final_state == MonitorState::Stopped && r.cycles == 1));
    assert_eq!(reports[0].source, "golang");
    assert_eq!(reports[0].post_matches, 1);
    assert_eq!(reports[1].posts_seen, 2);
    assert_eq!(reports[1].post_matches, 1);
    assert_eq!(h.store.len().await, 3);
}

#[tokio::test(start_paused = true)]
async fn rate_budget_is_shared_by_all_monitors() {
    let h = Harness::new(&["Goroutine"]);
    // One grant per second across three sources with empty pages.
    let supervisor = Supervisor::start(&config(&["a", "b", "c"], 60, 3600), h.deps.clone());

    sleep(Duration::from_millis(1500)).await;
    assert_eq!(h.forum.list_calls(), 2);

    sleep(Duration::from_secs(1)).await;
    assert_eq!(h.forum.list_calls(), 3);

    let reports = supervisor.shutdown().await;
    assert_eq!(reports.iter().map(|r| r.cycles).sum::<u64>(), 3);
}

#[tokio::test(start_paused = true)]
async fn parent_token_cancellation_stops_every_monitor() {
    let h = Harness::new(&["Goroutine"]);
    let parent = CancellationToken::new();
    let supervisor = Supervisor::start_with_token(
        &config(&["golang", "rust", "programming"], 6000, 30),
        h.deps.clone(),
        parent.child_token(),
    );

    sleep(Duration::from_secs(45)).await;
    parent.cancel();

    let reports = supervisor.join().await;
    assert_eq!(reports.len(), 3);
    assert!(reports.iter().all(|r| r.cycles == 2));
    assert!(reports
        .iter()
        .all(|r| r.final_state == MonitorState::Stopped));
}
