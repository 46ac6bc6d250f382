use super::*;
use listing_watcher::core::SessionPhase;

#[tokio::test(start_paused = true)]
async fn test_backoff_doubles_between_attempts() {
    let dir = tempfile::tempdir().unwrap();
    let mut h = harness(dir.path(), HarnessOptions::default());
    h.browser.script("spongebob sketch", vec![Scripted::Fail("net::ERR_CONNECTION_RESET")]);

    let notified = h.orchestrator.run_cycle(&[sketch_target()]).await.unwrap();
    assert_eq!(notified, 0);

    let state = h.browser.state();
    let instants: Vec<_> = state.renders.iter().map(|(_, at)| *at).collect();
    assert_eq!(instants.len(), 4);
    let gaps: Vec<_> = instants.windows(2).map(|pair| pair[1] - pair[0]).collect();
    assert_eq!(
        gaps,
        vec![Duration::from_secs(10), Duration::from_secs(20), Duration::from_secs(40)]
    );
}

#[tokio::test(start_paused = true)]
async fn test_each_retry_uses_a_fresh_session() {
    let dir = tempfile::tempdir().unwrap();
    let mut h = harness(dir.path(), HarnessOptions::default());
    h.browser.script("spongebob sketch", vec![Scripted::Fail("Target closed")]);

    h.orchestrator.run_cycle(&[sketch_target()]).await.unwrap();

    let state = h.browser.state();
    assert_eq!(state.launches.len(), 4);
    let pids: Vec<&String> = state.events.iter().filter(|e| e.starts_with("render:")).collect();
    let mut unique = pids.clone();
    unique.dedup();
    assert_eq!(unique.len(), 4);
}

#[tokio::test(start_paused = true)]
async fn test_final_retry_reaps_strays_first() {
    let dir = tempfile::tempdir().unwrap();
    let mut h = harness(dir.path(), HarnessOptions::default());
    h.browser.script("spongebob sketch", vec![Scripted::Fail("Target closed")]);

    h.orchestrator.run_cycle(&[sketch_target()]).await.unwrap();

    let state = h.browser.state();
    assert_eq!(state.reaps, 1);
    // Ordinary restarts close the previous session; the final one kills it.
    assert_eq!(state.closes.len(), 2);
    assert_eq!(state.kills.len(), 1);

    let reap_at = state.events.iter().position(|e| e == "reap").unwrap();
    let last_launch = state.events.iter().rposition(|e| e.starts_with("launch:")).unwrap();
    let last_render = state.events.iter().rposition(|e| e.starts_with("render:")).unwrap();
    assert!(reap_at < last_launch);
    assert!(last_launch < last_render);
    assert_eq!(state.events.iter().filter(|e| e.starts_with("launch:")).count(), 4);
}

#[tokio::test(start_paused = true)]
async fn test_exhaustion_alerts_ops_channel() {
    let dir = tempfile::tempdir().unwrap();
    let mut h = harness(dir.path(), HarnessOptions::default());
    h.browser.script("spongebob sketch", vec![Scripted::Fail("Navigation timeout")]);

    h.orchestrator.run_cycle(&[sketch_target()]).await.unwrap();

    assert_eq!(h.orchestrator.supervisor().consecutive_failures(), 4);
    let events = h.notifications.events();
    assert_eq!(events.len(), 1);
    match &events[0] {
        NotificationEvent::Error { message } => {
            assert!(message.contains("Spongebob Sketch"));
            assert!(message.contains("Navigation timeout"));
        }
        other => panic!("unexpected event: {:?}", other),
    }
}

#[tokio::test(start_paused = true)]
async fn test_success_resets_failure_count() {
    let dir = tempfile::tempdir().unwrap();
    let mut h = harness(dir.path(), HarnessOptions::default());
    h.browser.script(
        "spongebob sketch",
        vec![Scripted::Fail("Target closed"), Scripted::Fail("Target closed"), page(&["1"])],
    );

    h.orchestrator.run_cycle(&[sketch_target()]).await.unwrap();

    assert_eq!(h.browser.render_count(), 3);
    assert_eq!(h.orchestrator.supervisor().consecutive_failures(), 0);
    assert_eq!(h.notifications.count("error"), 0);
    assert_eq!(stored_ids(dir.path(), "spongebob-sketch"), vec!["1"]);
}

#[tokio::test(start_paused = true)]
async fn test_empty_page_does_not_reset_failure_count() {
    let dir = tempfile::tempdir().unwrap();
    let mut h = harness(dir.path(), HarnessOptions::default());
    h.browser.script(
        "spongebob sketch",
        vec![
            Scripted::Fail("Target closed"),
            Scripted::Fail("Target closed"),
            Scripted::Listings(vec![]),
        ],
    );

    h.orchestrator.run_cycle(&[sketch_target()]).await.unwrap();

    assert_eq!(h.browser.render_count(), 3);
    assert_eq!(h.orchestrator.supervisor().consecutive_failures(), 2);
    assert_eq!(h.notifications.count("error"), 0);
}

#[tokio::test(start_paused = true)]
async fn test_launch_failure_counts_as_attempt() {
    let dir = tempfile::tempdir().unwrap();
    let mut h = harness(
        dir.path(),
        HarnessOptions {
            max_retries: 1,
            hard_restart_threshold: 5,
            ..HarnessOptions::default()
        },
    );
    h.browser.state().fail_launch = true;

    h.orchestrator.run_cycle(&[sketch_target()]).await.unwrap();

    assert_eq!(h.browser.state().launch_attempts, 2);
    assert_eq!(h.orchestrator.supervisor().consecutive_failures(), 2);
    assert_eq!(h.browser.render_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_hard_fault_after_threshold_stops_launching() {
    let dir = tempfile::tempdir().unwrap();
    let mut h = harness(
        dir.path(),
        HarnessOptions {
            base_delay: Duration::from_secs(1),
            hard_restart_threshold: 6,
            ..HarnessOptions::default()
        },
    );
    h.browser.script("spongebob sketch", vec![Scripted::Fail("Protocol error")]);
    let targets = [sketch_target()];

    h.orchestrator.run_cycle(&targets).await.unwrap();
    assert_eq!(h.orchestrator.supervisor().consecutive_failures(), 4);

    let err = h.orchestrator.run_cycle(&targets).await.unwrap_err();
    assert!(matches!(err, AppError::HardFault { failures: 6 }));
    assert_eq!(h.orchestrator.supervisor().phase(), SessionPhase::HardFault);
    assert_eq!(h.browser.launch_count(), 6);
    assert_eq!(h.notifications.count("error"), 2);
    assert_eq!(h.orchestrator.counters().cycles_completed, 1);

    let attempts = h.browser.state().launch_attempts;
    assert!(h.orchestrator.run_cycle(&targets).await.unwrap_err().is_fatal());
    assert_eq!(h.browser.state().launch_attempts, attempts);
}
