use super::*;
use listing_watcher::models::Target;
use listing_watcher::plugins::traits::NotificationEvent;
use listing_watcher::scheduler::{PollScheduler, SchedulerExit};

#[tokio::test(start_paused = true)]
async fn test_first_run_is_silent_then_only_new_listings_notify() {
    let dir = tempfile::tempdir().unwrap();
    let mut h = harness(dir.path(), HarnessOptions::default());
    let target = sketch_target();
    h.browser.script(
        "spongebob sketch",
        vec![page(&["1", "2"]), page(&["3", "1", "2"]), page(&["3", "1", "2"])],
    );

    let first = h.orchestrator.run_cycle(&[target.clone()]).await.unwrap();
    assert_eq!(first, 0);
    assert!(h.notifications.listing_ids().is_empty());
    assert_eq!(h.orchestrator.is_first_run(&target), Some(false));
    assert_eq!(stored_ids(dir.path(), "spongebob-sketch"), vec!["1", "2"]);

    let second = h.orchestrator.run_cycle(&[target.clone()]).await.unwrap();
    assert_eq!(second, 1);
    assert_eq!(h.notifications.listing_ids(), vec!["3"]);

    // Identical results never notify twice.
    let third = h.orchestrator.run_cycle(&[target]).await.unwrap();
    assert_eq!(third, 0);
    assert_eq!(h.notifications.listing_ids(), vec!["3"]);
    assert_eq!(h.orchestrator.counters().cycles_completed, 3);
    assert_eq!(h.orchestrator.counters().listings_notified, 1);
}

#[tokio::test(start_paused = true)]
async fn test_empty_first_poll_keeps_first_run() {
    let dir = tempfile::tempdir().unwrap();
    let mut h = harness(dir.path(), HarnessOptions::default());
    let target = sketch_target();
    h.browser
        .script("spongebob sketch", vec![Scripted::Listings(vec![]), page(&["1"]), page(&["1", "2"])]);

    h.orchestrator.run_cycle(&[target.clone()]).await.unwrap();
    assert_eq!(h.orchestrator.is_first_run(&target), Some(true));

    // The first non-empty poll is still the silent baseline.
    h.orchestrator.run_cycle(&[target.clone()]).await.unwrap();
    assert!(h.notifications.listing_ids().is_empty());
    assert_eq!(h.orchestrator.is_first_run(&target), Some(false));

    h.orchestrator.run_cycle(&[target]).await.unwrap();
    assert_eq!(h.notifications.listing_ids(), vec!["2"]);
}

#[tokio::test(start_paused = true)]
async fn test_state_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let target = sketch_target();

    {
        let mut h = harness(dir.path(), HarnessOptions::default());
        h.browser.script("spongebob sketch", vec![page(&["1", "2"])]);
        h.orchestrator.run_cycle(&[target.clone()]).await.unwrap();
        h.orchestrator.shutdown().await;
    }

    let mut h = harness(dir.path(), HarnessOptions::default());
    h.browser.script("spongebob sketch", vec![page(&["4", "1", "2"])]);
    h.orchestrator.run_cycle(&[target.clone()]).await.unwrap();

    assert_eq!(h.orchestrator.is_first_run(&target), Some(false));
    assert_eq!(h.notifications.listing_ids(), vec!["4"]);
}

#[tokio::test(start_paused = true)]
async fn test_keyword_filter_suppresses_but_records() {
    let dir = tempfile::tempdir().unwrap();
    seed_store(dir.path(), "lorcana-mickey", &["0"]);
    let mut h = harness(dir.path(), HarnessOptions::default());
    let target = Target::new("Lorcana Mickey", "lorcana enchanted").with_keywords(["iconic", "mickey"]);
    h.browser.script(
        "lorcana enchanted",
        vec![Scripted::Listings(vec![
            raw("10", "ICONIC Mickey Mouse - Lorcana"),
            raw("11", "Mickey Mouse Enchanted"),
            raw("12", "Iconic Elsa"),
        ])],
    );

    h.orchestrator.run_cycle(&[target.clone()]).await.unwrap();
    assert_eq!(h.notifications.listing_ids(), vec!["10"]);
    assert_eq!(stored_ids(dir.path(), "lorcana-mickey"), vec!["0", "10", "11", "12"]);

    h.orchestrator.run_cycle(&[target]).await.unwrap();
    assert_eq!(h.notifications.listing_ids(), vec!["10"]);
}

#[tokio::test(start_paused = true)]
async fn test_seen_set_pruned_to_cap() {
    let dir = tempfile::tempdir().unwrap();
    let mut h = harness(
        dir.path(),
        HarnessOptions {
            max_seen: 5,
            ..HarnessOptions::default()
        },
    );
    let target = sketch_target();
    h.browser.script(
        "spongebob sketch",
        vec![page(&["1", "2", "3"]), page(&["4", "5", "6", "7"])],
    );

    h.orchestrator.run_cycle(&[target.clone()]).await.unwrap();
    h.orchestrator.run_cycle(&[target]).await.unwrap();

    assert_eq!(stored_ids(dir.path(), "spongebob-sketch"), vec!["3", "4", "5", "6", "7"]);
    assert_eq!(h.orchestrator.store().len("spongebob-sketch"), 5);
}

#[tokio::test(start_paused = true)]
async fn test_failed_delivery_is_not_retried() {
    let dir = tempfile::tempdir().unwrap();
    seed_store(dir.path(), "spongebob-sketch", &["1"]);
    let mut h = harness(dir.path(), HarnessOptions::default());
    let target = sketch_target();
    h.browser.script("spongebob sketch", vec![page(&["2", "1"])]);
    h.notifications.set_failing(true);

    h.orchestrator.run_cycle(&[target.clone()]).await.unwrap();
    assert_eq!(h.notifications.listing_ids(), vec!["2"]);
    assert_eq!(h.orchestrator.counters().listings_notified, 0);

    h.notifications.set_failing(false);
    h.orchestrator.run_cycle(&[target]).await.unwrap();
    assert_eq!(h.notifications.listing_ids(), vec!["2"]);
    assert!(stored_ids(dir.path(), "spongebob-sketch").contains(&"2".to_string()));
}

#[tokio::test(start_paused = true)]
async fn test_failing_target_does_not_block_others() {
    let dir = tempfile::tempdir().unwrap();
    seed_store(dir.path(), "working", &["old"]);
    let mut h = harness(
        dir.path(),
        HarnessOptions {
            base_delay: Duration::from_secs(1),
            ..HarnessOptions::default()
        },
    );
    let broken = Target::new("Broken", "broken query");
    let working = Target::new("Working", "working query");
    h.browser.script("broken query", vec![Scripted::Fail("net::ERR_TIMED_OUT")]);
    h.browser.script("working query", vec![page(&["old", "new"])]);

    let notified = h.orchestrator.run_cycle(&[broken, working]).await.unwrap();

    assert_eq!(notified, 1);
    assert_eq!(h.notifications.listing_ids(), vec!["new"]);
    assert_eq!(h.notifications.count("error"), 1);
    assert_eq!(h.orchestrator.supervisor().consecutive_failures(), 0);
    assert_eq!(h.orchestrator.counters().cycles_completed, 1);
}

#[tokio::test(start_paused = true)]
async fn test_screenshot_attached_when_enabled() {
    let dir = tempfile::tempdir().unwrap();
    seed_store(dir.path(), "spongebob-sketch", &["1"]);
    let mut h = harness(
        dir.path(),
        HarnessOptions {
            screenshots: true,
            ..HarnessOptions::default()
        },
    );
    h.browser.script("spongebob sketch", vec![page(&["2", "1"])]);

    h.orchestrator.run_cycle(&[sketch_target()]).await.unwrap();

    assert_eq!(h.browser.state().captures, 1);
    let events = h.notifications.events();
    match &events[0] {
        NotificationEvent::NewListing {
            listing, screenshot, ..
        } => {
            assert_eq!(listing.url, "https://www.ebay.com/itm/2");
            assert!(screenshot.as_ref().is_some_and(|png| png.starts_with(&[0x89, b'P'])));
        }
        other => panic!("unexpected event: {:?}", other),
    }
}

#[tokio::test(start_paused = true)]
async fn test_health_report_reflects_counters() {
    let dir = tempfile::tempdir().unwrap();
    seed_store(dir.path(), "spongebob-sketch", &["1"]);
    let mut h = harness(dir.path(), HarnessOptions::default());
    h.browser.script("spongebob sketch", vec![page(&["2", "3", "1"])]);

    h.orchestrator.announce_startup(&[sketch_target()]).await;
    h.orchestrator.run_cycle(&[sketch_target()]).await.unwrap();
    h.orchestrator.report_health().await;

    let report = h.orchestrator.health_report();
    assert_eq!(report.cycles_completed, 1);
    assert_eq!(report.listings_notified, 2);
    assert_eq!(report.target_count, 1);
    assert!(report.last_success.is_some());
    assert_eq!(h.notifications.count("startup"), 1);
    assert_eq!(h.notifications.count("health"), 1);
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_between_notifications_does_not_renotify() {
    let dir = tempfile::tempdir().unwrap();
    seed_store(dir.path(), "spongebob-sketch", &["1"]);
    let options = HarnessOptions {
        inter_notification: Duration::from_secs(10),
        ..HarnessOptions::default()
    };

    {
        let mut h = harness(dir.path(), options.clone());
        h.browser.script("spongebob sketch", vec![page(&["2", "3", "1"])]);
        let scheduler = PollScheduler::new(Duration::from_secs(420), Duration::from_secs(3600));

        // Terminates while the second notification is still paced.
        let exit = scheduler
            .run(
                &mut h.orchestrator,
                &[sketch_target()],
                tokio::time::sleep(Duration::from_secs(5)),
            )
            .await;
        h.orchestrator.shutdown().await;

        assert_eq!(exit, SchedulerExit::Shutdown);
        assert_eq!(h.notifications.listing_ids(), vec!["2"]);
    }

    assert_eq!(stored_ids(dir.path(), "spongebob-sketch"), vec!["1", "2", "3"]);

    let mut h = harness(dir.path(), options);
    h.browser.script("spongebob sketch", vec![page(&["2", "3", "1"])]);
    let notified = h.orchestrator.run_cycle(&[sketch_target()]).await.unwrap();

    assert_eq!(notified, 0);
    assert!(h.notifications.listing_ids().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_cycle_without_results_leaves_last_success_unset() {
    let dir = tempfile::tempdir().unwrap();
    let mut h = harness(
        dir.path(),
        HarnessOptions {
            base_delay: Duration::from_secs(1),
            ..HarnessOptions::default()
        },
    );
    let broken = Target::new("Broken", "broken query");
    let blank = Target::new("Blank", "blank query");
    h.browser.script("broken query", vec![Scripted::Fail("net::ERR_TIMED_OUT")]);
    h.browser.script("blank query", vec![Scripted::Listings(vec![])]);

    h.orchestrator.run_cycle(&[broken, blank]).await.unwrap();

    assert_eq!(h.orchestrator.counters().cycles_completed, 1);
    assert!(h.orchestrator.counters().last_success.is_none());
    assert!(h.orchestrator.health_report().last_success.is_none());
}
