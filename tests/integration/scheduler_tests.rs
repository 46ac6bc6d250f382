use super::*;
use listing_watcher::scheduler::{PollScheduler, SchedulerExit};

#[tokio::test(start_paused = true)]
async fn test_polls_immediately_then_every_interval() {
    let dir = tempfile::tempdir().unwrap();
    let mut h = harness(dir.path(), HarnessOptions::default());
    let scheduler = PollScheduler::new(Duration::from_secs(420), Duration::from_secs(500));
    let start = tokio::time::Instant::now();

    let exit = scheduler
        .run(
            &mut h.orchestrator,
            &[sketch_target()],
            tokio::time::sleep(Duration::from_secs(1000)),
        )
        .await;

    assert_eq!(exit, SchedulerExit::Shutdown);
    let offsets: Vec<_> = h.browser.state().renders.iter().map(|(_, at)| *at - start).collect();
    assert_eq!(
        offsets,
        vec![Duration::ZERO, Duration::from_secs(420), Duration::from_secs(840)]
    );
    assert_eq!(h.orchestrator.counters().cycles_completed, 3);
    assert_eq!(h.notifications.count("health"), 1);
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_abandons_in_flight_cycle() {
    let dir = tempfile::tempdir().unwrap();
    let mut h = harness(dir.path(), HarnessOptions::default());
    h.browser.state().render_delay = Duration::from_secs(120);
    let scheduler = PollScheduler::new(Duration::from_secs(420), Duration::from_secs(3600));

    let exit = scheduler
        .run(
            &mut h.orchestrator,
            &[sketch_target()],
            tokio::time::sleep(Duration::from_secs(30)),
        )
        .await;

    assert_eq!(exit, SchedulerExit::Shutdown);
    assert_eq!(h.orchestrator.counters().cycles_completed, 0);
    assert_eq!(h.browser.render_count(), 0);

    h.orchestrator.shutdown().await;
    assert_eq!(h.browser.state().closes, vec![1000]);
}

#[tokio::test(start_paused = true)]
async fn test_hard_fault_ends_scheduler() {
    let dir = tempfile::tempdir().unwrap();
    let mut h = harness(
        dir.path(),
        HarnessOptions {
            max_retries: 1,
            base_delay: Duration::from_secs(5),
            hard_restart_threshold: 2,
            ..HarnessOptions::default()
        },
    );
    h.browser.state().fail_launch = true;
    let scheduler = PollScheduler::new(Duration::from_secs(60), Duration::from_secs(3600));

    let exit = scheduler
        .run(&mut h.orchestrator, &[sketch_target()], std::future::pending::<()>())
        .await;

    assert_eq!(exit, SchedulerExit::HardFault { failures: 2 });
    assert_eq!(h.browser.state().launch_attempts, 2);
    // One reap from the final-retry cleanup, one from the hard fault.
    assert_eq!(h.browser.state().reaps, 2);
    assert_eq!(h.notifications.count("error"), 2);
}
