use std::future::Future;
use std::time::Duration;

use tokio::time::{Instant, MissedTickBehavior};

use crate::config::MonitorConfig;
use crate::core::TargetOrchestrator;
use crate::models::Target;
use crate::plugins::traits::SessionLauncher;
use crate::utils::error::AppError;

/// Why the scheduler loop returned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchedulerExit {
    /// A termination signal arrived; an in-flight cycle was abandoned.
    Shutdown,
    /// The consecutive failure threshold was crossed. Cleanup already ran.
    HardFault { failures: u32 },
}

enum Tick {
    Shutdown,
    Poll,
    Health,
}

/// Fires a poll cycle immediately and then every poll interval, plus a
/// health report every health interval. Cycles never overlap.
#[derive(Debug, Clone)]
pub struct PollScheduler {
    poll_interval: Duration,
    health_interval: Duration,
}

impl PollScheduler {
    pub fn new(poll_interval: Duration, health_interval: Duration) -> Self {
        Self {
            poll_interval,
            health_interval,
        }
    }

    pub fn from_config(config: &MonitorConfig) -> Self {
        Self::new(config.poll_interval(), config.health_interval())
    }

    pub async fn run<L, F>(
        &self,
        orchestrator: &mut TargetOrchestrator<L>,
        targets: &[Target],
        shutdown: F,
    ) -> SchedulerExit
    where
        L: SessionLauncher,
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);

        let mut poll = tokio::time::interval(self.poll_interval);
        poll.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut health = tokio::time::interval_at(Instant::now() + self.health_interval, self.health_interval);
        health.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::info!(
            poll_secs = self.poll_interval.as_secs(),
            health_secs = self.health_interval.as_secs(),
            targets = targets.len(),
            "Poll scheduler started"
        );

        loop {
            let tick = tokio::select! {
                biased;
                _ = &mut shutdown => Tick::Shutdown,
                _ = poll.tick() => Tick::Poll,
                _ = health.tick() => Tick::Health,
            };

            match tick {
                Tick::Shutdown => {
                    tracing::info!("Shutdown requested, stopping scheduler");
                    return SchedulerExit::Shutdown;
                }
                Tick::Health => orchestrator.report_health().await,
                Tick::Poll => {
                    let result = tokio::select! {
                        biased;
                        _ = &mut shutdown => None,
                        result = orchestrator.run_cycle(targets) => Some(result),
                    };

                    match result {
                        None => {
                            tracing::info!("Shutdown requested during a cycle, abandoning it");
                            return SchedulerExit::Shutdown;
                        }
                        Some(Ok(new_listings)) => {
                            tracing::info!(new_listings, "Check cycle complete");
                        }
                        Some(Err(AppError::HardFault { failures })) => {
                            return SchedulerExit::HardFault { failures };
                        }
                        Some(Err(e)) => {
                            tracing::error!("Check cycle failed: {}", e);
                        }
                    }
                }
            }
        }
    }
}
