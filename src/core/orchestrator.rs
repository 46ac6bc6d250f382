use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::AppConfig;
use crate::core::dedupe::{DedupeStore, JsonFileStorage};
use crate::core::retry::{RetryEngine, RetryPolicy, ScrapeOutcome};
use crate::core::session::{SessionSupervisor, SupervisorPolicy};
use crate::models::{Listing, Target};
use crate::plugins::manager::NotificationDispatcher;
use crate::plugins::traits::{HealthReport, IdentityPool, SessionLauncher};
use crate::utils::error::Result;

/// Process-wide counters for health reporting only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunCounters {
    pub started_at: DateTime<Utc>,
    pub cycles_completed: u64,
    pub listings_notified: u64,
    pub last_success: Option<DateTime<Utc>>,
}

impl Default for RunCounters {
    fn default() -> Self {
        Self {
            started_at: Utc::now(),
            cycles_completed: 0,
            listings_notified: 0,
            last_success: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Pacing {
    pub inter_target: Duration,
    pub inter_notification: Duration,
}

#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    pub search_base_url: String,
    pub max_seen_per_target: usize,
    pub screenshots: bool,
    pub pacing: Pacing,
}

impl OrchestratorSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            search_base_url: config.scraper.search_base_url.clone(),
            max_seen_per_target: config.storage.max_seen_per_target,
            screenshots: config.monitor.screenshots,
            pacing: Pacing {
                inter_target: config.monitor.inter_target_delay(),
                inter_notification: config.monitor.inter_notification_delay(),
            },
        }
    }
}

/// What one target contributed to a cycle.
#[derive(Debug, Default)]
struct TargetPass {
    /// The search returned at least one listing.
    scraped: bool,
    dispatched: usize,
}

/// Drives one poll cycle over the target catalog, strictly in order, through
/// the single shared session.
pub struct TargetOrchestrator<L: SessionLauncher> {
    supervisor: SessionSupervisor<L>,
    retry: RetryEngine,
    store: DedupeStore,
    dispatcher: NotificationDispatcher,
    settings: OrchestratorSettings,
    /// Re-derived each process start from whether the store loaded empty.
    first_run: HashMap<String, bool>,
    counters: RunCounters,
    target_count: usize,
}

impl<L: SessionLauncher> TargetOrchestrator<L> {
    pub fn new(
        supervisor: SessionSupervisor<L>,
        retry: RetryEngine,
        store: DedupeStore,
        dispatcher: NotificationDispatcher,
        settings: OrchestratorSettings,
    ) -> Self {
        Self {
            supervisor,
            retry,
            store,
            dispatcher,
            settings,
            first_run: HashMap::new(),
            counters: RunCounters::default(),
            target_count: 0,
        }
    }

    pub fn from_config(config: &AppConfig, launcher: L) -> Self {
        let supervisor = SessionSupervisor::new(
            launcher,
            IdentityPool::new(config.scraper.user_agents.clone(), config.scraper.viewports.clone()),
            SupervisorPolicy::from_config(config),
        );
        let store = DedupeStore::new(Box::new(JsonFileStorage::new(config.storage.data_dir.clone())));
        let dispatcher = NotificationDispatcher::from_config(&config.notifications, &config.targets);

        Self::new(
            supervisor,
            RetryEngine::new(RetryPolicy::from_config(&config.retry)),
            store,
            dispatcher,
            OrchestratorSettings::from_config(config),
        )
    }

    pub fn counters(&self) -> &RunCounters {
        &self.counters
    }

    pub fn supervisor(&self) -> &SessionSupervisor<L> {
        &self.supervisor
    }

    pub fn store(&self) -> &DedupeStore {
        &self.store
    }

    pub fn is_first_run(&self, target: &Target) -> Option<bool> {
        self.first_run.get(&target.store_key()).copied()
    }

    /// Runs every target once. Returns how many new listings were handed to
    /// the dispatcher; only a hard fault aborts the cycle.
    pub async fn run_cycle(&mut self, targets: &[Target]) -> Result<usize> {
        self.target_count = targets.len();
        tracing::info!(targets = targets.len(), "Running check");
        let mut total_new = 0;
        let mut any_scraped = false;

        for (index, target) in targets.iter().enumerate() {
            if index > 0 && !self.settings.pacing.inter_target.is_zero() {
                tokio::time::sleep(self.settings.pacing.inter_target).await;
            }

            match self.process_target(target).await {
                Ok(pass) => {
                    total_new += pass.dispatched;
                    any_scraped |= pass.scraped;
                }
                Err(e) if e.is_fatal() => {
                    self.dispatcher
                        .notify_error(format!(
                            "{}. Forcing cleanup and exiting so the process manager can restart the monitor.",
                            e
                        ))
                        .await;
                    return Err(e);
                }
                Err(e) => {
                    tracing::error!(target = %target.name, "Check failed: {}", e);
                }
            }
        }

        self.counters.cycles_completed += 1;
        if any_scraped {
            self.counters.last_success = Some(Utc::now());
        }
        metrics::counter!("watcher_cycles_total").increment(1);

        Ok(total_new)
    }

    async fn process_target(&mut self, target: &Target) -> Result<TargetPass> {
        let key = target.store_key();
        let first_run = match self.first_run.get(&key) {
            Some(first_run) => *first_run,
            None => {
                let empty = self.store.load(&key);
                self.first_run.insert(key.clone(), empty);
                empty
            }
        };

        let url = target.search_url(&self.settings.search_base_url)?;
        tracing::info!(target = %target.name, query = %target.query, "Navigating to search");

        let listings = match self.retry.attempt(&mut self.supervisor, target, url.as_str()).await? {
            ScrapeOutcome::Listings(listings) => listings,
            ScrapeOutcome::Exhausted { failures, last_error } => {
                self.dispatcher
                    .notify_error(format!(
                        "Failed to check \"{}\" after {} consecutive failures: {}",
                        target.name, failures, last_error
                    ))
                    .await;
                return Ok(TargetPass::default());
            }
        };

        if listings.is_empty() {
            tracing::warn!(target = %target.name, "No listings found, the site might be blocking or the page structure changed");
            return Ok(TargetPass::default());
        }

        let (new_count, pending) = self.mark_seen(target, &key, first_run, &listings);

        if first_run {
            tracing::info!(target = %target.name, count = new_count, "Initial scan complete, marked listings as seen");
            self.first_run.insert(key.clone(), false);
        } else if new_count == 0 {
            tracing::info!(target = %target.name, "No new listings found");
        } else {
            tracing::info!(target = %target.name, new = new_count, notify = pending.len(), "Found new listing(s)");
        }

        // Ids must be durable before the first delivery.
        self.store.prune(&key, self.settings.max_seen_per_target);
        if let Err(e) = self.store.flush(&key) {
            tracing::error!(
                target = %target.name,
                "Failed to save seen listings, in-memory state remains authoritative: {}",
                e
            );
        }

        let dispatched = self.dispatch(target, &pending).await;

        Ok(TargetPass {
            scraped: true,
            dispatched,
        })
    }

    /// Records every unseen id and returns the new count together with the
    /// listings that should be announced.
    fn mark_seen<'a>(
        &mut self,
        target: &Target,
        key: &str,
        first_run: bool,
        listings: &'a [Listing],
    ) -> (usize, Vec<&'a Listing>) {
        let mut new_count = 0;
        let mut pending = Vec::new();

        for listing in listings {
            if !self.store.record(key, &listing.id) {
                continue;
            }
            new_count += 1;

            if first_run {
                tracing::debug!(target = %target.name, "Initial scan, marking as seen: {}", listing.title);
            } else if !target.matches_keywords(&listing.title) {
                tracing::debug!(target = %target.name, "Missing required keywords, skipping: {}", listing.title);
            } else {
                pending.push(listing);
            }
        }

        (new_count, pending)
    }

    async fn dispatch(&mut self, target: &Target, pending: &[&Listing]) -> usize {
        for (index, listing) in pending.iter().enumerate() {
            if index > 0 && !self.settings.pacing.inter_notification.is_zero() {
                tokio::time::sleep(self.settings.pacing.inter_notification).await;
            }

            tracing::info!(target = %target.name, price = %listing.price, url = %listing.url, "[NEW] {}", listing.title);

            let screenshot = if self.settings.screenshots {
                self.supervisor.capture(&listing.url).await
            } else {
                None
            };

            if self.dispatcher.notify_new_listing(target, listing, screenshot).await {
                self.counters.listings_notified += 1;
                metrics::counter!("watcher_listings_notified_total", "target" => target.name.clone()).increment(1);
            }
        }

        pending.len()
    }

    pub fn health_report(&self) -> HealthReport {
        HealthReport {
            started_at: self.counters.started_at,
            cycles_completed: self.counters.cycles_completed,
            listings_notified: self.counters.listings_notified,
            last_success: self.counters.last_success,
            consecutive_failures: self.supervisor.consecutive_failures(),
            target_count: self.target_count,
        }
    }

    pub async fn report_health(&self) {
        let report = self.health_report();
        tracing::info!(
            cycles = report.cycles_completed,
            notified = report.listings_notified,
            failures = report.consecutive_failures,
            "Sending health report"
        );
        self.dispatcher.notify_health(report).await;
    }

    pub async fn announce_startup(&mut self, targets: &[Target]) {
        self.target_count = targets.len();
        self.dispatcher.notify_startup(targets).await;
    }

    /// Orderly release of the session and notifiers.
    pub async fn shutdown(&mut self) {
        self.supervisor.shutdown().await;
        self.dispatcher.shutdown().await;
    }
}
