use std::time::Duration;

use crate::config::RetryConfig;
use crate::core::session::SessionSupervisor;
use crate::models::{Listing, Target};
use crate::plugins::traits::SessionLauncher;
use crate::utils::error::Result;

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &RetryConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            base_delay: config.base_delay(),
        }
    }

    /// Backoff before each retry: the base delay, doubling every time.
    pub fn schedule(&self) -> Vec<Duration> {
        std::iter::successors(Some(self.base_delay), |delay| Some(delay.saturating_mul(2)))
            .take(self.max_retries as usize)
            .collect()
    }
}

#[derive(Debug)]
pub enum ScrapeOutcome {
    Listings(Vec<Listing>),
    /// Every attempt failed. Always raised on the ops channel.
    Exhausted { failures: u32, last_error: String },
}

pub struct RetryEngine {
    policy: RetryPolicy,
}

impl RetryEngine {
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Scrapes one target with uniform retry handling. The only error
    /// returned is the hard fault; exhaustion is an outcome.
    pub async fn attempt<L: SessionLauncher>(
        &self,
        supervisor: &mut SessionSupervisor<L>,
        target: &Target,
        url: &str,
    ) -> Result<ScrapeOutcome> {
        let max_retries = self.policy.max_retries;
        let mut delay = self.policy.base_delay;
        let mut last_error = String::new();

        for attempt in 0..=max_retries {
            if supervisor.hard_fault_reached() {
                return Err(supervisor.hard_fault().await);
            }

            match supervisor.fetch_listings(url).await {
                Ok(raw) => {
                    let listings = Listing::normalize_batch(raw);
                    if listings.is_empty() {
                        // A challenge page renders fine but carries no results.
                        tracing::warn!(
                            target = %target.name,
                            failures = supervisor.consecutive_failures(),
                            "Empty results page, failure count left unchanged"
                        );
                    } else {
                        supervisor.record_success();
                        tracing::info!(target = %target.name, count = listings.len(), "Found listings");
                    }
                    return Ok(ScrapeOutcome::Listings(listings));
                }
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    let failures = supervisor.record_failure();
                    metrics::counter!("watcher_scrape_failures_total").increment(1);
                    tracing::warn!(
                        target = %target.name,
                        attempt = attempt + 1,
                        failures,
                        "Scrape attempt failed: {}",
                        e
                    );
                    last_error = e.to_string();

                    if attempt == max_retries {
                        break;
                    }

                    let retry = attempt + 1;
                    if retry == max_retries {
                        tracing::warn!(target = %target.name, "Final retry, reaping stray renderer processes first");
                        supervisor.aggressive_cleanup().await;
                    }

                    tracing::info!(
                        target = %target.name,
                        retry,
                        max_retries,
                        delay_secs = delay.as_secs(),
                        "Retrying with a fresh session after backoff"
                    );
                    tokio::time::sleep(delay).await;
                    delay = delay.saturating_mul(2);
                }
            }
        }

        let failures = supervisor.consecutive_failures();
        tracing::error!(
            target = %target.name,
            failures,
            "All {} retries exhausted, skipping target this cycle",
            max_retries
        );

        Ok(ScrapeOutcome::Exhausted { failures, last_error })
    }
}
