//! Lifecycle of the single shared rendering session.
//!
//! ```text
//! UNINITIALIZED -> READY -> (STALE | CRASHED) -> RESTARTING -> READY
//!            any ----------------------------------------> HARD_FAULT
//! ```

use std::time::Duration;

use tokio::time::Instant;

use crate::config::AppConfig;
use crate::models::RawListing;
use crate::plugins::traits::{IdentityPool, RenderSession, SessionIdentity, SessionLauncher};
use crate::utils::error::{AppError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Uninitialized,
    Ready,
    Stale,
    Crashed,
    Restarting,
    HardFault,
}

#[derive(Debug, Clone)]
pub struct SessionState {
    pub phase: SessionPhase,
    pub created_at: Option<Instant>,
    pub consecutive_failures: u32,
}

#[derive(Debug, Clone)]
pub struct SupervisorPolicy {
    /// Sessions older than this are restarted before their next use.
    pub max_age: Duration,
    /// Deadline for an orderly close before the process is killed.
    pub close_grace: Duration,
    pub hard_restart_threshold: u32,
}

impl SupervisorPolicy {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            max_age: config.session.max_age(),
            close_grace: config.session.close_grace(),
            hard_restart_threshold: config.retry.hard_restart_threshold,
        }
    }
}

pub struct SessionSupervisor<L: SessionLauncher> {
    launcher: L,
    identities: IdentityPool,
    policy: SupervisorPolicy,
    session: Option<L::Session>,
    identity: Option<SessionIdentity>,
    state: SessionState,
    restarts: u64,
}

impl<L: SessionLauncher> SessionSupervisor<L> {
    pub fn new(launcher: L, identities: IdentityPool, policy: SupervisorPolicy) -> Self {
        Self {
            launcher,
            identities,
            policy,
            session: None,
            identity: None,
            state: SessionState {
                phase: SessionPhase::Uninitialized,
                created_at: None,
                consecutive_failures: 0,
            },
            restarts: 0,
        }
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn phase(&self) -> SessionPhase {
        self.state.phase
    }

    pub fn identity(&self) -> Option<&SessionIdentity> {
        self.identity.as_ref()
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.state.consecutive_failures
    }

    /// Number of sessions created over the process lifetime.
    pub fn restarts(&self) -> u64 {
        self.restarts
    }

    pub fn hard_fault_reached(&self) -> bool {
        self.state.consecutive_failures >= self.policy.hard_restart_threshold
    }

    fn is_stale(&self) -> bool {
        self.state
            .created_at
            .is_some_and(|created| created.elapsed() > self.policy.max_age)
    }

    /// Returns a ready session, creating or replacing it when it is missing,
    /// crashed or past its maximum age.
    async fn ensure_ready(&mut self) -> Result<&mut L::Session> {
        if self.state.phase == SessionPhase::HardFault {
            return Err(AppError::HardFault {
                failures: self.state.consecutive_failures,
            });
        }

        if self.state.phase == SessionPhase::Ready && self.is_stale() {
            tracing::info!(max_age_secs = self.policy.max_age.as_secs(), "Session exceeded maximum age, restarting");
            self.state.phase = SessionPhase::Stale;
        }

        if self.state.phase != SessionPhase::Ready || self.session.is_none() {
            self.restart().await?;
        }

        self.session
            .as_mut()
            .ok_or_else(|| AppError::SessionUnavailable("no session after restart".to_string()))
    }

    /// Closes any existing session and creates a fresh one with a new identity.
    pub async fn restart(&mut self) -> Result<()> {
        let previous = self.state.phase;
        self.state.phase = SessionPhase::Restarting;
        self.release().await;

        let identity = self.identities.pick();
        match self.launcher.launch(&identity).await {
            Ok(session) => {
                tracing::info!(
                    from = ?previous,
                    pid = ?session.process_id(),
                    viewport = ?identity.viewport,
                    "Rendering session ready"
                );
                self.session = Some(session);
                self.identity = Some(identity);
                self.state.created_at = Some(Instant::now());
                self.state.phase = SessionPhase::Ready;
                self.restarts += 1;
                metrics::counter!("watcher_session_restarts_total").increment(1);
                Ok(())
            }
            Err(e) => {
                tracing::warn!("Failed to launch rendering session: {}", e);
                self.state.phase = SessionPhase::Crashed;
                Err(e)
            }
        }
    }

    /// Orderly close bounded by the grace period; on expiry or error the
    /// backing process is killed. The handle is cleared on every path.
    pub async fn release(&mut self) {
        let Some(session) = self.session.take() else {
            return;
        };
        self.identity = None;
        self.state.created_at = None;

        let pid = session.process_id();
        match tokio::time::timeout(self.policy.close_grace, session.close()).await {
            Ok(Ok(())) => tracing::debug!(pid = ?pid, "Rendering session closed"),
            Ok(Err(e)) => {
                tracing::warn!(pid = ?pid, "Rendering session close failed: {}", e);
                self.force_kill(pid);
            }
            Err(_) => {
                tracing::warn!(
                    pid = ?pid,
                    grace_secs = self.policy.close_grace.as_secs(),
                    "Rendering session close timed out"
                );
                self.force_kill(pid);
            }
        }
    }

    fn force_kill(&self, pid: Option<u32>) {
        match pid {
            Some(pid) => {
                if self.launcher.kill_process(pid) {
                    tracing::warn!(pid, "Force-killed rendering process");
                } else {
                    tracing::debug!(pid, "Rendering process already gone");
                }
            }
            None => tracing::warn!("Rendering process id unknown, cannot force-kill"),
        }
    }

    /// Discards the current session without an orderly close.
    fn discard(&mut self) {
        if let Some(session) = self.session.take() {
            self.force_kill(session.process_id());
            // Dropping a renderer handle may block on process teardown.
            tokio::task::spawn_blocking(move || drop(session));
        }
        self.identity = None;
        self.state.created_at = None;
    }

    /// Render `url` through the shared session and extract candidate listings.
    pub async fn fetch_listings(&mut self, url: &str) -> Result<Vec<RawListing>> {
        let session = self.ensure_ready().await?;
        let page = session.render(url).await?;
        session.extract_listings(&page)
    }

    /// Best-effort screenshot through the current session. Never launches a
    /// session and never counts as a failure.
    pub async fn capture(&mut self, url: &str) -> Option<Vec<u8>> {
        if self.state.phase != SessionPhase::Ready {
            return None;
        }

        let session = self.session.as_mut()?;
        match session.capture(url).await {
            Ok(png) => Some(png),
            Err(e) => {
                tracing::warn!(url = %url, "Failed to capture listing screenshot: {}", e);
                None
            }
        }
    }

    /// Counts a failed attempt and marks the session crashed.
    pub fn record_failure(&mut self) -> u32 {
        self.state.consecutive_failures += 1;
        if self.state.phase != SessionPhase::HardFault {
            self.state.phase = SessionPhase::Crashed;
        }
        metrics::gauge!("watcher_consecutive_failures").set(self.state.consecutive_failures as f64);
        self.state.consecutive_failures
    }

    pub fn record_success(&mut self) {
        if self.state.consecutive_failures > 0 {
            tracing::info!(previous = self.state.consecutive_failures, "Scrape succeeded, failure counter reset");
        }
        self.state.consecutive_failures = 0;
        metrics::gauge!("watcher_consecutive_failures").set(0.0);
    }

    /// Kills the current session and every stray renderer process. Used when
    /// ordinary restarts are assumed to have leaked processes.
    pub async fn aggressive_cleanup(&mut self) -> usize {
        self.discard();
        let reaped = self.launcher.reap_stray_processes();
        tracing::warn!(reaped, "Aggressive renderer cleanup completed");
        if self.state.phase != SessionPhase::HardFault {
            self.state.phase = SessionPhase::Crashed;
        }
        reaped
    }

    /// Terminal path: forced cleanup, then hand back the error the caller
    /// turns into a non-zero process exit.
    pub async fn hard_fault(&mut self) -> AppError {
        let failures = self.state.consecutive_failures;
        tracing::error!(
            failures,
            threshold = self.policy.hard_restart_threshold,
            "Consecutive failure threshold reached, forcing cleanup before process exit"
        );

        self.discard();
        let reaped = self.launcher.reap_stray_processes();
        tracing::error!(reaped, "Renderer processes reaped, process will exit for an external restart");

        self.state.phase = SessionPhase::HardFault;
        AppError::HardFault { failures }
    }

    /// Orderly release for process shutdown.
    pub async fn shutdown(&mut self) {
        self.release().await;
        if self.state.phase != SessionPhase::HardFault {
            self.state.phase = SessionPhase::Uninitialized;
        }
    }
}
