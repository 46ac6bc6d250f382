use async_trait::async_trait;
use rand::seq::IndexedRandom;
use rand::Rng;

use crate::models::RawListing;
use crate::utils::error::Result;

/// Fingerprint chosen once per session and kept for its whole lifetime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionIdentity {
    pub user_agent: String,
    pub viewport: (u32, u32),
}

/// Rotation pool the per-session identity is drawn from.
#[derive(Debug, Clone)]
pub struct IdentityPool {
    user_agents: Vec<String>,
    viewports: Vec<(u32, u32)>,
}

impl IdentityPool {
    pub fn new(user_agents: Vec<String>, viewports: Vec<(u32, u32)>) -> Self {
        Self {
            user_agents,
            viewports,
        }
    }

    pub fn pick(&self) -> SessionIdentity {
        let mut rng = rand::rng();
        let user_agent = self
            .user_agents
            .choose(&mut rng)
            .cloned()
            .unwrap_or_default();
        // Small jitter on top of the pooled size.
        let (width, height) = self.viewports.choose(&mut rng).copied().unwrap_or((1280, 800));
        let jitter = rng.random_range(0..=32u32);

        SessionIdentity {
            user_agent,
            viewport: (width + jitter, height + jitter / 2),
        }
    }
}

/// A live rendering session: the single shared browser the core drives.
///
/// Selector heuristics live behind `extract_listings`; the core never looks
/// inside a page.
#[async_trait]
pub trait RenderSession: Send + 'static {
    type Page: Send;

    /// Loads `url` and returns an opaque handle to the rendered page.
    async fn render(&mut self, url: &str) -> Result<Self::Page>;

    fn extract_listings(&self, page: &Self::Page) -> Result<Vec<RawListing>>;

    /// PNG capture of a listing page, used as a notification attachment.
    async fn capture(&mut self, url: &str) -> Result<Vec<u8>>;

    /// OS process backing the session, if known.
    fn process_id(&self) -> Option<u32>;

    /// Orderly release. Callers bound this with a deadline.
    async fn close(self) -> Result<()>;
}

/// Creates sessions and reclaims their OS resources when orderly release fails.
#[async_trait]
pub trait SessionLauncher: Send + Sync {
    type Session: RenderSession;

    async fn launch(&self, identity: &SessionIdentity) -> Result<Self::Session>;

    /// Force-terminates one process (and its children) by id.
    fn kill_process(&self, pid: u32) -> bool;

    /// Best-effort termination of every stray renderer process. Returns how
    /// many were killed.
    fn reap_stray_processes(&self) -> usize;
}
