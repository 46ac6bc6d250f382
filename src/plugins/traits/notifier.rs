use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{Listing, Target};
use crate::utils::error::Result;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetInfo {
    pub name: String,
    pub query: String,
    pub required_keywords: Vec<String>,
    pub channel: String,
}

impl From<&Target> for TargetInfo {
    fn from(target: &Target) -> Self {
        Self {
            name: target.name.clone(),
            query: target.query.clone(),
            required_keywords: target.required_keywords.clone(),
            channel: target.channel.clone(),
        }
    }
}

/// Snapshot of the run counters sent on the health trigger.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthReport {
    pub started_at: DateTime<Utc>,
    pub cycles_completed: u64,
    pub listings_notified: u64,
    pub last_success: Option<DateTime<Utc>>,
    pub consecutive_failures: u32,
    pub target_count: usize,
}

#[derive(Debug, Clone)]
pub enum NotificationEvent {
    NewListing {
        target: TargetInfo,
        listing: Listing,
        /// PNG bytes of the listing page.
        screenshot: Option<Vec<u8>>,
    },
    Error {
        message: String,
    },
    Health(HealthReport),
    Startup {
        targets: Vec<TargetInfo>,
    },
}

impl NotificationEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            NotificationEvent::NewListing { .. } => "new_listing",
            NotificationEvent::Error { .. } => "error",
            NotificationEvent::Health(_) => "health",
            NotificationEvent::Startup { .. } => "startup",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationResult {
    pub success: bool,
    pub message_id: Option<String>,
    pub error: Option<String>,
}

/// Trait for implementing notification sinks (Discord, log, ...)
#[async_trait]
pub trait NotifierPlugin: Send + Sync {
    /// Plugin metadata
    fn name(&self) -> &str;
    fn plugin_type(&self) -> &str;

    /// Delivers one event. Delivery is best-effort and never retried.
    async fn notify(&self, event: &NotificationEvent) -> Result<NotificationResult>;

    /// Plugin lifecycle
    async fn shutdown(&self) -> Result<()> {
        Ok(())
    }
}
