use async_trait::async_trait;

use crate::plugins::traits::{NotificationEvent, NotificationResult, NotifierPlugin};
use crate::utils::error::Result;

/// Stands in for a channel that has no webhook configured.
pub struct LogNotifier {
    channel: String,
}

impl LogNotifier {
    pub fn new(channel: impl Into<String>) -> Self {
        Self {
            channel: channel.into(),
        }
    }
}

#[async_trait]
impl NotifierPlugin for LogNotifier {
    fn name(&self) -> &str {
        &self.channel
    }

    fn plugin_type(&self) -> &str {
        "log"
    }

    async fn notify(&self, event: &NotificationEvent) -> Result<NotificationResult> {
        match event {
            NotificationEvent::NewListing { target, listing, .. } => {
                tracing::info!(
                    channel = %self.channel,
                    target = %target.name,
                    price = %listing.price,
                    url = %listing.url,
                    "[NEW] {}",
                    listing.title
                );
            }
            NotificationEvent::Error { message } => {
                tracing::error!(channel = %self.channel, "{}", message);
            }
            NotificationEvent::Health(report) => {
                tracing::info!(
                    channel = %self.channel,
                    cycles = report.cycles_completed,
                    notified = report.listings_notified,
                    failures = report.consecutive_failures,
                    "Health report"
                );
            }
            NotificationEvent::Startup { targets } => {
                tracing::info!(channel = %self.channel, targets = targets.len(), "Monitor started");
            }
        }

        Ok(NotificationResult {
            success: true,
            message_id: None,
            error: None,
        })
    }
}
