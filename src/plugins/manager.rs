use std::collections::BTreeMap;

use super::notifiers::{DiscordConfig, DiscordNotifier, LogNotifier};
use super::traits::{HealthReport, NotificationEvent, NotifierPlugin, TargetInfo};
use crate::config::{NotificationsConfig, DEFAULT_CHANNEL};
use crate::models::{Listing, Target};
use crate::utils::error::{AppError, Result};

pub type NotifierPluginBox = Box<dyn NotifierPlugin>;

/// Routes notifications to per-target channels and operator reports to the
/// ops channel. Deliveries are attempted once; failures are logged.
pub struct NotificationDispatcher {
    notifiers: BTreeMap<String, NotifierPluginBox>,
    ops_channel: Option<String>,
}

impl NotificationDispatcher {
    pub fn new() -> Self {
        Self {
            notifiers: BTreeMap::new(),
            ops_channel: None,
        }
    }

    /// Builds a Discord notifier per configured webhook, and a log-only
    /// notifier for every channel a target names without a webhook.
    pub fn from_config(config: &NotificationsConfig, targets: &[Target]) -> Self {
        let mut dispatcher = Self::new();

        for (channel, webhook_url) in &config.channels {
            dispatcher.register(
                channel.clone(),
                Box::new(DiscordNotifier::new(
                    channel.clone(),
                    DiscordConfig {
                        webhook_url: webhook_url.clone(),
                        username: Some(config.username.clone()),
                        avatar_url: config.avatar_url.clone(),
                    },
                )),
            );
        }

        for target in targets {
            if !dispatcher.has_channel(&target.channel) {
                tracing::warn!(
                    channel = %target.channel,
                    target = %target.name,
                    "No webhook configured - notifications for this channel go to the log only"
                );
                dispatcher.register(target.channel.clone(), Box::new(LogNotifier::new(target.channel.clone())));
            }
        }

        if dispatcher.notifiers.is_empty() {
            dispatcher.register(DEFAULT_CHANNEL, Box::new(LogNotifier::new(DEFAULT_CHANNEL)));
        }

        dispatcher.ops_channel = config.ops_channel.clone();
        dispatcher
    }

    /// Register a notifier plugin for a channel, replacing any previous one
    pub fn register(&mut self, channel: impl Into<String>, plugin: NotifierPluginBox) {
        self.notifiers.insert(channel.into(), plugin);
    }

    pub fn with_ops_channel(mut self, channel: impl Into<String>) -> Self {
        self.ops_channel = Some(channel.into());
        self
    }

    pub fn has_channel(&self, channel: &str) -> bool {
        self.notifiers.contains_key(channel)
    }

    /// Ops channel if registered, else `default`, else the first channel.
    fn resolve_ops_channel(&self) -> Option<&str> {
        self.ops_channel
            .as_deref()
            .filter(|c| self.notifiers.contains_key(*c))
            .or_else(|| self.notifiers.contains_key(DEFAULT_CHANNEL).then_some(DEFAULT_CHANNEL))
            .or_else(|| self.notifiers.keys().next().map(String::as_str))
    }

    async fn send(&self, channel: &str, event: &NotificationEvent) -> Result<()> {
        let notifier = self.notifiers.get(channel).ok_or_else(|| AppError::Notification {
            channel: channel.to_string(),
            message: "channel not registered".to_string(),
        })?;

        let result = notifier.notify(event).await?;
        if result.success {
            Ok(())
        } else {
            Err(AppError::Notification {
                channel: channel.to_string(),
                message: result.error.unwrap_or_else(|| "delivery rejected".to_string()),
            })
        }
    }

    async fn send_ops(&self, event: &NotificationEvent) -> bool {
        let Some(channel) = self.resolve_ops_channel() else {
            tracing::warn!(kind = event.kind(), "No notification channel available");
            return false;
        };

        match self.send(channel, event).await {
            Ok(()) => true,
            Err(e) => {
                tracing::error!(kind = event.kind(), "Failed to send notification: {}", e);
                false
            }
        }
    }

    pub async fn notify_new_listing(&self, target: &Target, listing: &Listing, screenshot: Option<Vec<u8>>) -> bool {
        let event = NotificationEvent::NewListing {
            target: TargetInfo::from(target),
            listing: listing.clone(),
            screenshot,
        };

        match self.send(&target.channel, &event).await {
            Ok(()) => {
                tracing::info!(target = %target.name, listing_id = %listing.id, "Notification sent for: {}", listing.title);
                true
            }
            Err(e) => {
                tracing::error!(target = %target.name, listing_id = %listing.id, "Failed to send notification: {}", e);
                false
            }
        }
    }

    pub async fn notify_error(&self, message: impl Into<String>) -> bool {
        self.send_ops(&NotificationEvent::Error {
            message: message.into(),
        })
        .await
    }

    pub async fn notify_health(&self, report: HealthReport) -> bool {
        self.send_ops(&NotificationEvent::Health(report)).await
    }

    pub async fn notify_startup(&self, targets: &[Target]) -> bool {
        self.send_ops(&NotificationEvent::Startup {
            targets: targets.iter().map(TargetInfo::from).collect(),
        })
        .await
    }

    /// Shutdown all plugins
    pub async fn shutdown(&self) {
        for (channel, plugin) in &self.notifiers {
            if let Err(e) = plugin.shutdown().await {
                tracing::warn!(channel = %channel, "Error shutting down notifier plugin: {}", e);
            }
        }
    }
}

impl Default for NotificationDispatcher {
    fn default() -> Self {
        Self::new()
    }
}
