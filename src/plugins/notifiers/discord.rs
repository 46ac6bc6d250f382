use crate::plugins::traits::{HealthReport, NotificationEvent, NotificationResult, NotifierPlugin, TargetInfo};
use crate::models::Listing;
use crate::utils::error::{AppError, Result};
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use serde_json::json;
use std::time::Duration;

const LISTING_COLOR: u32 = 0x0066cc;
const ERROR_COLOR: u32 = 0xff3333;
const HEALTH_COLOR: u32 = 0x00cc66;
const STARTUP_COLOR: u32 = 0x9966ff;
const ATTACHMENT_NAME: &str = "listing.png";
const FOOTER: &str = "Listing Watcher";

#[derive(Debug, Clone)]
pub struct DiscordConfig {
    pub webhook_url: String,
    pub username: Option<String>,
    pub avatar_url: Option<String>,
}

pub struct DiscordNotifier {
    client: Client,
    channel: String,
    config: DiscordConfig,
}

impl DiscordNotifier {
    pub fn new(channel: impl Into<String>, config: DiscordConfig) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_else(|_| Client::new());

        DiscordNotifier {
            client,
            channel: channel.into(),
            config,
        }
    }

    fn listing_embed(&self, target: &TargetInfo, listing: &Listing, has_screenshot: bool) -> serde_json::Value {
        let mut embed = json!({
            "title": listing.title,
            "url": listing.url,
            "color": LISTING_COLOR,
            "fields": [
                { "name": "Price", "value": listing.price, "inline": true },
                { "name": "Search", "value": target.name, "inline": true },
            ],
            "footer": { "text": FOOTER },
            "timestamp": chrono::Utc::now().to_rfc3339(),
        });

        if has_screenshot {
            embed["image"] = json!({ "url": format!("attachment://{}", ATTACHMENT_NAME) });
        } else if let Some(image) = &listing.image {
            embed["thumbnail"] = json!({ "url": image });
        }

        embed
    }

    fn health_embed(&self, report: &HealthReport) -> serde_json::Value {
        let uptime = chrono::Utc::now().signed_duration_since(report.started_at);
        let last_success = report
            .last_success
            .map(|t| t.to_rfc3339())
            .unwrap_or_else(|| "never".to_string());

        json!({
            "title": "Health report",
            "color": HEALTH_COLOR,
            "fields": [
                { "name": "Uptime", "value": format!("{}h {}m", uptime.num_hours(), uptime.num_minutes() % 60), "inline": true },
                { "name": "Cycles", "value": report.cycles_completed.to_string(), "inline": true },
                { "name": "Notified", "value": report.listings_notified.to_string(), "inline": true },
                { "name": "Targets", "value": report.target_count.to_string(), "inline": true },
                { "name": "Consecutive failures", "value": report.consecutive_failures.to_string(), "inline": true },
                { "name": "Last success", "value": last_success, "inline": false },
            ],
            "footer": { "text": FOOTER },
            "timestamp": chrono::Utc::now().to_rfc3339(),
        })
    }

    fn startup_embed(&self, targets: &[TargetInfo]) -> serde_json::Value {
        let description = targets
            .iter()
            .map(|t| {
                if t.required_keywords.is_empty() {
                    format!("• **{}**: `{}`", t.name, t.query)
                } else {
                    format!("• **{}**: `{}` (requires: {})", t.name, t.query, t.required_keywords.join(", "))
                }
            })
            .collect::<Vec<_>>()
            .join("\n");

        json!({
            "title": format!("Monitoring {} search(es)", targets.len()),
            "description": description,
            "color": STARTUP_COLOR,
            "footer": { "text": FOOTER },
            "timestamp": chrono::Utc::now().to_rfc3339(),
        })
    }

    fn create_webhook_payload(&self, event: &NotificationEvent) -> serde_json::Value {
        let (content, embed) = match event {
            NotificationEvent::NewListing { target, listing, screenshot } => (
                "**New listing found!**".to_string(),
                self.listing_embed(target, listing, screenshot.is_some()),
            ),
            NotificationEvent::Error { message } => (
                "**Monitor error**".to_string(),
                json!({
                    "title": "Scrape failure",
                    "description": message,
                    "color": ERROR_COLOR,
                    "footer": { "text": FOOTER },
                    "timestamp": chrono::Utc::now().to_rfc3339(),
                }),
            ),
            NotificationEvent::Health(report) => (String::new(), self.health_embed(report)),
            NotificationEvent::Startup { targets } => {
                ("**Monitor started**".to_string(), self.startup_embed(targets))
            }
        };

        let mut payload = json!({ "embeds": [embed] });

        if !content.is_empty() {
            payload["content"] = json!(content);
        }

        if let Some(username) = &self.config.username {
            payload["username"] = json!(username);
        }

        if let Some(avatar_url) = &self.config.avatar_url {
            payload["avatar_url"] = json!(avatar_url);
        }

        payload
    }

    fn notification_error(&self, message: impl Into<String>) -> AppError {
        AppError::Notification {
            channel: self.channel.clone(),
            message: message.into(),
        }
    }
}

#[async_trait]
impl NotifierPlugin for DiscordNotifier {
    fn name(&self) -> &str {
        &self.channel
    }

    fn plugin_type(&self) -> &str {
        "discord"
    }

    async fn notify(&self, event: &NotificationEvent) -> Result<NotificationResult> {
        let payload = self.create_webhook_payload(event);

        let request = match event {
            NotificationEvent::NewListing {
                screenshot: Some(png), ..
            } => {
                let file = Part::bytes(png.clone())
                    .file_name(ATTACHMENT_NAME)
                    .mime_str("image/png")?;
                let form = Form::new()
                    .text("payload_json", payload.to_string())
                    .part("file", file);
                self.client.post(&self.config.webhook_url).multipart(form)
            }
            _ => self.client.post(&self.config.webhook_url).json(&payload),
        };

        let response = request.send().await?;
        let status = response.status();

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(self.notification_error(format!("Discord API error: {} - {}", status, body)));
        }

        tracing::debug!(channel = %self.channel, kind = event.kind(), "Discord notification sent");

        Ok(NotificationResult {
            success: true,
            message_id: None,
            error: None,
        })
    }
}
