use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

use crate::core::dedupe::state_file_stem;
use crate::models::Target;

/// Channel name that `DISCORD_WEBHOOK_URL` populates when nothing else does.
pub const DEFAULT_CHANNEL: &str = "default";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub scraper: ScraperConfig,
    pub session: SessionConfig,
    pub retry: RetryConfig,
    pub monitor: MonitorConfig,
    pub storage: StorageConfig,
    pub notifications: NotificationsConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
    #[serde(default)]
    pub targets: Vec<Target>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScraperConfig {
    pub chrome_path: Option<String>,
    pub headless: bool,
    pub search_base_url: String,
    pub results_selector: String,
    pub navigation_timeout_secs: u64,
    pub user_agents: Vec<String>,
    pub viewports: Vec<(u32, u32)>,
    pub reap_process_names: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    pub max_age_secs: u64,
    pub close_grace_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub base_delay_secs: u64,
    pub hard_restart_threshold: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    pub poll_interval_secs: u64,
    pub health_interval_secs: u64,
    pub inter_target_delay_secs: u64,
    pub inter_notification_delay_secs: u64,
    pub shutdown_timeout_secs: u64,
    pub screenshots: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub data_dir: PathBuf,
    pub max_seen_per_target: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationsConfig {
    pub username: String,
    pub avatar_url: Option<String>,
    /// Channel name -> Discord webhook URL.
    #[serde(default)]
    pub channels: HashMap<String, String>,
    /// Receives startup, health and error reports.
    pub ops_channel: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub directory: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    pub enabled: bool,
    pub port: u16,
}

impl Default for ScraperConfig {
    fn default() -> Self {
        Self {
            chrome_path: None,
            headless: true,
            search_base_url: "https://www.ebay.com/sch/i.html".to_string(),
            results_selector: ".srp-results".to_string(),
            navigation_timeout_secs: 60,
            user_agents: vec![
                "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36".to_string(),
            ],
            viewports: vec![(1280, 800)],
            reap_process_names: vec!["chrome".to_string(), "chromium".to_string()],
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_age_secs: 3600,
            close_grace_secs: 10,
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_secs: 10,
            hard_restart_threshold: 10,
        }
    }
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: 420,
            health_interval_secs: 6 * 3600,
            inter_target_delay_secs: 5,
            inter_notification_delay_secs: 2,
            shutdown_timeout_secs: 15,
            screenshots: true,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            max_seen_per_target: 2000,
        }
    }
}

impl Default for NotificationsConfig {
    fn default() -> Self {
        Self {
            username: "Listing Watcher".to_string(),
            avatar_url: None,
            channels: HashMap::new(),
            ops_channel: None,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            directory: None,
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            port: 9001,
        }
    }
}

impl SessionConfig {
    pub fn max_age(&self) -> Duration {
        Duration::from_secs(self.max_age_secs)
    }

    pub fn close_grace(&self) -> Duration {
        Duration::from_secs(self.close_grace_secs)
    }
}

impl RetryConfig {
    pub fn base_delay(&self) -> Duration {
        Duration::from_secs(self.base_delay_secs)
    }
}

impl MonitorConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn health_interval(&self) -> Duration {
        Duration::from_secs(self.health_interval_secs)
    }

    pub fn inter_target_delay(&self) -> Duration {
        Duration::from_secs(self.inter_target_delay_secs)
    }

    pub fn inter_notification_delay(&self) -> Duration {
        Duration::from_secs(self.inter_notification_delay_secs)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }
}

impl AppConfig {
    pub fn load(config_dir: &Path) -> Result<Self, ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());
        let layer = |name: &str| config_dir.join(name).to_string_lossy().into_owned();

        let s = Config::builder()
            // Start with default configuration
            .add_source(File::with_name(&layer("default")))
            // Add environment-specific config
            .add_source(File::with_name(&layer(&run_mode)).required(false))
            // Add local config (ignored by git)
            .add_source(File::with_name(&layer("local")).required(false))
            // Add environment variables with prefix "WATCHER_"
            .add_source(
                Environment::with_prefix("WATCHER")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let mut config: AppConfig = s.try_deserialize()?;

        if config.scraper.chrome_path.is_none() {
            config.scraper.chrome_path = env::var("CHROME_PATH").ok();
        }

        if !config.notifications.channels.contains_key(DEFAULT_CHANNEL) {
            if let Ok(webhook_url) = env::var("DISCORD_WEBHOOK_URL") {
                config
                    .notifications
                    .channels
                    .insert(DEFAULT_CHANNEL.to_string(), webhook_url);
            }
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if Url::parse(&self.scraper.search_base_url).is_err() {
            return Err(ConfigError::Message("Invalid scraper.search_base_url".into()));
        }

        if self.scraper.navigation_timeout_secs == 0 {
            return Err(ConfigError::Message("Navigation timeout must be greater than 0".into()));
        }

        if self.scraper.user_agents.is_empty() || self.scraper.viewports.is_empty() {
            return Err(ConfigError::Message("Scraper user_agents and viewports must not be empty".into()));
        }

        if self.session.max_age_secs == 0 {
            return Err(ConfigError::Message("Session max_age_secs must be greater than 0".into()));
        }

        if self.retry.hard_restart_threshold == 0 {
            return Err(ConfigError::Message("Hard restart threshold must be greater than 0".into()));
        }

        if self.retry.hard_restart_threshold <= self.retry.max_retries {
            return Err(ConfigError::Message(
                "Hard restart threshold must exceed max_retries".into(),
            ));
        }

        if self.monitor.poll_interval_secs == 0 || self.monitor.health_interval_secs == 0 {
            return Err(ConfigError::Message("Poll and health intervals must be greater than 0".into()));
        }

        if self.storage.max_seen_per_target == 0 {
            return Err(ConfigError::Message("max_seen_per_target must be greater than 0".into()));
        }

        for (name, webhook_url) in &self.notifications.channels {
            if !is_discord_webhook(webhook_url) {
                return Err(ConfigError::Message(format!(
                    "Invalid Discord webhook URL for channel '{}'",
                    name
                )));
            }
        }

        if let Some(ops) = &self.notifications.ops_channel {
            if !self.notifications.channels.contains_key(ops) {
                return Err(ConfigError::Message(format!("Unknown ops_channel '{}'", ops)));
            }
        }

        if self.targets.is_empty() {
            return Err(ConfigError::Message("At least one target must be configured".into()));
        }

        let mut store_keys = HashSet::new();
        let mut state_files: HashMap<String, String> = HashMap::new();
        for target in &self.targets {
            if target.name.trim().is_empty() || target.query.trim().is_empty() {
                return Err(ConfigError::Message("Target name and query must not be empty".into()));
            }

            if !store_keys.insert(target.store_key()) {
                return Err(ConfigError::Message(format!(
                    "Duplicate store key '{}'",
                    target.store_key()
                )));
            }

            let key = target.store_key();
            if let Some(other) = state_files.insert(state_file_stem(&key), key.clone()) {
                return Err(ConfigError::Message(format!(
                    "Store keys '{}' and '{}' map to the same state file",
                    other, key
                )));
            }

            // Channels without a webhook fall back to log-only delivery, so an
            // unknown channel is only an error once any webhook is configured.
            if !self.notifications.channels.is_empty()
                && !self.notifications.channels.contains_key(&target.channel)
            {
                return Err(ConfigError::Message(format!(
                    "Target '{}' references unknown channel '{}'",
                    target.name, target.channel
                )));
            }
        }

        Ok(())
    }
}

pub fn is_discord_webhook(webhook_url: &str) -> bool {
    webhook_url.starts_with("https://discord.com/api/webhooks/")
        || webhook_url.starts_with("https://discordapp.com/api/webhooks/")
}
