// Notifier plugin implementations
pub mod discord;
pub mod log;

pub use discord::{DiscordConfig, DiscordNotifier};
pub use log::LogNotifier;
