pub mod config;
pub mod core;
pub mod models;
pub mod plugins;
pub mod scheduler;
pub mod scraper;
pub mod utils;

pub use config::AppConfig;
pub use utils::error::{AppError, Result};
