use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parsing error: {message}")]
    Parse { message: String },

    #[error("Scraping error: {0}")]
    Scraping(String),

    #[error("Rendering session unavailable: {0}")]
    SessionUnavailable(String),

    #[error("Notification error: {channel}: {message}")]
    Notification { channel: String, message: String },

    #[error("Persistence error for '{key}': {message}")]
    Persistence { key: String, message: String },

    #[error("Hard fault after {failures} consecutive failures")]
    HardFault { failures: u32 },

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Only sustained failure escalates past the current poll cycle.
    pub fn is_fatal(&self) -> bool {
        matches!(self, AppError::HardFault { .. })
    }
}

impl From<tokio::task::JoinError> for AppError {
    fn from(err: tokio::task::JoinError) -> Self {
        AppError::Internal(format!("blocking task failed: {}", err))
    }
}

// Result type alias for convenience
pub type Result<T> = std::result::Result<T, AppError>;
