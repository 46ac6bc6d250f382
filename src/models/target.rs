use serde::{Deserialize, Serialize};
use url::Url;

use crate::config::DEFAULT_CHANNEL;
use crate::utils::error::{AppError, Result};

/// One independently configured marketplace search.
///
/// Immutable for the lifetime of the process; loaded once from the target
/// catalog in configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Target {
    pub name: String,
    pub query: String,
    #[serde(default)]
    pub category_id: Option<String>,
    /// Every keyword must appear in a listing title (case-insensitive).
    #[serde(default)]
    pub required_keywords: Vec<String>,
    #[serde(default = "default_channel")]
    pub channel: String,
    #[serde(default)]
    pub store_key: Option<String>,
}

fn default_channel() -> String {
    DEFAULT_CHANNEL.to_string()
}

impl Target {
    pub fn new(name: impl Into<String>, query: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            query: query.into(),
            category_id: None,
            required_keywords: Vec::new(),
            channel: default_channel(),
            store_key: None,
        }
    }

    pub fn with_keywords<I, S>(mut self, keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.required_keywords = keywords.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_category(mut self, category_id: impl Into<String>) -> Self {
        self.category_id = Some(category_id.into());
        self
    }

    pub fn with_channel(mut self, channel: impl Into<String>) -> Self {
        self.channel = channel.into();
        self
    }

    /// Identity of the durable dedupe record; a slug of the name unless
    /// configured explicitly.
    pub fn store_key(&self) -> String {
        match &self.store_key {
            Some(key) => key.clone(),
            None => slugify(&self.name),
        }
    }

    /// Search URL sorted newest-first (`_sop=10`).
    pub fn search_url(&self, base_url: &str) -> Result<Url> {
        let mut url = Url::parse(base_url).map_err(|e| AppError::Parse {
            message: format!("invalid search base URL '{}': {}", base_url, e),
        })?;

        {
            let mut pairs = url.query_pairs_mut();
            pairs.append_pair("_nkw", &self.query);
            pairs.append_pair("_sop", "10");
            if let Some(category) = &self.category_id {
                pairs.append_pair("_sacat", category);
            }
        }

        Ok(url)
    }

    /// Case-insensitive substring match; all keywords must be present.
    pub fn matches_keywords(&self, title: &str) -> bool {
        let title = title.to_lowercase();
        self.required_keywords
            .iter()
            .all(|keyword| title.contains(&keyword.to_lowercase()))
    }
}

fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    let mut pending_dash = false;

    for c in name.chars() {
        if c.is_ascii_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(c.to_ascii_lowercase());
        } else {
            pending_dash = true;
        }
    }

    if slug.is_empty() {
        "target".to_string()
    } else {
        slug
    }
}
