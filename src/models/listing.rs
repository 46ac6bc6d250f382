use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use url::Url;

/// Longest title carried into a notification (Discord embed title limit).
pub const MAX_TITLE_CHARS: usize = 256;

pub const PRICE_UNAVAILABLE: &str = "N/A";

/// Candidate listing exactly as the extraction layer produced it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawListing {
    pub id: String,
    pub title: String,
    pub url: String,
    pub price: Option<String>,
    pub image: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Listing {
    pub id: String,
    pub title: String,
    pub url: String,
    pub price: String,
    pub image: Option<String>,
}

impl Listing {
    /// Normalizes a raw candidate. Returns `None` when the id is missing.
    pub fn from_raw(raw: RawListing) -> Option<Self> {
        let id = raw.id.trim();
        if id.is_empty() {
            return None;
        }

        let url = canonicalize_url(&raw.url);
        let image = raw.image.as_deref().and_then(|image| absolute_url(&url, image));
        let price = raw
            .price
            .map(|p| p.trim().to_string())
            .filter(|p| !p.is_empty())
            .unwrap_or_else(|| PRICE_UNAVAILABLE.to_string());

        Some(Self {
            id: id.to_string(),
            title: truncate_title(raw.title.trim()),
            url,
            price,
            image,
        })
    }

    /// Normalizes a whole extraction result, dropping id-less entries and
    /// repeated ids (first occurrence wins).
    pub fn normalize_batch(raw: Vec<RawListing>) -> Vec<Self> {
        let mut seen = HashSet::new();
        raw.into_iter()
            .filter_map(Self::from_raw)
            .filter(|listing| seen.insert(listing.id.clone()))
            .collect()
    }
}

/// Strips query string and fragment.
pub fn canonicalize_url(raw: &str) -> String {
    match Url::parse(raw.trim()) {
        Ok(mut url) => {
            url.set_query(None);
            url.set_fragment(None);
            url.to_string()
        }
        Err(_) => raw
            .split(['?', '#'])
            .next()
            .unwrap_or_default()
            .trim()
            .to_string(),
    }
}

fn absolute_url(base: &str, candidate: &str) -> Option<String> {
    let candidate = candidate.trim();
    if candidate.is_empty() || candidate.starts_with("data:") {
        return None;
    }

    match Url::parse(candidate) {
        Ok(url) => Some(url.to_string()),
        Err(url::ParseError::RelativeUrlWithoutBase) => Url::parse(base)
            .ok()
            .and_then(|base| base.join(candidate).ok())
            .map(|url| url.to_string()),
        Err(_) => None,
    }
}

fn truncate_title(title: &str) -> String {
    if title.chars().count() <= MAX_TITLE_CHARS {
        return title.to_string();
    }

    let mut truncated: String = title.chars().take(MAX_TITLE_CHARS - 3).collect();
    truncated.push_str("...");
    truncated
}
