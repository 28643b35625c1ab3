//! Row types shared by the extractors, the content store, and the search index.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Stable identity of a URL: the hash of the URL string
pub fn url_id(url: &str) -> String {
    content_hash(url)
}

/// Hex-encoded blake3 hash, used for URL and document identities
pub fn content_hash(content: &str) -> String {
    blake3::hash(content.as_bytes()).to_hex().to_string()
}

/// Unix seconds to a timestamp. Zero means "unknown" (some sources never
/// recorded a visit time) and maps to `None`.
pub fn from_unix(ts: i64) -> Option<DateTime<Utc>> {
    if ts <= 0 {
        return None;
    }
    DateTime::from_timestamp(ts, 0)
}

/// The epoch, used as the watermark of a source that has never been imported
pub fn epoch() -> DateTime<Utc> {
    DateTime::<Utc>::default()
}

/// A URL as reported by a browser extractor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UrlRow {
    pub url: String,
    pub title: Option<String>,
    pub description: Option<String>,
    pub last_visit: Option<DateTime<Utc>>,
}

impl UrlRow {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            title: None,
            description: None,
            last_visit: None,
        }
    }

    pub fn url_id(&self) -> String {
        url_id(&self.url)
    }
}

/// A single visit as reported by a browser extractor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisitRow {
    pub url: String,
    pub visited_at: DateTime<Utc>,
    /// Filled in with the importing extractor's name when empty
    pub extractor_name: Option<String>,
}

/// A distilled page body, keyed by the hash of its content
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentRow {
    pub document_id: String,
    pub status_code: u16,
    pub accessed_at: DateTime<Utc>,
    pub body: String,
}

impl DocumentRow {
    pub fn new(body: String, status_code: u16, accessed_at: DateTime<Utc>) -> Self {
        Self {
            document_id: content_hash(&body),
            status_code,
            accessed_at,
            body,
        }
    }
}

/// Half-open `[start, end)` byte range of a matched term within a field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    pub start: usize,
    pub end: usize,
}

impl Location {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }
}

/// Field name to matched spans within that field's text
pub type FieldLocations = HashMap<String, Vec<Location>>;

/// What gets written to, and read back from, the full-text index
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchableEntity {
    pub id: String,
    pub url: String,
    pub title: Option<String>,
    pub description: Option<String>,
    pub last_visit: Option<DateTime<Utc>>,
    /// Plaintext body. Markdown syntax is stripped before indexing.
    pub body: Option<String>,
    pub body_id: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub snippet: Option<String>,
    #[serde(default)]
    pub match_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rank: Option<f64>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub locations: FieldLocations,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_id_is_stable() {
        assert_eq!(url_id("https://example.com"), url_id("https://example.com"));
        assert_ne!(url_id("https://example.com"), url_id("https://example.com/"));
        assert_eq!(url_id("https://example.com").len(), 64);
    }

    #[test]
    fn test_document_id_follows_content() {
        let now = Utc::now();
        let a = DocumentRow::new("# Hello".to_string(), 200, now);
        let b = DocumentRow::new("# Hello".to_string(), 404, now);
        assert_eq!(a.document_id, b.document_id);
    }

    #[test]
    fn test_from_unix_zero_is_unknown() {
        assert!(from_unix(0).is_none());
        assert_eq!(from_unix(1_700_000_000).unwrap().timestamp(), 1_700_000_000);
    }
}
