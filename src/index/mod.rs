//! Full-text index
//!
//! The index holds one [`SearchableEntity`] per URL and answers ranked
//! queries with per-field match locations. It is opened once and shared as
//! an `Arc<dyn SearchIndex>`.

mod fts;

pub use fts::FtsIndex;

use crate::error::Result;
use crate::models::{FieldLocations, SearchableEntity};
use async_trait::async_trait;
use serde::Serialize;

/// Indexed fields, in column order
pub const FIELD_URL: &str = "url";
pub const FIELD_TITLE: &str = "title";
pub const FIELD_DESCRIPTION: &str = "description";
pub const FIELD_BODY: &str = "body";
/// Pseudo-field for match locations within a hit's snippet
pub const FIELD_SNIPPET: &str = "snippet";

/// One ranked match
#[derive(Debug, Clone, Serialize)]
pub struct IndexHit {
    pub id: String,
    /// Higher is better
    pub score: f64,
    pub snippet: Option<String>,
    pub locations: FieldLocations,
}

impl IndexHit {
    /// Matched spans across every field
    pub fn match_count(&self) -> usize {
        self.locations
            .iter()
            .filter(|(field, _)| field.as_str() != FIELD_SNIPPET)
            .map(|(_, spans)| spans.len())
            .sum()
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct IndexSearchResult {
    pub hits: Vec<IndexHit>,
    /// Matches in the whole index, not just the returned hits
    pub total: usize,
}

/// Search index backend
#[async_trait]
pub trait SearchIndex: Send + Sync {
    /// Add or replace entities, keyed by id. Returns how many were written.
    async fn index_batch(&self, entities: &[SearchableEntity]) -> Result<usize>;

    /// Ranked search. A malformed query is [`crate::error::Error::QueryParse`].
    async fn search(&self, query: &str, limit: usize) -> Result<IndexSearchResult>;

    /// Number of indexed entities
    async fn count(&self) -> Result<usize>;

    async fn close(&self) -> Result<()>;
}
