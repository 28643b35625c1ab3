//! Querying the corpus
//!
//! Full-text queries go through the search index and are hydrated from the
//! content store. Structured queries and the recent list read the store
//! directly.

mod highlight;

pub use highlight::highlight_all;

use crate::error::Result;
use crate::index::SearchIndex;
use crate::models::{Location, SearchableEntity};
use crate::store::{ContentStore, UrlEntity};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Row cap for structured search
pub const STRUCTURED_LIMIT: usize = 100;

/// Results with the uncapped match count
#[derive(Debug, Clone, Default, Serialize)]
pub struct SearchResult {
    pub results: Vec<SearchableEntity>,
    pub total: usize,
}

fn entity_from_url(url: UrlEntity) -> SearchableEntity {
    SearchableEntity {
        last_visit: url.last_visit_at(),
        id: url.url_id,
        url: url.url,
        title: url.title,
        description: url.description,
        ..Default::default()
    }
}

/// Match locations recorded for one field of a result
pub fn field_locations<'a>(entity: &'a SearchableEntity, field: &str) -> &'a [Location] {
    entity
        .locations
        .get(field)
        .map(Vec::as_slice)
        .unwrap_or(&[])
}

/// Search front end over the store and the index
pub struct Searcher {
    store: ContentStore,
    index: Arc<dyn SearchIndex>,
    limit: usize,
}

impl Searcher {
    pub fn new(store: ContentStore, index: Arc<dyn SearchIndex>, limit: usize) -> Self {
        Self {
            store,
            index,
            limit,
        }
    }

    /// Ranked full-text search, best match first
    pub async fn search(&self, query: &str) -> Result<SearchResult> {
        let found = self.index.search(query, self.limit).await?;
        let ids: Vec<String> = found.hits.iter().map(|h| h.id.clone()).collect();

        let mut urls: HashMap<String, UrlEntity> = self
            .store
            .urls_by_id(&ids)
            .await?
            .into_iter()
            .map(|u| (u.url_id.clone(), u))
            .collect();

        let mut results = Vec::with_capacity(found.hits.len());
        for hit in found.hits {
            let Some(url) = urls.remove(&hit.id) else {
                debug!(id = %hit.id, "Indexed entity missing from store");
                continue;
            };

            let match_count = hit.match_count();
            results.push(SearchableEntity {
                rank: Some(hit.score),
                snippet: hit.snippet,
                match_count,
                locations: hit.locations,
                ..entity_from_url(url)
            });
        }

        Ok(SearchResult {
            results,
            total: found.total,
        })
    }

    /// Substring match over URL, title and description, most recent first
    pub async fn search_urls(&self, query: &str) -> Result<SearchResult> {
        let (rows, total) = self.store.search_urls(query, STRUCTURED_LIMIT).await?;
        Ok(SearchResult {
            results: rows.into_iter().map(entity_from_url).collect(),
            total,
        })
    }

    /// Most recently visited URLs
    pub async fn recent(&self, limit: usize) -> Result<SearchResult> {
        let (rows, total) = self.store.recent_urls(limit).await?;
        Ok(SearchResult {
            results: rows.into_iter().map(entity_from_url).collect(),
            total,
        })
    }
}
