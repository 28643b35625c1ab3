//! The two batch passes that turn imported history into a searchable corpus
//!
//! - Scrape: fetch every URL that has no document yet and store what came back
//! - Index: write every URL whose current document is newer than its index
//!   watermark to the full-text index, then advance the watermark
//!
//! Both passes work in bounded batches and only check for cancellation
//! between batches, so an interrupted run redoes at most one batch.

use crate::config::PipelineConfig;
use crate::crawl::{FetchedPage, PageFetcher};
use crate::distill::{distill, strip_markdown};
use crate::error::{Error, Result};
use crate::index::SearchIndex;
use crate::models::{from_unix, DocumentRow, SearchableEntity};
use crate::progress::{advance_progress, finish_progress, start_progress_bar};
use crate::store::{ContentStore, PendingUrl, Unprocessed};
use chrono::Utc;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Outcome of a scrape pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ScrapeStats {
    pub batches: usize,
    pub processed: usize,
    pub failed_fetches: usize,
    pub documents_created: usize,
}

/// Outcome of an index pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IndexStats {
    pub batches: usize,
    pub indexed: usize,
}

/// Scrape and index passes over one content store and one index
pub struct Pipeline {
    store: ContentStore,
    index: Arc<dyn SearchIndex>,
    fetcher: Arc<dyn PageFetcher>,
    config: PipelineConfig,
}

impl Pipeline {
    pub fn new(
        store: ContentStore,
        index: Arc<dyn SearchIndex>,
        fetcher: Arc<dyn PageFetcher>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            store,
            index,
            fetcher,
            config,
        }
    }

    /// Fetch and store a document for every URL that lacks one.
    ///
    /// Failed fetches are stored too, as empty documents, so a URL is
    /// attempted once rather than on every run.
    pub async fn scrape(&self, cancel: &AtomicBool) -> Result<ScrapeStats> {
        let mut stats = ScrapeStats::default();
        let pending = self.store.count_where(Unprocessed::Unscraped.into()).await?;
        info!("{} URLs to scrape", pending);
        let pb = start_progress_bar(pending, "Scraping");

        loop {
            if cancel.load(Ordering::Relaxed) {
                info!("Scrape cancelled after {} batches", stats.batches);
                break;
            }

            let batch = self
                .store
                .select_unprocessed(Unprocessed::Unscraped, self.config.scrape_batch_size)
                .await?;
            if batch.is_empty() {
                break;
            }

            let urls: Vec<String> = batch.iter().map(|p| p.url.clone()).collect();
            let mut pages = self.fetcher.fetch_all(&urls).await;

            for pending in &batch {
                let page = pages.remove(&pending.url).unwrap_or_else(|| {
                    warn!(url = %pending.url, "Fetcher returned no result");
                    missing_page(&pending.url)
                });

                if !page.is_success() {
                    stats.failed_fetches += 1;
                }
                if self.record_page(pending, &page).await? {
                    stats.documents_created += 1;
                }
                stats.processed += 1;
            }

            stats.batches += 1;
            advance_progress(&pb, batch.len() as u64);
            debug!(batch = stats.batches, urls = batch.len(), "Scraped batch");
        }

        finish_progress(pb, "Scrape complete");
        info!(
            processed = stats.processed,
            failed = stats.failed_fetches,
            documents = stats.documents_created,
            "Scrape finished"
        );
        Ok(stats)
    }

    /// Distill one fetched page and store it. Returns whether the document
    /// was new.
    async fn record_page(&self, pending: &PendingUrl, page: &FetchedPage) -> Result<bool> {
        let (body, title) = if page.is_success() {
            let distilled = distill(&page.body, page.content_type.as_deref());
            (distilled.markdown, distilled.title)
        } else {
            (String::new(), None)
        };

        let doc = DocumentRow::new(body, page.status_code, Utc::now());
        let created = self.store.record_document(&pending.url_id, &doc).await?;

        if let Some(title) = title {
            if pending.title.as_deref().map_or(true, str::is_empty) {
                self.store.fill_missing_title(&pending.url_id, &title).await?;
            }
        }

        Ok(created)
    }

    /// Write stale or never-indexed URLs to the index, at most `limit` of them.
    pub async fn build_index(
        &self,
        limit: Option<usize>,
        cancel: &AtomicBool,
    ) -> Result<IndexStats> {
        let mut stats = IndexStats::default();
        let pending = self.store.count_where(Unprocessed::Unindexed.into()).await?;
        let target = limit.map_or(pending, |l| l.min(pending));
        info!("{} URLs to index", target);
        let pb = start_progress_bar(target, "Indexing");

        loop {
            if cancel.load(Ordering::Relaxed) {
                info!("Indexing cancelled after {} batches", stats.batches);
                break;
            }

            let batch_size = match limit {
                Some(l) if stats.indexed >= l => break,
                Some(l) => self.config.index_batch_size.min(l - stats.indexed),
                None => self.config.index_batch_size,
            };

            let batch = self
                .store
                .select_unprocessed(Unprocessed::Unindexed, batch_size)
                .await?;
            if batch.is_empty() {
                break;
            }

            let entities: Vec<SearchableEntity> = batch.iter().map(to_entity).collect();
            let written = self.index.index_batch(&entities).await?;
            if written == 0 {
                break;
            }

            // Only after the index write has gone through
            let ids: Vec<String> = entities.into_iter().map(|e| e.id).collect();
            self.mark_indexed(&ids).await?;

            stats.batches += 1;
            stats.indexed += written;
            advance_progress(&pb, written as u64);
            debug!(batch = stats.batches, indexed = written, "Indexed batch");
        }

        finish_progress(pb, "Indexing complete");
        info!(indexed = stats.indexed, "Indexing finished");
        Ok(stats)
    }

    /// Forget every index watermark and rebuild the index, at most `limit`
    /// URLs of it. Scraped documents are left alone.
    pub async fn reindex(&self, limit: Option<usize>, cancel: &AtomicBool) -> Result<IndexStats> {
        self.store.clear_indexed_at().await?;
        self.build_index(limit, cancel).await
    }

    /// Advance the watermark, riding out a locked database for a while
    async fn mark_indexed(&self, ids: &[String]) -> Result<()> {
        let now = Utc::now();
        let mut attempts = 0u32;

        loop {
            attempts += 1;
            match self.store.upsert_url_meta(ids, Some(now)).await {
                Ok(()) => return Ok(()),
                Err(e) if e.is_database_locked() => {
                    if attempts > self.config.lock_retries {
                        return Err(Error::IndexBusy {
                            attempts,
                            reason: e.to_string(),
                        });
                    }
                    warn!(attempt = attempts, "Database locked, retrying: {}", e);
                    tokio::time::sleep(Duration::from_millis(self.config.lock_backoff_ms)).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

fn missing_page(url: &str) -> FetchedPage {
    FetchedPage {
        requested_url: url.to_string(),
        final_url: url.to_string(),
        body: String::new(),
        status_code: 0,
        content_type: None,
        redirects: Vec::new(),
        error: Some(Error::Fetch("no result".to_string())),
    }
}

fn to_entity(pending: &PendingUrl) -> SearchableEntity {
    SearchableEntity {
        id: pending.url_id.clone(),
        url: pending.url.clone(),
        title: pending.title.clone(),
        description: pending.description.clone(),
        last_visit: pending.last_visit.and_then(from_unix),
        body: pending.body.as_deref().map(strip_markdown),
        body_id: pending.document_id.clone(),
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::FtsIndex;
    use crate::models::{url_id, UrlRow};
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use tempfile::TempDir;

    /// Serves canned bodies and remembers what was asked for
    #[derive(Default)]
    struct StubFetcher {
        bodies: HashMap<String, (u16, String)>,
        requested: Mutex<Vec<String>>,
    }

    impl StubFetcher {
        fn with(pages: &[(&str, u16, &str)]) -> Self {
            Self {
                bodies: pages
                    .iter()
                    .map(|(url, status, body)| (url.to_string(), (*status, body.to_string())))
                    .collect(),
                requested: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl PageFetcher for StubFetcher {
        async fn fetch_all(&self, urls: &[String]) -> HashMap<String, FetchedPage> {
            self.requested.lock().unwrap().extend(urls.iter().cloned());
            urls.iter()
                .map(|url| {
                    let (status, body) = self
                        .bodies
                        .get(url)
                        .cloned()
                        .unwrap_or((404, String::new()));
                    let error = (status != 200).then(|| Error::Fetch(format!("HTTP {}", status)));
                    let page = FetchedPage {
                        requested_url: url.clone(),
                        final_url: url.clone(),
                        body,
                        status_code: status,
                        content_type: Some("text/html".to_string()),
                        redirects: Vec::new(),
                        error,
                    };
                    (url.clone(), page)
                })
                .collect()
        }
    }

    type Harness = (Pipeline, ContentStore, Arc<FtsIndex>, Arc<StubFetcher>, TempDir);

    async fn setup(fetcher: StubFetcher) -> Harness {
        let tmp = TempDir::new().unwrap();
        let store = ContentStore::open(&tmp.path().join("db.sqlite")).await.unwrap();
        let index = Arc::new(FtsIndex::open(&tmp.path().join("searchindex.db")).await.unwrap());
        let fetcher = Arc::new(fetcher);
        let config = PipelineConfig {
            scrape_batch_size: 2,
            index_batch_size: 2,
            lock_backoff_ms: 10,
            ..PipelineConfig::default()
        };
        let pipeline = Pipeline::new(store.clone(), index.clone(), fetcher.clone(), config);
        (pipeline, store, index, fetcher, tmp)
    }

    fn page(title: &str, text: &str) -> String {
        format!("<html><head><title>{}</title></head><body><p>{}</p></body></html>", title, text)
    }

    #[tokio::test]
    async fn test_scrape_dedupes_and_records_failures() {
        let same = page("Same", "identical content");
        let stub = StubFetcher::with(&[
            ("https://a.test/", 200, same.as_str()),
            ("https://b.test/", 200, same.as_str()),
            ("https://c.test/", 200, page("C", "other content").as_str()),
        ]);
        let (pipeline, store, _index, fetcher, _tmp) = setup(stub).await;

        for url in ["https://a.test/", "https://b.test/", "https://c.test/", "https://gone.test/"] {
            store.upsert_url(&UrlRow::new(url)).await.unwrap();
        }

        let cancel = AtomicBool::new(false);
        let stats = pipeline.scrape(&cancel).await.unwrap();
        assert_eq!(stats.processed, 4);
        assert_eq!(stats.batches, 2);
        assert_eq!(stats.failed_fetches, 1);
        // a and b share one document, the failed fetch gets the empty one
        assert_eq!(stats.documents_created, 3);

        let store_stats = store.stats().await.unwrap();
        assert_eq!(store_stats.document_count, 3);
        assert_eq!(store_stats.edge_count, 4);
        assert_eq!(store_stats.unscraped_count, 0);

        // Titles the browser never recorded come from the page
        let urls = store.urls_by_id(&[url_id("https://c.test/")]).await.unwrap();
        assert_eq!(urls[0].title.as_deref(), Some("C"));

        // Nothing left to do on a second run
        let again = pipeline.scrape(&cancel).await.unwrap();
        assert_eq!(again.processed, 0);
        assert_eq!(fetcher.requested.lock().unwrap().len(), 4);
    }

    #[tokio::test]
    async fn test_build_index_advances_watermark() {
        let stub = StubFetcher::with(&[
            ("https://a.test/", 200, page("A", "alpha words").as_str()),
            ("https://b.test/", 200, page("B", "beta words").as_str()),
            ("https://c.test/", 200, page("C", "gamma words").as_str()),
        ]);
        let (pipeline, store, index, _fetcher, _tmp) = setup(stub).await;
        for url in ["https://a.test/", "https://b.test/", "https://c.test/", "https://gone.test/"] {
            store.upsert_url(&UrlRow::new(url)).await.unwrap();
        }

        let cancel = AtomicBool::new(false);
        pipeline.scrape(&cancel).await.unwrap();

        let stats = pipeline.build_index(None, &cancel).await.unwrap();
        // The failed fetch has an empty body and is never indexed
        assert_eq!(stats.indexed, 3);
        assert_eq!(index.count().await.unwrap(), 3);

        for url in ["https://a.test/", "https://b.test/", "https://c.test/"] {
            let indexed_at = store.indexed_at(&url_id(url)).await.unwrap().unwrap();
            let docs = store.documents_for_url(&url_id(url)).await.unwrap();
            assert!(indexed_at >= docs[0].accessed_at);
        }
        assert_eq!(store.indexed_at(&url_id("https://gone.test/")).await.unwrap(), None);

        let again = pipeline.build_index(None, &cancel).await.unwrap();
        assert_eq!(again.indexed, 0);

        let result = index.search("beta", 10).await.unwrap();
        assert_eq!(result.total, 1);
        assert_eq!(result.hits[0].id, url_id("https://b.test/"));
    }

    #[tokio::test]
    async fn test_reindex_respects_limit() {
        let stub = StubFetcher::with(&[
            ("https://a.test/", 200, page("A", "alpha").as_str()),
            ("https://b.test/", 200, page("B", "beta").as_str()),
            ("https://c.test/", 200, page("C", "gamma").as_str()),
        ]);
        let (pipeline, store, _index, _fetcher, _tmp) = setup(stub).await;
        for url in ["https://a.test/", "https://b.test/", "https://c.test/"] {
            store.upsert_url(&UrlRow::new(url)).await.unwrap();
        }

        let cancel = AtomicBool::new(false);
        pipeline.scrape(&cancel).await.unwrap();
        pipeline.build_index(None, &cancel).await.unwrap();
        assert_eq!(store.count_where(crate::store::UrlFilter::Indexed).await.unwrap(), 3);

        let stats = pipeline.reindex(Some(1), &cancel).await.unwrap();
        assert_eq!(stats.indexed, 1);
        assert_eq!(store.count_where(crate::store::UrlFilter::Indexed).await.unwrap(), 1);

        let stats = pipeline.reindex(None, &cancel).await.unwrap();
        assert_eq!(stats.indexed, 3);
    }

    #[tokio::test]
    async fn test_cancelled_pass_does_nothing() {
        let stub = StubFetcher::with(&[("https://a.test/", 200, page("A", "alpha").as_str())]);
        let (pipeline, store, _index, fetcher, _tmp) = setup(stub).await;
        store.upsert_url(&UrlRow::new("https://a.test/")).await.unwrap();

        let cancel = AtomicBool::new(true);
        let stats = pipeline.scrape(&cancel).await.unwrap();
        assert_eq!(stats.batches, 0);
        assert!(fetcher.requested.lock().unwrap().is_empty());
    }
}
