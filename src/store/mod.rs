//! Content store backed by SQLite
//!
//! Owns every persisted row:
//! - URLs and their visits, as imported from browser history
//! - The per-URL index watermark (`urls_meta.indexed_at`)
//! - Content-addressed documents and the URL to document edges
//!
//! All writes are idempotent, so any pass that dies half way can simply be
//! run again.

use crate::config::Config;
use crate::error::Result;
use crate::models::{epoch, from_unix, DocumentRow, UrlRow, VisitRow};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteSynchronous,
};
use sqlx::{FromRow, QueryBuilder, Sqlite};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info};

/// Rows per multi-row statement. Well below SQLite's bound parameter limit.
const MAX_ROWS_PER_STATEMENT: usize = 400;

/// Picks each URL's current document: the newest by access time, ties broken
/// by the newest edge.
const CURRENT_DOCUMENTS_CTE: &str = r#"
    WITH current_docs AS (
        SELECT e.url_id, d.document_id, d.body, d.accessed_at,
               ROW_NUMBER() OVER (
                   PARTITION BY e.url_id
                   ORDER BY d.accessed_at DESC, e.linked_at DESC
               ) AS rn
        FROM url_document_edges e
        JOIN documents d ON d.document_id = e.document_id
    )
"#;

const STALE_INDEX_PREDICATE: &str = r#"
    c.rn = 1
    AND c.body <> ''
    AND (m.indexed_at IS NULL OR m.indexed_at < c.accessed_at)
"#;

/// A URL row as stored
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct UrlEntity {
    pub url_id: String,
    pub url: String,
    pub title: Option<String>,
    pub description: Option<String>,
    pub last_visit: Option<i64>,
}

impl UrlEntity {
    pub fn last_visit_at(&self) -> Option<DateTime<Utc>> {
        self.last_visit.and_then(from_unix)
    }
}

/// A URL picked up by [`ContentStore::select_unprocessed`]. The document
/// columns are only set for [`Unprocessed::Unindexed`].
#[derive(Debug, Clone, FromRow)]
pub struct PendingUrl {
    pub url_id: String,
    pub url: String,
    pub title: Option<String>,
    pub description: Option<String>,
    pub last_visit: Option<i64>,
    pub document_id: Option<String>,
    pub body: Option<String>,
    pub accessed_at: Option<i64>,
}

/// The two kinds of work the indexing pipeline picks up
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Unprocessed {
    /// URLs with no linked document yet
    Unscraped,
    /// URLs whose current, non-empty document is newer than their index watermark
    Unindexed,
}

/// Predicates for [`ContentStore::count_where`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UrlFilter {
    All,
    Indexed,
    Pending(Unprocessed),
}

impl From<Unprocessed> for UrlFilter {
    fn from(kind: Unprocessed) -> Self {
        UrlFilter::Pending(kind)
    }
}

/// Outcome of importing one extractor's rows
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportStats {
    pub urls: usize,
    pub visits_inserted: usize,
    pub visits_ignored: usize,
}

/// Row counts for the status command
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreStats {
    pub url_count: usize,
    pub visit_count: usize,
    pub document_count: usize,
    pub edge_count: usize,
    pub indexed_count: usize,
    pub unscraped_count: usize,
    pub unindexed_count: usize,
}

/// Content store handle
#[derive(Clone)]
pub struct ContentStore {
    pool: SqlitePool,
    write_lock: Arc<Mutex<()>>,
}

impl ContentStore {
    /// Open the content store configured in `config`
    pub async fn connect(config: &Config) -> Result<Self> {
        Self::open(&config.paths.db_file).await
    }

    /// Open (creating if needed) the store at `db_path` and apply migrations
    pub async fn open(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let options = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(Duration::from_secs(5));

        debug!("Connecting to SQLite database at {:?}", db_path);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        sqlx::migrate!("./migrations").run(&pool).await?;

        Ok(Self {
            pool,
            write_lock: Arc::new(Mutex::new(())),
        })
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    // ===== History =====

    /// Latest visit already recorded for the named extractor, or the epoch
    pub async fn latest_visit_time(&self, extractor_name: &str) -> Result<DateTime<Utc>> {
        let latest: Option<i64> =
            sqlx::query_scalar("SELECT MAX(visit_time) FROM visits WHERE extractor_name = ?")
                .bind(extractor_name)
                .fetch_one(&self.pool)
                .await?;

        Ok(latest.and_then(from_unix).unwrap_or_else(epoch))
    }

    /// Insert or update a URL. Title and description are only replaced by
    /// non-empty values and the last visit only moves forward.
    pub async fn upsert_url(&self, row: &UrlRow) -> Result<String> {
        let url_id = row.url_id();
        upsert_url_query(&url_id, row).execute(&self.pool).await?;
        Ok(url_id)
    }

    /// Insert a visit unless one already exists for the same URL and instant.
    /// Returns whether a row was written.
    pub async fn insert_visit(&self, row: &VisitRow, extractor_name: &str) -> Result<bool> {
        let result = insert_visit_query(row, extractor_name)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() == 1)
    }

    /// Import one extractor's URLs and visits in a single transaction
    pub async fn import_rows(
        &self,
        extractor_name: &str,
        urls: &[UrlRow],
        visits: &[VisitRow],
    ) -> Result<ImportStats> {
        let _guard = self.write_lock.lock().await;
        let mut tx = self.pool.begin().await?;
        let mut stats = ImportStats::default();

        for row in urls {
            let url_id = row.url_id();
            upsert_url_query(&url_id, row).execute(&mut *tx).await?;
            stats.urls += 1;
        }

        for row in visits {
            let result = insert_visit_query(row, extractor_name)
                .execute(&mut *tx)
                .await?;
            if result.rows_affected() == 1 {
                stats.visits_inserted += 1;
            } else {
                stats.visits_ignored += 1;
            }
        }

        tx.commit().await?;

        debug!(
            source = %extractor_name,
            urls = stats.urls,
            visits = stats.visits_inserted,
            duplicates = stats.visits_ignored,
            "Imported history rows"
        );
        Ok(stats)
    }

    /// Set the index watermark for a batch of URLs
    pub async fn upsert_url_meta(
        &self,
        url_ids: &[String],
        indexed_at: Option<DateTime<Utc>>,
    ) -> Result<()> {
        if url_ids.is_empty() {
            return Ok(());
        }

        let ts = indexed_at.map(|t| t.timestamp());
        let _guard = self.write_lock.lock().await;
        let mut tx = self.pool.begin().await?;

        for chunk in url_ids.chunks(MAX_ROWS_PER_STATEMENT) {
            let mut qb = QueryBuilder::<Sqlite>::new("INSERT INTO urls_meta (url_id, indexed_at) ");
            qb.push_values(chunk, |mut b, id| {
                b.push_bind(id).push_bind(ts);
            });
            qb.push(" ON CONFLICT(url_id) DO UPDATE SET indexed_at = excluded.indexed_at");
            qb.build().execute(&mut *tx).await?;
        }

        tx.commit().await?;
        Ok(())
    }

    /// Index watermark of one URL
    pub async fn indexed_at(&self, url_id: &str) -> Result<Option<DateTime<Utc>>> {
        let ts: Option<Option<i64>> =
            sqlx::query_scalar("SELECT indexed_at FROM urls_meta WHERE url_id = ?")
                .bind(url_id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(ts.flatten().and_then(from_unix))
    }

    /// Forget every index watermark so the next index pass redoes everything
    pub async fn clear_indexed_at(&self) -> Result<u64> {
        let _guard = self.write_lock.lock().await;
        let result = sqlx::query("UPDATE urls_meta SET indexed_at = NULL")
            .execute(&self.pool)
            .await?;
        info!("Cleared index watermark on {} URLs", result.rows_affected());
        Ok(result.rows_affected())
    }

    // ===== Documents =====

    /// Insert a document. A body already stored under the same hash is left alone.
    pub async fn insert_document(&self, doc: &DocumentRow) -> Result<bool> {
        let result = insert_document_query(doc).execute(&self.pool).await?;
        Ok(result.rows_affected() == 1)
    }

    /// Link a URL to a document it was observed serving
    pub async fn link_url_document(&self, url_id: &str, document_id: &str) -> Result<bool> {
        let result = link_query(url_id, document_id, Utc::now())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() == 1)
    }

    /// Store a fetched document and link it to the URL that served it.
    /// Returns whether the document itself was new.
    pub async fn record_document(&self, url_id: &str, doc: &DocumentRow) -> Result<bool> {
        let _guard = self.write_lock.lock().await;
        let mut tx = self.pool.begin().await?;

        let created = insert_document_query(doc).execute(&mut *tx).await?.rows_affected() == 1;
        link_query(url_id, &doc.document_id, Utc::now())
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(created)
    }

    /// Backfill a title the browser never recorded
    pub async fn fill_missing_title(&self, url_id: &str, title: &str) -> Result<()> {
        sqlx::query(
            "UPDATE urls SET title = ? WHERE url_id = ? AND (title IS NULL OR title = '')",
        )
        .bind(title)
        .bind(url_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Every document linked to a URL, newest first
    pub async fn documents_for_url(&self, url_id: &str) -> Result<Vec<DocumentRow>> {
        let rows: Vec<(String, i64, i64, String)> = sqlx::query_as(
            r#"
            SELECT d.document_id, d.status_code, d.accessed_at, d.body
            FROM url_document_edges e
            JOIN documents d ON d.document_id = e.document_id
            WHERE e.url_id = ?
            ORDER BY d.accessed_at DESC, e.linked_at DESC
            "#,
        )
        .bind(url_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(document_id, status_code, accessed_at, body)| DocumentRow {
                document_id,
                status_code: u16::try_from(status_code).unwrap_or(0),
                accessed_at: from_unix(accessed_at).unwrap_or_else(epoch),
                body,
            })
            .collect())
    }

    // ===== Work selection =====

    /// Count URLs matching a filter
    pub async fn count_where(&self, filter: UrlFilter) -> Result<usize> {
        let sql = match filter {
            UrlFilter::All => "SELECT COUNT(*) FROM urls".to_string(),
            UrlFilter::Indexed => {
                "SELECT COUNT(*) FROM urls_meta WHERE indexed_at IS NOT NULL".to_string()
            }
            UrlFilter::Pending(Unprocessed::Unscraped) => r#"
                SELECT COUNT(*) FROM urls u
                WHERE NOT EXISTS (SELECT 1 FROM url_document_edges e WHERE e.url_id = u.url_id)
                "#
            .to_string(),
            UrlFilter::Pending(Unprocessed::Unindexed) => format!(
                r#"{CURRENT_DOCUMENTS_CTE}
                SELECT COUNT(*) FROM urls u
                JOIN current_docs c ON c.url_id = u.url_id
                LEFT JOIN urls_meta m ON m.url_id = u.url_id
                WHERE {STALE_INDEX_PREDICATE}
                "#
            ),
        };

        let count: i64 = sqlx::query_scalar(&sql).fetch_one(&self.pool).await?;
        Ok(count as usize)
    }

    /// Next batch of URLs needing a scrape or an index write.
    ///
    /// Unscraped URLs come back in random order so one batch spreads over many
    /// domains. Unindexed URLs come back most recently visited first.
    pub async fn select_unprocessed(
        &self,
        kind: Unprocessed,
        limit: usize,
    ) -> Result<Vec<PendingUrl>> {
        let sql = match kind {
            Unprocessed::Unscraped => r#"
                SELECT u.url_id, u.url, u.title, u.description, u.last_visit,
                       NULL AS document_id, NULL AS body, NULL AS accessed_at
                FROM urls u
                WHERE NOT EXISTS (SELECT 1 FROM url_document_edges e WHERE e.url_id = u.url_id)
                ORDER BY RANDOM()
                LIMIT ?
                "#
            .to_string(),
            Unprocessed::Unindexed => format!(
                r#"{CURRENT_DOCUMENTS_CTE}
                SELECT u.url_id, u.url, u.title, u.description, u.last_visit,
                       c.document_id, c.body, c.accessed_at
                FROM urls u
                JOIN current_docs c ON c.url_id = u.url_id
                LEFT JOIN urls_meta m ON m.url_id = u.url_id
                WHERE {STALE_INDEX_PREDICATE}
                ORDER BY u.last_visit DESC
                LIMIT ?
                "#
            ),
        };

        let rows = sqlx::query_as::<_, PendingUrl>(&sql)
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    // ===== Lookups =====

    /// Hydrate URLs by id. Order of the result is unspecified.
    pub async fn urls_by_id(&self, ids: &[String]) -> Result<Vec<UrlEntity>> {
        let mut found = Vec::with_capacity(ids.len());

        for chunk in ids.chunks(MAX_ROWS_PER_STATEMENT) {
            let mut qb = QueryBuilder::<Sqlite>::new(
                "SELECT url_id, url, title, description, last_visit FROM urls WHERE url_id IN (",
            );
            let mut separated = qb.separated(", ");
            for id in chunk {
                separated.push_bind(id);
            }
            separated.push_unseparated(")");

            let rows = qb.build_query_as::<UrlEntity>().fetch_all(&self.pool).await?;
            found.extend(rows);
        }

        Ok(found)
    }

    /// Substring match over URL, title and description, most recent first.
    /// Returns the capped rows and the uncapped match count.
    pub async fn search_urls(&self, query: &str, limit: usize) -> Result<(Vec<UrlEntity>, usize)> {
        let pattern = format!("%{}%", escape_like(query));
        let predicate = r#"
            url LIKE ?1 ESCAPE '\'
            OR title LIKE ?1 ESCAPE '\'
            OR description LIKE ?1 ESCAPE '\'
        "#;

        let total: i64 = sqlx::query_scalar(&format!(
            "SELECT COUNT(*) FROM urls WHERE {predicate}"
        ))
        .bind(&pattern)
        .fetch_one(&self.pool)
        .await?;

        let rows = sqlx::query_as::<_, UrlEntity>(&format!(
            r#"
            SELECT url_id, url, title, description, last_visit FROM urls
            WHERE {predicate}
            ORDER BY last_visit DESC
            LIMIT ?2
            "#
        ))
        .bind(&pattern)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        Ok((rows, total as usize))
    }

    /// Most recently visited URLs, with the total URL count
    pub async fn recent_urls(&self, limit: usize) -> Result<(Vec<UrlEntity>, usize)> {
        let rows = sqlx::query_as::<_, UrlEntity>(
            r#"
            SELECT url_id, url, title, description, last_visit FROM urls
            ORDER BY last_visit DESC
            LIMIT ?
            "#,
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        let total = self.count_where(UrlFilter::All).await?;
        Ok((rows, total))
    }

    // ===== Statistics =====

    pub async fn stats(&self) -> Result<StoreStats> {
        let visit_count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM visits")
            .fetch_one(&self.pool)
            .await?;
        let document_count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM documents")
            .fetch_one(&self.pool)
            .await?;
        let edge_count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM url_document_edges")
            .fetch_one(&self.pool)
            .await?;

        Ok(StoreStats {
            url_count: self.count_where(UrlFilter::All).await?,
            visit_count: visit_count as usize,
            document_count: document_count as usize,
            edge_count: edge_count as usize,
            indexed_count: self.count_where(UrlFilter::Indexed).await?,
            unscraped_count: self.count_where(Unprocessed::Unscraped.into()).await?,
            unindexed_count: self.count_where(Unprocessed::Unindexed.into()).await?,
        })
    }
}

fn upsert_url_query<'q>(
    url_id: &'q str,
    row: &'q UrlRow,
) -> sqlx::query::Query<'q, Sqlite, sqlx::sqlite::SqliteArguments<'q>> {
    sqlx::query(
        r#"
        INSERT INTO urls (url_id, url, title, description, last_visit)
        VALUES (?, ?, NULLIF(?, ''), NULLIF(?, ''), ?)
        ON CONFLICT(url_id) DO UPDATE SET
            title = COALESCE(excluded.title, urls.title),
            description = COALESCE(excluded.description, urls.description),
            last_visit = CASE
                WHEN excluded.last_visit IS NULL THEN urls.last_visit
                WHEN urls.last_visit IS NULL OR excluded.last_visit > urls.last_visit
                    THEN excluded.last_visit
                ELSE urls.last_visit
            END
        "#,
    )
    .bind(url_id)
    .bind(&row.url)
    .bind(row.title.as_deref())
    .bind(row.description.as_deref())
    .bind(row.last_visit.map(|t| t.timestamp()))
}

fn insert_visit_query<'q>(
    row: &'q VisitRow,
    extractor_name: &'q str,
) -> sqlx::query::Query<'q, Sqlite, sqlx::sqlite::SqliteArguments<'q>> {
    let name = row
        .extractor_name
        .as_deref()
        .filter(|n| !n.is_empty())
        .unwrap_or(extractor_name);

    sqlx::query(
        "INSERT OR IGNORE INTO visits (url_id, visit_time, extractor_name) VALUES (?, ?, ?)",
    )
    .bind(crate::models::url_id(&row.url))
    .bind(row.visited_at.timestamp())
    .bind(name)
}

fn insert_document_query(
    doc: &DocumentRow,
) -> sqlx::query::Query<'_, Sqlite, sqlx::sqlite::SqliteArguments<'_>> {
    sqlx::query(
        r#"
        INSERT INTO documents (document_id, status_code, accessed_at, body)
        VALUES (?, ?, ?, ?)
        ON CONFLICT(document_id) DO NOTHING
        "#,
    )
    .bind(&doc.document_id)
    .bind(i64::from(doc.status_code))
    .bind(doc.accessed_at.timestamp())
    .bind(&doc.body)
}

fn link_query<'q>(
    url_id: &'q str,
    document_id: &'q str,
    linked_at: DateTime<Utc>,
) -> sqlx::query::Query<'q, Sqlite, sqlx::sqlite::SqliteArguments<'q>> {
    sqlx::query(
        "INSERT OR IGNORE INTO url_document_edges (url_id, document_id, linked_at) VALUES (?, ?, ?)",
    )
    .bind(url_id)
    .bind(document_id)
    .bind(linked_at.timestamp())
}

fn escape_like(query: &str) -> String {
    let mut escaped = String::with_capacity(query.len());
    for c in query.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::url_id;
    use chrono::TimeZone;
    use tempfile::TempDir;

    async fn setup_test_store() -> (ContentStore, TempDir) {
        let tmp = TempDir::new().unwrap();
        let mut config = Config::default();
        config.paths.db_file = tmp.path().join("test.db");

        let store = ContentStore::connect(&config).await.unwrap();
        (store, tmp)
    }

    fn at(ts: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(ts, 0).unwrap()
    }

    fn visit(url: &str, ts: i64, name: &str) -> VisitRow {
        VisitRow {
            url: url.to_string(),
            visited_at: at(ts),
            extractor_name: Some(name.to_string()),
        }
    }

    #[tokio::test]
    async fn test_migrations_are_reapplied_as_noop() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("db.sqlite");

        let store = ContentStore::open(&path).await.unwrap();
        store.upsert_url(&UrlRow::new("https://a.test")).await.unwrap();
        store.close().await;

        let reopened = ContentStore::open(&path).await.unwrap();
        assert_eq!(reopened.count_where(UrlFilter::All).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_visit_uniqueness_ignores_extractor() {
        let (store, _tmp) = setup_test_store().await;
        let url = "https://example.com/page";
        store.upsert_url(&UrlRow::new(url)).await.unwrap();

        assert!(store.insert_visit(&visit(url, 1_700_000_000, "chrome"), "chrome").await.unwrap());
        assert!(!store.insert_visit(&visit(url, 1_700_000_000, "firefox"), "firefox").await.unwrap());
        assert!(store.insert_visit(&visit(url, 1_700_000_001, "firefox"), "firefox").await.unwrap());

        assert_eq!(store.stats().await.unwrap().visit_count, 2);
    }

    #[tokio::test]
    async fn test_last_visit_is_monotone() {
        let (store, _tmp) = setup_test_store().await;

        let mut row = UrlRow::new("https://example.com");
        row.title = Some("Example".to_string());
        row.last_visit = Some(at(2_000));
        let id = store.upsert_url(&row).await.unwrap();

        // A stale import with no title must not roll anything back
        let stale = UrlRow {
            last_visit: Some(at(1_000)),
            ..UrlRow::new("https://example.com")
        };
        store.upsert_url(&stale).await.unwrap();

        let urls = store.urls_by_id(&[id.clone()]).await.unwrap();
        assert_eq!(urls[0].last_visit, Some(2_000));
        assert_eq!(urls[0].title.as_deref(), Some("Example"));

        let newer = UrlRow {
            last_visit: Some(at(3_000)),
            ..UrlRow::new("https://example.com")
        };
        store.upsert_url(&newer).await.unwrap();
        let urls = store.urls_by_id(&[id]).await.unwrap();
        assert_eq!(urls[0].last_visit, Some(3_000));
    }

    #[tokio::test]
    async fn test_document_dedup_by_content() {
        let (store, _tmp) = setup_test_store().await;
        let a = store.upsert_url(&UrlRow::new("https://a.test")).await.unwrap();
        let b = store.upsert_url(&UrlRow::new("https://b.test")).await.unwrap();

        let doc = DocumentRow::new("same body".to_string(), 200, at(1_000));
        assert!(store.record_document(&a, &doc).await.unwrap());
        assert!(!store.record_document(&b, &doc).await.unwrap());
        // Re-recording the same pair is a no-op
        assert!(!store.record_document(&a, &doc).await.unwrap());

        let stats = store.stats().await.unwrap();
        assert_eq!(stats.document_count, 1);
        assert_eq!(stats.edge_count, 2);
    }

    #[tokio::test]
    async fn test_interrupted_document_write_is_retryable() {
        let (store, _tmp) = setup_test_store().await;
        let id = store.upsert_url(&UrlRow::new("https://a.test")).await.unwrap();
        let doc = DocumentRow::new("body".to_string(), 200, at(1_000));

        // Document written, edge never made it
        assert!(store.insert_document(&doc).await.unwrap());
        let stats = store.stats().await.unwrap();
        assert_eq!((stats.document_count, stats.edge_count), (1, 0));
        assert_eq!(stats.unscraped_count, 1);

        // Retrying the whole write finishes the job without duplicating anything
        assert!(!store.record_document(&id, &doc).await.unwrap());
        assert!(!store.insert_document(&doc).await.unwrap());
        assert!(!store.link_url_document(&id, &doc.document_id).await.unwrap());

        let stats = store.stats().await.unwrap();
        assert_eq!((stats.document_count, stats.edge_count), (1, 1));
        assert_eq!(stats.unscraped_count, 0);
    }

    #[tokio::test]
    async fn test_failed_fetches_share_first_failure() {
        let (store, _tmp) = setup_test_store().await;
        let a = store.upsert_url(&UrlRow::new("https://a.test")).await.unwrap();
        let b = store.upsert_url(&UrlRow::new("https://b.test")).await.unwrap();

        let first = DocumentRow::new(String::new(), 500, at(1_000));
        let second = DocumentRow::new(String::new(), 404, at(2_000));
        assert_eq!(first.document_id, second.document_id);
        assert!(store.record_document(&a, &first).await.unwrap());
        assert!(!store.record_document(&b, &second).await.unwrap());

        let stats = store.stats().await.unwrap();
        assert_eq!((stats.document_count, stats.edge_count), (1, 2));
        assert_eq!(stats.unscraped_count, 0);

        let (status, accessed_at): (i64, i64) =
            sqlx::query_as("SELECT status_code, accessed_at FROM documents")
                .fetch_one(&store.pool)
                .await
                .unwrap();
        assert_eq!((status, accessed_at), (500, 1_000));
    }

    #[tokio::test]
    async fn test_latest_visit_time_per_extractor() {
        let (store, _tmp) = setup_test_store().await;
        assert_eq!(store.latest_visit_time("chrome").await.unwrap(), epoch());

        let url = "https://example.com";
        let urls = vec![UrlRow::new(url)];
        let visits = vec![visit(url, 100, "chrome"), visit(url, 300, "chrome")];
        let stats = store.import_rows("chrome", &urls, &visits).await.unwrap();
        assert_eq!(stats.visits_inserted, 2);

        assert_eq!(store.latest_visit_time("chrome").await.unwrap(), at(300));
        assert_eq!(store.latest_visit_time("firefox").await.unwrap(), epoch());
    }

    #[tokio::test]
    async fn test_select_unprocessed() {
        let (store, _tmp) = setup_test_store().await;
        let scraped = store.upsert_url(&UrlRow::new("https://scraped.test")).await.unwrap();
        let failed = store.upsert_url(&UrlRow::new("https://failed.test")).await.unwrap();
        let fresh = store.upsert_url(&UrlRow::new("https://fresh.test")).await.unwrap();

        store
            .record_document(&scraped, &DocumentRow::new("content".into(), 200, at(1_000)))
            .await
            .unwrap();
        store
            .record_document(&failed, &DocumentRow::new(String::new(), 500, at(1_000)))
            .await
            .unwrap();

        let unscraped = store.select_unprocessed(Unprocessed::Unscraped, 10).await.unwrap();
        assert_eq!(unscraped.len(), 1);
        assert_eq!(unscraped[0].url_id, fresh);
        assert!(unscraped[0].body.is_none());

        // Empty bodies are never indexed
        let unindexed = store.select_unprocessed(Unprocessed::Unindexed, 10).await.unwrap();
        assert_eq!(unindexed.len(), 1);
        assert_eq!(unindexed[0].url_id, scraped);
        assert_eq!(unindexed[0].body.as_deref(), Some("content"));

        store
            .upsert_url_meta(&[scraped.clone()], Some(at(2_000)))
            .await
            .unwrap();
        assert_eq!(
            store.count_where(Unprocessed::Unindexed.into()).await.unwrap(),
            0
        );

        // A newer document makes the URL stale again
        store
            .record_document(&scraped, &DocumentRow::new("changed".into(), 200, at(3_000)))
            .await
            .unwrap();
        let unindexed = store.select_unprocessed(Unprocessed::Unindexed, 10).await.unwrap();
        assert_eq!(unindexed.len(), 1);
        assert_eq!(unindexed[0].body.as_deref(), Some("changed"));
    }

    #[tokio::test]
    async fn test_clear_indexed_at() {
        let (store, _tmp) = setup_test_store().await;
        let id = store.upsert_url(&UrlRow::new("https://a.test")).await.unwrap();
        store.upsert_url_meta(&[id.clone()], Some(at(5_000))).await.unwrap();
        assert_eq!(store.indexed_at(&id).await.unwrap(), Some(at(5_000)));

        assert_eq!(store.clear_indexed_at().await.unwrap(), 1);
        assert_eq!(store.indexed_at(&id).await.unwrap(), None);
        assert_eq!(store.count_where(UrlFilter::Indexed).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_search_urls_and_recent() {
        let (store, _tmp) = setup_test_store().await;
        for (i, url) in ["https://rust-lang.org", "https://docs.rs/rust", "https://go.dev"]
            .iter()
            .enumerate()
        {
            let row = UrlRow {
                last_visit: Some(at(1_000 + i as i64)),
                ..UrlRow::new(*url)
            };
            store.upsert_url(&row).await.unwrap();
        }

        let (rows, total) = store.search_urls("rust", 1).await.unwrap();
        assert_eq!(total, 2);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].url, "https://docs.rs/rust");

        // LIKE wildcards in the query are literal
        let (rows, total) = store.search_urls("%", 10).await.unwrap();
        assert!(rows.is_empty());
        assert_eq!(total, 0);

        let (recent, total) = store.recent_urls(2).await.unwrap();
        assert_eq!(total, 3);
        assert_eq!(recent[0].url, "https://go.dev");
        assert_eq!(recent[0].url_id, url_id("https://go.dev"));
    }

    #[tokio::test]
    async fn test_fill_missing_title() {
        let (store, _tmp) = setup_test_store().await;
        let id = store.upsert_url(&UrlRow::new("https://a.test")).await.unwrap();
        store.fill_missing_title(&id, "From Page").await.unwrap();
        store.fill_missing_title(&id, "Ignored").await.unwrap();

        let urls = store.urls_by_id(&[id]).await.unwrap();
        assert_eq!(urls[0].title.as_deref(), Some("From Page"));
    }
}
