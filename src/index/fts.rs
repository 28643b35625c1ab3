//! SQLite FTS5 index backend

use super::{
    IndexHit, IndexSearchResult, SearchIndex, FIELD_BODY, FIELD_DESCRIPTION, FIELD_SNIPPET,
    FIELD_TITLE, FIELD_URL,
};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::models::{FieldLocations, Location, SearchableEntity};
use async_trait::async_trait;
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteRow,
    SqliteSynchronous,
};
use sqlx::Row;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

const SCHEMA_SQL: &str = r#"
CREATE VIRTUAL TABLE IF NOT EXISTS entities USING fts5(
    id UNINDEXED,
    url,
    title,
    description,
    body,
    last_visit UNINDEXED
);
"#;

/// Marks the start and end of a match in `highlight()`/`snippet()` output.
/// Stripped from text before indexing so they can't collide.
const MATCH_START: char = '\u{2}';
const MATCH_END: char = '\u{3}';

/// Tokens of context around the match in a snippet
const SNIPPET_TOKENS: i64 = 24;

/// FTS5 index stored in its own SQLite file
pub struct FtsIndex {
    pool: SqlitePool,
}

impl FtsIndex {
    /// Open the index configured in `config`
    pub async fn connect(config: &Config) -> Result<Self> {
        Self::open(&config.paths.index_file).await
    }

    /// Open (creating if needed) the index at `path`
    pub async fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(Duration::from_secs(5));

        debug!("Opening search index at {:?}", path);

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await?;

        sqlx::query(SCHEMA_SQL).execute(&pool).await?;

        Ok(Self { pool })
    }
}

/// FTS5 rowid for an entity id, so replacing an entry is a rowid lookup
fn rowid_for(id: &str) -> i64 {
    let hash = blake3::hash(id.as_bytes());
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&hash.as_bytes()[..8]);
    i64::from_be_bytes(bytes)
}

fn sanitize(text: Option<&str>) -> Option<String> {
    text.map(|t| t.replace([MATCH_START, MATCH_END], ""))
}

/// Split `highlight()` output into the plain field text and the byte spans
/// of every marked match
fn parse_highlighted(marked: &str) -> (String, Vec<Location>) {
    let mut text = String::with_capacity(marked.len());
    let mut spans = Vec::new();
    let mut start = None;

    for c in marked.chars() {
        match c {
            MATCH_START => start = Some(text.len()),
            MATCH_END => {
                if let Some(s) = start.take() {
                    if text.len() > s {
                        spans.push(Location::new(s, text.len()));
                    }
                }
            }
            _ => text.push(c),
        }
    }

    (text, spans)
}

fn map_query_error(err: sqlx::Error) -> Error {
    if let sqlx::Error::Database(db_err) = &err {
        let message = db_err.message();
        if message.starts_with("fts5:")
            || message.contains("syntax error")
            || message.contains("unterminated string")
            || message.contains("no such column")
        {
            return Error::QueryParse(message.to_string());
        }
    }
    Error::Index(err.to_string())
}

fn hit_from_row(row: &SqliteRow) -> Result<IndexHit> {
    let id: String = row.try_get("id")?;
    let rank: f64 = row.try_get("rank")?;
    let snippet: Option<String> = row.try_get("snippet")?;

    let mut locations = FieldLocations::new();
    for field in [FIELD_URL, FIELD_TITLE, FIELD_DESCRIPTION, FIELD_BODY] {
        let marked: Option<String> = row.try_get(format!("{}_hl", field).as_str())?;
        if let Some(marked) = marked {
            let (_, spans) = parse_highlighted(&marked);
            if !spans.is_empty() {
                locations.insert(field.to_string(), spans);
            }
        }
    }

    let snippet = snippet.map(|marked| {
        let (text, spans) = parse_highlighted(&marked);
        if !spans.is_empty() {
            locations.insert(FIELD_SNIPPET.to_string(), spans);
        }
        text
    });

    Ok(IndexHit {
        id,
        // bm25 ranks lower as better
        score: -rank,
        snippet,
        locations,
    })
}

#[async_trait]
impl SearchIndex for FtsIndex {
    async fn index_batch(&self, entities: &[SearchableEntity]) -> Result<usize> {
        if entities.is_empty() {
            return Ok(0);
        }

        let mut tx = self.pool.begin().await?;

        for entity in entities {
            let rowid = rowid_for(&entity.id);
            sqlx::query("DELETE FROM entities WHERE rowid = ?")
                .bind(rowid)
                .execute(&mut *tx)
                .await?;

            sqlx::query(
                r#"
                INSERT INTO entities (rowid, id, url, title, description, body, last_visit)
                VALUES (?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(rowid)
            .bind(&entity.id)
            .bind(sanitize(Some(&entity.url)))
            .bind(sanitize(entity.title.as_deref()))
            .bind(sanitize(entity.description.as_deref()))
            .bind(sanitize(entity.body.as_deref()))
            .bind(entity.last_visit.map(|t| t.timestamp()))
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        debug!("Indexed {} entities", entities.len());
        Ok(entities.len())
    }

    async fn search(&self, query: &str, limit: usize) -> Result<IndexSearchResult> {
        let query = query.trim();
        if query.is_empty() {
            return Ok(IndexSearchResult::default());
        }

        let sql = format!(
            r#"
            SELECT id, rank,
                   snippet(entities, 4, char(2), char(3), '...', {SNIPPET_TOKENS}) AS snippet,
                   highlight(entities, 1, char(2), char(3)) AS url_hl,
                   highlight(entities, 2, char(2), char(3)) AS title_hl,
                   highlight(entities, 3, char(2), char(3)) AS description_hl,
                   highlight(entities, 4, char(2), char(3)) AS body_hl
            FROM entities
            WHERE entities MATCH ?
            ORDER BY rank
            LIMIT ?
            "#
        );

        let rows = sqlx::query(&sql)
            .bind(query)
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await
            .map_err(map_query_error)?;

        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM entities WHERE entities MATCH ?")
            .bind(query)
            .fetch_one(&self.pool)
            .await
            .map_err(map_query_error)?;

        let hits = rows.iter().map(hit_from_row).collect::<Result<Vec<_>>>()?;
        debug!(query = %query, hits = hits.len(), total, "Full-text search");

        Ok(IndexSearchResult {
            hits,
            total: total as usize,
        })
    }

    async fn count(&self) -> Result<usize> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM entities")
            .fetch_one(&self.pool)
            .await?;
        Ok(count as usize)
    }

    async fn close(&self) -> Result<()> {
        info!("Closing search index");
        self.pool.close().await;
        Ok(())
    }
}
