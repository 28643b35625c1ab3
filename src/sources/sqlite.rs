//! Extractors for browsers that keep history in SQLite

use super::Extractor;
use crate::error::{is_sqlite_locked, Error, Result};
use crate::models::{from_unix, UrlRow, VisitRow};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteConnection};
use sqlx::{ConnectOptions, Connection};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

/// History database layouts we know how to read. Each query converts the
/// browser's native timestamps to unix seconds and returns rows newest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BrowserKind {
    /// Chrome and friends: microseconds since 1601-01-01
    Chromium,
    /// Microseconds since the unix epoch
    Firefox,
    /// Seconds since 2001-01-01
    Safari,
    /// Visit times stored as ISO-8601 text
    Orion,
    /// Core Data store, seconds since 2001-01-01
    SigmaOs,
}

impl BrowserKind {
    fn layout_check_sql(&self) -> &'static str {
        match self {
            BrowserKind::Chromium => "SELECT COUNT(*) FROM urls",
            BrowserKind::Firefox => "SELECT COUNT(*) FROM moz_places",
            BrowserKind::Safari => "SELECT COUNT(*) FROM history_items",
            BrowserKind::Orion => "SELECT COUNT(*) FROM history_items",
            BrowserKind::SigmaOs => "SELECT COUNT(*) FROM ZHISTORYITEM",
        }
    }

    fn urls_sql(&self) -> &'static str {
        match self {
            BrowserKind::Chromium => {
                r#"
                SELECT url, title, NULL AS description,
                       CAST(last_visit_time / 1000000 - 11644473600 AS INTEGER) AS last_visit
                FROM urls
                WHERE last_visit_time / 1000000 - 11644473600 >= ?
                ORDER BY last_visit_time DESC
                "#
            }
            BrowserKind::Firefox => {
                r#"
                SELECT url, title, description,
                       CAST(last_visit_date / 1000000 AS INTEGER) AS last_visit
                FROM moz_places
                WHERE COALESCE(last_visit_date, 0) / 1000000 >= ?
                ORDER BY last_visit_date DESC
                "#
            }
            BrowserKind::Safari => {
                r#"
                SELECT i.url, v.title, NULL AS description,
                       CAST(v.max_visit + 978307200 AS INTEGER) AS last_visit
                FROM history_items i
                JOIN (
                    SELECT history_item, title, MAX(visit_time) AS max_visit
                    FROM history_visits
                    GROUP BY history_item
                ) v ON v.history_item = i.id
                WHERE v.max_visit + 978307200 >= ?
                ORDER BY v.max_visit DESC
                "#
            }
            BrowserKind::Orion => {
                r#"
                SELECT i.URL, i.TITLE, NULL AS description,
                       CAST(strftime('%s', v.max_visit) AS INTEGER) AS last_visit
                FROM history_items i
                LEFT JOIN (
                    SELECT HISTORY_ITEM_ID, MAX(VISIT_TIME) AS max_visit
                    FROM visits
                    GROUP BY HISTORY_ITEM_ID
                ) v ON v.HISTORY_ITEM_ID = i.ID
                WHERE COALESCE(CAST(strftime('%s', v.max_visit) AS INTEGER), 0) >= ?
                ORDER BY v.max_visit DESC
                "#
            }
            BrowserKind::SigmaOs => {
                r#"
                SELECT u.ZURL, v.ZTITLE, NULL AS description,
                       CAST(MAX(v.ZVISITTIME) + 978307200 AS INTEGER) AS last_visit
                FROM ZHISTORYITEM u
                JOIN ZHISTORYVISIT v ON u.Z_PK = v.ZHISTORYITEM
                GROUP BY v.ZHISTORYITEM
                HAVING MAX(v.ZVISITTIME) + 978307200 >= ?
                ORDER BY MAX(v.ZVISITTIME) DESC
                "#
            }
        }
    }

    fn visits_sql(&self) -> &'static str {
        match self {
            BrowserKind::Chromium => {
                r#"
                SELECT u.url,
                       CAST(v.visit_time / 1000000 - 11644473600 AS INTEGER) AS visited_at
                FROM visits v
                JOIN urls u ON v.url = u.id
                WHERE v.visit_time / 1000000 - 11644473600 >= ?
                ORDER BY v.visit_time DESC
                "#
            }
            BrowserKind::Firefox => {
                r#"
                SELECT p.url, CAST(v.visit_date / 1000000 AS INTEGER) AS visited_at
                FROM moz_historyvisits v
                JOIN moz_places p ON v.place_id = p.id
                WHERE v.visit_date / 1000000 >= ?
                ORDER BY v.visit_date DESC
                "#
            }
            BrowserKind::Safari => {
                r#"
                SELECT i.url, CAST(v.visit_time + 978307200 AS INTEGER) AS visited_at
                FROM history_visits v
                JOIN history_items i ON v.history_item = i.id
                WHERE v.visit_time + 978307200 >= ?
                ORDER BY v.visit_time DESC
                "#
            }
            BrowserKind::Orion => {
                r#"
                SELECT i.URL, CAST(strftime('%s', v.VISIT_TIME) AS INTEGER) AS visited_at
                FROM visits v
                JOIN history_items i ON i.ID = v.HISTORY_ITEM_ID
                WHERE CAST(strftime('%s', v.VISIT_TIME) AS INTEGER) >= ?
                ORDER BY v.VISIT_TIME DESC
                "#
            }
            BrowserKind::SigmaOs => {
                r#"
                SELECT u.ZURL, CAST(v.ZVISITTIME + 978307200 AS INTEGER) AS visited_at
                FROM ZHISTORYVISIT v
                JOIN ZHISTORYITEM u ON u.Z_PK = v.ZHISTORYITEM
                WHERE v.ZVISITTIME + 978307200 >= ?
                ORDER BY v.ZVISITTIME DESC
                "#
            }
        }
    }
}

/// Reads one browser profile's history database, read-only
pub struct SqliteExtractor {
    name: String,
    path: PathBuf,
    kind: BrowserKind,
}

impl SqliteExtractor {
    pub fn new(name: impl Into<String>, path: PathBuf, kind: BrowserKind) -> Self {
        Self {
            name: name.into(),
            path,
            kind,
        }
    }

    async fn connect(&self) -> Result<SqliteConnection> {
        // No busy wait: a browser holding the lock is reported straight away
        // so the caller can fall back to a copy.
        let options = SqliteConnectOptions::new()
            .filename(&self.path)
            .read_only(true)
            .busy_timeout(Duration::ZERO);

        options.connect().await.map_err(|e| self.map_error(e))
    }

    fn map_error(&self, err: sqlx::Error) -> Error {
        if is_sqlite_locked(&err) {
            Error::SourceLocked(self.name.clone())
        } else {
            Error::SourceUnreadable {
                source_name: self.name.clone(),
                reason: err.to_string(),
            }
        }
    }
}

#[async_trait]
impl Extractor for SqliteExtractor {
    fn name(&self) -> &str {
        &self.name
    }

    fn source_path(&self) -> &Path {
        &self.path
    }

    fn set_source_path(&mut self, path: PathBuf) {
        self.path = path;
    }

    async fn verify_connection(&self) -> Result<()> {
        let mut conn = self.connect().await?;
        let count: i64 = sqlx::query_scalar(self.kind.layout_check_sql())
            .fetch_one(&mut conn)
            .await
            .map_err(|e| self.map_error(e))?;
        debug!(source = %self.name, rows = count, "History database readable");
        conn.close().await.map_err(|e| self.map_error(e))?;
        Ok(())
    }

    async fn urls_since(&self, since: DateTime<Utc>) -> Result<Vec<UrlRow>> {
        let mut conn = self.connect().await?;
        let rows: Vec<(String, Option<String>, Option<String>, Option<i64>)> =
            sqlx::query_as(self.kind.urls_sql())
                .bind(since.timestamp())
                .fetch_all(&mut conn)
                .await
                .map_err(|e| self.map_error(e))?;
        conn.close().await.map_err(|e| self.map_error(e))?;

        Ok(rows
            .into_iter()
            .map(|(url, title, description, last_visit)| UrlRow {
                url,
                title,
                description,
                last_visit: last_visit.and_then(from_unix),
            })
            .collect())
    }

    async fn visits_since(&self, since: DateTime<Utc>) -> Result<Vec<VisitRow>> {
        let mut conn = self.connect().await?;
        let rows: Vec<(String, i64)> = sqlx::query_as(self.kind.visits_sql())
            .bind(since.timestamp())
            .fetch_all(&mut conn)
            .await
            .map_err(|e| self.map_error(e))?;
        conn.close().await.map_err(|e| self.map_error(e))?;

        // Visits with no usable time carry nothing worth keeping
        Ok(rows
            .into_iter()
            .filter_map(|(url, ts)| {
                from_unix(ts).map(|visited_at| VisitRow {
                    url,
                    visited_at,
                    extractor_name: Some(self.name.clone()),
                })
            })
            .collect())
    }
}
