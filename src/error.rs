//! Custom error types for browsedex

use thiserror::Error;

/// Main error type for browsedex operations
#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Schema migration failed: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Source unreadable ({source_name}): {reason}")]
    SourceUnreadable { source_name: String, reason: String },

    #[error("Source locked ({0})")]
    SourceLocked(String),

    #[error("Recursive lock on {source_name}: copy at {path} is also locked")]
    RecursiveLock { source_name: String, path: String },

    #[error("All {0} history sources failed")]
    AllSourcesFailed(usize),

    #[error("{0} history source(s) failed")]
    SourcesFailed(usize),

    #[error("Fetch error: {0}")]
    Fetch(String),

    #[error("Too many redirects: {0}")]
    RedirectLoop(String),

    #[error("Search index busy after {attempts} attempts: {reason}")]
    IndexBusy { attempts: u32, reason: String },

    #[error("Search index error: {0}")]
    Index(String),

    #[error("Query parse error: {0}")]
    QueryParse(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Query errors that an interactive caller can treat as "no results yet",
    /// e.g. a half-typed query with an unbalanced quote.
    pub fn is_acceptable_query_error(&self) -> bool {
        matches!(self, Error::QueryParse(_))
    }

    /// SQLite busy/locked, reported either as a typed code or only in the message
    pub fn is_database_locked(&self) -> bool {
        match self {
            Error::Database(e) => is_sqlite_locked(e),
            Error::SourceLocked(_) => true,
            _ => false,
        }
    }
}

/// SQLITE_BUSY (5) and SQLITE_LOCKED (6), including extended codes
pub fn is_sqlite_locked(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => {
            let code_locked = db_err
                .code()
                .and_then(|c| c.parse::<i32>().ok())
                .map(|c| matches!(c & 0xff, 5 | 6))
                .unwrap_or(false);
            code_locked || message_says_locked(db_err.message())
        }
        other => message_says_locked(&other.to_string()),
    }
}

fn message_says_locked(message: &str) -> bool {
    let lower = message.to_lowercase();
    lower.contains("database is locked")
        || lower.contains("database table is locked")
        || lower.contains("sqlite_busy")
}

/// Result type alias for browsedex
pub type Result<T> = std::result::Result<T, Error>;
