//! Browser history sources
//!
//! An [`Extractor`] reads URLs and visits out of one browser's history
//! database. [`fetch_since`] wraps an extractor with the locked-database
//! fallback and [`populate_all`] imports every discovered source into the
//! content store.

mod registry;
mod sqlite;

pub use registry::{discover_extractors, BrowserSource, BROWSER_SOURCES};
pub use sqlite::{BrowserKind, SqliteExtractor};

use crate::error::{Error, Result};
use crate::models::{epoch, UrlRow, VisitRow};
use crate::store::{ContentStore, ImportStats};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

/// A readable browser history database
#[async_trait]
pub trait Extractor: Send + Sync {
    /// Name of the browser this reads from. Several extractors may share a
    /// name (one per profile), and the watermark is tracked per name.
    fn name(&self) -> &str;

    fn source_path(&self) -> &Path;

    fn set_source_path(&mut self, path: PathBuf);

    /// Cheap check that the database opens and has the expected layout
    async fn verify_connection(&self) -> Result<()>;

    /// URLs last visited at or after `since`, newest first
    async fn urls_since(&self, since: DateTime<Utc>) -> Result<Vec<UrlRow>>;

    /// Visits at or after `since`, newest first
    async fn visits_since(&self, since: DateTime<Utc>) -> Result<Vec<VisitRow>>;
}

/// Rows read from one source
#[derive(Debug, Default)]
pub struct SourceRows {
    pub urls: Vec<UrlRow>,
    pub visits: Vec<VisitRow>,
}

/// Private copy of a locked database, removed on drop unless kept
struct TempCopy {
    file: Option<NamedTempFile>,
    keep: bool,
}

impl TempCopy {
    fn create(original: &Path, tmp_dir: &Path, name: &str, keep: bool) -> Result<Self> {
        std::fs::create_dir_all(tmp_dir)?;
        let file = tempfile::Builder::new()
            .prefix(&format!("browsedex-{}-", name))
            .suffix(".sqlite")
            .tempfile_in(tmp_dir)?;
        std::fs::copy(original, file.path())?;

        Ok(Self {
            file: Some(file),
            keep,
        })
    }

    fn path(&self) -> PathBuf {
        self.file
            .as_ref()
            .map(|f| f.path().to_path_buf())
            .unwrap_or_default()
    }
}

impl Drop for TempCopy {
    fn drop(&mut self) {
        let Some(file) = self.file.take() else {
            return;
        };

        if self.keep {
            match file.keep() {
                Ok((_, path)) => debug!("Keeping tmp file: {:?}", path),
                Err(e) => warn!("Could not keep tmp file: {}", e),
            }
        } else if let Err(e) = file.close() {
            warn!("Could not remove tmp file: {}", e);
        }
    }
}

async fn read_rows(extractor: &dyn Extractor, since: DateTime<Utc>) -> Result<SourceRows> {
    extractor.verify_connection().await?;
    let urls = extractor.urls_since(since).await?;
    let visits = extractor.visits_since(since).await?;
    Ok(SourceRows { urls, visits })
}

/// Read everything a source recorded since `since`.
///
/// A locked database is copied into `tmp_dir` and read from the copy, once.
/// If the copy is locked too the source fails with [`Error::RecursiveLock`].
/// The extractor's path is restored before returning.
pub async fn fetch_since(
    extractor: &mut dyn Extractor,
    since: DateTime<Utc>,
    tmp_dir: &Path,
    keep_tmp_files: bool,
) -> Result<SourceRows> {
    let original = extractor.source_path().to_path_buf();
    let mut copy: Option<TempCopy> = None;
    let mut attempt = 0u32;

    let result = loop {
        attempt += 1;

        match read_rows(extractor, since).await {
            Ok(rows) => break Ok(rows),
            Err(e) if e.is_database_locked() => {
                if attempt > 1 || extractor.source_path() != original {
                    break Err(Error::RecursiveLock {
                        source_name: extractor.name().to_string(),
                        path: extractor.source_path().display().to_string(),
                    });
                }

                info!(
                    source = %extractor.name(),
                    "Database locked, copying for read access: {:?}", original
                );

                let tmp = match TempCopy::create(&original, tmp_dir, extractor.name(), keep_tmp_files)
                {
                    Ok(tmp) => tmp,
                    Err(e) => break Err(e),
                };

                if tmp.path() == original {
                    break Err(Error::RecursiveLock {
                        source_name: extractor.name().to_string(),
                        path: original.display().to_string(),
                    });
                }

                extractor.set_source_path(tmp.path());
                copy = Some(tmp);
            }
            Err(e) => break Err(e),
        }
    };

    extractor.set_source_path(original);
    drop(copy);
    result
}

/// Options for one populate run
#[derive(Debug, Clone)]
pub struct PopulateOptions {
    /// Only import rows newer than each source's latest recorded visit
    pub latest: bool,
    pub keep_tmp_files: bool,
    pub tmp_dir: PathBuf,
}

/// A source that could not be imported
#[derive(Debug, Clone, Serialize)]
pub struct SourceFailure {
    pub name: String,
    pub path: PathBuf,
    pub reason: String,
}

/// Outcome of importing all sources
#[derive(Debug, Default, Serialize)]
pub struct PopulateReport {
    pub imported: Vec<(String, ImportStats)>,
    pub failures: Vec<SourceFailure>,
}

impl PopulateReport {
    pub fn total_visits(&self) -> usize {
        self.imported.iter().map(|(_, s)| s.visits_inserted).sum()
    }

    pub fn total_urls(&self) -> usize {
        self.imported.iter().map(|(_, s)| s.urls).sum()
    }
}

/// Import every source into the store.
///
/// One source failing never stops the others. If every source fails the run
/// fails with [`Error::AllSourcesFailed`]. Errors from the content store
/// itself are not source failures and abort the run.
pub async fn populate_all(
    extractors: &mut [Box<dyn Extractor>],
    store: &ContentStore,
    options: &PopulateOptions,
) -> Result<PopulateReport> {
    let mut report = PopulateReport::default();

    for extractor in extractors.iter_mut() {
        let name = extractor.name().to_string();
        let since = if options.latest {
            store.latest_visit_time(&name).await?
        } else {
            epoch()
        };

        debug!(source = %name, path = ?extractor.source_path(), %since, "Reading history");

        match fetch_since(
            extractor.as_mut(),
            since,
            &options.tmp_dir,
            options.keep_tmp_files,
        )
        .await
        {
            Ok(rows) => {
                let stats = store.import_rows(&name, &rows.urls, &rows.visits).await?;
                info!(
                    source = %name,
                    urls = stats.urls,
                    visits = stats.visits_inserted,
                    "Imported history"
                );
                report.imported.push((name, stats));
            }
            Err(e) => {
                warn!(source = %name, "Could not read history: {}", e);
                report.failures.push(SourceFailure {
                    path: extractor.source_path().to_path_buf(),
                    name,
                    reason: e.to_string(),
                });
            }
        }
    }

    if !extractors.is_empty() && report.imported.is_empty() {
        return Err(Error::AllSourcesFailed(report.failures.len()));
    }

    Ok(report)
}
