//! Populate command - import browser history, then optionally scrape and index

use super::build_pipeline;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::index::SearchIndex;
use crate::pipeline::{IndexStats, ScrapeStats};
use crate::sources::{discover_extractors, populate_all, PopulateOptions, PopulateReport};
use crate::store::ContentStore;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{info, warn};

/// Populate options from the command line
#[derive(Debug, Clone, Default)]
pub struct PopulateArgs {
    /// Only import this browser
    pub browser: Option<String>,
    /// Only pull visits newer than what each source already has in the store
    pub latest: bool,
    /// Scrape page content for URLs without a document
    pub fulltext: bool,
    /// Write pending documents to the search index
    pub build_index: bool,
    pub keep_tmp_files: bool,
    /// Where to look for browser profiles; defaults to the home directory
    pub home_dir: Option<PathBuf>,
}

/// Everything a populate run did
#[derive(Debug, Default, Serialize)]
pub struct PopulateSummary {
    pub import: PopulateReport,
    pub scrape: Option<ScrapeStats>,
    pub index: Option<IndexStats>,
}

impl PopulateSummary {
    /// Any source that failed to import fails the run, after the rest of
    /// the work has been committed and reported.
    pub fn ensure_complete(&self) -> Result<()> {
        match self.import.failures.len() {
            0 => Ok(()),
            n => Err(Error::SourcesFailed(n)),
        }
    }
}

/// Execute populate command
pub async fn cmd_populate(
    config: &Config,
    store: &ContentStore,
    index: Arc<dyn SearchIndex>,
    args: PopulateArgs,
    cancel: &AtomicBool,
) -> Result<PopulateSummary> {
    let home = args
        .home_dir
        .clone()
        .or_else(dirs::home_dir)
        .ok_or_else(|| Error::Config("Could not determine home directory".to_string()))?;

    let mut extractors = discover_extractors(&home, args.browser.as_deref());
    if extractors.is_empty() {
        match &args.browser {
            Some(name) => {
                return Err(Error::Config(format!(
                    "No history database found for browser '{}'",
                    name
                )));
            }
            None => warn!("No browser history databases found under {:?}", home),
        }
    }

    info!("Importing history from {} source(s)", extractors.len());
    let options = PopulateOptions {
        latest: args.latest,
        keep_tmp_files: args.keep_tmp_files || config.keep_tmp_files,
        tmp_dir: config.paths.tmp_dir.clone(),
    };
    let import = populate_all(&mut extractors, store, &options).await?;

    let mut summary = PopulateSummary {
        import,
        ..Default::default()
    };

    if !(args.fulltext || args.build_index) {
        return Ok(summary);
    }

    let pipeline = build_pipeline(config, store, index)?;

    if args.fulltext && !cancel.load(Ordering::Relaxed) {
        summary.scrape = Some(pipeline.scrape(cancel).await?);
    }

    if args.build_index && !cancel.load(Ordering::Relaxed) {
        summary.index = Some(pipeline.build_index(None, cancel).await?);
    }

    Ok(summary)
}

/// Print populate summary to console
pub fn print_populate_summary(summary: &PopulateSummary) {
    println!("\n📥 Populate Complete\n");

    for (name, stats) in &summary.import.imported {
        println!(
            "  {}: {} URLs, {} new visits ({} already known)",
            name, stats.urls, stats.visits_inserted, stats.visits_ignored
        );
    }
    println!(
        "Total: {} URLs, {} new visits",
        summary.import.total_urls(),
        summary.import.total_visits()
    );

    if !summary.import.failures.is_empty() {
        println!("\n⚠ {} source(s) failed:", summary.import.failures.len());
        for failure in &summary.import.failures {
            println!(
                "  {} ({}): {}",
                failure.name,
                failure.path.display(),
                failure.reason
            );
        }
    }

    if let Some(scrape) = &summary.scrape {
        println!("\nScraped: {} URLs", scrape.processed);
        println!("  New documents: {}", scrape.documents_created);
        if scrape.failed_fetches > 0 {
            println!("  Failed fetches: {}", scrape.failed_fetches);
        }
    }

    if let Some(index) = &summary.index {
        println!("\nIndexed: {} entities", index.indexed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::SourceFailure;

    #[test]
    fn test_partial_failure_is_an_error() {
        let mut summary = PopulateSummary::default();
        assert!(summary.ensure_complete().is_ok());

        summary.import.failures.push(SourceFailure {
            name: "firefox".to_string(),
            path: PathBuf::from("places.sqlite"),
            reason: "file is not a database".to_string(),
        });
        assert!(matches!(
            summary.ensure_complete(),
            Err(Error::SourcesFailed(1))
        ));
    }
}
