//! Status command implementation

use crate::config::Config;
use crate::error::Result;
use crate::index::SearchIndex;
use crate::store::{ContentStore, StoreStats};
use serde::Serialize;
use tracing::{debug, info};

/// Status information
#[derive(Debug, Clone, Serialize)]
pub struct StatusInfo {
    pub config_path: String,
    pub db_path: String,
    pub index_path: String,
    pub store: StoreStats,
    /// Entries in the search index, None if it could not be read
    pub index_entries: Option<usize>,
}

/// Get system status
pub async fn cmd_status(
    config: &Config,
    store: &ContentStore,
    index: &dyn SearchIndex,
) -> Result<StatusInfo> {
    info!("Getting status");

    let stats = store.stats().await?;
    let index_entries = match index.count().await {
        Ok(n) => Some(n),
        Err(e) => {
            debug!("Search index count error: {:?}", e);
            None
        }
    };

    Ok(StatusInfo {
        config_path: config.paths.config_file.display().to_string(),
        db_path: config.paths.db_file.display().to_string(),
        index_path: config.paths.index_file.display().to_string(),
        store: stats,
        index_entries,
    })
}

/// Print status to console
pub fn print_status(status: &StatusInfo) {
    println!("\n📊 browsedex Status\n");
    println!("Configuration: {}", status.config_path);
    println!("Database: {}", status.db_path);
    println!("Search index: {}", status.index_path);

    println!("\nDatabase Stats:");
    println!("  URLs: {}", status.store.url_count);
    println!("  Visits: {}", status.store.visit_count);
    println!("  Documents: {}", status.store.document_count);
    println!("  URL-document links: {}", status.store.edge_count);

    println!("\nPipeline:");
    println!("  Unscraped URLs: {}", status.store.unscraped_count);
    println!("  Indexed URLs: {}", status.store.indexed_count);
    println!("  Waiting for index: {}", status.store.unindexed_count);

    match status.index_entries {
        Some(n) => println!("  Index entries: {}", n),
        None => println!("  Index entries: ✗ unreadable"),
    }
}
