//! Reindex command - rebuild the search index from stored documents

use super::build_pipeline;
use crate::config::Config;
use crate::error::Result;
use crate::index::SearchIndex;
use crate::pipeline::IndexStats;
use crate::store::ContentStore;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tracing::info;

/// Execute reindex command. Pages are not fetched again.
pub async fn cmd_reindex(
    config: &Config,
    store: &ContentStore,
    index: Arc<dyn SearchIndex>,
    limit: Option<usize>,
    cancel: &AtomicBool,
) -> Result<IndexStats> {
    info!("Starting reindex operation");

    let pipeline = build_pipeline(config, store, index)?;
    pipeline.reindex(limit, cancel).await
}

pub fn print_reindex_stats(stats: &IndexStats) {
    println!("\n🔄 Reindex Complete\n");
    println!("Batches: {}", stats.batches);
    println!("Entities indexed: {}", stats.indexed);
}
