//! CLI commands implementation

pub mod populate;
pub mod reindex;
pub mod search;
pub mod status;

pub use populate::*;
pub use reindex::*;
pub use search::*;
pub use status::*;

use crate::config::Config;
use crate::crawl::Crawler;
use crate::error::Result;
use crate::index::SearchIndex;
use crate::pipeline::Pipeline;
use crate::store::ContentStore;
use std::sync::Arc;

/// Pipeline wired to the real crawler
fn build_pipeline(
    config: &Config,
    store: &ContentStore,
    index: Arc<dyn SearchIndex>,
) -> Result<Pipeline> {
    let crawler = Crawler::new(config.crawl.clone())?;
    Ok(Pipeline::new(
        store.clone(),
        index,
        Arc::new(crawler),
        config.pipeline.clone(),
    ))
}
