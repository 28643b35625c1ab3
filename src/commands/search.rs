//! Search command implementation

use crate::config::Config;
use crate::error::Result;
use crate::index::{SearchIndex, FIELD_SNIPPET, FIELD_TITLE, FIELD_URL};
use crate::search::{field_locations, highlight_all, SearchResult, Searcher};
use crate::store::ContentStore;
use serde::Serialize;
use std::sync::Arc;
use tracing::info;

/// Search options
#[derive(Debug, Clone, Default)]
pub struct SearchArgs {
    /// No query lists the most recent URLs instead
    pub query: Option<String>,
    /// Substring match over URL, title and description instead of full text
    pub structured: bool,
}

/// Search results along with what was asked
#[derive(Debug, Clone, Serialize)]
pub struct SearchOutput {
    pub query: Option<String>,
    pub structured: bool,
    #[serde(flatten)]
    pub result: SearchResult,
}

/// Execute search command
pub async fn cmd_search(
    config: &Config,
    store: &ContentStore,
    index: Arc<dyn SearchIndex>,
    args: SearchArgs,
) -> Result<SearchOutput> {
    let searcher = Searcher::new(store.clone(), index, config.search.limit);

    let query = args
        .query
        .map(|q| q.trim().to_string())
        .filter(|q| !q.is_empty());

    let result = match &query {
        None => searcher.recent(config.search.limit).await?,
        Some(q) if args.structured => {
            info!("Structured search: {}", q);
            searcher.search_urls(q).await?
        }
        Some(q) => {
            info!("Full-text search: {}", q);
            searcher.search(q).await?
        }
    };

    Ok(SearchOutput {
        query,
        structured: args.structured,
        result,
    })
}

fn bold(text: &str) -> String {
    format!("\x1b[1m{}\x1b[0m", text)
}

/// Print search results to console
pub fn print_search_results(output: &SearchOutput) {
    match &output.query {
        Some(q) => println!("\n🔍 Search: {}\n", q),
        None => println!("\n🕘 Recent\n"),
    }

    let shown = output.result.results.len();
    if shown < output.result.total {
        println!("Showing {} of {} results:\n", shown, output.result.total);
    } else {
        println!("Found {} results:\n", output.result.total);
    }

    for (i, entity) in output.result.results.iter().enumerate() {
        let url = highlight_all(field_locations(entity, FIELD_URL), &entity.url, bold);
        match entity.rank {
            Some(rank) => println!("{}. [score: {:.3}] {}", i + 1, rank, url),
            None => println!("{}. {}", i + 1, url),
        }

        if let Some(title) = entity.title.as_deref().filter(|t| !t.is_empty()) {
            println!(
                "   Title: {}",
                highlight_all(field_locations(entity, FIELD_TITLE), title, bold)
            );
        }

        if let Some(last_visit) = entity.last_visit {
            println!("   Last visit: {}", last_visit.format("%Y-%m-%d %H:%M"));
        }

        if let Some(snippet) = &entity.snippet {
            let snippet = highlight_all(field_locations(entity, FIELD_SNIPPET), snippet, bold);
            println!("   {}", snippet.replace('\n', " "));
        }

        if entity.match_count > 0 {
            println!("   Matches: {}", entity.match_count);
        }
        println!();
    }
}
