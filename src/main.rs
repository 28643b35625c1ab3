//! browsedex CLI entry point

use browsedex::{
    commands::{
        cmd_populate, cmd_reindex, cmd_search, cmd_status, print_populate_summary,
        print_reindex_stats, print_search_results, print_status, PopulateArgs, SearchArgs,
    },
    config::Config,
    error::Result,
    index::{FtsIndex, SearchIndex},
    progress::LogWriterFactory,
    store::ContentStore,
};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{error, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "browsedex")]
#[command(version, about = "Aggregate local browser history and search it", long_about = None)]
struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Import browser history, optionally scraping and indexing visited pages
    Populate {
        /// Only import this browser (e.g. chrome, firefox, safari)
        #[arg(short, long)]
        browser: Option<String>,

        /// Only import visits newer than the last import
        #[arg(long)]
        latest: bool,

        /// Fetch page content for URLs that have none yet
        #[arg(long)]
        fulltext: bool,

        /// Write fetched pages to the search index
        #[arg(long)]
        build_index: bool,

        /// Keep temporary copies of locked history databases
        #[arg(long)]
        keep_tmp_files: bool,
    },

    /// Rebuild the search index from stored pages
    Reindex {
        /// Maximum number of URLs to index
        #[arg(short, long)]
        limit: Option<usize>,
    },

    /// Search history; with no query, list recent URLs
    Search {
        /// The search query
        query: Option<String>,

        /// Substring match over URL, title and description
        #[arg(long)]
        structured: bool,
    },

    /// Show database and index status
    Status,
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("{}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(LogWriterFactory::default()))
        .with(filter)
        .init();

    let config = load_config(cli.config.as_deref())?;

    // Initialize components
    let store = ContentStore::connect(&config).await?;
    let index = Arc::new(FtsIndex::connect(&config).await?);

    let cancel = Arc::new(AtomicBool::new(false));
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupted, stopping after the current batch");
                cancel.store(true, Ordering::Relaxed);
            }
        });
    }

    let result = handle_command(&cli, &config, &store, index.clone(), &cancel).await;

    if let Err(e) = index.close().await {
        warn!("Failed to close search index: {}", e);
    }
    store.close().await;

    result
}

fn load_config(path: Option<&std::path::Path>) -> Result<Config> {
    match path {
        Some(path) => Config::load(path),
        None => Config::load_from(None),
    }
}

async fn handle_command(
    cli: &Cli,
    config: &Config,
    store: &ContentStore,
    index: Arc<FtsIndex>,
    cancel: &AtomicBool,
) -> Result<()> {
    match &cli.command {
        Commands::Populate {
            browser,
            latest,
            fulltext,
            build_index,
            keep_tmp_files,
        } => {
            let args = PopulateArgs {
                browser: browser.clone(),
                latest: *latest,
                fulltext: *fulltext,
                build_index: *build_index,
                keep_tmp_files: *keep_tmp_files,
                home_dir: None,
            };

            let summary = cmd_populate(config, store, index, args, cancel).await?;

            if cli.json {
                println!("{}", serde_json::to_string_pretty(&summary)?);
            } else {
                print_populate_summary(&summary);
            }

            summary.ensure_complete()?;
        }

        Commands::Reindex { limit } => {
            let stats = cmd_reindex(config, store, index, *limit, cancel).await?;

            if cli.json {
                println!("{}", serde_json::to_string_pretty(&stats)?);
            } else {
                print_reindex_stats(&stats);
            }
        }

        Commands::Search { query, structured } => {
            let args = SearchArgs {
                query: query.clone(),
                structured: *structured,
            };

            let output = cmd_search(config, store, index, args).await?;

            if cli.json {
                println!("{}", serde_json::to_string_pretty(&output)?);
            } else {
                print_search_results(&output);
            }
        }

        Commands::Status => {
            let status = cmd_status(config, store, &*index).await?;

            if cli.json {
                println!("{}", serde_json::to_string_pretty(&status)?);
            } else {
                print_status(&status);
            }
        }
    }

    Ok(())
}
