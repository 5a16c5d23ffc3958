//! # apod CLI
//!
//! Command-line interface for apod-search: collection setup, bulk loading
//! and search against an Elasticsearch-compatible store.
//!
//! ## Usage
//!
//! ```bash
//! apod --config ./config/apod.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `apod init` | Create the collection if needed and wait until it serves |
//! | `apod load <file>` | Bulk-ingest a JSON array of entries |
//! | `apod search [text]` | Search entries, optionally filtered by year |
//! | `apod health` | Print the collection's current health |
//!
//! Logs go to stderr (`RUST_LOG` overrides the level); results go to stdout.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use apod_search::config::{self, Config};
use apod_search::ingest::{load_documents, BulkIngestor, IngestSettings};
use apod_search::lifecycle::IndexManager;
use apod_search::models::{SearchRequest, SearchResult};
use apod_search::search::Searcher;
use apod_search::store::http::ElasticsearchStore;

/// apod: search and ingestion for daily astronomy entries.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. When the default path does not exist, built-in defaults are used.
#[derive(Parser)]
#[command(
    name = "apod",
    about = "Search and bulk ingestion for daily astronomy entries",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log at debug level unless RUST_LOG is set.
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

const DEFAULT_CONFIG_PATH: &str = "./config/apod.toml";

#[derive(Subcommand)]
enum Commands {
    /// Create the collection if it is missing and wait until it is ready.
    ///
    /// Idempotent: an existing collection is left untouched.
    Init,

    /// Bulk-ingest entries from a JSON file.
    ///
    /// The file holds an array of objects with `title`, `explanation`,
    /// `date` (YYYY-MM-DD), `image_url` and `authors`. Entries are written
    /// in chunks; failed chunks are reported and the command exits non-zero.
    Load {
        /// Path to the JSON file.
        file: PathBuf,

        /// Override the chunk size from config.
        #[arg(long)]
        chunk_size: Option<usize>,
    },

    /// Search indexed entries.
    ///
    /// With text, results are ranked by relevance then date; without text,
    /// they are listed newest first.
    Search {
        /// Free text to search for. Omit to browse.
        #[arg(default_value = "")]
        text: String,

        /// Only return entries from this year (YYYY).
        #[arg(long)]
        year: Option<String>,

        /// Zero-based page number.
        #[arg(long, default_value_t = 0)]
        page: usize,

        /// Results per page (defaults to `search.page_size`).
        #[arg(long)]
        page_size: Option<usize>,

        /// Print the result as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Print the collection's current health status.
    Health,
}

fn init_tracing(verbose: bool) {
    let default = if verbose {
        "apod_search=debug,apod=debug"
    } else {
        "apod_search=info,apod=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)),
        )
        .with_writer(std::io::stderr)
        .init();
}

fn load_settings(path: Option<&PathBuf>) -> anyhow::Result<Config> {
    match path {
        Some(p) => config::load_config(p),
        None => config::load_or_default(DEFAULT_CONFIG_PATH.as_ref()),
    }
}

fn index_manager(cfg: &Config) -> anyhow::Result<Arc<IndexManager>> {
    let store = ElasticsearchStore::from_config(&cfg.store)
        .with_context(|| format!("Failed to create store client for {}", cfg.store.url))?;
    Ok(Arc::new(IndexManager::new(
        Arc::new(store),
        cfg.store.index.clone(),
        cfg.readiness.policy(),
    )))
}

fn print_result(result: &SearchResult, request: &SearchRequest) {
    if result.items.is_empty() {
        println!("No results.");
    } else {
        for (i, doc) in result.items.iter().enumerate() {
            println!("{}. {}  {}", request.offset + i + 1, doc.date, doc.title);
            if !doc.authors.is_empty() {
                println!("    authors: {}", doc.authors);
            }
            if !doc.image_url.is_empty() {
                println!("    image: {}", doc.image_url);
            }
            let excerpt: String = doc.explanation.chars().take(160).collect();
            println!("    excerpt: \"{}\"", excerpt.replace('\n', " ").trim());
            println!();
        }
    }
    println!("total: {}", result.total_matches);
    if !result.year_buckets.is_empty() {
        let years: Vec<String> = result
            .year_buckets
            .iter()
            .map(|b| format!("{} ({})", b.key, b.doc_count))
            .collect();
        println!("years: {}", years.join(", "));
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let cfg = load_settings(cli.config.as_ref())?;
    let manager = index_manager(&cfg)?;

    match cli.command {
        Commands::Init => {
            manager.ensure_ready().await?;
            println!("Index '{}' is ready.", manager.index());
        }
        Commands::Load { file, chunk_size } => {
            let docs = load_documents(&file)?;
            let mut settings = IngestSettings::from(&cfg.ingest);
            if let Some(n) = chunk_size {
                if n == 0 {
                    anyhow::bail!("--chunk-size must be > 0");
                }
                settings.chunk_size = n;
            }
            // Init runs even for an empty batch.
            manager.ensure_ready().await?;
            let ingestor = BulkIngestor::new(manager, settings);
            let report = ingestor.ingest(&docs).await?;
            println!(
                "Completed indexing. {} chunks succeeded out of {}.",
                report.chunks_succeeded, report.chunks_attempted
            );
            println!(
                "  documents indexed: {} of {}",
                report.documents_indexed, report.documents
            );
            for failure in &report.failures {
                println!(
                    "  chunk {} failed ({} documents)",
                    failure.chunk + 1,
                    failure.documents.len()
                );
            }
            report.into_result()?;
        }
        Commands::Search {
            text,
            year,
            page,
            page_size,
            json,
        } => {
            let page_size = page_size.unwrap_or(cfg.search.page_size);
            let request = SearchRequest::page(text, page, page_size, year);
            let result = Searcher::new(manager).search(&request).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                print_result(&result, &request);
            }
        }
        Commands::Health => {
            let status = manager.health().await?;
            println!("{} {}", manager.index(), status);
        }
    }

    Ok(())
}
