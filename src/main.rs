// src/main.rs
// =============================================================================
// This is the entry point of our CLI application.
//
// What happens here:
// 1. Parse command-line arguments using clap
// 2. Set up logging (always to stderr, so stdout stays a clean record stream)
// 3. Dispatch to the appropriate subcommand handler
// 4. Exit with proper code (0 = success, 2 = any error)
//
// Rust concepts used:
// - async/await: Because we need to make many network requests concurrently
// - Result<T, E>: For error handling (T = success type, E = error type)
// - match: Pattern matching to handle different subcommands
// =============================================================================

// Module declarations - tells Rust about our other source files
mod cli; // src/cli.rs - command-line parsing
mod crawler; // src/crawler/ - BFS crawling and HTTP fetching
mod pipeline; // src/pipeline.rs - crawl results to record/option sinks
mod scrape; // src/scrape/ - site scrapers, records, snapshot store

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

// anyhow::Result is like std::result::Result but simpler for applications
// It lets us return any error type with the ? operator
use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::Parser; // Parser trait enables the parse() method
use serde::Serialize;
use tracing_subscriber::EnvFilter;

use cli::{Cli, Commands};
use crawler::{Getter, DEFAULT_USER_AGENT};
use pipeline::CrawlOptions;
use scrape::{Deal, DealId, DealOption, SnapshotStore};

// The #[tokio::main] attribute transforms our async main into a real main function
// It creates a tokio runtime and runs our async code inside it
#[tokio::main]
async fn main() {
    // Parse command-line arguments into our Cli struct
    // This will automatically handle --help, --version, etc.
    let cli = Cli::parse();
    init_logging(cli.verbose);

    // If an error occurred, print it and exit with code 2
    if let Err(error) = run(cli).await {
        eprintln!("Error: {error:#}");
        std::process::exit(2);
    }
}

// Logs go to stderr so that `crawl` can stream records on stdout.
// RUST_LOG overrides the level when set.
fn init_logging(verbose: bool) {
    let default_filter = if verbose {
        "deal_scout=debug"
    } else {
        "deal_scout=info"
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

// Match on which subcommand was used
// Each branch handles a different command (crawl, deal, dump)
async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Crawl {
            site,
            url,
            max_depth,
            max_parallel,
            timeout,
            skip_options,
            quiet,
            store,
            data_dir,
        } => {
            let options = CrawlOptions {
                start_url: url,
                max_depth,
                max_parallel,
                timeout: Duration::from_secs(timeout),
                fetch_options: !skip_options,
                quiet,
            };
            handle_crawl(&site, store.then_some(data_dir), &options).await
        }
        Commands::Deal {
            site,
            id,
            skip_options,
            timeout,
        } => handle_deal(&site, id, skip_options, timeout).await,
        Commands::Dump {
            day,
            data_dir,
            out_dir,
            compress,
        } => handle_dump(day, data_dir, out_dir, compress).await,
    }
}

// Handles the 'crawl' subcommand
// Walks the whole site and streams every deal found, optionally snapshotting
// each record into the daily store
async fn handle_crawl(
    site: &str,
    store_dir: Option<PathBuf>,
    options: &CrawlOptions,
) -> Result<()> {
    let scraper = scrape::new_scraper(site)?;
    let store = match store_dir {
        Some(dir) => Some(Arc::new(SnapshotStore::open(dir).await?)),
        None => None,
    };
    pipeline::run(scraper, store, options).await
}

// Handles the 'deal' subcommand
// Fetches one deal page directly, no crawl, and prints the parsed record
// together with its purchase options as pretty JSON
async fn handle_deal(site: &str, id: i64, skip_options: bool, timeout: u64) -> Result<()> {
    let scraper = scrape::new_scraper(site)?;
    let getter = Getter::new(DEFAULT_USER_AGENT, Duration::from_secs(timeout))?;

    let url = scraper.deal_url(DealId(id));
    let body = getter.get_body(&url).await?;
    let deal = scraper
        .parse_deal(&url, &body)?
        .with_context(|| format!("deal {id} does not exist on {}", scraper.name()))?;

    let options = if skip_options {
        Vec::new()
    } else {
        scraper.fetch_deal_options(&getter, deal.deal_id).await
    };

    #[derive(Serialize)]
    struct DealInfo {
        deal: Deal,
        options: Vec<DealOption>,
    }

    println!("{}", serde_json::to_string_pretty(&DealInfo { deal, options })?);
    Ok(())
}

// Handles the 'dump' subcommand
// Exports one day's snapshot (default: today) as two CSV files,
// gzipped when --compress is given
async fn handle_dump(
    day: Option<String>,
    data_dir: PathBuf,
    out_dir: PathBuf,
    compress: bool,
) -> Result<()> {
    let day = match day {
        Some(raw) => NaiveDate::parse_from_str(&raw, "%Y-%m-%d")
            .with_context(|| format!("invalid day {raw:?}, expected YYYY-MM-DD"))?,
        None => chrono::Local::now().date_naive(),
    };

    let store = SnapshotStore::open(&data_dir).await?;
    let (deals_csv, options_csv) = store.export_csv(day, &out_dir, compress).await?;

    println!("✅ Exported snapshot for {day}:");
    println!("   📄 {}", deals_csv.display());
    println!("   📄 {}", options_csv.display());
    Ok(())
}
