// src/cli.rs
// =============================================================================
// This file defines our command-line interface using the `clap` crate.
//
// clap is a popular Rust library for parsing command-line arguments.
// We use the "derive" API which lets us define the CLI structure using
// Rust structs and attributes (the #[...] things).
//
// Rust concepts:
// - Structs: Custom data types that group related data
// - Enums: Types that can be one of several variants
// - Derive macros: Automatically generate code for our types
// =============================================================================

use std::path::PathBuf;

use clap::{Parser, Subcommand};

// This struct represents our entire CLI application
//
// #[derive(Parser)] tells clap to automatically generate parsing code
// The #[command(...)] attributes configure how the CLI behaves
#[derive(Parser, Debug)]
#[command(
    name = "deal-scout",
    version = "0.1.0",
    about = "A CLI tool to crawl daily-deal sites and collect deal snapshots",
    long_about = "deal-scout crawls Korean daily-deal sites (ticketmonster, coupang, wemakeprice), \
                  extracts every deal it finds along with its purchase options, and streams the \
                  records as JSON. Snapshots can be stored per day and exported as CSV."
)]
pub struct Cli {
    // The #[command(subcommand)] attribute tells clap that this field
    // will hold one of the subcommands defined in the Commands enum
    #[command(subcommand)]
    pub command: Commands,

    /// Log debug detail to stderr
    ///
    /// This flag is global, so it works on every subcommand
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

// This enum defines our subcommands (crawl, deal, dump)
//
// Each variant represents a different subcommand the user can run
// The fields inside each variant become the arguments for that subcommand
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Crawl a whole site and stream every deal found as JSON
    ///
    /// Example: deal-scout crawl --site tmon --max-depth 3 --store
    Crawl {
        /// Which site to crawl: ticketmonster/tmon, coupang, wemakeprice/wmp
        #[arg(short, long)]
        site: String,

        /// Start the crawl at this URL instead of the site's front page
        ///
        /// This is an optional flag: --url
        #[arg(long)]
        url: Option<String>,

        /// Maximum crawl depth from the start page
        ///
        /// Depth 0 = just the start page
        /// Depth 1 = start page + all pages it links to
        /// etc.
        #[arg(long, default_value_t = 10)]
        max_depth: usize,

        /// Cap on pages fetched at the same time
        #[arg(long, default_value_t = 10)]
        max_parallel: usize,

        /// HTTP timeout in seconds for each page
        #[arg(long, default_value_t = 5)]
        timeout: u64,

        /// Do not fetch per-deal purchase options
        #[arg(long)]
        skip_options: bool,

        /// Do not print records to stdout (useful together with --store)
        #[arg(short, long)]
        quiet: bool,

        /// Also append every record to the daily snapshot store
        #[arg(long)]
        store: bool,

        /// Directory holding the daily snapshot files
        #[arg(long, default_value = "data")]
        data_dir: PathBuf,
    },

    /// Fetch and print a single deal by id
    ///
    /// Example: deal-scout deal --site tmon --id 73110
    Deal {
        /// Which site the deal lives on
        #[arg(short, long)]
        site: String,

        /// The site's numeric id for the deal
        #[arg(short, long)]
        id: i64,

        /// Do not fetch the deal's purchase options
        #[arg(long)]
        skip_options: bool,

        /// HTTP timeout in seconds
        #[arg(long, default_value_t = 5)]
        timeout: u64,
    },

    /// Export one day's snapshot as CSV spreadsheets
    ///
    /// Example: deal-scout dump --day 2026-08-20 --out-dir /tmp
    Dump {
        /// Day to export as YYYY-MM-DD (default: today)
        #[arg(long)]
        day: Option<String>,

        /// Directory holding the daily snapshot files
        #[arg(long, default_value = "data")]
        data_dir: PathBuf,

        /// Directory the CSV files are written to
        #[arg(long, default_value = "/tmp")]
        out_dir: PathBuf,

        /// Gzip the exported files (.csv.gz)
        #[arg(long)]
        compress: bool,
    },
}

// -----------------------------------------------------------------------------
// BEGINNER NOTES:
//
// 1. Why use structs and enums?
//    - Structs group related data (like the CLI arguments)
//    - Enums represent choices (like "crawl OR deal OR dump")
//    - Both are core Rust types for organizing data
//
// 2. What are derive macros?
//    - #[derive(...)] automatically generates code for common operations
//    - Parser: generates CLI parsing logic
//    - Debug: generates code to print the struct for debugging
//
// 3. What does global = true mean on --verbose?
//    - Normally an argument belongs to one subcommand
//    - A global argument can be written anywhere on the command line,
//      before or after the subcommand name
//
// 4. Why Option<String> for --url and --day?
//    - Option<T> is Rust's way of saying "may be absent"
//    - clap leaves the field as None when the flag is not given,
//      and the handler picks the default behavior
//
// 5. Why PathBuf instead of String for directories?
//    - PathBuf is the owned type for filesystem paths
//    - It makes the intent clear and joins path segments correctly
//      on every platform
// -----------------------------------------------------------------------------
