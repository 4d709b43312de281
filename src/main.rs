//! Catalog Harvest main entry point
//!
//! This is the command-line interface for the Catalog Harvest acquisition engine.

use anyhow::Context;
use catalog_harvest::catalog::CatalogMerger;
use catalog_harvest::config::{load_config_with_hash, validate_page_size, Config};
use catalog_harvest::fetch::{
    build_http_client, fetch_catalog, BackoffPolicy, BackoffScheduler, HttpSearchClient,
    PaginatedFetcher,
};
use catalog_harvest::output::{load_statistics, print_statistics};
use catalog_harvest::staging::StagingArea;
use catalog_harvest::storage::{lock_storage, open_storage, share, SharedStorage};
use catalog_harvest::taxonomy::{HttpBrowseClient, TaxonomyCrawler};
use catalog_harvest::walker::{
    DocumentSession, Immediate, OperatorSignal, PageWalker, StdinOperator, WalkerSettings,
    WebDriverSession,
};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

/// Catalog Harvest: acquisition engine for record-collection catalogs
///
/// Pulls the collection catalog from a paginated search API, enriches
/// collections with their browse taxonomy, and walks a document viewer page
/// by page to extract index tables into SQLite.
#[derive(Parser, Debug)]
#[command(name = "catalog-harvest")]
#[command(version)]
#[command(about = "Acquisition engine for record-collection catalogs", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(short, long, value_name = "CONFIG", default_value = "harvest.toml")]
    config: PathBuf,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose", global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Page through the search endpoint and stage every page
    Fetch {
        /// Entries per page (defaults to search.page-size)
        #[arg(long)]
        page_size: Option<u32>,

        /// Stage pages only, without merging them into the store
        #[arg(long)]
        no_merge: bool,
    },

    /// Merge staged pages into the collection store
    Merge {
        /// Run to merge (defaults to the latest completed run)
        #[arg(long)]
        run: Option<i64>,
    },

    /// Crawl the browse taxonomy of collections and attach it
    CrawlTaxonomy {
        /// Collection keys to crawl
        #[arg(required = true)]
        keys: Vec<String>,

        /// Skip the collection details lookup
        #[arg(long)]
        skip_details: bool,
    },

    /// Walk record pages in a WebDriver session and extract their index rows
    Walk {
        /// Attach to an existing WebDriver session instead of opening one
        #[arg(long)]
        session: Option<String>,

        /// Navigate here before handing over to the operator
        #[arg(long)]
        start_url: Option<String>,

        /// Start walking without waiting for the operator
        #[arg(long)]
        no_prompt: bool,

        /// Save each page image through the viewer (overrides walker.save-images)
        #[arg(long)]
        save_images: bool,
    },

    /// Show statistics from the database and exit
    Stats,

    /// Validate the configuration and show what it resolves to
    CheckConfig,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose, cli.quiet);

    // Load and validate configuration
    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (config, config_hash) = load_config_with_hash(&cli.config)
        .with_context(|| format!("Failed to load configuration {}", cli.config.display()))?;
    tracing::info!("Configuration loaded successfully (hash: {})", config_hash);

    let cancel = CancellationToken::new();
    spawn_interrupt_handler(cancel.clone());

    match cli.command {
        Command::Fetch {
            page_size,
            no_merge,
        } => handle_fetch(&config, &config_hash, page_size, no_merge, cancel).await,
        Command::Merge { run } => handle_merge(&config, run),
        Command::CrawlTaxonomy { keys, skip_details } => {
            handle_crawl_taxonomy(&config, &keys, skip_details, cancel).await
        }
        Command::Walk {
            session,
            start_url,
            no_prompt,
            save_images,
        } => handle_walk(&config, session, start_url, no_prompt, save_images, cancel).await,
        Command::Stats => handle_stats(&config),
        Command::CheckConfig => {
            handle_check_config(&config, &config_hash);
            Ok(())
        }
    }
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        // Only show errors
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("catalog_harvest=info,warn"),
            1 => EnvFilter::new("catalog_harvest=debug,info"),
            2 => EnvFilter::new("catalog_harvest=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

/// Cancels the token on Ctrl-C; traversals stop at their next checkpoint
fn spawn_interrupt_handler(cancel: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received, stopping at the next checkpoint");
            cancel.cancel();
        }
    });
}

fn open_shared_storage(config: &Config) -> anyhow::Result<SharedStorage> {
    let path = Path::new(&config.output.database_path);
    let storage = open_storage(path)
        .with_context(|| format!("Failed to open database {}", path.display()))?;
    Ok(share(storage))
}

/// Handles the fetch command: stages all pages, then merges them
async fn handle_fetch(
    config: &Config,
    config_hash: &str,
    page_size: Option<u32>,
    no_merge: bool,
    cancel: CancellationToken,
) -> anyhow::Result<()> {
    let page_size = page_size.unwrap_or(config.search.page_size);
    validate_page_size(page_size).context("Invalid --page-size")?;

    let storage = open_shared_storage(config)?;
    let staging = StagingArea::new(&config.output.staging_dir);

    let client = build_http_client(&config.http)?;
    let api = HttpSearchClient::new(client, &config.search.endpoint)?;
    let backoff = BackoffScheduler::new(BackoffPolicy::from_config(&config.backoff));
    let mut fetcher = PaginatedFetcher::new(api, backoff, staging.clone(), config.search.clone())
        .with_cancellation(cancel);

    let report = fetch_catalog(&mut fetcher, &storage, config_hash, page_size).await?;
    println!(
        "Fetched {} results in {} pages (run {}, staged under {})",
        report.total_results,
        report.pages,
        report.run_id,
        staging.traversal_dir(&report.traversal_id).display()
    );

    if no_merge {
        return Ok(());
    }

    let merged = CatalogMerger::new(staging, storage).merge(&report.traversal_id)?;
    println!(
        "Merged {} entries ({} distinct collections, {} skipped)",
        merged.entries, merged.distinct_keys, merged.skipped
    );
    Ok(())
}

/// Handles the merge command
fn handle_merge(config: &Config, run: Option<i64>) -> anyhow::Result<()> {
    let storage = open_shared_storage(config)?;
    let staging = StagingArea::new(&config.output.staging_dir);
    let merger = CatalogMerger::new(staging, storage.clone());

    let report = match run {
        Some(run_id) => {
            let run = lock_storage(&storage)?.get_run(run_id)?;
            merger.merge(&run.traversal_id())?
        }
        None => match merger.merge_latest()? {
            Some(report) => report,
            None => {
                println!("No completed fetch run to merge");
                return Ok(());
            }
        },
    };

    println!(
        "Merged {} pages from {}: {} entries ({} distinct collections, {} skipped)",
        report.pages, report.traversal_id, report.entries, report.distinct_keys, report.skipped
    );
    Ok(())
}

/// Handles the crawl-taxonomy command
async fn handle_crawl_taxonomy(
    config: &Config,
    keys: &[String],
    skip_details: bool,
    cancel: CancellationToken,
) -> anyhow::Result<()> {
    let storage = open_shared_storage(config)?;
    let client = build_http_client(&config.http)?;
    let api = HttpBrowseClient::new(
        client,
        &config.taxonomy.browse_endpoint,
        &config.taxonomy.info_endpoint,
    )?;
    let backoff = BackoffScheduler::new(BackoffPolicy::from_config(&config.backoff));
    let mut crawler = TaxonomyCrawler::new(api, backoff, storage, config.taxonomy.max_depth)
        .with_cancellation(cancel);

    for key in keys {
        if !skip_details {
            let collection = crawler.enrich(key).await?;
            println!(
                "{}: {}",
                key,
                collection.title.as_deref().unwrap_or("(untitled)")
            );
        }

        let outcome = crawler.crawl_and_attach(key).await?;
        println!(
            "{}: {} sections, depth {}, {} requests ({} branches cut at depth cap)",
            key, outcome.nodes, outcome.depth, outcome.requests, outcome.depth_limit_reached
        );
    }
    Ok(())
}

/// Handles the walk command
async fn handle_walk(
    config: &Config,
    session_id: Option<String>,
    start_url: Option<String>,
    no_prompt: bool,
    save_images: bool,
    cancel: CancellationToken,
) -> anyhow::Result<()> {
    let storage = open_shared_storage(config)?;
    let walker_config = &config.walker;

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.http.timeout_secs))
        .connect_timeout(Duration::from_secs(config.http.connect_timeout_secs))
        .build()?;

    let owned = session_id.is_none();
    let mut session = match session_id {
        Some(id) => WebDriverSession::attach(
            client,
            &walker_config.webdriver_url,
            id,
            walker_config.selectors.clone(),
        )?,
        None => {
            WebDriverSession::start(
                client,
                &walker_config.webdriver_url,
                walker_config.selectors.clone(),
            )
            .await?
        }
    };

    if let Some(url) = start_url {
        tracing::info!("Navigating to {}", url);
        session
            .navigate(&url)
            .await
            .with_context(|| format!("Failed to open {}", url))?;
    }

    let mut operator: Box<dyn OperatorSignal> = if no_prompt {
        Box::new(Immediate)
    } else {
        Box::new(StdinOperator::default().with_cancellation(cancel.clone()))
    };

    let mut settings = WalkerSettings::from_config(walker_config);
    settings.save_images |= save_images;
    let mut walker = PageWalker::new(session, storage, settings).with_cancellation(cancel);
    let result = walker.run(operator.as_mut()).await;

    let report = walker.report().clone();
    println!(
        "Walk {}: {} pages, {} rows ({} new) into {} tables, {} retries",
        walker.state(),
        report.pages,
        report.rows_extracted,
        report.rows_inserted,
        report.tables.len(),
        report.retries
    );
    if report.images_saved > 0 || report.images_withheld > 0 {
        println!(
            "Images: {} saved, {} withheld by collection policy",
            report.images_saved, report.images_withheld
        );
    }

    if owned {
        if let Err(e) = walker.into_session().close().await {
            tracing::warn!("Failed to close WebDriver session: {}", e);
        }
    }

    result?;
    Ok(())
}

/// Handles the stats command: shows statistics from the database
fn handle_stats(config: &Config) -> anyhow::Result<()> {
    println!("Database: {}\n", config.output.database_path);

    let storage = open_storage(Path::new(&config.output.database_path))?;
    let stats = load_statistics(&storage)?;
    print_statistics(&stats);

    Ok(())
}

/// Handles the check-config command: shows the resolved configuration
fn handle_check_config(config: &Config, config_hash: &str) {
    println!("=== Catalog Harvest Configuration ===\n");

    println!("Search:");
    println!("  Endpoint: {}", config.search.endpoint);
    println!("  Page size: {}", config.search.page_size);
    println!("  Locale: {}", config.search.locale);

    println!("\nBackoff:");
    println!(
        "  Window: {}s - {}s (x{} on retry)",
        config.backoff.min_seconds, config.backoff.max_seconds, config.backoff.escalation_factor
    );

    println!("\nTaxonomy:");
    println!("  Browse: {}", config.taxonomy.browse_endpoint);
    println!("  Info: {}", config.taxonomy.info_endpoint);
    println!("  Max depth: {}", config.taxonomy.max_depth);

    println!("\nWalker:");
    println!("  WebDriver: {}", config.walker.webdriver_url);
    println!(
        "  Retry budget: {} ({}ms apart)",
        config.walker.retry_budget, config.walker.retry_delay_ms
    );
    if let Some(max) = config.walker.max_pages {
        println!("  Max pages: {}", max);
    }
    println!("  Save images: {}", config.walker.save_images);

    println!("\nOutput:");
    println!("  Database: {}", config.output.database_path);
    println!("  Staging: {}", config.output.staging_dir);

    println!("\n✓ Configuration is valid (hash: {})", config_hash);
}
