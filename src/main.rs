//! Orbweaver main entry point
//!
//! This is the command-line interface for the Orbweaver web crawler.

use clap::Parser;
use orbweaver::config::load_config_with_hash;
use orbweaver::crawler::LogHandler;
use orbweaver::CrawlEngine;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// Orbweaver: a polite, resumable web crawler
///
/// Orbweaver crawls websites breadth-first while respecting robots.txt and
/// a per-server politeness delay. Crawl state is kept on disk, so an
/// interrupted resumable session picks up where it left off.
#[derive(Parser, Debug)]
#[command(name = "orbweaver")]
#[command(version = "0.9.0")]
#[command(about = "A polite, resumable web crawler", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Resume the previous session even if the config says otherwise
    #[arg(long, conflicts_with = "fresh")]
    resume: bool,

    /// Start a fresh crawl, wiping previous state
    #[arg(long, conflicts_with = "resume")]
    fresh: bool,

    /// Show statistics from an existing storage root and exit
    #[arg(long)]
    stats: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose, cli.quiet);

    // Load and validate configuration
    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (mut config, _config_hash) = match load_config_with_hash(&cli.config) {
        Ok((cfg, hash)) => {
            tracing::info!("Configuration loaded successfully (hash: {})", hash);
            (cfg, hash)
        }
        Err(e) => {
            tracing::error!("Failed to load configuration: {}", e);
            return Err(e.into());
        }
    };

    // Command-line overrides beat the config file
    if cli.fresh {
        config.storage.resumable = false;
    } else if cli.resume {
        config.storage.resumable = true;
    }

    if cli.stats {
        handle_stats(&config)?;
    } else {
        handle_crawl(config).await?;
    }

    Ok(())
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        // Only show errors
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("orbweaver=info,warn"),
            1 => EnvFilter::new("orbweaver=debug,info"),
            2 => EnvFilter::new("orbweaver=trace,debug"),
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

/// Handles the --stats mode: reads counters and queue lengths from an
/// existing storage root without touching it
fn handle_stats(config: &orbweaver::config::Config) -> anyhow::Result<()> {
    use orbweaver::crawler::CrawlStats;
    use orbweaver::frontier::PENDING_TABLE;
    use orbweaver::storage::{Counters, InFlightLedger, StorageEnv, UrlQueueStore};
    use orbweaver::TldList;

    // Resumable mode never wipes, regardless of what the config says.
    let env = StorageEnv::open(&config.storage.root, true)?;
    let tld = match &config.tld_file {
        Some(path) => Arc::new(TldList::from_file(path)?),
        None => Arc::new(TldList::builtin()),
    };
    let counters = Counters::open(&env)?;
    let queue = UrlQueueStore::open(&env, PENDING_TABLE, false, tld.clone())?;
    let ledger = InFlightLedger::open(&env, tld)?;

    let stats = CrawlStats {
        scheduled: counters.get(Counters::SCHEDULED_PAGES).max(0) as u64,
        processed: counters.get(Counters::PROCESSED_PAGES).max(0) as u64,
        queue_length: queue.len()?,
        in_flight: ledger.len()?,
    };
    println!("{}", serde_json::to_string_pretty(&stats)?);

    Ok(())
}

/// Handles the main crawl operation
async fn handle_crawl(config: orbweaver::config::Config) -> anyhow::Result<()> {
    if config.storage.resumable {
        tracing::info!("Starting crawl (will resume if an interrupted run exists)");
    } else {
        tracing::info!("Starting fresh crawl (ignoring previous state)");
    }

    if config.seeds.is_empty() && !config.storage.resumable {
        tracing::warn!("Configuration lists no seeds; there is nothing to crawl");
    }

    let workers = config.engine.workers;
    let seeds = config.seeds.clone();
    let engine = Arc::new(CrawlEngine::new(config)?);

    for seed in &seeds {
        match seed.doc_id {
            Some(doc_id) => engine.add_seed_with_id(&seed.url, doc_id).await?,
            None => engine.add_seed(&seed.url).await?,
        }
    }

    // First interrupt drains gracefully, a second one kills the process.
    {
        let engine = engine.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("Interrupt received, finishing in-flight work");
                engine.shutdown();
            }
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::error!("Second interrupt, aborting");
                std::process::exit(130);
            }
        });
    }

    engine.run(LogHandler::factory(), workers).await;

    let stats = engine.stats();
    println!("{}", serde_json::to_string_pretty(&stats)?);

    Ok(())
}
