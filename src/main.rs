use anyhow::Context;
use clap::{Parser, Subcommand};
use oslo_events::apis::{create_extractors, supported_sources};
use oslo_events::browser::create_launcher;
use oslo_events::cache::{
    CacheManager, EventProvider, LeasedCacheManager, LeasedSettings, SqliteStore,
};
use oslo_events::config::{CacheMode, Config};
use oslo_events::constants::source_display_name;
use oslo_events::observability::{self, init_logging};
use oslo_events::pipeline::ScrapeCoordinator;
use oslo_events::server;
use oslo_events::types::{SourceBatch, SourceStatus};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "oslo_events")]
#[command(about = "Oslo event listings scraper with a cached streaming API")]
#[command(version)]
struct Cli {
    /// Path to a TOML config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the cached event stream over HTTP
    Serve {
        /// Address to bind, overrides server.bind
        #[arg(long)]
        bind: Option<String>,
    },
    /// Run one scrape cycle and print a per-source summary
    Scrape {
        /// Sources to run (comma-separated). Defaults to the configured ones
        #[arg(long)]
        sources: Option<String>,
        /// Write the scraped events as JSON to this file
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// List supported sources
    Sources,
}

fn build_coordinator(config: &Config) -> anyhow::Result<ScrapeCoordinator> {
    let launcher = create_launcher(&config.browser).context("creating browser launcher")?;
    let extractors = create_extractors(&config.sources, launcher);
    Ok(ScrapeCoordinator::new(extractors, config.cache.cycle_timeout()))
}

fn build_provider(config: &Config) -> anyhow::Result<Arc<dyn EventProvider>> {
    let coordinator = build_coordinator(config)?;
    let provider: Arc<dyn EventProvider> = match config.cache.mode {
        CacheMode::Memory => Arc::new(CacheManager::new(coordinator, config.cache.ttl())),
        CacheMode::Sqlite => {
            let store = SqliteStore::open(&config.cache.sqlite_path).with_context(|| {
                format!("opening cache store {}", config.cache.sqlite_path.display())
            })?;
            Arc::new(LeasedCacheManager::new(
                coordinator,
                Arc::new(store),
                LeasedSettings::from_config(&config.cache),
            ))
        }
    };
    Ok(provider)
}

async fn run_scrape(mut config: Config, sources: Option<String>, output: Option<PathBuf>) -> anyhow::Result<()> {
    if let Some(list) = sources {
        config.sources.enabled = list.split(',').map(|s| s.trim().to_string()).collect();
        config.validate()?;
    }
    let coordinator = build_coordinator(&config)?;

    println!("🔄 Scraping {}...", coordinator.source_names().join(", "));
    let report = coordinator
        .run_cycle(&mut |batch: &SourceBatch| {
            info!(source = %batch.source, "Received {} events", batch.events.len())
        })
        .await;

    println!("\n📊 Cycle results ({:.1}s):", report.duration_secs());
    for source in &report.sources {
        println!(
            "   {:<12} {:<10} {} events in {} batches",
            source.source,
            source.status.label(),
            source.events,
            source.batches
        );
        if let SourceStatus::Failed(reason) = &source.status {
            println!("      ⚠️  {}", reason);
        }
    }
    println!("   Total events: {}", report.events.len());
    if !report.is_committable() {
        warn!("Cycle would not be committed to the cache");
    }

    if let Some(path) = output {
        let json = serde_json::to_string_pretty(&report.events)?;
        std::fs::write(&path, json).with_context(|| format!("writing {}", path.display()))?;
        println!("   Output file: {}", path.display());
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    init_logging();

    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Serve { bind } => {
            observability::metrics::init();
            let provider = build_provider(&config)?;
            let bind = bind.unwrap_or_else(|| config.server.bind.clone());
            info!(mode = ?config.cache.mode, "Starting server");
            server::start_server(provider, &bind).await?;
        }
        Commands::Scrape { sources, output } => {
            run_scrape(config, sources, output).await?;
        }
        Commands::Sources => {
            for source in supported_sources() {
                println!("{:<12} {}", source, source_display_name(source).unwrap_or_default());
            }
        }
    }
    Ok(())
}
