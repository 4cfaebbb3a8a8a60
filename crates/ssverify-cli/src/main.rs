mod report;

use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::prelude::*;

use ssverify_client::{RecordingFetcher, ReqwestFetcher};
use ssverify_core::config::{AppConfig, LoggingConfig};
use ssverify_core::traits::Fetcher;
use ssverify_core::{PollService, RecordAssembler, SiteExtractor, TagStreamParser};
use ssverify_db::{Database, DatabaseConfig, ListingRepository};

use crate::report::{CliReporter, render_index};

#[derive(Parser)]
#[command(
    name = "ssverify",
    version,
    about = "Scrape ss.com listings and reconcile them with the store"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scrape the configured sites and reconcile them with the database
    Run {
        /// Path to the JSON config file
        #[arg(short, long, env = "SSVERIFY_CONFIG", default_value = "config.json")]
        config: PathBuf,

        /// Run a single cycle even when `restart` is set
        #[arg(long, default_value_t = false)]
        once: bool,

        /// Store listings that match no stored ad
        #[arg(long, default_value_t = false)]
        insert_new: bool,

        /// PostgreSQL URL (reads DATABASE_URL if not provided)
        #[arg(long)]
        database_url: Option<String>,
    },

    /// Fetch and print listings without touching the database
    Extract {
        /// Path to the JSON config file
        #[arg(short, long, env = "SSVERIFY_CONFIG", default_value = "config.json")]
        config: PathBuf,

        /// Site to extract instead of the configured ones (repeatable)
        #[arg(short, long)]
        site: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            config,
            once,
            insert_new,
            database_url,
        } => {
            let mut config = load_config(&config)?;
            if once {
                config.restart = None;
            }
            config.insert_new |= insert_new;
            init_tracing(&config.logging)?;

            let db_config = match database_url {
                Some(url) => DatabaseConfig::new(url),
                None => DatabaseConfig::from_env()?,
            };
            cmd_run(&config, &db_config).await?;
        }
        Commands::Extract { config, site } => {
            let mut config = load_config(&config)?;
            if !site.is_empty() {
                config.sites = site;
                config.validate()?;
            }
            init_tracing(&config.logging)?;
            cmd_extract(&config).await?;
        }
    }

    Ok(())
}

fn load_config(path: &Path) -> Result<AppConfig> {
    AppConfig::from_file(path)
        .with_context(|| format!("Failed to load config: {}", path.display()))
}

/// Stderr output, plus a plain-text copy in `logging.file` when set.
///
/// `RUST_LOG` takes precedence over `logging.level`.
fn init_tracing(logging: &LoggingConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&logging.level))
        .with_context(|| format!("Invalid logging.level '{}'", logging.level))?;

    let file_layer = match &logging.file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file: {}", path.display()))?;
            Some(
                fmt::layer()
                    .with_ansi(false)
                    .with_target(false)
                    .with_writer(Mutex::new(file)),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .with(file_layer)
        .init();

    Ok(())
}

fn http_fetcher(config: &AppConfig) -> Result<ReqwestFetcher> {
    ReqwestFetcher::with_timeout(Duration::from_secs(config.fetch_timeout))
        .context("Failed to create HTTP client")
}

async fn cmd_run(config: &AppConfig, db_config: &DatabaseConfig) -> Result<()> {
    let database = Database::connect(db_config)
        .await
        .context("Failed to connect to database")?;
    database.migrate().await?;
    let store = database.listing_repo();

    let fetcher = http_fetcher(config)?;
    match config.requests_dir() {
        Some(dir) => poll(RecordingFetcher::new(fetcher, dir), store, config).await,
        None => poll(fetcher, store, config).await,
    }
}

async fn poll<F: Fetcher>(fetcher: F, store: ListingRepository, config: &AppConfig) -> Result<()> {
    let service = PollService::new(fetcher, store, config)?;
    service.run(&CliReporter::default()).await?;
    Ok(())
}

async fn cmd_extract(config: &AppConfig) -> Result<()> {
    let fetcher = http_fetcher(config)?;
    match config.requests_dir() {
        Some(dir) => extract(RecordingFetcher::new(fetcher, dir), config).await,
        None => extract(fetcher, config).await,
    }
}

async fn extract<F: Fetcher>(fetcher: F, config: &AppConfig) -> Result<()> {
    let parser = TagStreamParser::new(config.parser_config())?;
    let extractor = SiteExtractor::new(
        fetcher,
        parser,
        config.base_url(),
        &config.pagination_marker,
    )
    .with_concurrency(config.fetch_concurrency);
    let assembler = RecordAssembler::new(
        config.marker_matcher(),
        config.base_url(),
        &config.house_marker,
    );

    let extraction = extractor.extract_sites(&config.sites).await;
    let index = assembler.assemble(&extraction.stream);

    print!("{}", render_index(&index));
    println!(
        "\nrecords={} addresses={} sites_ok={} sites_failed={}",
        index.len(),
        index.bucket_count(),
        extraction.sites_ok,
        extraction.sites_failed
    );

    Ok(())
}
