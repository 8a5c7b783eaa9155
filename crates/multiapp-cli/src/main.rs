//! Command-line driver for the multiapp offline cache.
//!
//! Runs the cache manager against the real network (or none at all) and
//! keeps the cache store on disk between runs.
//!
//! ## Usage
//!
//! ```bash
//! # Install the configured generation
//! multiapp install --config multiapp.json
//!
//! # Fetch a page as a navigation, with the network switched off
//! multiapp fetch ./about.html --navigate --offline
//!
//! # Store a sub-application ahead of time
//! multiapp prefetch /Apps/todo.html
//!
//! # Show what is cached
//! multiapp status
//! ```

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{ArgAction, Parser, Subcommand};
use multiapp_common::{init_logging, AppConfig, LogConfig, LogFormat, Result};
use tracing::{error, Level};

mod session;

use session::Session;

/// Configuration file read when `--config` is not given.
const DEFAULT_CONFIG: &str = "multiapp.json";

#[derive(Parser)]
#[command(name = "multiapp")]
#[command(about = "Offline cache manager for the multiapp launcher")]
struct Cli {
    /// Configuration file (JSON)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    /// Log output format (pretty, compact, json)
    #[arg(long, global = true)]
    log_format: Option<LogFormat>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Install the configured generation and activate it
    Install {
        /// Run without network access
        #[arg(long)]
        offline: bool,
    },

    /// Fetch a URL through the cache manager
    Fetch {
        /// URL, absolute or relative to the scope
        url: String,
        /// Treat the request as a page navigation
        #[arg(long)]
        navigate: bool,
        /// Run without network access
        #[arg(long)]
        offline: bool,
        /// Print the response body
        #[arg(long)]
        body: bool,
    },

    /// Store a URL in the active generation
    Prefetch {
        /// URL, absolute or relative to the scope
        url: String,
        /// Run without network access
        #[arg(long)]
        offline: bool,
    },

    /// Show the cached generations and their entries
    Status,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(category = e.category(), error = %e, "Command failed");
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = match &cli.config {
        Some(path) => AppConfig::load(path)?,
        None => AppConfig::load_or_default(Path::new(DEFAULT_CONFIG))?,
    };
    init_logging(log_config(&cli, &config))?;

    match cli.command {
        Commands::Install { offline } => {
            let session = Session::open(config, offline)?;
            let report = session.install().await?;

            println!("Installed generation {}", report.generation);
            println!("  Stored: {}", report.stored.len());
            for url in &report.stored {
                println!("    {}", url);
            }
            if !report.is_complete() {
                println!("  Failed: {}", report.failed.len());
                for (url, reason) in &report.failed {
                    println!("    {} ({})", url, reason);
                }
            }
            session.save().await?;
        }

        Commands::Fetch {
            url,
            navigate,
            offline,
            body,
        } => {
            let session = Session::open(config, offline)?;
            session.activate().await?;
            let result = session.fetch(&url, navigate).await;
            session.save().await?;
            let (response, served) = result?;

            println!("{} {}", response.status, response.url);
            println!("  Served from: {}", served);
            if let Some(content_type) = response.content_type() {
                println!("  Content-Type: {}", content_type);
            }
            println!("  Length: {}", response.body.len());
            if body {
                println!();
                println!("{}", String::from_utf8_lossy(&response.body));
            }
        }

        Commands::Prefetch { url, offline } => {
            let session = Session::open(config, offline)?;
            session.activate().await?;
            session.prefetch(&url).await?;
            session.save().await?;
            println!("Prefetch of {} done", url);
        }

        Commands::Status => {
            let session = Session::open(config, true)?;
            let current = &session.config().worker.cache_name;
            let snapshot = session.snapshot().await;

            if snapshot.caches.is_empty() {
                println!("No cached generations");
            }
            for cache in &snapshot.caches {
                let marker = if &cache.name == current { " (current)" } else { "" };
                println!("{}{}: {} entries", cache.name, marker, cache.entries.len());
                for (key, entry) in &cache.entries {
                    println!("  {} {} {} bytes", entry.status, key.as_str(), entry.body.len());
                }
            }
        }
    }

    Ok(())
}

fn log_config(cli: &Cli, config: &AppConfig) -> LogConfig {
    let mut log = LogConfig::from_verbosity(cli.verbose);
    if cli.verbose == 0 {
        if let Ok(level) = config.logging.level.parse::<Level>() {
            log.level = level;
        }
    }
    log.with_format(cli.log_format.unwrap_or(config.logging.format))
}
