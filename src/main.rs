//! Backlink Scout main entry point
//!
//! This is the command-line interface for the coordinator, the crawl workers
//! and the database admin tasks.

use anyhow::{bail, Context};
use backlink_scout::config::{load_or_default, validate, validate_domain_string, Config};
use backlink_scout::coordinator::{self, AppState};
use backlink_scout::output::{load_statistics, print_statistics};
use backlink_scout::storage::{import_sellers, open_storage, SqliteStorage, Storage};
use backlink_scout::url::canonical_domain;
use backlink_scout::worker::{WorkerContext, WorkerEngine};
use clap::{Args, Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

/// Backlink Scout: distributed backlink discovery
///
/// A coordinator hands out seller domains; workers crawl them, collect the
/// external domains they link to and look for contact emails on those.
#[derive(Parser, Debug)]
#[command(name = "backlink-scout")]
#[command(version = "1.0.0")]
#[command(about = "Distributed backlink discovery crawler", long_about = None)]
struct Cli {
    /// Path to TOML configuration file (defaults apply when omitted)
    #[arg(short, long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Coordinator database (overrides the configuration file)
    #[arg(long, value_name = "PATH", global = true)]
    database: Option<String>,

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
    /// Crawl sellers handed out by the coordinator until interrupted
    Worker(WorkerArgs),

    /// Serve the task-distribution API until interrupted
    Coordinator {
        /// Listen address (overrides the configuration file)
        #[arg(long, value_name = "ADDR")]
        bind: Option<String>,
    },

    /// Import sellers from a file, one domain or URL per line
    Seed {
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },

    /// Blacklist a domain; in-flight crawls of it are cancelled
    Blacklist {
        domain: String,

        /// Remove the domain from the blacklist instead
        #[arg(long)]
        undo: bool,
    },

    /// Make crawled sellers eligible again
    Reset {
        /// Only reset this seller
        #[arg(long)]
        domain: Option<String>,
    },

    /// Show statistics from the database and exit
    Stats,
}

#[derive(Args, Debug, Default)]
struct WorkerArgs {
    /// Coordinator base URL
    #[arg(long, env = "CRAWL_API_URL")]
    api_url: Option<String>,

    /// Worker identity (default: worker_<hostname>-<pid>)
    #[arg(long, env = "CRAWL_WORKER_ID")]
    worker_id: Option<String>,

    /// Sellers crawled at the same time
    #[arg(long)]
    parallel_sites: Option<usize>,

    /// Concurrent requests per seller
    #[arg(long)]
    concurrent: Option<usize>,

    /// Page budget per seller
    #[arg(long)]
    max_pages: Option<usize>,

    /// Seconds between heartbeats
    #[arg(long, value_name = "SECS")]
    heartbeat_interval: Option<u64>,

    /// Stay idle instead of running email-extraction tasks when no seller is pending
    #[arg(long)]
    no_email_tasks: bool,
}

impl WorkerArgs {
    fn apply(&self, config: &mut Config) {
        let worker = &mut config.worker;
        if let Some(api_url) = &self.api_url {
            worker.api_url = api_url.clone();
        }
        if let Some(worker_id) = &self.worker_id {
            worker.worker_id = Some(worker_id.clone());
        }
        if let Some(n) = self.parallel_sites {
            worker.parallel_sites = n;
        }
        if let Some(n) = self.concurrent {
            worker.concurrent = n;
        }
        if let Some(n) = self.max_pages {
            worker.max_pages = n;
        }
        if let Some(secs) = self.heartbeat_interval {
            worker.heartbeat_interval_ms = secs.saturating_mul(1000);
        }
        if self.no_email_tasks {
            worker.email_tasks = false;
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet);

    let (mut config, hash) =
        load_or_default(cli.config.as_deref()).context("Failed to load configuration")?;
    match (&cli.config, &hash) {
        (Some(path), Some(hash)) => {
            tracing::info!("Configuration loaded from {} (hash: {})", path.display(), hash)
        }
        _ => tracing::info!("No configuration file given, using defaults"),
    }

    if let Some(database) = &cli.database {
        config.coordinator.database_path = database.clone();
    }

    match cli.command {
        Command::Worker(args) => {
            args.apply(&mut config);
            validate(&config).context("Invalid worker configuration")?;
            handle_worker(config).await
        }
        Command::Coordinator { bind } => {
            if let Some(bind) = bind {
                config.coordinator.bind = bind;
            }
            validate(&config).context("Invalid coordinator configuration")?;
            handle_coordinator(config).await
        }
        Command::Seed { file } => handle_seed(&config, &file),
        Command::Blacklist { domain, undo } => handle_blacklist(&config, &domain, undo),
        Command::Reset { domain } => handle_reset(&config, domain.as_deref()),
        Command::Stats => handle_stats(&config),
    }
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("backlink_scout=info,warn"),
            1 => EnvFilter::new("backlink_scout=debug,info"),
            2 => EnvFilter::new("backlink_scout=trace,debug"),
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

/// Cancels `token` on SIGINT or SIGTERM
fn spawn_signal_handler(token: CancellationToken) {
    tokio::spawn(async move {
        wait_for_signal().await;
        tracing::info!("Shutdown requested, finishing in-flight work");
        token.cancel();
    });
}

async fn wait_for_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!("Cannot listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::warn!("Cannot listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}

async fn handle_worker(config: Config) -> anyhow::Result<()> {
    let shutdown = CancellationToken::new();
    spawn_signal_handler(shutdown.clone());

    let ctx = WorkerContext::new(&config, shutdown).context("Failed to initialize worker")?;
    tracing::info!(
        "Coordinator: {}, worker id: {}",
        config.worker.api_url,
        ctx.worker_id
    );

    WorkerEngine::new(Arc::new(ctx)).run().await?;
    Ok(())
}

async fn handle_coordinator(config: Config) -> anyhow::Result<()> {
    let storage = open_database(&config)?;
    let listener = TcpListener::bind(&config.coordinator.bind)
        .await
        .with_context(|| format!("Failed to bind {}", config.coordinator.bind))?;

    let shutdown = CancellationToken::new();
    spawn_signal_handler(shutdown.clone());

    let state = AppState::new(storage, config.coordinator.clone(), &config.classifier);
    coordinator::serve(listener, state, shutdown).await?;
    Ok(())
}

fn open_database(config: &Config) -> anyhow::Result<SqliteStorage> {
    let path = Path::new(&config.coordinator.database_path);
    open_storage(path).with_context(|| format!("Failed to open database {}", path.display()))
}

fn handle_seed(config: &Config, file: &Path) -> anyhow::Result<()> {
    let content = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read {}", file.display()))?;
    let mut storage = open_database(config)?;

    let report = import_sellers(&mut storage, &content)?;
    println!(
        "Imported {} new sellers ({} already known, {} invalid lines)",
        report.inserted, report.existing, report.invalid
    );
    Ok(())
}

fn handle_blacklist(config: &Config, domain: &str, undo: bool) -> anyhow::Result<()> {
    let domain = canonical_domain(domain);
    if let Err(e) = validate_domain_string(&domain) {
        bail!("Invalid domain: {}", e);
    }

    let mut storage = open_database(config)?;
    storage.set_blacklisted(&domain, !undo)?;

    if undo {
        println!("Removed {} from the blacklist", domain);
    } else {
        println!("Blacklisted {}", domain);
    }
    Ok(())
}

fn handle_reset(config: &Config, domain: Option<&str>) -> anyhow::Result<()> {
    let domain = domain.map(canonical_domain);
    let mut storage = open_database(config)?;
    let count = storage.reset_crawled(domain.as_deref())?;
    println!("Reset {} sellers", count);
    Ok(())
}

fn handle_stats(config: &Config) -> anyhow::Result<()> {
    println!("Database: {}\n", config.coordinator.database_path);
    let storage = open_database(config)?;
    let stats = load_statistics(&storage, chrono::Utc::now(), 0)?;
    print_statistics(&stats);
    Ok(())
}
