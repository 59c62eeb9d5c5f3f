//! scanvault: data service lifecycle and maintenance commands.

use std::path::Path;
use std::process::ExitCode;
use std::str::FromStr;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::{error, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use scanvault_db::defaults::CACHE_SWEEP_INTERVAL_SECS;
use scanvault_db::{DataService, EntityType, StoreConfig};
use scanvault_search::{FederatedSearchEngine, IndexReport, SearchIndexManager};

#[derive(Parser)]
#[command(name = "scanvault")]
#[command(author, version, about = "Data access and search for scan results")]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the service: migrate, provision search, sweep the cache until ctrl-c
    Run {
        /// Seconds between expired-cache sweeps
        #[arg(long, default_value_t = CACHE_SWEEP_INTERVAL_SECS)]
        sweep_interval: u64,
    },

    /// Apply pending schema migrations
    Migrate,

    /// Show the migration ledger
    Status,

    /// Probe the backend and print pool statistics
    Health,

    /// Search one entity type, or all of them
    Search {
        /// Search text
        query: String,

        /// Restrict to records owned by this user id
        #[arg(short, long)]
        scope: Option<String>,

        /// Entity type (project, scan, file, conflict); all when omitted
        #[arg(short, long)]
        entity: Option<String>,

        /// Maximum number of results
        #[arg(short, long)]
        limit: Option<i64>,

        /// Results to skip (single entity only)
        #[arg(long, default_value_t = 0)]
        offset: i64,
    },

    /// Remove expired cache entries
    SweepCache,
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    let _log_guard = init_logging();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %format!("{:#}", e), "Command failed");
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

/// Install the tracing subscriber.
///
/// Environment variables:
///   LOG_FORMAT  - "json" or "text" (default: "text")
///   LOG_FILE    - path to log file (optional, enables daily-rotated file logging)
///   LOG_ANSI    - "true"/"false" override ANSI colors (auto-detected by default)
///   RUST_LOG    - standard env filter (default: "scanvault=info")
fn init_logging() -> Option<WorkerGuard> {
    let log_format = std::env::var("LOG_FORMAT").unwrap_or_else(|_| "text".to_string());
    let log_file = std::env::var("LOG_FILE").ok();
    let log_ansi = std::env::var("LOG_ANSI")
        .ok()
        .map(|v| v == "true" || v == "1");

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        "scanvault=info,scanvault_db=info,scanvault_search=info".into()
    });
    let registry = tracing_subscriber::registry().with(env_filter);

    let guard = if let Some(ref path) = log_file {
        let file_dir = Path::new(path).parent().unwrap_or(Path::new("."));
        let file_name = Path::new(path)
            .file_name()
            .and_then(|f| f.to_str())
            .unwrap_or("scanvault.log");
        let file_appender = tracing_appender::rolling::daily(file_dir, file_name);
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

        if log_format == "json" {
            registry
                .with(
                    tracing_subscriber::fmt::layer()
                        .json()
                        .with_writer(non_blocking),
                )
                .init();
        } else {
            let layer = tracing_subscriber::fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(log_ansi.unwrap_or(false));
            registry.with(layer).init();
        }
        Some(guard)
    } else {
        if log_format == "json" {
            registry
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        } else {
            let mut layer = tracing_subscriber::fmt::layer();
            if let Some(ansi) = log_ansi {
                layer = layer.with_ansi(ansi);
            }
            registry.with(layer).init();
        }
        None
    };

    info!(
        log_format = %log_format,
        log_file = log_file.as_deref().unwrap_or("(stdout)"),
        "Logging initialized"
    );
    guard
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = StoreConfig::from_env().context("invalid store configuration")?;
    let service = DataService::initialize(config).await;

    let outcome = match cli.command {
        Commands::Run { sweep_interval } => cmd_run(&service, sweep_interval).await,
        Commands::Migrate => cmd_migrate(&service).await,
        Commands::Status => cmd_status(&service).await,
        Commands::Health => cmd_health(&service).await,
        Commands::Search {
            query,
            scope,
            entity,
            limit,
            offset,
        } => cmd_search(&service, &query, scope.as_deref(), entity.as_deref(), limit, offset).await,
        Commands::SweepCache => cmd_sweep_cache(&service).await,
    };

    service.shutdown().await;
    outcome
}

async fn cmd_run(service: &DataService, sweep_interval: u64) -> anyhow::Result<()> {
    if !service.is_live() {
        warn!(
            store_mode = %service.mode(),
            "Backend unavailable, serving from the emulated store"
        );
    }

    let applied = service
        .migration_runner()
        .run()
        .await
        .context("schema migration failed")?;
    info!(result_count = applied.len(), "Migrations complete");

    provision_search(service).await;

    let cache = service.cache().clone();
    let sweeper = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(sweep_interval.max(1)));
        // The first tick completes immediately.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            if let Err(e) = cache.sweep_expired().await {
                warn!(error = %e, "Cache sweep failed");
            }
        }
    });

    info!(store_mode = %service.mode(), "Service ready, press ctrl-c to stop");
    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for ctrl-c")?;
    info!("Shutdown signal received");

    sweeper.abort();
    Ok(())
}

async fn provision_search(service: &DataService) {
    let manager = SearchIndexManager::new(service.store().clone());
    let indexes = manager.create_indexes().await;
    let functions = manager.create_functions().await;
    for (kind, report) in [("indexes", indexes), ("functions", functions)] {
        log_report(kind, report);
    }
}

fn log_report(kind: &str, report: IndexReport) {
    if report.failed > 0 {
        warn!(
            op = kind,
            created = report.created,
            failed = report.failed,
            "Search provisioning incomplete"
        );
    }
}

async fn cmd_migrate(service: &DataService) -> anyhow::Result<()> {
    let applied = service
        .migration_runner()
        .run()
        .await
        .context("schema migration failed")?;
    if applied.is_empty() {
        println!("Schema is up to date");
    }
    for id in applied {
        println!("applied {}", id);
    }
    Ok(())
}

async fn cmd_status(service: &DataService) -> anyhow::Result<()> {
    let status = service.migration_runner().status().await?;
    println!("{}", serde_json::to_string_pretty(&status)?);
    Ok(())
}

async fn cmd_health(service: &DataService) -> anyhow::Result<()> {
    let report = service.health().await;
    println!("{}", serde_json::to_string_pretty(&report)?);
    if !report.connected {
        anyhow::bail!("backend not connected");
    }
    Ok(())
}

async fn cmd_search(
    service: &DataService,
    query: &str,
    scope: Option<&str>,
    entity: Option<&str>,
    limit: Option<i64>,
    offset: i64,
) -> anyhow::Result<()> {
    let engine = FederatedSearchEngine::for_service(service);
    let output = match entity {
        Some(name) => {
            let entity = EntityType::from_str(name)?;
            let results = engine
                .search_entity(entity, query, scope, limit, offset)
                .await?;
            serde_json::to_string_pretty(&results)?
        }
        None => {
            let response = engine.global_search(query, scope, limit).await?;
            serde_json::to_string_pretty(&response)?
        }
    };
    println!("{}", output);
    Ok(())
}

async fn cmd_sweep_cache(service: &DataService) -> anyhow::Result<()> {
    let removed = service.cache().sweep_expired().await?;
    println!("removed {} expired cache entries", removed);
    Ok(())
}
