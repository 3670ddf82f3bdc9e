use std::sync::Arc;

use anyhow::Context;
use broker_client::{BrokerClient, HttpBrokerClient};
use clap::{Parser, Subcommand};
use configuration::{Config, StoreBackend, load_config_from};
use core_types::TradeMode;
use engine::Engine;
use events::EventBus;
use store::{MemoryStore, PgStore, Store};
use tokio::sync::watch;
use tracing::{error, info};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

/// The main entry point for the Openbell trading engine.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Secrets (DATABASE_URL, OPENBELL_BROKER_TOKEN) come from the
    // environment; a local .env is a convenience, not a requirement.
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let _log_guard = init_tracing();

    let config = load_config_from(&cli.config)
        .with_context(|| format!("failed to load configuration from {}", cli.config))?;

    match cli.command {
        Commands::Run(args) => run_engine(config, args).await,
        Commands::InitDb => init_db(config).await,
        Commands::ShowConfig => {
            println!("{config:#?}");
            Ok(())
        }
    }
}

// ==============================================================================
// CLI Structure
// ==============================================================================

/// An order lifecycle and risk gating engine for a single trading account.
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the configuration file.
    #[arg(long, default_value = "config.toml")]
    config: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the engine: market data, strategy loop, sweeps and heartbeat.
    Run(RunArgs),
    /// Create or update the Postgres schema, then exit.
    InitDb,
    /// Print the resolved configuration and exit.
    ShowConfig,
}

#[derive(Parser)]
struct RunArgs {
    /// Lock this algo in for today before the loops start (e.g.
    /// "vwap_momentum"). Omitted, the engine resumes whatever day the store
    /// holds, or idles on simulated data.
    #[arg(long)]
    algo: Option<String>,

    /// Trade mode for the --algo lock.
    #[arg(long, default_value_t = TradeMode::Paper)]
    mode: TradeMode,
}

// ==============================================================================
// Command Handlers
// ==============================================================================

async fn run_engine(config: Config, args: RunArgs) -> anyhow::Result<()> {
    let store = build_store(&config).await?;
    let broker = build_broker(&config)?;
    let bus = EventBus::new(1024);
    let engine = Engine::new(config, store, broker, bus);

    engine.start().await?;
    if let Some(algo) = &args.algo {
        let state = engine.lock_algo(algo, args.mode).await?;
        info!(
            "Locked {} ({}) for {}",
            state.algo, state.mode, state.trade_date
        );
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let handles = engine.spawn_tasks(&shutdown_rx);
    info!("Engine is running. Press Ctrl-C to stop.");

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for Ctrl-C")?;
    info!("Ctrl-C received, shutting down.");
    let _ = shutdown_tx.send(true);

    for handle in handles {
        if let Err(e) = handle.await {
            error!(error = %e, "A background task ended abnormally.");
        }
    }
    engine.shutdown().await;
    Ok(())
}

async fn init_db(config: Config) -> anyhow::Result<()> {
    let url = database_url(&config)
        .context("init-db needs DATABASE_URL or store.database_url to be set")?;
    let pool = store::connect(&url).await?;
    store::run_migrations(&pool).await?;
    info!("Database schema is up to date.");
    Ok(())
}

// ==============================================================================
// Wiring
// ==============================================================================

async fn build_store(config: &Config) -> anyhow::Result<Arc<dyn Store>> {
    match config.store.backend {
        StoreBackend::Memory => {
            info!("Using the in-memory store; nothing survives a restart.");
            let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
            Ok(store)
        }
        StoreBackend::Postgres => {
            let url = database_url(config)
                .context("store.backend is postgres but no database URL is configured")?;
            let pool = store::connect(&url).await?;
            store::run_migrations(&pool).await?;
            let store: Arc<dyn Store> = Arc::new(PgStore::new(pool));
            Ok(store)
        }
    }
}

fn build_broker(config: &Config) -> anyhow::Result<Arc<dyn BrokerClient>> {
    let token = std::env::var("OPENBELL_BROKER_TOKEN")
        .ok()
        .or_else(|| config.broker.access_token.clone());
    match &token {
        Some(_) => info!("Broker session token present; live endpoints are available."),
        None => info!("No broker session token; simulated data and paper execution only."),
    }
    let client: Arc<dyn BrokerClient> = Arc::new(HttpBrokerClient::new(&config.broker, token)?);
    Ok(client)
}

fn database_url(config: &Config) -> Option<String> {
    std::env::var("DATABASE_URL")
        .ok()
        .or_else(|| config.store.database_url.clone())
}

/// Console plus a daily-rolling file under logs/. The guard must live as
/// long as the process or buffered lines are lost on exit.
fn init_tracing() -> tracing_appender::non_blocking::WorkerGuard {
    let file = RollingFileAppender::new(Rotation::DAILY, "logs", "openbell.log");
    let (file_writer, guard) = tracing_appender::non_blocking(file);
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stdout))
        .with(fmt::layer().with_ansi(false).with_writer(file_writer))
        .init();
    guard
}
