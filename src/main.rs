use anyhow::Result;
use clap::{Parser, Subcommand};
use drop_access::config::AppConfig;
use drop_access::email::mailer_from_config;
use drop_access::objects::{LocalObjectStore, ObjectStore};
use drop_access::payments::WebhookLedger;
use drop_access::server::{self, AppState};
use drop_access::storage::{InMemoryStorage, Storage};
use drop_access::{logging, metrics, tasks};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

#[cfg(feature = "db")]
use drop_access::{db::DatabaseManager, storage::DatabaseStorage};

#[derive(Parser)]
#[command(name = "drop_access")]
#[command(about = "Share files and links with time-limited, recipient-only access")]
#[command(version)]
struct Cli {
    /// Path to a TOML config file (defaults to ./config.toml when present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Directory for rolling JSON logs
    #[arg(long, global = true, default_value = "logs")]
    log_dir: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP API
    Serve {
        /// Port to listen on (overrides config and DROPACCESS_PORT)
        #[arg(short, long)]
        port: Option<u16>,

        /// Prometheus exporter address, e.g. 127.0.0.1:9464
        #[arg(long)]
        metrics_addr: Option<String>,

        /// Use database storage instead of in-memory
        #[arg(long)]
        use_database: bool,
    },
    /// Apply database migrations and exit
    Migrate,
    /// Run one expiry sweep and exit
    Sweep {
        #[arg(long)]
        use_database: bool,
    },
}

async fn create_storage(config: &AppConfig, use_database: bool) -> Result<Arc<dyn Storage>> {
    if use_database || config.storage.use_database {
        #[cfg(feature = "db")]
        {
            info!("Initializing database storage...");
            let db_manager = DatabaseManager::connect(&config.database).await?;
            db_manager.run_migrations().await?;
            let storage = Arc::new(DatabaseStorage::new(db_manager));
            info!("Database storage initialized successfully");
            Ok(storage)
        }
        #[cfg(not(feature = "db"))]
        {
            anyhow::bail!("Database feature not enabled. Rebuild with --features db");
        }
    } else {
        info!("Using in-memory storage (data will not persist)");
        Ok(Arc::new(InMemoryStorage::new()))
    }
}

async fn serve(
    mut config: AppConfig,
    port: Option<u16>,
    metrics_addr: Option<String>,
    use_database: bool,
) -> Result<()> {
    if let Some(port) = port {
        config.server.port = port;
    }
    if metrics_addr.is_some() {
        config.metrics.listen_addr = metrics_addr;
    }
    metrics::init_metrics(config.metrics.listen_addr.as_deref());

    let storage = create_storage(&config, use_database).await?;
    let objects: Arc<dyn ObjectStore> = Arc::new(LocalObjectStore::new(config.objects_root())?);
    let mailer = mailer_from_config(&config.email);
    let ledger = WebhookLedger::open(config.ledger_path())?;

    if config.payments.webhook_secret.is_none() {
        warn!("PAYMENTS_WEBHOOK_SECRET is not set; payment webhooks will be rejected");
    }

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    let sweep_every = Duration::from_secs(config.access.sweep_interval_secs.max(1));
    let state = AppState::new(config, storage.clone(), objects.clone(), mailer, ledger);

    let sweeper = tokio::spawn(tasks::run_sweeper(
        storage,
        objects,
        state.access.sessions().clone(),
        sweep_every,
    ));

    let result = server::start_server(state, addr).await;
    sweeper.abort();
    result
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables before reading config
    dotenv::dotenv().ok();

    let cli = Cli::parse();
    let _log_guard = logging::init_logging(&cli.log_dir);
    let config = AppConfig::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Serve {
            port,
            metrics_addr,
            use_database,
        } => serve(config, port, metrics_addr, use_database).await,
        Commands::Migrate => {
            let _storage = create_storage(&config, true).await?;
            info!("Migrations applied");
            Ok(())
        }
        Commands::Sweep { use_database } => {
            let storage = create_storage(&config, use_database).await?;
            let objects = LocalObjectStore::new(config.objects_root())?;
            let summary =
                tasks::sweep_expired(storage.as_ref(), &objects, chrono::Utc::now()).await?;
            info!(
                scanned = summary.scanned,
                deactivated = summary.deactivated,
                objects_deleted = summary.objects_deleted,
                "Sweep complete"
            );
            for error in &summary.errors {
                warn!("{}", error);
            }
            println!("{}", serde_json::to_string_pretty(&summary)?);
            Ok(())
        }
    }
}
