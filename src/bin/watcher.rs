use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::{debug, error, info, level_filters::LevelFilter, trace, warn};
use tracing_subscriber::{filter, layer::SubscriberExt, util::SubscriberInitExt};
use validator_watcher::{
    actors::{coordinator::Coordinator, monitor::MonitorContext},
    alerts::sender_from_config,
    config::{StorageConfig, read_config_file},
    monitors::balance::BalanceTrendEvaluator,
    storage::{MemoryBackend, StorageBackend, ensure_healthy},
};

#[derive(Debug, Clone, Parser)]
#[command(version, about = "Watches beacon chain validator balances")]
struct Args {
    /// Config file (JSON or YAML)
    #[arg(short, long, env = "VALIDATOR_WATCHER_CONFIG", default_value = "config.yaml")]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "VALIDATOR_WATCHER_LOG", default_value = "info")]
    log_level: LevelFilter,
}

fn init(level: LevelFilter) {
    // the binary and the library share the `validator_watcher` target
    let filter = filter::Targets::new().with_target("validator_watcher", level);
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .compact()
                .with_ansi(false),
        )
        .with(filter)
        .init();
}

async fn open_store(storage: &StorageConfig) -> anyhow::Result<Arc<dyn StorageBackend>> {
    match storage {
        StorageConfig::None => {
            warn!("storage backend is 'none', history is lost on restart");
            Ok(Arc::new(MemoryBackend::new()))
        }
        #[cfg(feature = "storage-sqlite")]
        StorageConfig::Sqlite { path } => {
            let backend = validator_watcher::storage::sqlite::SqliteBackend::new(path)
                .await
                .with_context(|| format!("failed to open database {}", path.display()))?;
            Ok(Arc::new(backend))
        }
        #[cfg(not(feature = "storage-sqlite"))]
        StorageConfig::Sqlite { .. } => {
            anyhow::bail!("sqlite storage requested but the storage-sqlite feature is disabled")
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // a missing .env file is fine
    let _ = dotenv::dotenv();
    let args = Args::parse();
    init(args.log_level);
    trace!("started with args: {args:?}");

    let config = read_config_file(&args.config)?
        .resolve()
        .context("invalid configuration")?;
    debug!("resolved {} targets", config.targets.len());
    if config.targets.is_empty() {
        warn!("no targets configured, nothing to watch");
    }

    let store = open_store(&config.storage).await?;
    let health = ensure_healthy(store.as_ref())
        .await
        .context("storage backend is not healthy")?;
    info!("{}", health.message);
    if let Ok(stats) = store.get_stats().await {
        info!("{stats}");
    }

    let ctx = MonitorContext {
        store: store.clone(),
        evaluator: Arc::new(BalanceTrendEvaluator::new()),
        sender: sender_from_config(&config.alerts.sender),
        options: config.alerts,
    };

    let coordinator = Coordinator::start(config.targets, ctx)?;

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for ctrl-c")?;
    info!("interrupt received");

    coordinator.shutdown();
    let failed = coordinator.wait().await;

    if let Err(e) = store.close().await {
        error!("failed to close storage: {e}");
    }

    if failed > 0 {
        anyhow::bail!("{failed} target monitors terminated abnormally");
    }

    info!("shutdown complete");
    Ok(())
}
