use clap::Parser;
use pingwatch::VERSION;
use pingwatch::config::MonitorConfig;
use pingwatch::db::{EndpointStore, MemoryEndpointStore, PgEndpointStore};
use pingwatch::logging::init_logging;
use pingwatch::monitor::{HttpProber, Scheduler};
use std::sync::Arc;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(author, version = VERSION, about, long_about = None)]
struct Args {
    /// Path to the configuration file
    #[arg(short, long)]
    config: Option<String>,

    /// Run against an in-memory store seeded from the config's `[[endpoints]]`
    #[arg(long)]
    memory: bool,
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C.");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler.");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("SIGINT received. Shutting down gracefully..."),
        _ = terminate => info!("SIGTERM received. Shutting down gracefully..."),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let args = Args::parse();

    let config = MonitorConfig::load(args.config.as_deref())?;
    init_logging(&config.log_dir);
    info!("Starting pingwatch, version: {}", VERSION);

    // --- Storage Setup ---
    let pg_store = if args.memory {
        None
    } else {
        let store = PgEndpointStore::connect(
            config.require_database_url()?,
            config.db_max_connections,
        )
        .await?;
        store.run_migrations().await?;
        Some(Arc::new(store))
    };
    let store: Arc<dyn EndpointStore> = match &pg_store {
        Some(pg) => pg.clone(),
        None => {
            info!(
                endpoints = config.endpoints.len(),
                "Using in-memory endpoint store."
            );
            Arc::new(MemoryEndpointStore::seeded(&config.endpoints).await)
        }
    };

    // --- Scheduler Setup ---
    let prober = HttpProber::new(config.probe_timeout(), &config.user_agent)?;
    let scheduler = Scheduler::new(store, Arc::new(prober), config.scheduler_config());
    scheduler.start().await?;

    shutdown_signal().await;

    // Jobs must be drained before the database handle goes away.
    scheduler.stop().await;
    if let Some(pg) = pg_store {
        if let Err(e) = pg.close().await {
            error!(error = %e, "Failed to close database connection.");
        }
    }

    info!("Shutdown complete.");
    Ok(())
}
