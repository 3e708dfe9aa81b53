//! Waitlist - Main Entry Point
//! Admission-control daemon: JSON-RPC server + expiry engine + reaper

mod config;
mod telemetry;

use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

// Import workspace crates
use config::{DaemonConfig, LogFormat};
use waitlist_api_rpc::RpcServer;
use waitlist_core::application::{shutdown_channel, TicketReaper, WaitlistService};
use waitlist_core::port::id_provider::UuidProvider;
use waitlist_core::port::time_provider::SystemTimeProvider;
use waitlist_core::port::TimeProvider;
use waitlist_infra_sqlite::{create_pool, run_migrations, SqliteTicketStore};

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Load configuration
    let config = DaemonConfig::from_env();

    // 2. Initialize logging
    let (writer, _log_guard) = tracing_appender::non_blocking(std::io::stdout());
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("waitlist=info"))
        .context("Failed to create env filter")?;

    match config.log_format {
        LogFormat::Json => {
            // Production: JSON structured logging
            tracing_subscriber::registry()
                .with(env_filter)
                .with(telemetry::otel_layer())
                .with(fmt::layer().json().with_writer(writer))
                .init();
        }
        LogFormat::Pretty => {
            // Development: Pretty formatting with colors
            tracing_subscriber::registry()
                .with(env_filter)
                .with(telemetry::otel_layer())
                .with(fmt::layer().pretty().with_writer(writer))
                .init();
        }
    }

    info!("Waitlist v{} starting...", VERSION);

    // 3. Initialize database
    info!(db_path = %config.db_path, "Initializing database...");
    if let Some(parent) = Path::new(&config.db_path).parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    let pool = create_pool(&config.database_url())
        .await
        .map_err(|e| anyhow::anyhow!("DB pool creation failed: {}", e))?;
    run_migrations(&pool)
        .await
        .map_err(|e| anyhow::anyhow!("Migration failed: {}", e))?;

    // 4. Setup dependencies (DI wiring)
    let time_provider: Arc<dyn TimeProvider> = Arc::new(SystemTimeProvider);
    let store = Arc::new(SqliteTicketStore::new(pool.clone()));
    let service = WaitlistService::new(
        store,
        Arc::new(UuidProvider),
        time_provider.clone(),
        config.waitlist.clone(),
    );

    // 5. Rebuild queues from the store before serving
    let report = service
        .restore()
        .await
        .map_err(|e| anyhow::anyhow!("Restore failed: {}", e))?;
    info!(
        restored = report.restored,
        expired = report.expired,
        promoted = report.promoted,
        "Restore completed"
    );

    // 6. Start JSON-RPC server
    let (rpc_addr, rpc_handle) = RpcServer::new(config.rpc.clone(), service.clone())
        .start()
        .await
        .map_err(|e| anyhow::anyhow!("RPC server start failed: {}", e))?;

    // 7. Start reaper
    let (shutdown_tx, shutdown_rx) = shutdown_channel();
    let reaper = TicketReaper::new(service.clone(), time_provider);
    let reaper_handle = tokio::spawn(reaper.run(shutdown_rx));

    info!(rpc_addr = %rpc_addr, "System ready. Press Ctrl+C to shutdown");

    // 8. Wait for shutdown signal
    tokio::signal::ctrl_c().await?;

    info!("Shutdown signal received. Exiting gracefully...");

    // 9. Graceful shutdown
    let loops = shutdown_tx.shutdown();
    info!(loops = loops, "Background loops signalled");
    if let Err(e) = rpc_handle.stop() {
        warn!(error = %e, "RPC server already stopped");
    }
    rpc_handle.stopped().await;
    let _ = tokio::time::timeout(Duration::from_secs(5), reaper_handle).await;

    // Last chance for writes deferred during an outage
    match service.sync_store().await {
        Ok(replayed) if replayed > 0 => info!(replayed = replayed, "Deferred writes flushed"),
        Ok(_) => {}
        Err(e) => error!(
            error = %e,
            deferred = service.stats().await.deferred_writes,
            "Deferred writes lost on shutdown; restore will expire overdue tickets"
        ),
    }

    pool.close().await;
    telemetry::shutdown();
    info!("Shutdown complete.");

    Ok(())
}
