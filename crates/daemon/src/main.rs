//! Exportd Report Engine - Main Entry Point
//!
//! Composition root: wires the SQLite repositories, the storage backend,
//! the data source registry and the queue worker, then hands control to
//! the self-rescheduling scheduler loop.

use anyhow::Result;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

// Import workspace crates
use exportd_core::application::{
    shutdown_channel, ExportPipeline, QueueWorker, RetentionCleaner, SchedulerJob,
};
use exportd_core::domain::{ExportSettings, Schedule};
use exportd_core::port::id_provider::UuidProvider;
use exportd_core::port::time_provider::SystemTimeProvider;
use exportd_core::port::{
    DataSourceRegistry, IdProvider, JobQueue, QueueTask, StorageBackend, TimeProvider,
};
use exportd_infra_fs::{JsonDirSource, LocalDiskStorage, VolumeStorage};
use exportd_infra_sqlite::{
    create_pool, run_migrations, SqliteExportRepository, SqliteJobQueue, SqliteReportRepository,
};

const VERSION: &str = env!("CARGO_PKG_VERSION");
const DEFAULT_DB_PATH: &str = "~/.exportd/exportd.db";
const DEFAULT_EXPORT_DIR: &str = "~/.exportd/exports";

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Initialize logging
    let log_format = std::env::var("EXPORTD_LOG_FORMAT").unwrap_or_else(|_| "pretty".to_string());

    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("exportd=info"))
        .expect("Failed to create env filter");

    match log_format.as_str() {
        "json" => {
            // Production: JSON structured logging
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().json())
                .init();
        }
        _ => {
            // Development: Pretty formatting with colors
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().pretty())
                .init();
        }
    }

    info!("Exportd Report Engine v{} starting...", VERSION);

    // 2. Load configuration from environment
    let db_path = env_or(DEFAULT_DB_PATH, "EXPORTD_DB_PATH");
    let settings = settings_from_env()?;

    info!(db_path = %db_path, "Initializing database...");

    // 3. Initialize database
    let pool = create_pool(&db_path)
        .await
        .map_err(|e| anyhow::anyhow!("DB pool creation failed: {}", e))?;
    run_migrations(&pool)
        .await
        .map_err(|e| anyhow::anyhow!("Migration failed: {}", e))?;

    // 4. Setup dependencies (DI wiring)
    let time_provider: Arc<dyn TimeProvider> = Arc::new(SystemTimeProvider);
    let id_provider: Arc<dyn IdProvider> = Arc::new(UuidProvider);

    let report_repo = Arc::new(SqliteReportRepository::new(pool.clone()));
    let export_repo = Arc::new(SqliteExportRepository::new(pool.clone()));
    let queue: Arc<dyn JobQueue> = Arc::new(SqliteJobQueue::new(
        pool.clone(),
        time_provider.clone(),
        id_provider.clone(),
    ));

    let storage = storage_from_env()?;
    let registry = Arc::new(registry_from_env());

    let pipeline = Arc::new(ExportPipeline::new(
        registry,
        storage.clone(),
        export_repo.clone(),
        settings.clone(),
        time_provider.clone(),
    ));
    let retention = Arc::new(RetentionCleaner::new(
        export_repo.clone(),
        storage,
        settings.clone(),
        time_provider.clone(),
    ));
    let scheduler = Arc::new(SchedulerJob::new(
        report_repo,
        export_repo,
        pipeline.clone(),
        retention,
        queue.clone(),
        settings.clone(),
        time_provider.clone(),
        id_provider,
    ));

    // 5. Bootstrap the scheduler loop, deduplicating against a pending one
    if settings.scheduled_exports_enabled {
        if queue.has_pending_scheduler().await? {
            info!("scheduler task already pending, skipping bootstrap enqueue");
        } else {
            queue
                .enqueue(
                    QueueTask::RunScheduler { reschedule: true },
                    0,
                    Some("Scheduled exports".to_string()),
                )
                .await?;
            info!("scheduler loop enqueued");
        }
    } else {
        info!("scheduled exports are disabled");
    }

    // 6. Start the queue worker
    info!("Starting queue worker...");
    let (shutdown_tx, shutdown_rx) = shutdown_channel();
    let worker = QueueWorker::new(queue, scheduler, pipeline);
    let worker_handle = tokio::spawn(async move {
        if let Err(e) = worker.run(shutdown_rx).await {
            tracing::error!(error = ?e, "Queue worker failed");
        }
    });

    info!("System ready. Press Ctrl+C to shutdown");

    // 7. Wait for shutdown signal
    tokio::signal::ctrl_c().await?;

    info!("Shutdown signal received. Exiting gracefully...");

    // 8. Graceful shutdown
    shutdown_tx.shutdown();
    let _ = tokio::time::timeout(std::time::Duration::from_secs(5), worker_handle).await;

    info!("Shutdown complete.");

    Ok(())
}

/// Read one env var with tilde expansion and a default
fn env_or(default: &str, var: &str) -> String {
    std::env::var(var).unwrap_or_else(|_| shellexpand::tilde(default).into_owned())
}

fn settings_from_env() -> Result<ExportSettings> {
    let defaults = ExportSettings::default();

    let default_schedule = match std::env::var("EXPORTD_SCHEDULE") {
        Ok(value) => Schedule::parse(&value)
            .map_err(|e| anyhow::anyhow!("EXPORTD_SCHEDULE: {}", e))?,
        Err(_) => defaults.default_schedule,
    };

    Ok(ExportSettings {
        scheduled_exports_enabled: env_bool(
            "EXPORTD_SCHEDULED_EXPORTS",
            defaults.scheduled_exports_enabled,
        ),
        default_schedule,
        auto_cleanup_enabled: env_bool("EXPORTD_AUTO_CLEANUP", defaults.auto_cleanup_enabled),
        retention_days: std::env::var("EXPORTD_RETENTION_DAYS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(defaults.retention_days),
        csv_delimiter: env_byte("EXPORTD_CSV_DELIMITER", defaults.csv_delimiter),
        csv_quote: env_byte("EXPORTD_CSV_QUOTE", defaults.csv_quote),
        csv_bom: env_bool("EXPORTD_CSV_BOM", defaults.csv_bom),
    })
}

fn env_bool(var: &str, default: bool) -> bool {
    std::env::var(var)
        .ok()
        .map(|s| matches!(s.as_str(), "1" | "true" | "yes" | "on"))
        .unwrap_or(default)
}

fn env_byte(var: &str, default: u8) -> u8 {
    std::env::var(var)
        .ok()
        .and_then(|s| s.bytes().next())
        .unwrap_or(default)
}

/// Select the storage backend: a mounted volume when
/// EXPORTD_VOLUME_MOUNT is set, the local export directory otherwise
fn storage_from_env() -> Result<Arc<dyn StorageBackend>> {
    if let Ok(mount) = std::env::var("EXPORTD_VOLUME_MOUNT") {
        let mount = shellexpand::tilde(&mount).into_owned();
        info!(mount = %mount, "using volume storage");
        return Ok(Arc::new(VolumeStorage::new(mount)));
    }

    let dir = env_or(DEFAULT_EXPORT_DIR, "EXPORTD_EXPORT_DIR");
    info!(dir = %dir, "using local disk storage");
    Ok(Arc::new(LocalDiskStorage::new(dir)))
}

/// Register the configured data sources. The JSON directory source is
/// the built-in provider; deployments add their own here.
fn registry_from_env() -> DataSourceRegistry {
    let mut registry = DataSourceRegistry::new();

    if let Ok(dir) = std::env::var("EXPORTD_SOURCE_DIR") {
        let dir = shellexpand::tilde(&dir).into_owned();
        info!(dir = %dir, "registering JSON directory data source");
        registry.register(Arc::new(JsonDirSource::new(
            "submissions",
            "Submissions",
            dir,
        )));
    }

    registry
}
