//! Retention cleanup over the real SQLite repository and a real
//! filesystem storage backend.

use std::sync::Arc;

use exportd_core::application::RetentionCleaner;
use exportd_core::domain::{
    Export, ExportFormat, ExportSettings, ExportTarget, FilterSnapshot, Trigger,
};
use exportd_core::port::time_provider::mocks::FixedClock;
use exportd_core::port::{ExportRepository, StorageBackend};
use exportd_infra_fs::LocalDiskStorage;
use exportd_infra_sqlite::{create_pool, run_migrations, SqliteExportRepository};

const MILLIS_PER_DAY: i64 = 24 * 60 * 60 * 1000;
const NOW: i64 = 400 * MILLIS_PER_DAY;

async fn completed_export(
    repo: &SqliteExportRepository,
    storage: &LocalDiskStorage,
    id: &str,
    created_at: i64,
    with_file: bool,
) {
    let export = Export::new(
        id,
        created_at,
        "submissions",
        ExportTarget::Single {
            entity_id: "form-1".to_string(),
        },
        FilterSnapshot::default(),
        ExportFormat::Csv,
        Trigger::Scheduled,
    );
    repo.insert(&export).await.unwrap();

    let path = format!("{}.csv", id);
    repo.mark_processing(&id.to_string(), created_at + 1).await.unwrap();
    repo.mark_completed(&id.to_string(), created_at + 2, &path, 3, 1)
        .await
        .unwrap();
    if with_file {
        storage.write(&path, b"Name\nalice\n").await.unwrap();
    }
}

#[tokio::test]
async fn test_thirty_day_retention_sweeps_files_and_records() {
    let pool = create_pool("sqlite::memory:").await.unwrap();
    run_migrations(&pool).await.unwrap();
    let repo = Arc::new(SqliteExportRepository::new(pool));

    let dir = tempfile::tempdir().unwrap();
    let storage = Arc::new(LocalDiskStorage::new(dir.path()));

    // 31 and 40 days old: expired. 29 days old and brand new: kept.
    completed_export(&repo, &storage, "e-31d", NOW - 31 * MILLIS_PER_DAY, true).await;
    completed_export(&repo, &storage, "e-40d", NOW - 40 * MILLIS_PER_DAY, true).await;
    completed_export(&repo, &storage, "e-29d", NOW - 29 * MILLIS_PER_DAY, true).await;
    completed_export(&repo, &storage, "e-now", NOW - 1_000, true).await;

    let settings = ExportSettings {
        retention_days: 30,
        ..Default::default()
    };
    let cleaner = RetentionCleaner::new(
        repo.clone(),
        storage.clone(),
        settings,
        Arc::new(FixedClock::new(NOW)),
    );

    assert_eq!(cleaner.cleanup().await.unwrap(), 2);

    for id in ["e-31d", "e-40d"] {
        assert!(repo.find_by_id(&id.to_string()).await.unwrap().is_none());
        assert!(!storage.exists(&format!("{}.csv", id)).await.unwrap());
    }
    for id in ["e-29d", "e-now"] {
        assert!(repo.find_by_id(&id.to_string()).await.unwrap().is_some());
        assert!(storage.exists(&format!("{}.csv", id)).await.unwrap());
    }
}

#[tokio::test]
async fn test_already_absent_file_does_not_stop_the_sweep() {
    let pool = create_pool("sqlite::memory:").await.unwrap();
    run_migrations(&pool).await.unwrap();
    let repo = Arc::new(SqliteExportRepository::new(pool));

    let dir = tempfile::tempdir().unwrap();
    let storage = Arc::new(LocalDiskStorage::new(dir.path()));

    // The record claims a file that was never written
    completed_export(&repo, &storage, "e-ghost", NOW - 60 * MILLIS_PER_DAY, false).await;
    completed_export(&repo, &storage, "e-real", NOW - 60 * MILLIS_PER_DAY, true).await;

    let settings = ExportSettings {
        retention_days: 30,
        ..Default::default()
    };
    let cleaner = RetentionCleaner::new(
        repo.clone(),
        storage,
        settings,
        Arc::new(FixedClock::new(NOW)),
    );

    assert_eq!(cleaner.cleanup().await.unwrap(), 2);
    assert!(repo.find_by_id(&"e-ghost".to_string()).await.unwrap().is_none());
    assert!(repo.find_by_id(&"e-real".to_string()).await.unwrap().is_none());
}
