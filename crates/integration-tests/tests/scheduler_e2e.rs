//! End-to-end scheduler scenarios over the real SQLite stack:
//! repositories, delayed queue, worker dispatch and the scheduler loop.

use std::sync::Arc;

use chrono::{TimeZone, Utc};
use serde_json::json;

use exportd_core::application::{
    ExportPipeline, QueueWorker, RetentionCleaner, SchedulerJob,
};
use exportd_core::domain::{
    ExportFormat, ExportMode, ExportSettings, ExportStatus, Report, Schedule,
};
use exportd_core::port::data_source::mocks::{text_field, StaticEntity, StaticSource};
use exportd_core::port::data_source::DataSourceRegistry;
use exportd_core::port::id_provider::UuidProvider;
use exportd_core::port::storage::mocks::MemoryStorage;
use exportd_core::port::time_provider::mocks::FixedClock;
use exportd_core::port::{ExportRepository, JobQueue, QueueTask, ReportRepository};
use exportd_infra_sqlite::{
    create_pool, run_migrations, SqliteExportRepository, SqliteJobQueue, SqliteReportRepository,
};

fn at(y: i32, m: u32, d: u32, h: u32, min: u32, s: u32) -> i64 {
    Utc.with_ymd_and_hms(y, m, d, h, min, s)
        .single()
        .expect("valid test instant")
        .timestamp_millis()
}

struct Stack {
    reports: Arc<SqliteReportRepository>,
    exports: Arc<SqliteExportRepository>,
    queue: Arc<SqliteJobQueue>,
    worker: QueueWorker,
    scheduler: Arc<SchedulerJob>,
    storage: Arc<MemoryStorage>,
    clock: Arc<FixedClock>,
}

async fn stack(settings: ExportSettings, now: i64) -> Stack {
    let pool = create_pool("sqlite::memory:").await.unwrap();
    run_migrations(&pool).await.unwrap();

    let clock = Arc::new(FixedClock::new(now));
    let reports = Arc::new(SqliteReportRepository::new(pool.clone()));
    let exports = Arc::new(SqliteExportRepository::new(pool.clone()));
    let queue = Arc::new(SqliteJobQueue::new(
        pool,
        clock.clone(),
        Arc::new(UuidProvider),
    ));

    let mut registry = DataSourceRegistry::new();
    registry.register(Arc::new(
        StaticSource::new("submissions", "Submissions").with_entity(StaticEntity::new(
            "form-contact",
            "Contact Form",
            vec![text_field("name", "Name"), text_field("email", "Email")],
            vec![
                vec![json!("alice"), json!("alice@example.test")],
                vec![json!("bob"), json!("bob@example.test")],
            ],
        )),
    ));

    let storage = Arc::new(MemoryStorage::new());
    let pipeline = Arc::new(ExportPipeline::new(
        Arc::new(registry),
        storage.clone(),
        exports.clone(),
        settings.clone(),
        clock.clone(),
    ));
    let retention = Arc::new(RetentionCleaner::new(
        exports.clone(),
        storage.clone(),
        settings.clone(),
        clock.clone(),
    ));
    let scheduler = Arc::new(SchedulerJob::new(
        reports.clone(),
        exports.clone(),
        pipeline.clone(),
        retention,
        queue.clone(),
        settings,
        clock.clone(),
        Arc::new(UuidProvider),
    ));
    let worker = QueueWorker::new(queue.clone(), scheduler.clone(), pipeline);

    Stack {
        reports,
        exports,
        queue,
        worker,
        scheduler,
        storage,
        clock,
    }
}

fn daily2am_report(due_at: i64, created_at: i64) -> Report {
    let mut report = Report::new(
        "r1",
        created_at,
        "Nightly contacts",
        "nightly-contacts",
        "submissions",
        vec!["form-contact".to_string()],
        ExportFormat::Csv,
        ExportMode::Separate,
    )
    .expect("valid report");
    report.schedule = Schedule::Daily2am;
    report.next_scheduled_at = Some(due_at);
    report
}

/// A `daily2am` report due at T, the scheduler running at T+1s: leaves a
/// completed export, a stamped report and a next run at the following
/// day's 02:00.
#[tokio::test]
async fn test_due_report_completes_and_advances_to_next_slot() {
    let due_at = at(2024, 3, 10, 2, 0, 0);
    let run_at = at(2024, 3, 10, 2, 0, 1);
    let stack = stack(ExportSettings::default(), run_at).await;

    stack
        .reports
        .insert(&daily2am_report(due_at, due_at - 60_000))
        .await
        .unwrap();

    let summary = stack.scheduler.run(true).await.unwrap();
    assert_eq!(summary.reports_processed, 1);
    assert_eq!(summary.exports_generated, 1);

    let exports = stack.exports.list().await.unwrap();
    assert_eq!(exports.len(), 1);
    assert_eq!(exports[0].status, ExportStatus::Completed);
    assert_eq!(exports[0].record_count, Some(2));
    let file = exports[0].file_path.clone().unwrap();
    assert!(stack.storage.bytes(&file).is_some());

    let report = stack
        .reports
        .find_by_id(&"r1".to_string())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(report.last_generated_at, Some(run_at));
    // Next slot is the following day's 02:00, not run_at + 24h
    assert_eq!(report.next_scheduled_at, Some(at(2024, 3, 11, 2, 0, 0)));
}

/// Bootstrap dedup: a second enqueue is skipped while a scheduler task
/// is pending, so the loop keeps at most one outstanding instance.
#[tokio::test]
async fn test_bootstrap_does_not_duplicate_a_pending_scheduler() {
    let stack = stack(ExportSettings::default(), at(2024, 3, 10, 10, 0, 0)).await;

    // Two bootstrap passes, each guarded by the dedup probe
    for _ in 0..2 {
        if !stack.queue.has_pending_scheduler().await.unwrap() {
            stack
                .queue
                .enqueue(QueueTask::RunScheduler { reschedule: true }, 0, None)
                .await
                .unwrap();
        }
    }

    // Exactly one task made it into the queue
    assert!(stack.queue.pop_due().await.unwrap().is_some());
    assert!(stack.queue.pop_due().await.unwrap().is_none());
}

/// Worker-driven lifecycle: popping the scheduler task runs the sweep,
/// which re-enqueues exactly one future instance of itself.
#[tokio::test]
async fn test_worker_runs_the_loop_and_exactly_one_successor_exists() {
    let run_at = at(2024, 3, 10, 2, 0, 1);
    let stack = stack(ExportSettings::default(), run_at).await;
    stack
        .reports
        .insert(&daily2am_report(at(2024, 3, 10, 2, 0, 0), at(2024, 3, 9, 0, 0, 0)))
        .await
        .unwrap();

    stack
        .queue
        .enqueue(QueueTask::RunScheduler { reschedule: true }, 0, None)
        .await
        .unwrap();

    assert!(stack.worker.process_next().await.unwrap());

    // The export ran
    let exports = stack.exports.list().await.unwrap();
    assert_eq!(exports.len(), 1);
    assert_eq!(exports[0].status, ExportStatus::Completed);

    // Exactly one successor scheduler task, due at the default daily slot
    assert!(stack.queue.has_pending_scheduler().await.unwrap());
    let successor = {
        stack.clock.set(at(2024, 3, 11, 0, 0, 1));
        stack.queue.pop_due().await.unwrap().expect("successor task")
    };
    assert_eq!(successor.task, QueueTask::RunScheduler { reschedule: true });
    assert!(successor.label.unwrap().contains("2024-03-11 00:00 UTC"));
    // And nothing else behind it
    assert!(stack.queue.pop_due().await.unwrap().is_none());
}

/// Double-fire tolerance: two scheduler invocations at the same instant
/// produce at most a duplicate export, never a corrupted record.
#[tokio::test]
async fn test_double_fire_is_idempotent_per_export_record() {
    let run_at = at(2024, 3, 10, 2, 0, 1);
    let stack = stack(ExportSettings::default(), run_at).await;
    stack
        .reports
        .insert(&daily2am_report(at(2024, 3, 10, 2, 0, 0), at(2024, 3, 9, 0, 0, 0)))
        .await
        .unwrap();

    // First sweep advances next_scheduled_at, so the second finds nothing due
    stack.scheduler.run(false).await.unwrap();
    let second = stack.scheduler.run(false).await.unwrap();
    assert_eq!(second.reports_processed, 0);

    let exports = stack.exports.list().await.unwrap();
    assert_eq!(exports.len(), 1);
    assert_eq!(exports[0].status, ExportStatus::Completed);
}

/// Globally disabled scheduling exits without reading reports and never
/// reschedules.
#[tokio::test]
async fn test_disabled_scheduling_never_reenqueues() {
    let settings = ExportSettings {
        scheduled_exports_enabled: false,
        ..Default::default()
    };
    let stack = stack(settings, at(2024, 3, 10, 2, 0, 1)).await;
    stack
        .reports
        .insert(&daily2am_report(at(2024, 3, 10, 2, 0, 0), at(2024, 3, 9, 0, 0, 0)))
        .await
        .unwrap();

    stack
        .queue
        .enqueue(QueueTask::RunScheduler { reschedule: true }, 0, None)
        .await
        .unwrap();
    assert!(stack.worker.process_next().await.unwrap());

    assert!(stack.exports.list().await.unwrap().is_empty());
    assert!(!stack.queue.has_pending_scheduler().await.unwrap());
}
