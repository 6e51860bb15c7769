// Scheduler Job - one queued sweep over every due report
//
// The loop keeps exactly one instance of itself outstanding by
// re-enqueuing through the queue's delay feature; turning scheduled
// exports off is the cancellation mechanism, checked at the top of every
// invocation.

use std::sync::Arc;

use chrono::DateTime;
use tracing::{error, info, warn};

use crate::application::pipeline::{ExportPipeline, GenerateOutcome};
use crate::application::retention::RetentionCleaner;
use crate::domain::schedule;
use crate::domain::{Export, ExportSettings, Report, Trigger};
use crate::error::Result;
use crate::port::{ExportRepository, IdProvider, JobQueue, QueueTask, ReportRepository, TimeProvider};

/// What one scheduler invocation did
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SchedulerRunSummary {
    pub reports_processed: usize,
    pub exports_generated: usize,
    pub exports_failed: usize,
    pub records_cleaned: u64,
    /// When the loop re-enqueued itself for, if it did
    pub next_run_at: Option<i64>,
}

pub struct SchedulerJob {
    reports: Arc<dyn ReportRepository>,
    exports: Arc<dyn ExportRepository>,
    pipeline: Arc<ExportPipeline>,
    retention: Arc<RetentionCleaner>,
    queue: Arc<dyn JobQueue>,
    settings: ExportSettings,
    time: Arc<dyn TimeProvider>,
    ids: Arc<dyn IdProvider>,
}

impl SchedulerJob {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        reports: Arc<dyn ReportRepository>,
        exports: Arc<dyn ExportRepository>,
        pipeline: Arc<ExportPipeline>,
        retention: Arc<RetentionCleaner>,
        queue: Arc<dyn JobQueue>,
        settings: ExportSettings,
        time: Arc<dyn TimeProvider>,
        ids: Arc<dyn IdProvider>,
    ) -> Self {
        Self {
            reports,
            exports,
            pipeline,
            retention,
            queue,
            settings,
            time,
            ids,
        }
    }

    /// One sweep: process due reports, run retention cleanup, and (when
    /// `reschedule` is set) enqueue the next invocation.
    pub async fn run(&self, reschedule: bool) -> Result<SchedulerRunSummary> {
        let mut summary = SchedulerRunSummary::default();

        if !self.settings.scheduled_exports_enabled {
            info!("scheduled exports are disabled, skipping run");
            return Ok(summary);
        }

        let now = self.time.now_millis();
        let due = self.reports.find_due(now).await?;
        info!(due = due.len(), "scheduler sweep started");

        for report in due {
            summary.reports_processed += 1;
            let (generated, failed) = self.process_report(&report, now).await;
            summary.exports_generated += generated;
            summary.exports_failed += failed;

            let next = schedule::next_run_millis(report.schedule, now);
            if let Err(err) = self.reports.set_schedule_state(&report.id, now, next).await {
                error!(report_id = %report.id, error = %err, "failed to update report schedule state");
            }
        }

        match self.retention.cleanup().await {
            Ok(count) => summary.records_cleaned = count,
            Err(err) => error!(error = %err, "retention cleanup failed"),
        }

        if reschedule {
            summary.next_run_at = self.reschedule(now).await?;
        }

        info!(
            reports = summary.reports_processed,
            generated = summary.exports_generated,
            failed = summary.exports_failed,
            cleaned = summary.records_cleaned,
            "scheduler sweep finished"
        );
        Ok(summary)
    }

    /// Generate every export one due report asks for. One export's
    /// failure never stops its siblings or the remaining due reports.
    async fn process_report(&self, report: &Report, now: i64) -> (usize, usize) {
        let mut generated = 0;
        let mut failed = 0;

        for target in report.export_targets() {
            let export = Export::for_report(
                report,
                target,
                Trigger::Scheduled,
                None,
                self.ids.generate_id(),
                now,
            );
            let export_id = export.id.clone();

            if let Err(err) = self.exports.insert(&export).await {
                error!(
                    report_id = %report.id,
                    export_id = %export_id,
                    error = %err,
                    "failed to create export record"
                );
                failed += 1;
                continue;
            }

            match self.pipeline.generate(&export_id).await {
                Ok(GenerateOutcome::Completed { .. }) => generated += 1,
                Ok(GenerateOutcome::Skipped) => {}
                Err(err) => {
                    warn!(
                        report_id = %report.id,
                        export_id = %export_id,
                        error = %err,
                        "scheduled export failed"
                    );
                    failed += 1;
                }
            }
        }

        (generated, failed)
    }

    /// Re-enqueue the loop once, on the system-wide default schedule.
    /// Individual reports may run on their own cadence; the loop's own
    /// re-trigger always follows the global default.
    async fn reschedule(&self, now: i64) -> Result<Option<i64>> {
        let Some(next_at) = schedule::next_run_millis(self.settings.default_schedule, now) else {
            info!("default schedule is disabled, scheduler will not re-enqueue");
            return Ok(None);
        };
        let Some(delay) = schedule::next_delay_secs(self.settings.default_schedule, now) else {
            return Ok(None);
        };
        if delay <= 0 {
            return Ok(None);
        }

        let label = next_run_label(next_at);
        self.queue
            .enqueue(QueueTask::RunScheduler { reschedule: true }, delay, Some(label))
            .await?;
        info!(delay_secs = delay, "scheduler re-enqueued");
        Ok(Some(next_at))
    }
}

/// Human-readable description shown in the queued-task list
fn next_run_label(next_at_millis: i64) -> String {
    match DateTime::from_timestamp_millis(next_at_millis) {
        Some(dt) => format!("Scheduled exports at {}", dt.format("%Y-%m-%d %H:%M UTC")),
        None => "Scheduled exports".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ExportFormat, ExportMode, ExportStatus, Schedule};
    use crate::port::data_source::mocks::{text_field, StaticEntity, StaticSource};
    use crate::port::data_source::DataSourceRegistry;
    use crate::port::export_repository::mocks::MemoryExportRepository;
    use crate::port::id_provider::mocks::SequentialIdProvider;
    use crate::port::job_queue::mocks::MemoryJobQueue;
    use crate::port::report_repository::mocks::MemoryReportRepository;
    use crate::port::storage::mocks::MemoryStorage;
    use crate::port::time_provider::mocks::FixedClock;
    use chrono::{TimeZone, Utc};
    use serde_json::json;

    fn at(y: i32, m: u32, d: u32, h: u32, min: u32, s: u32) -> i64 {
        Utc.with_ymd_and_hms(y, m, d, h, min, s)
            .single()
            .expect("valid test instant")
            .timestamp_millis()
    }

    const MILLIS_PER_DAY: i64 = 24 * 60 * 60 * 1000;

    struct Fixture {
        job: SchedulerJob,
        reports: Arc<MemoryReportRepository>,
        exports: Arc<MemoryExportRepository>,
        queue: Arc<MemoryJobQueue>,
    }

    fn fixture(settings: ExportSettings, source: StaticSource, now: i64) -> Fixture {
        let clock = Arc::new(FixedClock::new(now));
        let mut registry = DataSourceRegistry::new();
        registry.register(Arc::new(source));
        let registry = Arc::new(registry);

        let reports = Arc::new(MemoryReportRepository::new());
        let exports = Arc::new(MemoryExportRepository::new());
        let storage = Arc::new(MemoryStorage::new());
        let queue = Arc::new(MemoryJobQueue::new(clock.clone()));

        let pipeline = Arc::new(ExportPipeline::new(
            registry,
            storage.clone(),
            exports.clone(),
            settings.clone(),
            clock.clone(),
        ));
        let retention = Arc::new(RetentionCleaner::new(
            exports.clone(),
            storage,
            settings.clone(),
            clock.clone(),
        ));
        let job = SchedulerJob::new(
            reports.clone(),
            exports.clone(),
            pipeline,
            retention,
            queue.clone(),
            settings,
            clock.clone(),
            Arc::new(SequentialIdProvider::new()),
        );

        Fixture {
            job,
            reports,
            exports,
            queue,
        }
    }

    fn submissions_source() -> StaticSource {
        StaticSource::new("submissions", "Submissions").with_entity(StaticEntity::new(
            "form-1",
            "Contact Form",
            vec![text_field("name", "Name")],
            vec![vec![json!("alice")]],
        ))
    }

    fn due_report(id: &str, schedule: Schedule, due_at: i64, created_at: i64) -> Report {
        let mut report = Report::new(
            id,
            created_at,
            format!("Report {}", id),
            format!("report-{}", id),
            "submissions",
            vec!["form-1".to_string()],
            ExportFormat::Csv,
            ExportMode::Separate,
        )
        .expect("valid report");
        report.schedule = schedule;
        report.next_scheduled_at = Some(due_at);
        report
    }

    #[tokio::test]
    async fn test_globally_disabled_run_does_nothing_and_never_reschedules() {
        let now = at(2024, 1, 1, 2, 0, 1);
        let settings = ExportSettings {
            scheduled_exports_enabled: false,
            ..Default::default()
        };
        let fx = fixture(settings, submissions_source(), now);
        fx.reports
            .insert(&due_report("r1", Schedule::Daily2am, now - 1_000, now - 10_000))
            .await
            .unwrap();

        let summary = fx.job.run(true).await.unwrap();
        assert_eq!(summary, SchedulerRunSummary::default());
        assert!(fx.queue.queued_tasks().is_empty());
    }

    #[tokio::test]
    async fn test_due_report_is_exported_and_rescheduled() {
        // Report due at 02:00, scheduler runs one second later
        let due_at = at(2024, 1, 1, 2, 0, 0);
        let now = at(2024, 1, 1, 2, 0, 1);
        let fx = fixture(ExportSettings::default(), submissions_source(), now);
        fx.reports
            .insert(&due_report("r1", Schedule::Daily2am, due_at, due_at - 10_000))
            .await
            .unwrap();

        let summary = fx.job.run(true).await.unwrap();
        assert_eq!(summary.reports_processed, 1);
        assert_eq!(summary.exports_generated, 1);
        assert_eq!(summary.exports_failed, 0);

        // Export completed
        let exports = fx.exports.list().await.unwrap();
        assert_eq!(exports.len(), 1);
        assert_eq!(exports[0].status, ExportStatus::Completed);
        assert_eq!(exports[0].trigger, Trigger::Scheduled);

        // Report stamped with this run and the next 02:00 slot, not now+24h
        let report = fx.reports.find_by_id(&"r1".to_string()).await.unwrap().unwrap();
        assert_eq!(report.last_generated_at, Some(now));
        assert_eq!(report.next_scheduled_at, Some(at(2024, 1, 2, 2, 0, 0)));
    }

    #[tokio::test]
    async fn test_loop_reenqueues_itself_exactly_once_with_a_label() {
        let now = at(2024, 1, 1, 10, 0, 0);
        let fx = fixture(ExportSettings::default(), submissions_source(), now);

        let summary = fx.job.run(true).await.unwrap();
        // Default schedule is daily: next run at the following midnight
        assert_eq!(summary.next_run_at, Some(at(2024, 1, 2, 0, 0, 0)));

        let queued = fx.queue.queued_tasks();
        assert_eq!(queued.len(), 1);
        assert_eq!(
            queued[0].task,
            QueueTask::RunScheduler { reschedule: true }
        );
        assert_eq!(queued[0].run_at, at(2024, 1, 2, 0, 0, 0));
        assert!(queued[0]
            .label
            .as_deref()
            .unwrap()
            .contains("2024-01-02 00:00 UTC"));
    }

    #[tokio::test]
    async fn test_run_without_reschedule_flag_does_not_reenqueue() {
        let now = at(2024, 1, 1, 10, 0, 0);
        let fx = fixture(ExportSettings::default(), submissions_source(), now);

        let summary = fx.job.run(false).await.unwrap();
        assert_eq!(summary.next_run_at, None);
        assert!(fx.queue.queued_tasks().is_empty());
    }

    #[tokio::test]
    async fn test_disabled_default_schedule_stops_the_loop() {
        let now = at(2024, 1, 1, 10, 0, 0);
        let settings = ExportSettings {
            default_schedule: Schedule::Disabled,
            ..Default::default()
        };
        let fx = fixture(settings, submissions_source(), now);

        let summary = fx.job.run(true).await.unwrap();
        assert_eq!(summary.next_run_at, None);
        assert!(fx.queue.queued_tasks().is_empty());
    }

    #[tokio::test]
    async fn test_one_failing_report_does_not_stop_the_rest() {
        let now = at(2024, 1, 1, 2, 0, 1);
        let fx = fixture(ExportSettings::default(), submissions_source(), now);

        // First report in display order targets a missing entity
        let mut broken = due_report("broken", Schedule::Daily2am, now - 1_000, now - 20_000);
        broken.entity_ids = vec!["missing-form".to_string()];
        broken.sort_order = 0;
        let mut healthy = due_report("healthy", Schedule::Daily2am, now - 1_000, now - 10_000);
        healthy.sort_order = 1;

        fx.reports.insert(&broken).await.unwrap();
        fx.reports.insert(&healthy).await.unwrap();

        let summary = fx.job.run(false).await.unwrap();
        assert_eq!(summary.reports_processed, 2);
        assert_eq!(summary.exports_generated, 1);
        assert_eq!(summary.exports_failed, 1);

        // Both reports got their schedule state advanced
        for id in ["broken", "healthy"] {
            let report = fx.reports.find_by_id(&id.to_string()).await.unwrap().unwrap();
            assert_eq!(report.last_generated_at, Some(now));
        }
    }

    #[tokio::test]
    async fn test_reports_not_yet_due_are_left_alone() {
        let now = at(2024, 1, 1, 1, 0, 0);
        let fx = fixture(ExportSettings::default(), submissions_source(), now);
        fx.reports
            .insert(&due_report(
                "r1",
                Schedule::Daily2am,
                at(2024, 1, 1, 2, 0, 0),
                now - 10_000,
            ))
            .await
            .unwrap();

        let summary = fx.job.run(false).await.unwrap();
        assert_eq!(summary.reports_processed, 0);
        assert!(fx.exports.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_combined_report_creates_a_single_export() {
        let now = at(2024, 1, 1, 2, 0, 1);
        let source = StaticSource::new("submissions", "Submissions")
            .with_entity(StaticEntity::new(
                "form-1",
                "Contact Form",
                vec![text_field("name", "Name")],
                vec![vec![json!("alice")]],
            ))
            .with_entity(StaticEntity::new(
                "form-2",
                "Survey",
                vec![text_field("score", "Score")],
                vec![vec![json!(5)]],
            ));
        let fx = fixture(ExportSettings::default(), source, now);

        let mut report = due_report("r1", Schedule::Daily2am, now - 1_000, now - 10_000);
        report.mode = ExportMode::Combined;
        report.entity_ids = vec!["form-1".to_string(), "form-2".to_string()];
        fx.reports.insert(&report).await.unwrap();

        let summary = fx.job.run(false).await.unwrap();
        assert_eq!(summary.exports_generated, 1);

        let exports = fx.exports.list().await.unwrap();
        assert_eq!(exports.len(), 1);
        assert!(exports[0].target.is_combined());
        assert_eq!(exports[0].record_count, Some(2));
    }

    #[tokio::test]
    async fn test_sweep_runs_retention_cleanup() {
        let now = at(2024, 6, 1, 0, 0, 0);
        let fx = fixture(ExportSettings::default(), submissions_source(), now);

        // A 60-day-old export should be swept by the default 30-day retention
        let old = Export::new(
            "stale",
            now - 60 * MILLIS_PER_DAY,
            "submissions",
            crate::domain::ExportTarget::Single {
                entity_id: "form-1".to_string(),
            },
            crate::domain::FilterSnapshot::default(),
            ExportFormat::Csv,
            Trigger::Manual,
        );
        fx.exports.insert(&old).await.unwrap();

        let summary = fx.job.run(false).await.unwrap();
        assert_eq!(summary.records_cleaned, 1);
        assert!(fx.exports.find_by_id(&"stale".to_string()).await.unwrap().is_none());
    }
}
