// Report lifecycle operations shared by whatever control surface fronts
// the engine

use std::sync::Arc;

use tracing::info;

use crate::domain::Report;
use crate::error::Result;
use crate::port::{ExportRepository, ReportRepository, TimeProvider};

pub struct ReportService {
    reports: Arc<dyn ReportRepository>,
    exports: Arc<dyn ExportRepository>,
    time: Arc<dyn TimeProvider>,
}

impl ReportService {
    pub fn new(
        reports: Arc<dyn ReportRepository>,
        exports: Arc<dyn ExportRepository>,
        time: Arc<dyn TimeProvider>,
    ) -> Self {
        Self {
            reports,
            exports,
            time,
        }
    }

    /// Insert or update a report, keeping `next_scheduled_at` consistent
    /// with its schedule toggle
    pub async fn save(&self, mut report: Report) -> Result<Report> {
        let now = self.time.now_millis();
        report.sync_next_run(now);
        report.updated_at = now;

        if self.reports.find_by_id(&report.id).await?.is_some() {
            self.reports.update(&report).await?;
        } else {
            self.reports.insert(&report).await?;
        }
        Ok(report)
    }

    /// Delete a report. Its exports are detached, not deleted: export
    /// history survives report deletion.
    pub async fn delete(&self, report_id: &str) -> Result<()> {
        let detached = self.exports.detach_report(report_id).await?;
        if detached > 0 {
            info!(report_id, detached, "orphaned exports kept after report deletion");
        }
        self.reports.delete(&report_id.to_string()).await
    }

    pub async fn list(&self) -> Result<Vec<Report>> {
        self.reports.list().await
    }
}
