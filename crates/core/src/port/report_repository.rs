// Report Repository Port (Interface)

use async_trait::async_trait;

use crate::domain::{Report, ReportId};
use crate::error::Result;

/// Repository interface for Report persistence
#[async_trait]
pub trait ReportRepository: Send + Sync {
    /// Insert a new report
    async fn insert(&self, report: &Report) -> Result<()>;

    /// Update an existing report
    async fn update(&self, report: &Report) -> Result<()>;

    /// Find report by ID
    async fn find_by_id(&self, id: &ReportId) -> Result<Option<Report>>;

    /// Find report by its unique slug
    async fn find_by_slug(&self, slug: &str) -> Result<Option<Report>>;

    /// All reports in display order
    async fn list(&self) -> Result<Vec<Report>>;

    /// Enabled, schedule-enabled reports due at or before `now_millis`,
    /// in stable display order
    async fn find_due(&self, now_millis: i64) -> Result<Vec<Report>>;

    /// Record a generation pass: `last_generated_at` and the newly
    /// computed `next_scheduled_at`
    async fn set_schedule_state(
        &self,
        id: &ReportId,
        last_generated_at: i64,
        next_scheduled_at: Option<i64>,
    ) -> Result<()>;

    /// Delete one report
    async fn delete(&self, id: &ReportId) -> Result<()>;
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use crate::error::AppError;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// In-memory report repository for tests
    #[derive(Default)]
    pub struct MemoryReportRepository {
        reports: Mutex<HashMap<String, Report>>,
    }

    impl MemoryReportRepository {
        pub fn new() -> Self {
            Self::default()
        }
    }

    fn display_order(reports: &mut [Report]) {
        reports.sort_by(|a, b| {
            a.sort_order
                .cmp(&b.sort_order)
                .then(a.created_at.cmp(&b.created_at))
        });
    }

    #[async_trait]
    impl ReportRepository for MemoryReportRepository {
        async fn insert(&self, report: &Report) -> Result<()> {
            self.reports
                .lock()
                .expect("repo lock")
                .insert(report.id.clone(), report.clone());
            Ok(())
        }

        async fn update(&self, report: &Report) -> Result<()> {
            let mut reports = self.reports.lock().expect("repo lock");
            if !reports.contains_key(&report.id) {
                return Err(AppError::NotFound(format!("report {}", report.id)));
            }
            reports.insert(report.id.clone(), report.clone());
            Ok(())
        }

        async fn find_by_id(&self, id: &ReportId) -> Result<Option<Report>> {
            Ok(self.reports.lock().expect("repo lock").get(id).cloned())
        }

        async fn find_by_slug(&self, slug: &str) -> Result<Option<Report>> {
            Ok(self
                .reports
                .lock()
                .expect("repo lock")
                .values()
                .find(|r| r.slug == slug)
                .cloned())
        }

        async fn list(&self) -> Result<Vec<Report>> {
            let mut all: Vec<Report> = self
                .reports
                .lock()
                .expect("repo lock")
                .values()
                .cloned()
                .collect();
            display_order(&mut all);
            Ok(all)
        }

        async fn find_due(&self, now_millis: i64) -> Result<Vec<Report>> {
            let mut due: Vec<Report> = self
                .reports
                .lock()
                .expect("repo lock")
                .values()
                .filter(|r| {
                    r.scheduling_enabled()
                        && r.next_scheduled_at
                            .map(|at| at <= now_millis)
                            .unwrap_or(false)
                })
                .cloned()
                .collect();
            display_order(&mut due);
            Ok(due)
        }

        async fn set_schedule_state(
            &self,
            id: &ReportId,
            last_generated_at: i64,
            next_scheduled_at: Option<i64>,
        ) -> Result<()> {
            let mut reports = self.reports.lock().expect("repo lock");
            let report = reports
                .get_mut(id)
                .ok_or_else(|| AppError::NotFound(format!("report {}", id)))?;
            report.last_generated_at = Some(last_generated_at);
            report.next_scheduled_at = next_scheduled_at;
            Ok(())
        }

        async fn delete(&self, id: &ReportId) -> Result<()> {
            self.reports.lock().expect("repo lock").remove(id);
            Ok(())
        }
    }
}
