// Export Repository Port (Interface)

use async_trait::async_trait;

use crate::domain::{Export, ExportId};
use crate::error::Result;

/// Repository interface for Export persistence.
///
/// State transitions go through the `mark_*` methods so every backend
/// enforces the same guarded updates.
#[async_trait]
pub trait ExportRepository: Send + Sync {
    /// Insert a new pending export
    async fn insert(&self, export: &Export) -> Result<()>;

    /// Find export by ID
    async fn find_by_id(&self, id: &ExportId) -> Result<Option<Export>>;

    /// All exports, newest first
    async fn list(&self) -> Result<Vec<Export>>;

    /// Exports belonging to one report, newest first
    async fn list_for_report(&self, report_id: &str) -> Result<Vec<Export>>;

    /// Claim the export for generation: pending -> processing.
    ///
    /// Returns false without touching the record when it is no longer
    /// pending; the caller treats that as benign double-delivery.
    async fn mark_processing(&self, id: &ExportId, now_millis: i64) -> Result<bool>;

    /// Record generation progress (0-100)
    async fn set_progress(&self, id: &ExportId, progress: u8) -> Result<()>;

    /// processing -> completed, recording the generated file
    async fn mark_completed(
        &self,
        id: &ExportId,
        now_millis: i64,
        file_path: &str,
        file_size: i64,
        record_count: i64,
    ) -> Result<()>;

    /// pending|processing -> failed, capturing the error message
    async fn mark_failed(&self, id: &ExportId, now_millis: i64, error: &str) -> Result<()>;

    /// Exports created strictly before `cutoff_millis`, any status
    async fn find_created_before(&self, cutoff_millis: i64) -> Result<Vec<Export>>;

    /// Delete one export record
    async fn delete(&self, id: &ExportId) -> Result<()>;

    /// Null the report reference of every export owned by `report_id`,
    /// keeping the records. Returns the number detached.
    async fn detach_report(&self, report_id: &str) -> Result<u64>;
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use crate::domain::ExportStatus;
    use crate::error::AppError;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// In-memory export repository for tests
    #[derive(Default)]
    pub struct MemoryExportRepository {
        exports: Mutex<HashMap<String, Export>>,
    }

    impl MemoryExportRepository {
        pub fn new() -> Self {
            Self::default()
        }
    }

    #[async_trait]
    impl ExportRepository for MemoryExportRepository {
        async fn insert(&self, export: &Export) -> Result<()> {
            self.exports
                .lock()
                .expect("repo lock")
                .insert(export.id.clone(), export.clone());
            Ok(())
        }

        async fn find_by_id(&self, id: &ExportId) -> Result<Option<Export>> {
            Ok(self.exports.lock().expect("repo lock").get(id).cloned())
        }

        async fn list(&self) -> Result<Vec<Export>> {
            let mut all: Vec<Export> = self
                .exports
                .lock()
                .expect("repo lock")
                .values()
                .cloned()
                .collect();
            all.sort_by(|a, b| b.created_at.cmp(&a.created_at));
            Ok(all)
        }

        async fn list_for_report(&self, report_id: &str) -> Result<Vec<Export>> {
            let mut matching: Vec<Export> = self
                .exports
                .lock()
                .expect("repo lock")
                .values()
                .filter(|e| e.report_id.as_deref() == Some(report_id))
                .cloned()
                .collect();
            matching.sort_by(|a, b| b.created_at.cmp(&a.created_at));
            Ok(matching)
        }

        async fn mark_processing(&self, id: &ExportId, now_millis: i64) -> Result<bool> {
            let mut exports = self.exports.lock().expect("repo lock");
            let export = exports
                .get_mut(id)
                .ok_or_else(|| AppError::NotFound(format!("export {}", id)))?;
            if export.status != ExportStatus::Pending {
                return Ok(false);
            }
            export.start(now_millis)?;
            Ok(true)
        }

        async fn set_progress(&self, id: &ExportId, progress: u8) -> Result<()> {
            let mut exports = self.exports.lock().expect("repo lock");
            if let Some(export) = exports.get_mut(id) {
                export.progress = progress.min(100);
            }
            Ok(())
        }

        async fn mark_completed(
            &self,
            id: &ExportId,
            now_millis: i64,
            file_path: &str,
            file_size: i64,
            record_count: i64,
        ) -> Result<()> {
            let mut exports = self.exports.lock().expect("repo lock");
            let export = exports
                .get_mut(id)
                .ok_or_else(|| AppError::NotFound(format!("export {}", id)))?;
            export.complete(now_millis, file_path, file_size, record_count)?;
            Ok(())
        }

        async fn mark_failed(&self, id: &ExportId, now_millis: i64, error: &str) -> Result<()> {
            let mut exports = self.exports.lock().expect("repo lock");
            let export = exports
                .get_mut(id)
                .ok_or_else(|| AppError::NotFound(format!("export {}", id)))?;
            export.fail(now_millis, error)?;
            Ok(())
        }

        async fn find_created_before(&self, cutoff_millis: i64) -> Result<Vec<Export>> {
            let mut old: Vec<Export> = self
                .exports
                .lock()
                .expect("repo lock")
                .values()
                .filter(|e| e.created_at < cutoff_millis)
                .cloned()
                .collect();
            old.sort_by_key(|e| e.created_at);
            Ok(old)
        }

        async fn delete(&self, id: &ExportId) -> Result<()> {
            self.exports.lock().expect("repo lock").remove(id);
            Ok(())
        }

        async fn detach_report(&self, report_id: &str) -> Result<u64> {
            let mut exports = self.exports.lock().expect("repo lock");
            let mut detached = 0;
            for export in exports.values_mut() {
                if export.report_id.as_deref() == Some(report_id) {
                    export.report_id = None;
                    detached += 1;
                }
            }
            Ok(detached)
        }
    }
}
