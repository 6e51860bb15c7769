// Retention Cleaner - age-based removal of export records and files

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::domain::ExportSettings;
use crate::error::Result;
use crate::port::{ExportRepository, StorageBackend, TimeProvider};

const MILLIS_PER_DAY: i64 = 24 * 60 * 60 * 1000;

pub struct RetentionCleaner {
    exports: Arc<dyn ExportRepository>,
    storage: Arc<dyn StorageBackend>,
    settings: ExportSettings,
    time: Arc<dyn TimeProvider>,
}

impl RetentionCleaner {
    pub fn new(
        exports: Arc<dyn ExportRepository>,
        storage: Arc<dyn StorageBackend>,
        settings: ExportSettings,
        time: Arc<dyn TimeProvider>,
    ) -> Self {
        Self {
            exports,
            storage,
            settings,
            time,
        }
    }

    /// Delete every export created before the retention cutoff, file
    /// first, then record. Returns the number of records removed.
    ///
    /// A non-positive retention period means "keep forever". A missing
    /// file is logged and the record deletion proceeds; any other failure
    /// skips that export and moves on to the next.
    pub async fn cleanup(&self) -> Result<u64> {
        if !self.settings.auto_cleanup_enabled || self.settings.retention_days <= 0 {
            debug!("retention cleanup disabled, nothing to do");
            return Ok(0);
        }

        let now = self.time.now_millis();
        let cutoff = now - self.settings.retention_days * MILLIS_PER_DAY;
        let expired = self.exports.find_created_before(cutoff).await?;
        if expired.is_empty() {
            return Ok(0);
        }

        info!(
            count = expired.len(),
            retention_days = self.settings.retention_days,
            "removing expired exports"
        );

        let mut deleted = 0u64;
        for export in expired {
            if let Some(path) = &export.file_path {
                match self.storage.exists(path).await {
                    Ok(false) => {
                        debug!(export_id = %export.id, path = %path, "export file already absent");
                    }
                    Ok(true) => {
                        if let Err(err) = self.storage.delete(path).await {
                            warn!(
                                export_id = %export.id,
                                path = %path,
                                error = %err,
                                "could not delete export file, keeping record"
                            );
                            continue;
                        }
                    }
                    Err(err) => {
                        warn!(export_id = %export.id, path = %path, error = %err, "storage check failed");
                        continue;
                    }
                }
            }

            if let Err(err) = self.exports.delete(&export.id).await {
                warn!(export_id = %export.id, error = %err, "could not delete export record");
                continue;
            }
            deleted += 1;
        }

        info!(deleted, "retention cleanup finished");
        Ok(deleted)
    }
}
