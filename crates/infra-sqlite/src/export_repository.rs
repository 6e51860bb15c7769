// SQLite ExportRepository Implementation
//
// State transitions are guarded at the SQL level: conditional UPDATEs
// keyed on the current status make double delivery a no-op instead of a
// race.

use async_trait::async_trait;
use sqlx::SqlitePool;

use exportd_core::domain::{
    DateRangePreset, Export, ExportFormat, ExportId, ExportStatus, ExportTarget, FilterSnapshot,
    Trigger,
};
use exportd_core::error::{AppError, Result};
use exportd_core::port::ExportRepository;

use crate::map_sqlx_error;

pub struct SqliteExportRepository {
    pool: SqlitePool,
}

impl SqliteExportRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    async fn current_status(&self, id: &str) -> Result<Option<String>> {
        sqlx::query_scalar("SELECT status FROM exports WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_error)
    }
}

#[async_trait]
impl ExportRepository for SqliteExportRepository {
    async fn insert(&self, export: &Export) -> Result<()> {
        let (entity_id, entity_ids) = match &export.target {
            ExportTarget::Single { entity_id } => (Some(entity_id.clone()), None),
            ExportTarget::Combined { entity_ids } => {
                (None, Some(serde_json::to_string(entity_ids)?))
            }
        };

        sqlx::query(
            r#"
            INSERT INTO exports (
                id, report_id, data_source, entity_id, entity_ids,
                date_range, range_start, range_end, fields, site_id,
                format, file_path, file_size, record_count,
                status, progress, error, trigger_origin, triggered_by,
                created_at, started_at, completed_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&export.id)
        .bind(&export.report_id)
        .bind(&export.data_source)
        .bind(&entity_id)
        .bind(&entity_ids)
        .bind(export.filters.date_range.as_str())
        .bind(export.filters.range_start)
        .bind(export.filters.range_end)
        .bind(serde_json::to_string(&export.filters.fields)?)
        .bind(&export.filters.site_id)
        .bind(export.format.as_str())
        .bind(&export.file_path)
        .bind(export.file_size)
        .bind(export.record_count)
        .bind(export.status.as_str())
        .bind(export.progress as i64)
        .bind(&export.error)
        .bind(export.trigger.as_str())
        .bind(&export.triggered_by)
        .bind(export.created_at)
        .bind(export.started_at)
        .bind(export.completed_at)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(())
    }

    async fn find_by_id(&self, id: &ExportId) -> Result<Option<Export>> {
        let row = sqlx::query_as::<_, ExportRow>("SELECT * FROM exports WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        Ok(row.map(|r| r.into_export()))
    }

    async fn list(&self) -> Result<Vec<Export>> {
        let rows: Vec<ExportRow> =
            sqlx::query_as("SELECT * FROM exports ORDER BY created_at DESC, id ASC")
                .fetch_all(&self.pool)
                .await
                .map_err(map_sqlx_error)?;

        Ok(rows.into_iter().map(|r| r.into_export()).collect())
    }

    async fn list_for_report(&self, report_id: &str) -> Result<Vec<Export>> {
        let rows: Vec<ExportRow> = sqlx::query_as(
            "SELECT * FROM exports WHERE report_id = ? ORDER BY created_at DESC, id ASC",
        )
        .bind(report_id)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(rows.into_iter().map(|r| r.into_export()).collect())
    }

    async fn mark_processing(&self, id: &ExportId, now_millis: i64) -> Result<bool> {
        // The conditional UPDATE is the concurrency gate: only one caller
        // can move the record out of pending
        let result = sqlx::query(
            r#"
            UPDATE exports
            SET status = 'processing', started_at = ?
            WHERE id = ? AND status = 'pending'
            "#,
        )
        .bind(now_millis)
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(result.rows_affected() > 0)
    }

    async fn set_progress(&self, id: &ExportId, progress: u8) -> Result<()> {
        sqlx::query("UPDATE exports SET progress = ? WHERE id = ? AND status = 'processing'")
            .bind(progress.min(100) as i64)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

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
        let result = sqlx::query(
            r#"
            UPDATE exports
            SET status = 'completed', progress = 100,
                file_path = ?, file_size = ?, record_count = ?, completed_at = ?
            WHERE id = ? AND status = 'processing'
            "#,
        )
        .bind(file_path)
        .bind(file_size)
        .bind(record_count)
        .bind(now_millis)
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        if result.rows_affected() == 0 {
            return match self.current_status(id).await? {
                None => Err(AppError::NotFound(format!("export {}", id))),
                Some(status) => Err(AppError::InvalidState(format!(
                    "cannot complete export {} from status {}",
                    id, status
                ))),
            };
        }
        Ok(())
    }

    async fn mark_failed(&self, id: &ExportId, now_millis: i64, error: &str) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE exports
            SET status = 'failed', error = ?, completed_at = ?
            WHERE id = ? AND status IN ('pending', 'processing')
            "#,
        )
        .bind(error)
        .bind(now_millis)
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        if result.rows_affected() == 0 {
            return match self.current_status(id).await? {
                None => Err(AppError::NotFound(format!("export {}", id))),
                Some(status) => Err(AppError::InvalidState(format!(
                    "cannot fail export {} from status {}",
                    id, status
                ))),
            };
        }
        Ok(())
    }

    async fn find_created_before(&self, cutoff_millis: i64) -> Result<Vec<Export>> {
        let rows: Vec<ExportRow> = sqlx::query_as(
            "SELECT * FROM exports WHERE created_at < ? ORDER BY created_at ASC, id ASC",
        )
        .bind(cutoff_millis)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(rows.into_iter().map(|r| r.into_export()).collect())
    }

    async fn delete(&self, id: &ExportId) -> Result<()> {
        sqlx::query("DELETE FROM exports WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        Ok(())
    }

    async fn detach_report(&self, report_id: &str) -> Result<u64> {
        let result = sqlx::query("UPDATE exports SET report_id = NULL WHERE report_id = ?")
            .bind(report_id)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        Ok(result.rows_affected())
    }
}

/// SQLite row representation
#[derive(Debug, sqlx::FromRow)]
struct ExportRow {
    id: String,
    report_id: Option<String>,
    data_source: String,
    entity_id: Option<String>,
    entity_ids: Option<String>,
    date_range: String,
    range_start: Option<i64>,
    range_end: Option<i64>,
    fields: String,
    site_id: Option<String>,
    format: String,
    file_path: Option<String>,
    file_size: Option<i64>,
    record_count: Option<i64>,
    status: String,
    progress: i64,
    error: Option<String>,
    trigger_origin: String,
    triggered_by: Option<String>,
    created_at: i64,
    started_at: Option<i64>,
    completed_at: Option<i64>,
}

impl ExportRow {
    fn into_export(self) -> Export {
        let target = match &self.entity_ids {
            Some(json) => ExportTarget::Combined {
                entity_ids: serde_json::from_str(json).unwrap_or_default(),
            },
            None => ExportTarget::Single {
                entity_id: self.entity_id.clone().unwrap_or_default(),
            },
        };

        Export {
            id: self.id,
            report_id: self.report_id,
            data_source: self.data_source,
            target,
            filters: FilterSnapshot {
                date_range: DateRangePreset::parse(&self.date_range),
                range_start: self.range_start,
                range_end: self.range_end,
                fields: serde_json::from_str(&self.fields).unwrap_or_default(),
                site_id: self.site_id,
            },
            // Default fallbacks for rows written by a newer schema
            format: ExportFormat::parse(&self.format).unwrap_or(ExportFormat::Csv),
            file_path: self.file_path,
            file_size: self.file_size,
            record_count: self.record_count,
            status: ExportStatus::parse(&self.status).unwrap_or(ExportStatus::Failed),
            progress: self.progress.clamp(0, 100) as u8,
            error: self.error,
            trigger: Trigger::parse(&self.trigger_origin).unwrap_or(Trigger::Manual),
            triggered_by: self.triggered_by,
            created_at: self.created_at,
            started_at: self.started_at,
            completed_at: self.completed_at,
        }
    }
}
