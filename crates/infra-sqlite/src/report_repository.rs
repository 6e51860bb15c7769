// SQLite ReportRepository Implementation

use async_trait::async_trait;
use sqlx::SqlitePool;

use exportd_core::domain::{
    DateRangePreset, ExportFormat, ExportMode, Report, ReportId, Schedule,
};
use exportd_core::error::{AppError, Result};
use exportd_core::port::ReportRepository;

use crate::map_sqlx_error;

pub struct SqliteReportRepository {
    pool: SqlitePool,
}

impl SqliteReportRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ReportRepository for SqliteReportRepository {
    async fn insert(&self, report: &Report) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO reports (
                id, name, slug, data_source, entity_ids, site_id,
                date_range, range_start, range_end, fields,
                format, mode, schedule,
                last_generated_at, next_scheduled_at,
                enabled, sort_order, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&report.id)
        .bind(&report.name)
        .bind(&report.slug)
        .bind(&report.data_source)
        .bind(to_json_list(&report.entity_ids)?)
        .bind(&report.site_id)
        .bind(report.date_range.as_str())
        .bind(report.range_start)
        .bind(report.range_end)
        .bind(to_json_list(&report.fields)?)
        .bind(report.format.as_str())
        .bind(report.mode.as_str())
        .bind(report.schedule.as_str())
        .bind(report.last_generated_at)
        .bind(report.next_scheduled_at)
        .bind(if report.enabled { 1 } else { 0 })
        .bind(report.sort_order)
        .bind(report.created_at)
        .bind(report.updated_at)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(())
    }

    async fn update(&self, report: &Report) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE reports
            SET name = ?, slug = ?, data_source = ?, entity_ids = ?, site_id = ?,
                date_range = ?, range_start = ?, range_end = ?, fields = ?,
                format = ?, mode = ?, schedule = ?,
                last_generated_at = ?, next_scheduled_at = ?,
                enabled = ?, sort_order = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(&report.name)
        .bind(&report.slug)
        .bind(&report.data_source)
        .bind(to_json_list(&report.entity_ids)?)
        .bind(&report.site_id)
        .bind(report.date_range.as_str())
        .bind(report.range_start)
        .bind(report.range_end)
        .bind(to_json_list(&report.fields)?)
        .bind(report.format.as_str())
        .bind(report.mode.as_str())
        .bind(report.schedule.as_str())
        .bind(report.last_generated_at)
        .bind(report.next_scheduled_at)
        .bind(if report.enabled { 1 } else { 0 })
        .bind(report.sort_order)
        .bind(report.updated_at)
        .bind(&report.id)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("report {}", report.id)));
        }
        Ok(())
    }

    async fn find_by_id(&self, id: &ReportId) -> Result<Option<Report>> {
        let row = sqlx::query_as::<_, ReportRow>("SELECT * FROM reports WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        Ok(row.map(|r| r.into_report()))
    }

    async fn find_by_slug(&self, slug: &str) -> Result<Option<Report>> {
        let row = sqlx::query_as::<_, ReportRow>("SELECT * FROM reports WHERE slug = ?")
            .bind(slug)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        Ok(row.map(|r| r.into_report()))
    }

    async fn list(&self) -> Result<Vec<Report>> {
        let rows: Vec<ReportRow> = sqlx::query_as(
            "SELECT * FROM reports ORDER BY sort_order ASC, created_at ASC, id ASC",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(rows.into_iter().map(|r| r.into_report()).collect())
    }

    async fn find_due(&self, now_millis: i64) -> Result<Vec<Report>> {
        // Stable order: due reports are always processed in display order
        let rows: Vec<ReportRow> = sqlx::query_as(
            r#"
            SELECT * FROM reports
            WHERE enabled = 1
              AND schedule != 'disabled'
              AND next_scheduled_at IS NOT NULL
              AND next_scheduled_at <= ?
            ORDER BY sort_order ASC, created_at ASC, id ASC
            "#,
        )
        .bind(now_millis)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(rows.into_iter().map(|r| r.into_report()).collect())
    }

    async fn set_schedule_state(
        &self,
        id: &ReportId,
        last_generated_at: i64,
        next_scheduled_at: Option<i64>,
    ) -> Result<()> {
        let result = sqlx::query(
            "UPDATE reports SET last_generated_at = ?, next_scheduled_at = ? WHERE id = ?",
        )
        .bind(last_generated_at)
        .bind(next_scheduled_at)
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("report {}", id)));
        }
        Ok(())
    }

    async fn delete(&self, id: &ReportId) -> Result<()> {
        sqlx::query("DELETE FROM reports WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        Ok(())
    }
}

fn to_json_list(items: &[String]) -> Result<String> {
    Ok(serde_json::to_string(items)?)
}

fn from_json_list(json: &str) -> Vec<String> {
    serde_json::from_str(json).unwrap_or_default()
}

/// SQLite row representation
#[derive(Debug, sqlx::FromRow)]
struct ReportRow {
    id: String,
    name: String,
    slug: String,
    data_source: String,
    entity_ids: String,
    site_id: Option<String>,
    date_range: String,
    range_start: Option<i64>,
    range_end: Option<i64>,
    fields: String,
    format: String,
    mode: String,
    schedule: String,
    last_generated_at: Option<i64>,
    next_scheduled_at: Option<i64>,
    enabled: i64, // SQLite boolean as integer
    sort_order: i32,
    created_at: i64,
    updated_at: i64,
}

impl ReportRow {
    fn into_report(self) -> Report {
        Report {
            id: self.id,
            name: self.name,
            slug: self.slug,
            data_source: self.data_source,
            entity_ids: from_json_list(&self.entity_ids),
            site_id: self.site_id,
            date_range: DateRangePreset::parse(&self.date_range),
            range_start: self.range_start,
            range_end: self.range_end,
            fields: from_json_list(&self.fields),
            // Default fallbacks for rows written by a newer schema
            format: ExportFormat::parse(&self.format).unwrap_or(ExportFormat::Csv),
            mode: ExportMode::parse(&self.mode).unwrap_or(ExportMode::Separate),
            schedule: Schedule::parse(&self.schedule).unwrap_or(Schedule::Disabled),
            last_generated_at: self.last_generated_at,
            next_scheduled_at: self.next_scheduled_at,
            enabled: self.enabled != 0,
            sort_order: self.sort_order,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}
