// Export Pipeline - turns a pending export into a generated file
//
// The pipeline exclusively owns an export record from the moment it wins
// the pending -> processing claim until the record reaches a terminal
// state. Every failure is persisted onto the record before the error is
// returned; partial output is deliberately left in place for inspection.

mod combine;
pub mod encoder;

pub use combine::{merge, CombinedInput, SOURCE_COLUMN};

use std::sync::Arc;

use chrono::DateTime;
use tracing::{error, info, warn};

use crate::domain::{Export, ExportFormat, ExportSettings, ExportTarget};
use crate::error::{AppError, Result};
use crate::port::data_source::{DataSource, FieldDescriptor, RowQuery, TableData};
use crate::port::{DataSourceRegistry, ExportRepository, StorageBackend, TimeProvider};

use encoder::CsvOptions;

/// Filename component used in place of an entity handle for combined files
const COMBINED_COMPONENT: &str = "combined";

/// Sheet name for combined XLSX exports
const COMBINED_SHEET: &str = "Combined";

/// Result of one `generate` call
#[derive(Debug, Clone, PartialEq)]
pub enum GenerateOutcome {
    Completed {
        file_path: String,
        record_count: i64,
    },
    /// The record was no longer pending - benign double delivery
    Skipped,
}

struct GeneratedFile {
    file_path: String,
    file_size: i64,
    record_count: i64,
}

pub struct ExportPipeline {
    sources: Arc<DataSourceRegistry>,
    storage: Arc<dyn StorageBackend>,
    exports: Arc<dyn ExportRepository>,
    settings: ExportSettings,
    time: Arc<dyn TimeProvider>,
}

impl ExportPipeline {
    pub fn new(
        sources: Arc<DataSourceRegistry>,
        storage: Arc<dyn StorageBackend>,
        exports: Arc<dyn ExportRepository>,
        settings: ExportSettings,
        time: Arc<dyn TimeProvider>,
    ) -> Self {
        Self {
            sources,
            storage,
            exports,
            settings,
            time,
        }
    }

    /// Run the full pipeline for one export record.
    ///
    /// Returns `Skipped` without touching the record when it is not
    /// pending any more; otherwise the record ends up `completed` or
    /// `failed`, and a failure is also returned to the caller so the
    /// queue layer can decide on visibility.
    pub async fn generate(&self, export_id: &str) -> Result<GenerateOutcome> {
        let export = self
            .exports
            .find_by_id(&export_id.to_string())
            .await?
            .ok_or_else(|| AppError::NotFound(format!("export {}", export_id)))?;

        let now = self.time.now_millis();
        if !self.exports.mark_processing(&export.id, now).await? {
            warn!(
                export_id,
                status = %export.status,
                "export is not pending, skipping generation"
            );
            return Ok(GenerateOutcome::Skipped);
        }

        match self.run(&export).await {
            Ok(output) => {
                let done_at = self.time.now_millis();
                self.exports
                    .mark_completed(
                        &export.id,
                        done_at,
                        &output.file_path,
                        output.file_size,
                        output.record_count,
                    )
                    .await?;
                info!(
                    export_id,
                    file = %output.file_path,
                    rows = output.record_count,
                    "export completed"
                );
                Ok(GenerateOutcome::Completed {
                    file_path: output.file_path,
                    record_count: output.record_count,
                })
            }
            Err(err) => {
                let done_at = self.time.now_millis();
                let message = err.to_string();
                error!(export_id, error = %message, "export failed");
                self.exports.mark_failed(&export.id, done_at, &message).await?;
                Err(err)
            }
        }
    }

    async fn run(&self, export: &Export) -> Result<GeneratedFile> {
        let source = self.sources.get(&export.data_source).ok_or_else(|| {
            AppError::Config(format!("unknown data source: {}", export.data_source))
        })?;

        let now = self.time.now_millis();
        let (start, end) = export.filters.resolve_bounds(now);
        let query = RowQuery {
            start,
            end,
            site_id: export.filters.site_id.clone(),
            fields: export.filters.fields.clone(),
            ..Default::default()
        };

        let (table, file_component, sheet_name) = match &export.target {
            ExportTarget::Single { entity_id } => {
                let descriptor = source.entity(entity_id).await?.ok_or_else(|| {
                    AppError::NotFound(format!(
                        "entity {} in data source {}",
                        entity_id, export.data_source
                    ))
                })?;
                let table = source.export(entity_id, &query).await?;
                (table, descriptor.handle, descriptor.name)
            }
            ExportTarget::Combined { entity_ids } => {
                let table = self
                    .collect_combined(source.as_ref(), entity_ids, &query)
                    .await?;
                (
                    table,
                    COMBINED_COMPONENT.to_string(),
                    COMBINED_SHEET.to_string(),
                )
            }
        };
        self.exports.set_progress(&export.id, 60).await?;

        let bytes = encoder::encode(export.format, &table, &sheet_name, &self.csv_options())?;
        self.exports.set_progress(&export.id, 80).await?;

        let file_path = file_name(&export.data_source, &file_component, export.format, now);
        self.storage.write(&file_path, &bytes).await?;

        Ok(GeneratedFile {
            file_path,
            file_size: bytes.len() as i64,
            record_count: table.rows.len() as i64,
        })
    }

    /// Two-pass combined extraction: field labels first, then rows, both
    /// handed to the pure merge
    async fn collect_combined(
        &self,
        source: &dyn DataSource,
        entity_ids: &[String],
        query: &RowQuery,
    ) -> Result<TableData> {
        let mut inputs = Vec::with_capacity(entity_ids.len());
        for entity_id in entity_ids {
            let descriptor = source.entity(entity_id).await?.ok_or_else(|| {
                AppError::NotFound(format!(
                    "entity {} in data source {}",
                    entity_id,
                    source.handle()
                ))
            })?;
            let field_labels = selected_labels(source.fields(entity_id).await?, &query.fields);
            let table = source.export(entity_id, query).await?;
            inputs.push(CombinedInput {
                source_name: descriptor.name,
                field_labels,
                table,
            });
        }
        Ok(merge(&inputs))
    }

    fn csv_options(&self) -> CsvOptions {
        CsvOptions {
            delimiter: self.settings.csv_delimiter,
            quote: self.settings.csv_quote,
            bom: self.settings.csv_bom,
        }
    }
}

/// Labels of the fields a query selects, in entity field order
fn selected_labels(fields: Vec<FieldDescriptor>, subset: &[String]) -> Vec<String> {
    fields
        .into_iter()
        .filter(|f| {
            if subset.is_empty() {
                f.exportable
            } else {
                subset.contains(&f.handle)
            }
        })
        .map(|f| f.label)
        .collect()
}

/// `{dataSourceHandle}_{entityHandleOrCombined}_{YYYY-MM-DD_HH-mm-ss}.{ext}`
fn file_name(source: &str, component: &str, format: ExportFormat, now_millis: i64) -> String {
    let stamp = DateTime::from_timestamp_millis(now_millis)
        .map(|dt| dt.format("%Y-%m-%d_%H-%M-%S").to_string())
        .unwrap_or_else(|| now_millis.to_string());
    format!("{}_{}_{}.{}", source, component, stamp, format.extension())
}
