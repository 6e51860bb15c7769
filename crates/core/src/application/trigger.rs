// Manual / API export triggering
//
// Queued triggers hand the work to the queue like every other export;
// the Immediate mode is the one explicit exception that runs the
// pipeline inline so the caller gets the outcome in the same request.

use std::sync::Arc;

use tracing::info;

use crate::application::pipeline::ExportPipeline;
use crate::domain::{
    Export, ExportFormat, ExportStatus, ExportTarget, FilterSnapshot, Report, Trigger,
};
use crate::error::{AppError, Result};
use crate::port::{ExportRepository, IdProvider, JobQueue, QueueTask, TimeProvider};

/// How a triggered export is executed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerMode {
    /// Enqueue and return; generation happens on a queue worker
    Queued,
    /// Run the pipeline inline and report the terminal state
    Immediate,
}

/// One export created by a trigger call
#[derive(Debug, Clone)]
pub struct TriggeredExport {
    pub export_id: String,
    /// `Pending` when queued; the terminal status when run inline
    pub status: ExportStatus,
    pub error: Option<String>,
}

/// An ad-hoc export request not backed by a saved report
#[derive(Debug, Clone)]
pub struct AdhocExportRequest {
    pub data_source: String,
    pub target: ExportTarget,
    pub filters: FilterSnapshot,
    pub format: ExportFormat,
    pub trigger: Trigger,
    pub triggered_by: Option<String>,
}

pub struct TriggerService {
    exports: Arc<dyn ExportRepository>,
    pipeline: Arc<ExportPipeline>,
    queue: Arc<dyn JobQueue>,
    time: Arc<dyn TimeProvider>,
    ids: Arc<dyn IdProvider>,
}

impl TriggerService {
    pub fn new(
        exports: Arc<dyn ExportRepository>,
        pipeline: Arc<ExportPipeline>,
        queue: Arc<dyn JobQueue>,
        time: Arc<dyn TimeProvider>,
        ids: Arc<dyn IdProvider>,
    ) -> Self {
        Self {
            exports,
            pipeline,
            queue,
            time,
            ids,
        }
    }

    /// Trigger every export a report produces (one per entity in
    /// `separate` mode, one merged in `combined` mode)
    pub async fn trigger_report(
        &self,
        report: &Report,
        trigger: Trigger,
        triggered_by: Option<String>,
        mode: TriggerMode,
    ) -> Result<Vec<TriggeredExport>> {
        let now = self.time.now_millis();
        let mut results = Vec::new();

        for target in report.export_targets() {
            let export = Export::for_report(
                report,
                target,
                trigger,
                triggered_by.clone(),
                self.ids.generate_id(),
                now,
            );
            self.exports.insert(&export).await?;
            results.push(
                self.dispatch(export.id, mode, Some(report.name.as_str()))
                    .await?,
            );
        }

        info!(
            report_id = %report.id,
            count = results.len(),
            ?mode,
            "report triggered"
        );
        Ok(results)
    }

    /// Trigger a one-off export that is not backed by a saved report
    pub async fn trigger_adhoc(
        &self,
        request: AdhocExportRequest,
        mode: TriggerMode,
    ) -> Result<TriggeredExport> {
        if let ExportTarget::Combined { entity_ids } = &request.target {
            if entity_ids.is_empty() {
                return Err(AppError::Validation(
                    "a combined export needs at least one entity".to_string(),
                ));
            }
        }

        let now = self.time.now_millis();
        let mut export = Export::new(
            self.ids.generate_id(),
            now,
            request.data_source,
            request.target,
            request.filters,
            request.format,
            request.trigger,
        );
        export.triggered_by = request.triggered_by;

        self.exports.insert(&export).await?;
        self.dispatch(export.id, mode, None).await
    }

    async fn dispatch(
        &self,
        export_id: String,
        mode: TriggerMode,
        report_name: Option<&str>,
    ) -> Result<TriggeredExport> {
        match mode {
            TriggerMode::Queued => {
                let label = report_name
                    .map(|name| format!("Generate export for {}", name))
                    .or_else(|| Some("Generate export".to_string()));
                self.queue
                    .enqueue(
                        QueueTask::GenerateExport {
                            export_id: export_id.clone(),
                        },
                        0,
                        label,
                    )
                    .await?;
                Ok(TriggeredExport {
                    export_id,
                    status: ExportStatus::Pending,
                    error: None,
                })
            }
            TriggerMode::Immediate => {
                let error = match self.pipeline.generate(&export_id).await {
                    Ok(_) => None,
                    Err(err) => Some(err.to_string()),
                };
                // Report the persisted terminal state, whatever it is
                let status = self
                    .exports
                    .find_by_id(&export_id)
                    .await?
                    .map(|e| e.status)
                    .unwrap_or(ExportStatus::Failed);
                Ok(TriggeredExport {
                    export_id,
                    status,
                    error,
                })
            }
        }
    }
}
