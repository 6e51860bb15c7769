// Application Layer - Use Cases and Services

pub mod pipeline;
pub mod reports;
pub mod retention;
pub mod scheduler_job;
pub mod trigger;
pub mod worker;

// Re-exports
pub use pipeline::{ExportPipeline, GenerateOutcome};
pub use reports::ReportService;
pub use retention::RetentionCleaner;
pub use scheduler_job::{SchedulerJob, SchedulerRunSummary};
pub use trigger::{AdhocExportRequest, TriggerMode, TriggerService, TriggeredExport};
pub use worker::{shutdown_channel, QueueWorker, ShutdownSender, ShutdownToken};
