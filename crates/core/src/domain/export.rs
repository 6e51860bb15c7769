// Export entity - one generated artifact and its lifecycle state machine

use serde::{Deserialize, Serialize};

use crate::domain::error::{DomainError, Result};
use crate::domain::filter::FilterSnapshot;
use crate::domain::format::ExportFormat;
use crate::domain::report::Report;

/// Export ID (UUID v4)
pub type ExportId = String;

/// Lifecycle status. Transitions are one-directional:
/// pending -> processing -> completed | failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl ExportStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExportStatus::Pending => "pending",
            ExportStatus::Processing => "processing",
            ExportStatus::Completed => "completed",
            ExportStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "pending" => Ok(ExportStatus::Pending),
            "processing" => Ok(ExportStatus::Processing),
            "completed" => Ok(ExportStatus::Completed),
            "failed" => Ok(ExportStatus::Failed),
            other => Err(DomainError::ValidationError(format!(
                "unknown export status: {}",
                other
            ))),
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ExportStatus::Completed | ExportStatus::Failed)
    }
}

impl std::fmt::Display for ExportStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// What created the export
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Trigger {
    Manual,
    Scheduled,
    Api,
}

impl Trigger {
    pub fn as_str(&self) -> &'static str {
        match self {
            Trigger::Manual => "manual",
            Trigger::Scheduled => "scheduled",
            Trigger::Api => "api",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "manual" => Ok(Trigger::Manual),
            "scheduled" => Ok(Trigger::Scheduled),
            "api" => Ok(Trigger::Api),
            other => Err(DomainError::ValidationError(format!(
                "unknown trigger: {}",
                other
            ))),
        }
    }
}

impl std::fmt::Display for Trigger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// What an export covers: one entity, or several merged into one
/// column-aligned file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ExportTarget {
    Single { entity_id: String },
    Combined { entity_ids: Vec<String> },
}

impl ExportTarget {
    pub fn is_combined(&self) -> bool {
        matches!(self, ExportTarget::Combined { .. })
    }
}

/// Export entity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Export {
    pub id: ExportId,
    /// Owning report; None for ad-hoc exports and orphans of deleted reports
    pub report_id: Option<String>,
    pub data_source: String,
    pub target: ExportTarget,
    /// Immutable copy of the filters in effect at creation time
    pub filters: FilterSnapshot,
    pub format: ExportFormat,

    pub file_path: Option<String>,
    pub file_size: Option<i64>,
    pub record_count: Option<i64>,

    pub status: ExportStatus,
    pub progress: u8,
    pub error: Option<String>,

    pub trigger: Trigger,
    pub triggered_by: Option<String>,

    pub created_at: i64, // epoch ms
    pub started_at: Option<i64>,
    pub completed_at: Option<i64>,
}

impl Export {
    /// Create a new pending export
    ///
    /// * `id` - Unique export ID (injected, not generated)
    /// * `created_at` - Creation timestamp in epoch ms (injected)
    pub fn new(
        id: impl Into<String>,
        created_at: i64,
        data_source: impl Into<String>,
        target: ExportTarget,
        filters: FilterSnapshot,
        format: ExportFormat,
        trigger: Trigger,
    ) -> Self {
        Self {
            id: id.into(),
            report_id: None,
            data_source: data_source.into(),
            target,
            filters,
            format,
            file_path: None,
            file_size: None,
            record_count: None,
            status: ExportStatus::Pending,
            progress: 0,
            error: None,
            trigger,
            triggered_by: None,
            created_at,
            started_at: None,
            completed_at: None,
        }
    }

    /// Build a pending export for one target of a report, freezing the
    /// report's current filter configuration into the snapshot.
    pub fn for_report(
        report: &Report,
        target: ExportTarget,
        trigger: Trigger,
        triggered_by: Option<String>,
        id: impl Into<String>,
        created_at: i64,
    ) -> Self {
        let mut export = Self::new(
            id,
            created_at,
            report.data_source.clone(),
            target,
            report.filter_snapshot(),
            report.format,
            trigger,
        );
        export.report_id = Some(report.id.clone());
        export.triggered_by = triggered_by;
        export
    }

    /// Transition to Processing with explicit timestamp
    pub fn start(&mut self, now_millis: i64) -> Result<()> {
        if self.status != ExportStatus::Pending {
            return Err(DomainError::InvalidStateTransition {
                from: self.status.to_string(),
                to: ExportStatus::Processing.to_string(),
            });
        }
        self.status = ExportStatus::Processing;
        self.started_at = Some(now_millis);
        Ok(())
    }

    /// Transition to Completed, recording the generated file
    pub fn complete(
        &mut self,
        now_millis: i64,
        file_path: impl Into<String>,
        file_size: i64,
        record_count: i64,
    ) -> Result<()> {
        if self.status != ExportStatus::Processing {
            return Err(DomainError::InvalidStateTransition {
                from: self.status.to_string(),
                to: ExportStatus::Completed.to_string(),
            });
        }
        self.status = ExportStatus::Completed;
        self.progress = 100;
        self.file_path = Some(file_path.into());
        self.file_size = Some(file_size);
        self.record_count = Some(record_count);
        self.completed_at = Some(now_millis);
        Ok(())
    }

    /// Transition to Failed, capturing the error message
    pub fn fail(&mut self, now_millis: i64, message: impl Into<String>) -> Result<()> {
        if self.status.is_terminal() {
            return Err(DomainError::InvalidStateTransition {
                from: self.status.to_string(),
                to: ExportStatus::Failed.to_string(),
            });
        }
        self.status = ExportStatus::Failed;
        self.error = Some(message.into());
        self.completed_at = Some(now_millis);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pending_export() -> Export {
        Export::new(
            "export-1",
            1_000,
            "submissions",
            ExportTarget::Single {
                entity_id: "form-1".to_string(),
            },
            FilterSnapshot::default(),
            ExportFormat::Csv,
            Trigger::Manual,
        )
    }

    #[test]
    fn test_new_export_is_pending() {
        let export = pending_export();
        assert_eq!(export.status, ExportStatus::Pending);
        assert_eq!(export.progress, 0);
        assert!(export.file_path.is_none());
        assert!(export.started_at.is_none());
    }

    #[test]
    fn test_full_lifecycle() {
        let mut export = pending_export();

        export.start(2_000).unwrap();
        assert_eq!(export.status, ExportStatus::Processing);
        assert_eq!(export.started_at, Some(2_000));

        export.complete(3_000, "submissions_form-1.csv", 512, 10).unwrap();
        assert_eq!(export.status, ExportStatus::Completed);
        assert_eq!(export.progress, 100);
        assert_eq!(export.file_size, Some(512));
        assert_eq!(export.record_count, Some(10));
        assert_eq!(export.completed_at, Some(3_000));
    }

    #[test]
    fn test_failure_captures_the_message() {
        let mut export = pending_export();
        export.start(2_000).unwrap();
        export.fail(3_000, "data source went away").unwrap();

        assert_eq!(export.status, ExportStatus::Failed);
        assert_eq!(export.error.as_deref(), Some("data source went away"));
        assert!(export.file_path.is_none());
    }

    #[test]
    fn test_pending_export_may_fail_directly() {
        let mut export = pending_export();
        assert!(export.fail(2_000, "unknown data source").is_ok());
    }

    #[test]
    fn test_terminal_states_reject_every_transition() {
        let mut export = pending_export();
        export.start(2_000).unwrap();
        export.complete(3_000, "a.csv", 1, 1).unwrap();

        assert!(export.start(4_000).is_err());
        assert!(export.complete(4_000, "b.csv", 1, 1).is_err());
        assert!(export.fail(4_000, "late failure").is_err());
    }

    #[test]
    fn test_cannot_complete_without_processing() {
        let mut export = pending_export();
        assert!(export.complete(2_000, "a.csv", 1, 1).is_err());
    }

    #[test]
    fn test_cannot_start_twice() {
        let mut export = pending_export();
        export.start(2_000).unwrap();
        assert!(export.start(2_500).is_err());
    }
}
