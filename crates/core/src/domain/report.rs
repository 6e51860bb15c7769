// Report entity - a saved, reusable export configuration

use serde::{Deserialize, Serialize};

use crate::domain::error::{DomainError, Result};
use crate::domain::export::ExportTarget;
use crate::domain::filter::{DateRangePreset, FilterSnapshot};
use crate::domain::format::{ExportFormat, ExportMode};
use crate::domain::schedule::{self, Schedule};

/// Report ID (UUID v4)
pub type ReportId = String;

/// Identifier of a reportable entity inside a data source
pub type EntityId = String;

/// Report entity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Report {
    pub id: ReportId,
    pub name: String,
    /// Unique machine handle
    pub slug: String,
    pub data_source: String,
    pub entity_ids: Vec<EntityId>,
    pub site_id: Option<String>,

    pub date_range: DateRangePreset,
    pub range_start: Option<i64>,
    pub range_end: Option<i64>,
    /// Field handles to include; empty means every exportable field
    pub fields: Vec<String>,

    pub format: ExportFormat,
    pub mode: ExportMode,

    pub schedule: Schedule,
    pub last_generated_at: Option<i64>,
    pub next_scheduled_at: Option<i64>,

    pub enabled: bool,
    pub sort_order: i32,

    pub created_at: i64, // epoch ms
    pub updated_at: i64,
}

impl Report {
    /// Create a new report
    ///
    /// Fails when `entity_ids` is empty: a report with nothing to export
    /// is a configuration error, not a valid record.
    pub fn new(
        id: impl Into<String>,
        created_at: i64,
        name: impl Into<String>,
        slug: impl Into<String>,
        data_source: impl Into<String>,
        entity_ids: Vec<EntityId>,
        format: ExportFormat,
        mode: ExportMode,
    ) -> Result<Self> {
        if entity_ids.is_empty() {
            return Err(DomainError::ValidationError(
                "a report needs at least one entity".to_string(),
            ));
        }

        Ok(Self {
            id: id.into(),
            name: name.into(),
            slug: slug.into(),
            data_source: data_source.into(),
            entity_ids,
            site_id: None,
            date_range: DateRangePreset::All,
            range_start: None,
            range_end: None,
            fields: Vec::new(),
            format,
            mode,
            schedule: Schedule::Disabled,
            last_generated_at: None,
            next_scheduled_at: None,
            enabled: true,
            sort_order: 0,
            created_at,
            updated_at: created_at,
        })
    }

    /// Scheduling fires only for enabled reports with a live schedule
    pub fn scheduling_enabled(&self) -> bool {
        self.enabled && self.schedule.is_enabled()
    }

    /// Freeze the current filter configuration into an immutable snapshot
    pub fn filter_snapshot(&self) -> FilterSnapshot {
        FilterSnapshot {
            date_range: self.date_range,
            range_start: self.range_start,
            range_end: self.range_end,
            fields: self.fields.clone(),
            site_id: self.site_id.clone(),
        }
    }

    /// The export targets one run of this report produces: one per entity
    /// in `separate` mode, a single merged target in `combined` mode.
    pub fn export_targets(&self) -> Vec<ExportTarget> {
        match self.mode {
            ExportMode::Combined => vec![ExportTarget::Combined {
                entity_ids: self.entity_ids.clone(),
            }],
            ExportMode::Separate => self
                .entity_ids
                .iter()
                .map(|entity_id| ExportTarget::Single {
                    entity_id: entity_id.clone(),
                })
                .collect(),
        }
    }

    /// Keep `next_scheduled_at` consistent with the schedule toggle:
    /// non-null iff scheduling is enabled.
    pub fn sync_next_run(&mut self, now_millis: i64) {
        self.next_scheduled_at = if self.scheduling_enabled() {
            self.next_scheduled_at
                .or_else(|| schedule::next_run_millis(self.schedule, now_millis))
        } else {
            None
        };
    }
}
