// Domain Layer - Pure business logic and entities

pub mod error;
pub mod export;
pub mod filter;
pub mod format;
pub mod report;
pub mod schedule;
pub mod settings;

// Re-exports
pub use error::DomainError;
pub use export::{Export, ExportId, ExportStatus, ExportTarget, Trigger};
pub use filter::{DateRangePreset, FilterSnapshot};
pub use format::{ExportFormat, ExportMode};
pub use report::{EntityId, Report, ReportId};
pub use schedule::Schedule;
pub use settings::ExportSettings;
