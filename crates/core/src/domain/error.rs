// Domain Error Types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DomainError {
    #[error("Invalid export state transition: {from} -> {to}")]
    InvalidStateTransition { from: String, to: String },

    #[error("Report not found: {0}")]
    ReportNotFound(String),

    #[error("Export not found: {0}")]
    ExportNotFound(String),

    #[error("Unknown schedule: {0}")]
    UnknownSchedule(String),

    #[error("Validation error: {0}")]
    ValidationError(String),
}

pub type Result<T> = std::result::Result<T, DomainError>;
