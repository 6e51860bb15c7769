// Export format and mode

use serde::{Deserialize, Serialize};

use crate::domain::error::{DomainError, Result};

/// File format of a generated export
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    Csv,
    Json,
    Xlsx,
}

impl ExportFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExportFormat::Csv => "csv",
            ExportFormat::Json => "json",
            ExportFormat::Xlsx => "xlsx",
        }
    }

    /// File extension, without the dot
    pub fn extension(&self) -> &'static str {
        self.as_str()
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "csv" => Ok(ExportFormat::Csv),
            "json" => Ok(ExportFormat::Json),
            "xlsx" => Ok(ExportFormat::Xlsx),
            other => Err(DomainError::ValidationError(format!(
                "unsupported export format: {}",
                other
            ))),
        }
    }
}

impl std::fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Whether a multi-entity report produces one file per entity or a single
/// column-aligned merged file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportMode {
    Separate,
    Combined,
}

impl ExportMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExportMode::Separate => "separate",
            ExportMode::Combined => "combined",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "separate" => Ok(ExportMode::Separate),
            "combined" => Ok(ExportMode::Combined),
            other => Err(DomainError::ValidationError(format!(
                "unsupported export mode: {}",
                other
            ))),
        }
    }
}

impl std::fmt::Display for ExportMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
