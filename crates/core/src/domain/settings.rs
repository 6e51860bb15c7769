// Engine-wide settings, injected at composition time

use crate::domain::schedule::Schedule;

/// Settings shared by the scheduler loop, the pipeline and the cleaner
#[derive(Debug, Clone)]
pub struct ExportSettings {
    /// Global kill switch for scheduled exports
    pub scheduled_exports_enabled: bool,
    /// Cadence of the scheduler loop itself; individual reports may run on
    /// their own schedule
    pub default_schedule: Schedule,

    pub auto_cleanup_enabled: bool,
    /// Zero or negative keeps exports forever
    pub retention_days: i64,

    pub csv_delimiter: u8,
    pub csv_quote: u8,
    pub csv_bom: bool,
}

impl Default for ExportSettings {
    fn default() -> Self {
        Self {
            scheduled_exports_enabled: true,
            default_schedule: Schedule::Daily,
            auto_cleanup_enabled: true,
            retention_days: 30,
            csv_delimiter: b',',
            csv_quote: b'"',
            csv_bom: true,
        }
    }
}
