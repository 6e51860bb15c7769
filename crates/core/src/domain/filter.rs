// Filter snapshot embedded in an export record
//
// The snapshot is frozen at export creation time so a later edit of the
// owning report never changes what an already-generated file claims to
// contain.

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};

/// Named date-range shorthand, relative to "now" at resolution time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum DateRangePreset {
    #[default]
    #[serde(rename = "all")]
    All,
    #[serde(rename = "today")]
    Today,
    #[serde(rename = "yesterday")]
    Yesterday,
    #[serde(rename = "last7Days")]
    Last7Days,
    #[serde(rename = "last30Days")]
    Last30Days,
    #[serde(rename = "thisMonth")]
    ThisMonth,
    #[serde(rename = "thisYear")]
    ThisYear,
}

impl DateRangePreset {
    pub fn as_str(&self) -> &'static str {
        match self {
            DateRangePreset::All => "all",
            DateRangePreset::Today => "today",
            DateRangePreset::Yesterday => "yesterday",
            DateRangePreset::Last7Days => "last7Days",
            DateRangePreset::Last30Days => "last30Days",
            DateRangePreset::ThisMonth => "thisMonth",
            DateRangePreset::ThisYear => "thisYear",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "today" => DateRangePreset::Today,
            "yesterday" => DateRangePreset::Yesterday,
            "last7Days" => DateRangePreset::Last7Days,
            "last30Days" => DateRangePreset::Last30Days,
            "thisMonth" => DateRangePreset::ThisMonth,
            "thisYear" => DateRangePreset::ThisYear,
            _ => DateRangePreset::All,
        }
    }
}

/// The filters an export was actually generated with
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct FilterSnapshot {
    pub date_range: DateRangePreset,
    /// Explicit lower bound (epoch ms); takes precedence over the preset
    pub range_start: Option<i64>,
    /// Explicit upper bound (epoch ms); takes precedence over the preset
    pub range_end: Option<i64>,
    /// Field handles to include; empty means every exportable field
    pub fields: Vec<String>,
    pub site_id: Option<String>,
}

impl FilterSnapshot {
    /// Resolve the snapshot into concrete `[start, end)` bounds in epoch ms.
    ///
    /// Explicit bounds win over the preset whenever either one is set.
    pub fn resolve_bounds(&self, now_millis: i64) -> (Option<i64>, Option<i64>) {
        if self.range_start.is_some() || self.range_end.is_some() {
            return (self.range_start, self.range_end);
        }

        let Some(now) = DateTime::from_timestamp_millis(now_millis) else {
            return (None, None);
        };
        let today = now.date_naive();

        match self.date_range {
            DateRangePreset::All => (None, None),
            DateRangePreset::Today => (Some(midnight_millis(today)), None),
            DateRangePreset::Yesterday => (
                Some(midnight_millis(today - Duration::days(1))),
                Some(midnight_millis(today)),
            ),
            DateRangePreset::Last7Days => {
                (Some(now_millis - Duration::days(7).num_milliseconds()), None)
            }
            DateRangePreset::Last30Days => {
                (Some(now_millis - Duration::days(30).num_milliseconds()), None)
            }
            DateRangePreset::ThisMonth => {
                let first = NaiveDate::from_ymd_opt(today.year(), today.month(), 1)
                    .unwrap_or(today);
                (Some(midnight_millis(first)), None)
            }
            DateRangePreset::ThisYear => {
                let first = NaiveDate::from_ymd_opt(today.year(), 1, 1).unwrap_or(today);
                (Some(midnight_millis(first)), None)
            }
        }
    }
}

fn midnight_millis(date: NaiveDate) -> i64 {
    date.and_time(NaiveTime::MIN).and_utc().timestamp_millis()
}
