use std::collections::BTreeMap;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};
use strum::IntoEnumIterator;
use strum_macros::{AsRefStr, Display, EnumIter, EnumString};
use utoipa::ToSchema;

#[derive(
    Debug,
    Copy,
    Clone,
    Eq,
    PartialEq,
    Ord,
    PartialOrd,
    Hash,
    Serialize,
    Deserialize,
    ToSchema,
    Display,
    EnumString,
    AsRefStr,
    EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum AttendanceStatus {
    Present,
    Late,
    HalfDay,
    EarlyCheckout,
    Absent,
}

/// Same-day wall-clock thresholds used to classify a day's attendance.
///
/// Every threshold is a time of day; it is anchored on the record's own date
/// before comparing against the check-in/check-out timestamps.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct ShiftPolicy {
    #[schema(value_type = String, example = "08:30:00")]
    pub office_start: NaiveTime,
    #[schema(value_type = String, example = "09:00:00")]
    pub late_cutoff: NaiveTime,
    #[schema(value_type = String, example = "09:15:00")]
    pub absent_cutoff: NaiveTime,
    #[schema(value_type = String, example = "14:00:00")]
    pub half_day_end: NaiveTime,
    #[schema(value_type = String, example = "17:30:00")]
    pub full_day_end: NaiveTime,
}

fn hm(hour: u32, minute: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(hour, minute, 0).unwrap_or(NaiveTime::MIN)
}

impl Default for ShiftPolicy {
    fn default() -> Self {
        Self {
            office_start: hm(8, 30),
            late_cutoff: hm(9, 0),
            absent_cutoff: hm(9, 15),
            half_day_end: hm(14, 0),
            full_day_end: hm(17, 30),
        }
    }
}

impl ShiftPolicy {
    /// Thresholds must be non-decreasing through the day.
    pub fn is_ordered(&self) -> bool {
        self.office_start <= self.late_cutoff
            && self.late_cutoff <= self.absent_cutoff
            && self.absent_cutoff <= self.half_day_end
            && self.half_day_end <= self.full_day_end
    }

    /// Derives the status for a single day. Thresholds are exclusive upper
    /// bounds: an instant equal to a cutoff falls on the "not after" side.
    pub fn classify(
        &self,
        date: NaiveDate,
        check_in: Option<NaiveDateTime>,
        check_out: Option<NaiveDateTime>,
    ) -> AttendanceStatus {
        let Some(check_in) = check_in else {
            return AttendanceStatus::Absent;
        };

        let late_cutoff = date.and_time(self.late_cutoff);
        let absent_cutoff = date.and_time(self.absent_cutoff);

        if check_in > absent_cutoff {
            return AttendanceStatus::Absent;
        }
        if check_in > late_cutoff {
            return AttendanceStatus::Late;
        }

        match check_out {
            // still open, not a final status
            None => AttendanceStatus::HalfDay,
            Some(out) if out < date.and_time(self.half_day_end) => AttendanceStatus::HalfDay,
            Some(out) if out < date.and_time(self.full_day_end) => {
                AttendanceStatus::EarlyCheckout
            }
            Some(_) => AttendanceStatus::Present,
        }
    }
}

/// Frequency map over the five status labels for one day's records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct AttendanceSummary {
    #[schema(value_type = Object, example = json!({
        "present": 3, "late": 1, "half_day": 0, "early_checkout": 1, "absent": 2
    }))]
    pub counts: BTreeMap<AttendanceStatus, u32>,
    pub total: u32,
}

impl AttendanceSummary {
    pub fn from_statuses<I>(statuses: I) -> Self
    where
        I: IntoIterator<Item = AttendanceStatus>,
    {
        let mut counts: BTreeMap<AttendanceStatus, u32> =
            AttendanceStatus::iter().map(|s| (s, 0)).collect();
        let mut total = 0;

        for status in statuses {
            *counts.entry(status).or_insert(0) += 1;
            total += 1;
        }

        Self { counts, total }
    }

    pub fn count(&self, status: AttendanceStatus) -> u32 {
        self.counts.get(&status).copied().unwrap_or(0)
    }
}
