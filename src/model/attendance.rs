use chrono::{NaiveDate, NaiveDateTime};
use serde::Serialize;
use utoipa::ToSchema;

use crate::rules::attendance_status::{AttendanceStatus, ShiftPolicy};

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct AttendanceRow {
    pub id: u64,
    pub intern_id: u64,
    pub attendance_date: NaiveDate,
    pub check_in: Option<NaiveDateTime>,
    pub check_out: Option<NaiveDateTime>,
    pub total_hours: Option<f64>,
}

/// Attendance for one intern on one day, with the status derived from the
/// stored timestamps.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct AttendanceRecord {
    #[schema(example = 42)]
    pub id: u64,
    #[schema(example = 3)]
    pub intern_id: u64,
    #[schema(example = "2025-03-12")]
    pub attendance_date: NaiveDate,
    #[schema(example = "2025-03-12T08:52:10")]
    pub check_in: Option<NaiveDateTime>,
    #[schema(example = "2025-03-12T17:41:00")]
    pub check_out: Option<NaiveDateTime>,
    #[schema(example = 8.81)]
    pub total_hours: Option<f64>,
    pub status: AttendanceStatus,
}

impl AttendanceRow {
    pub fn classify(self, policy: &ShiftPolicy) -> AttendanceRecord {
        let status = policy.classify(self.attendance_date, self.check_in, self.check_out);
        AttendanceRecord {
            id: self.id,
            intern_id: self.intern_id,
            attendance_date: self.attendance_date,
            check_in: self.check_in,
            check_out: self.check_out,
            total_hours: self.total_hours,
            status,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_is_derived_from_timestamps() {
        let date = NaiveDate::from_ymd_opt(2025, 3, 12).unwrap();
        let row = AttendanceRow {
            id: 1,
            intern_id: 3,
            attendance_date: date,
            check_in: date.and_hms_opt(8, 0, 0),
            check_out: date.and_hms_opt(17, 45, 0),
            total_hours: Some(9.75),
        };

        let record = row.classify(&ShiftPolicy::default());
        assert_eq!(record.status, AttendanceStatus::Present);
        assert_eq!(record.total_hours, Some(9.75));

        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["status"], "present");
        assert_eq!(json["attendance_date"], "2025-03-12");
    }
}
