use chrono::NaiveDateTime;
use derive_more::Display;
use serde::Serialize;
use utoipa::ToSchema;

use crate::model::time_log::TimeLog;

const SECONDS_PER_HOUR: f64 = 3600.0;

#[derive(Debug, Display, PartialEq, Eq)]
pub enum TrackingError {
    #[display(fmt = "A tracking session is already open")]
    AlreadyTracking,
    #[display(fmt = "No tracking session is open")]
    NotTracking,
}

impl std::error::Error for TrackingError {}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct ClosedSession {
    #[schema(value_type = String, example = "2025-03-12T09:00:00")]
    pub start_time: NaiveDateTime,
    #[schema(value_type = String, example = "2025-03-12T10:30:00")]
    pub end_time: NaiveDateTime,
    pub elapsed_seconds: u64,
    #[schema(example = 1.5)]
    pub total_hours: f64,
}

/// Tracks at most one open session. Elapsed time advances either by `tick`
/// (one second per call) or is seeded from wall clock on `resume`.
#[derive(Debug, Default, Clone)]
pub struct TimeAccumulator {
    started_at: Option<NaiveDateTime>,
    elapsed_seconds: u64,
}

impl TimeAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuilds an open session from a persisted start time.
    pub fn resume(started_at: NaiveDateTime, now: NaiveDateTime) -> Self {
        Self {
            started_at: Some(started_at),
            elapsed_seconds: elapsed_between(started_at, now),
        }
    }

    pub fn is_tracking(&self) -> bool {
        self.started_at.is_some()
    }

    pub fn started_at(&self) -> Option<NaiveDateTime> {
        self.started_at
    }

    pub fn elapsed_seconds(&self) -> u64 {
        self.elapsed_seconds
    }

    pub fn start(&mut self, now: NaiveDateTime) -> Result<(), TrackingError> {
        if self.started_at.is_some() {
            return Err(TrackingError::AlreadyTracking);
        }
        self.started_at = Some(now);
        self.elapsed_seconds = 0;
        Ok(())
    }

    pub fn tick(&mut self) {
        if self.started_at.is_some() {
            self.elapsed_seconds += 1;
        }
    }

    pub fn stop(&mut self, now: NaiveDateTime) -> Result<ClosedSession, TrackingError> {
        let start_time = self.started_at.take().ok_or(TrackingError::NotTracking)?;
        let elapsed_seconds = std::mem::take(&mut self.elapsed_seconds);

        Ok(ClosedSession {
            start_time,
            end_time: now,
            elapsed_seconds,
            total_hours: hours_from_seconds(elapsed_seconds),
        })
    }
}

pub fn elapsed_between(start: NaiveDateTime, end: NaiveDateTime) -> u64 {
    (end - start).num_seconds().max(0) as u64
}

pub fn hours_from_seconds(seconds: u64) -> f64 {
    seconds as f64 / SECONDS_PER_HOUR
}

/// Sum of closed sessions; open sessions contribute nothing.
pub fn total_hours<'a, I>(logs: I) -> f64
where
    I: IntoIterator<Item = &'a TimeLog>,
{
    logs.into_iter()
        .filter(|log| log.end_time.is_some())
        .filter_map(|log| log.total_hours)
        .sum()
}

/// `HH:MM:SS`, hours not capped at 24.
pub fn format_elapsed(seconds: u64) -> String {
    let hours = seconds / 3600;
    let minutes = (seconds % 3600) / 60;
    let secs = seconds % 60;
    format!("{:02}:{:02}:{:02}", hours, minutes, secs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn t(h: u32, m: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 3, 12)
            .unwrap()
            .and_hms_opt(h, m, s)
            .unwrap()
    }

    fn log(id: u64, total_hours: Option<f64>, closed: bool) -> TimeLog {
        TimeLog {
            id,
            task_id: 7,
            intern_id: 3,
            start_time: t(9, 0, 0),
            end_time: closed.then(|| t(10, 0, 0)),
            total_hours,
            created_at: None,
        }
    }

    #[test]
    fn an_hour_of_ticks_is_one_hour() {
        let mut acc = TimeAccumulator::new();
        acc.start(t(9, 0, 0)).unwrap();
        for _ in 0..3600 {
            acc.tick();
        }
        let closed = acc.stop(t(10, 0, 0)).unwrap();

        assert_eq!(closed.elapsed_seconds, 3600);
        assert_eq!(closed.total_hours, 1.0);
        assert_eq!(closed.start_time, t(9, 0, 0));
        assert_eq!(closed.end_time, t(10, 0, 0));
        assert!(!acc.is_tracking());
        assert_eq!(acc.elapsed_seconds(), 0);
    }

    #[test]
    fn cannot_open_a_second_session() {
        let mut acc = TimeAccumulator::new();
        acc.start(t(9, 0, 0)).unwrap();
        assert_eq!(acc.start(t(9, 5, 0)), Err(TrackingError::AlreadyTracking));
        assert_eq!(acc.started_at(), Some(t(9, 0, 0)));
    }

    #[test]
    fn stop_without_start_fails() {
        let mut acc = TimeAccumulator::new();
        assert_eq!(acc.stop(t(9, 0, 0)), Err(TrackingError::NotTracking));
    }

    #[test]
    fn ticks_are_ignored_while_idle() {
        let mut acc = TimeAccumulator::new();
        acc.tick();
        acc.tick();
        assert_eq!(acc.elapsed_seconds(), 0);
    }

    #[test]
    fn resume_seeds_elapsed_from_wall_clock() {
        let mut acc = TimeAccumulator::resume(t(9, 0, 0), t(10, 30, 0));
        assert!(acc.is_tracking());
        assert_eq!(acc.elapsed_seconds(), 5400);

        let closed = acc.stop(t(10, 30, 0)).unwrap();
        assert_eq!(closed.total_hours, 1.5);
    }

    #[test]
    fn resume_with_clock_skew_never_goes_negative() {
        let acc = TimeAccumulator::resume(t(10, 0, 0), t(9, 0, 0));
        assert_eq!(acc.elapsed_seconds(), 0);
    }

    #[test]
    fn totals_only_closed_sessions() {
        let logs = vec![
            log(1, Some(1.5), true),
            log(2, Some(0.5), true),
            log(3, None, false),
        ];
        assert_eq!(total_hours(&logs), 2.0);
    }

    #[test]
    fn open_session_with_stale_hours_is_excluded() {
        let logs = vec![log(1, Some(4.0), false)];
        assert_eq!(total_hours(&logs), 0.0);
    }

    #[test]
    fn formats_elapsed_time() {
        assert_eq!(format_elapsed(0), "00:00:00");
        assert_eq!(format_elapsed(3661), "01:01:01");
        assert_eq!(format_elapsed(100 * 3600 + 59), "100:00:59");
    }
}
