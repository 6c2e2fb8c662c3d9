use chrono::{Datelike, NaiveDate};

use crate::error::AppError;

/// Inclusive calendar range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    pub first: NaiveDate,
    pub last: NaiveDate,
}

impl DateRange {
    pub fn new(first: NaiveDate, last: NaiveDate) -> Result<Self, AppError> {
        if first > last {
            return Err(AppError::validation("'from' cannot be after 'to'"));
        }
        Ok(Self { first, last })
    }

    /// The whole month containing `day`.
    pub fn month_of(day: NaiveDate) -> Self {
        let first = day.with_day(1).unwrap_or(day);
        let next_month = if first.month() == 12 {
            NaiveDate::from_ymd_opt(first.year() + 1, 1, 1)
        } else {
            NaiveDate::from_ymd_opt(first.year(), first.month() + 1, 1)
        };
        let last = next_month.and_then(|d| d.pred_opt()).unwrap_or(first);
        Self { first, last }
    }

    /// Parses `YYYY-MM`; `None` means the month containing `today`.
    pub fn parse_month(month: Option<&str>, today: NaiveDate) -> Result<Self, AppError> {
        match month {
            None => Ok(Self::month_of(today)),
            Some(raw) => NaiveDate::parse_from_str(&format!("{}-01", raw.trim()), "%Y-%m-%d")
                .map(Self::month_of)
                .map_err(|_| AppError::validation("month must be formatted as YYYY-MM")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn month_bounds() {
        assert_eq!(
            DateRange::month_of(d(2024, 2, 17)),
            DateRange { first: d(2024, 2, 1), last: d(2024, 2, 29) }
        );
        assert_eq!(DateRange::month_of(d(2025, 12, 31)).last, d(2025, 12, 31));
        assert_eq!(DateRange::month_of(d(2025, 4, 1)).last, d(2025, 4, 30));
    }

    #[test]
    fn parse_month_defaults_to_today() {
        let range = DateRange::parse_month(None, d(2025, 3, 12)).unwrap();
        assert_eq!(range.first, d(2025, 3, 1));
        assert_eq!(range.last, d(2025, 3, 31));
    }

    #[test]
    fn parse_month_rejects_garbage() {
        assert!(DateRange::parse_month(Some("2025-13"), d(2025, 3, 12)).is_err());
        assert!(DateRange::parse_month(Some("March"), d(2025, 3, 12)).is_err());
        assert_eq!(
            DateRange::parse_month(Some("2023-11"), d(2025, 3, 12)).unwrap().last,
            d(2023, 11, 30)
        );
    }

    #[test]
    fn explicit_range_must_be_ordered() {
        assert!(DateRange::new(d(2025, 3, 2), d(2025, 3, 1)).is_err());
        let range = DateRange::new(d(2025, 3, 1), d(2025, 3, 1)).unwrap();
        assert_eq!(range.first, range.last);
    }
}
