//! Date ranges for date search parameters.
//!
//! Every FHIR date, dateTime, instant or Period is indexed as an inclusive
//! `[start, end]` range. A partial value covers its whole interval: `1980`
//! is `1980-01-01T00:00:00Z ..= 1980-12-31T23:59:59.999999Z`.

use std::fmt;

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use super::stored_resource::format_instant;

/// Precision of a parsed date value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatePrecision {
    /// `YYYY`
    Year,
    /// `YYYY-MM`
    Month,
    /// `YYYY-MM-DD`
    Day,
    /// `YYYY-MM-DDThh:mm`
    Minute,
    /// `YYYY-MM-DDThh:mm:ss`
    Second,
    /// Fractional seconds.
    Fraction,
}

/// An inclusive instant range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    /// First instant covered.
    pub start: DateTime<Utc>,
    /// Last instant covered.
    pub end: DateTime<Utc>,
    /// Precision of the value the range came from (the coarser one for periods).
    pub precision: DatePrecision,
}

/// A value that is not a FHIR date.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DateParseError(pub String);

impl fmt::Display for DateParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "not a valid date: '{}'", self.0)
    }
}

impl std::error::Error for DateParseError {}

impl DateRange {
    /// Parses a FHIR date, dateTime or instant.
    pub fn parse(value: &str) -> Result<Self, DateParseError> {
        let value = value.trim();
        let err = || DateParseError(value.to_string());

        let (date_part, time_part) = match value.split_once('T') {
            Some((d, t)) => (d, Some(t)),
            None => (value, None),
        };

        let mut fields = date_part.split('-');
        let year: i32 = parse_fixed(fields.next(), 4).ok_or_else(err)?;
        let month: Option<u32> = match fields.next() {
            Some(m) => Some(parse_fixed(Some(m), 2).ok_or_else(err)?),
            None => None,
        };
        let day: Option<u32> = match fields.next() {
            Some(d) => Some(parse_fixed(Some(d), 2).ok_or_else(err)?),
            None => None,
        };
        if fields.next().is_some() {
            return Err(err());
        }

        match (month, day, time_part) {
            (None, None, None) => {
                let start = NaiveDate::from_ymd_opt(year, 1, 1).ok_or_else(err)?;
                let next = NaiveDate::from_ymd_opt(year + 1, 1, 1).ok_or_else(err)?;
                Ok(Self::from_naive_dates(start, next, DatePrecision::Year))
            }
            (Some(month), None, None) => {
                let start = NaiveDate::from_ymd_opt(year, month, 1).ok_or_else(err)?;
                let next = if month == 12 {
                    NaiveDate::from_ymd_opt(year + 1, 1, 1)
                } else {
                    NaiveDate::from_ymd_opt(year, month + 1, 1)
                }
                .ok_or_else(err)?;
                Ok(Self::from_naive_dates(start, next, DatePrecision::Month))
            }
            (Some(month), Some(day), None) => {
                let start = NaiveDate::from_ymd_opt(year, month, day).ok_or_else(err)?;
                let next = start.succ_opt().ok_or_else(err)?;
                Ok(Self::from_naive_dates(start, next, DatePrecision::Day))
            }
            (Some(month), Some(day), Some(time)) => {
                let date = NaiveDate::from_ymd_opt(year, month, day).ok_or_else(err)?;
                parse_time(date, time).ok_or_else(err)
            }
            _ => Err(err()),
        }
    }

    /// Builds the range of a FHIR Period; open ends extend to the representable limits.
    pub fn from_period(start: Option<&str>, end: Option<&str>) -> Result<Self, DateParseError> {
        let start = start.map(Self::parse).transpose()?;
        let end = end.map(Self::parse).transpose()?;
        let precision = match (&start, &end) {
            (Some(s), Some(e)) => s.precision.min(e.precision),
            (Some(s), None) => s.precision,
            (None, Some(e)) => e.precision,
            (None, None) => return Err(DateParseError("empty period".to_string())),
        };
        Ok(Self {
            start: start.map(|s| s.start).unwrap_or(DateTime::<Utc>::MIN_UTC),
            end: end.map(|e| e.end).unwrap_or(DateTime::<Utc>::MAX_UTC),
            precision,
        })
    }

    /// Returns a range covering exactly one instant.
    pub fn instant(at: DateTime<Utc>) -> Self {
        Self {
            start: at,
            end: at,
            precision: DatePrecision::Fraction,
        }
    }

    /// Widens the range by `amount` on both sides.
    pub fn widen(&self, amount: Duration) -> Self {
        Self {
            start: self
                .start
                .checked_sub_signed(amount)
                .unwrap_or(DateTime::<Utc>::MIN_UTC),
            end: self
                .end
                .checked_add_signed(amount)
                .unwrap_or(DateTime::<Utc>::MAX_UTC),
            precision: self.precision,
        }
    }

    /// Start formatted for storage and comparison.
    pub fn start_key(&self) -> String {
        sortable(self.start)
    }

    /// End formatted for storage and comparison.
    pub fn end_key(&self) -> String {
        sortable(self.end)
    }

    fn from_naive_dates(start: NaiveDate, next: NaiveDate, precision: DatePrecision) -> Self {
        let start = Utc.from_utc_datetime(&start.and_time(NaiveTime::MIN));
        let next = Utc.from_utc_datetime(&next.and_time(NaiveTime::MIN));
        Self {
            start,
            end: next - Duration::microseconds(1),
            precision,
        }
    }
}

/// Formats an instant so that string order equals time order.
///
/// Years outside `0000..=9999` are clamped so the fixed-width format holds.
fn sortable(instant: DateTime<Utc>) -> String {
    if instant.year() < 0 {
        return "0000-01-01T00:00:00.000000Z".to_string();
    }
    if instant.year() > 9999 {
        return "9999-12-31T23:59:59.999999Z".to_string();
    }
    format_instant(instant)
}

fn parse_fixed<T: std::str::FromStr>(field: Option<&str>, width: usize) -> Option<T> {
    let field = field?;
    if field.len() != width || !field.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    field.parse().ok()
}

fn parse_time(date: NaiveDate, time: &str) -> Option<DateRange> {
    // Split off the zone designator.
    let (clock, offset_secs) = if let Some(clock) = time.strip_suffix('Z') {
        (clock, 0)
    } else if let Some(pos) = time.rfind(['+', '-']) {
        let (clock, zone) = time.split_at(pos);
        let sign = if zone.starts_with('-') { -1 } else { 1 };
        let (h, m) = zone[1..].split_once(':')?;
        let h: i32 = parse_fixed(Some(h), 2)?;
        let m: i32 = parse_fixed(Some(m), 2)?;
        (clock, sign * (h * 3600 + m * 60))
    } else {
        (time, 0)
    };

    let mut parts = clock.split(':');
    let hour: u32 = parse_fixed(parts.next(), 2)?;
    let minute: u32 = parse_fixed(parts.next(), 2)?;
    let (second, fraction, precision) = match parts.next() {
        None => (0, None, DatePrecision::Minute),
        Some(sec) => match sec.split_once('.') {
            Some((s, frac)) if !frac.is_empty() && frac.bytes().all(|b| b.is_ascii_digit()) => {
                (parse_fixed::<u32>(Some(s), 2)?, Some(frac), DatePrecision::Fraction)
            }
            Some(_) => return None,
            None => (parse_fixed::<u32>(Some(sec), 2)?, None, DatePrecision::Second),
        },
    };
    if parts.next().is_some() {
        return None;
    }

    let micros: u32 = match fraction {
        Some(frac) => {
            let digits: String = frac.chars().chain(std::iter::repeat('0')).take(6).collect();
            digits.parse().ok()?
        }
        None => 0,
    };

    let naive = NaiveDateTime::new(
        date,
        NaiveTime::from_hms_micro_opt(hour, minute, second, micros)?,
    );
    let start = Utc.from_utc_datetime(&naive) - Duration::seconds(i64::from(offset_secs));
    let end = match precision {
        DatePrecision::Minute => start + Duration::minutes(1) - Duration::microseconds(1),
        DatePrecision::Second => start + Duration::seconds(1) - Duration::microseconds(1),
        _ => start,
    };

    Some(DateRange {
        start,
        end,
        precision,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_year_covers_whole_year() {
        let range = DateRange::parse("1980").unwrap();
        assert_eq!(range.precision, DatePrecision::Year);
        assert_eq!(range.start_key(), "1980-01-01T00:00:00.000000Z");
        assert_eq!(range.end_key(), "1980-12-31T23:59:59.999999Z");
    }

    #[test]
    fn test_month_handles_december_and_leap_years() {
        let dec = DateRange::parse("2023-12").unwrap();
        assert_eq!(dec.end_key(), "2023-12-31T23:59:59.999999Z");

        let feb = DateRange::parse("2024-02").unwrap();
        assert_eq!(feb.end_key(), "2024-02-29T23:59:59.999999Z");
    }

    #[test]
    fn test_day() {
        let range = DateRange::parse("2024-03-15").unwrap();
        assert_eq!(range.start_key(), "2024-03-15T00:00:00.000000Z");
        assert_eq!(range.end_key(), "2024-03-15T23:59:59.999999Z");
    }

    #[test]
    fn test_datetime_with_offset_is_normalized_to_utc() {
        let range = DateRange::parse("2024-03-15T10:30:00+02:00").unwrap();
        assert_eq!(range.precision, DatePrecision::Second);
        assert_eq!(range.start_key(), "2024-03-15T08:30:00.000000Z");
        assert_eq!(range.end_key(), "2024-03-15T08:30:00.999999Z");
    }

    #[test]
    fn test_instant_with_fraction() {
        let range = DateRange::parse("2024-03-15T10:30:00.25Z").unwrap();
        assert_eq!(range.start, range.end);
        assert_eq!(range.start_key(), "2024-03-15T10:30:00.250000Z");
    }

    #[test]
    fn test_invalid_dates() {
        for bad in ["", "80", "1980-13", "1980-02-30", "1980-1-1", "2024-03-15T25:00", "abc"] {
            assert!(DateRange::parse(bad).is_err(), "{bad} should not parse");
        }
    }

    #[test]
    fn test_open_period() {
        let range = DateRange::from_period(Some("2020-01-01"), None).unwrap();
        assert_eq!(range.start_key(), "2020-01-01T00:00:00.000000Z");
        assert_eq!(range.end_key(), "9999-12-31T23:59:59.999999Z");
        assert!(DateRange::from_period(None, None).is_err());
    }
}
