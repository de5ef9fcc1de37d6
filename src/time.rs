//! Time vocabulary: unit/epoch specs, fast-path numeric<->datetime conversion,
//! and loose coercion of timestamp/duration-like inputs.

use chrono::{Duration, NaiveDate, NaiveDateTime};

use crate::error::GeoDatasetError;

/// A unit understood by a `"<unit> since <epoch>"` spec.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeUnit {
    Nanoseconds,
    Microseconds,
    Milliseconds,
    Seconds,
    Minutes,
    Hours,
    Days,
}

impl TimeUnit {
    fn from_str(s: &str) -> Option<Self> {
        match s {
            "nanoseconds" | "nanosecond" => Some(Self::Nanoseconds),
            "microseconds" | "microsecond" => Some(Self::Microseconds),
            "milliseconds" | "millisecond" => Some(Self::Milliseconds),
            "seconds" | "second" => Some(Self::Seconds),
            "minutes" | "minute" => Some(Self::Minutes),
            "hours" | "hour" => Some(Self::Hours),
            "days" | "day" => Some(Self::Days),
            _ => None,
        }
    }

    fn to_duration(self, n: i64) -> Duration {
        match self {
            TimeUnit::Nanoseconds => Duration::nanoseconds(n),
            TimeUnit::Microseconds => Duration::microseconds(n),
            TimeUnit::Milliseconds => Duration::milliseconds(n),
            TimeUnit::Seconds => Duration::seconds(n),
            TimeUnit::Minutes => Duration::minutes(n),
            TimeUnit::Hours => Duration::hours(n),
            TimeUnit::Days => Duration::days(n),
        }
    }

    /// How many of this unit fit in one second, used for truncating
    /// toward the epoch in `date2num`.
    fn per_second(self) -> f64 {
        match self {
            TimeUnit::Nanoseconds => 1e9,
            TimeUnit::Microseconds => 1e6,
            TimeUnit::Milliseconds => 1e3,
            TimeUnit::Seconds => 1.0,
            TimeUnit::Minutes => 1.0 / 60.0,
            TimeUnit::Hours => 1.0 / 3_600.0,
            TimeUnit::Days => 1.0 / 86_400.0,
        }
    }
}

/// The calendar a numeric time axis is defined against. Only `Gregorian`
/// has a built-in fast path; anything else requires an external converter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Calendar {
    #[default]
    Gregorian,
    Other,
}

/// Injection point for calendars the crate doesn't implement directly
/// (e.g. 360-day or noleap calendars used in some climate model output).
pub trait CalendarConverter {
    fn num2date(&self, values: &[i64], unit: TimeUnit, epoch: NaiveDateTime) -> Vec<NaiveDateTime>;
    fn date2num(&self, times: &[NaiveDateTime], unit: TimeUnit, epoch: NaiveDateTime) -> Vec<i64>;
}

/// Parse a CF-style `"<unit> since <epoch>"` spec, e.g.
/// `"seconds since 1970-01-01 00:00:00"`.
pub fn parse_time_units(spec: &str) -> Result<(TimeUnit, NaiveDateTime), GeoDatasetError> {
    let (unit_str, epoch_str) = spec
        .split_once(" since ")
        .ok_or_else(|| GeoDatasetError::InvalidUnit { spec: spec.to_owned() })?;

    let unit = TimeUnit::from_str(unit_str.trim())
        .ok_or_else(|| GeoDatasetError::InvalidUnit { spec: spec.to_owned() })?;

    let epoch_str = epoch_str.trim();
    let epoch = parse_epoch(epoch_str).ok_or_else(|| GeoDatasetError::InvalidUnit { spec: spec.to_owned() })?;

    Ok((unit, epoch))
}

fn parse_epoch(s: &str) -> Option<NaiveDateTime> {
    if let Ok(dt) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return Some(dt);
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S") {
        return Some(dt);
    }
    if let Ok(d) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return Some(d.and_hms_opt(0, 0, 0).unwrap());
    }
    None
}

/// Convert integer offsets into datetimes under `spec`/`calendar`.
///
/// The gregorian fast path does direct arithmetic via `chrono::Duration`.
/// Any other calendar fails with `InvalidUnit` unless `converter` is given.
pub fn num2date(
    values: &[i64],
    spec: &str,
    calendar: Calendar,
    converter: Option<&dyn CalendarConverter>,
) -> Result<Vec<NaiveDateTime>, GeoDatasetError> {
    let (unit, epoch) = parse_time_units(spec)?;

    match calendar {
        Calendar::Gregorian => Ok(values.iter().map(|&v| epoch + unit.to_duration(v)).collect()),
        Calendar::Other => match converter {
            Some(c) => Ok(c.num2date(values, unit, epoch)),
            None => Err(GeoDatasetError::InvalidUnit { spec: spec.to_owned() }),
        },
    }
}

/// Inverse of [`num2date`]; truncates toward the epoch.
pub fn date2num(
    times: &[NaiveDateTime],
    spec: &str,
    calendar: Calendar,
    converter: Option<&dyn CalendarConverter>,
) -> Result<Vec<i64>, GeoDatasetError> {
    let (unit, epoch) = parse_time_units(spec)?;

    match calendar {
        Calendar::Gregorian => Ok(times
            .iter()
            .map(|&t| {
                let delta = t - epoch;
                let secs = delta.num_seconds() as f64 + (delta.num_nanoseconds().unwrap_or(0) % 1_000_000_000) as f64 / 1e9;
                (secs * unit.per_second()).trunc() as i64
            })
            .collect()),
        Calendar::Other => match converter {
            Some(c) => Ok(c.date2num(times, unit, epoch)),
            None => Err(GeoDatasetError::InvalidUnit { spec: spec.to_owned() }),
        },
    }
}

/// Something that can be coerced to a `NaiveDateTime`: a native value, an
/// ISO-8601-like string, or the literal `"now"`.
pub enum TimeLike<'a> {
    Naive(NaiveDateTime),
    Str(&'a str),
}

pub fn to_datetime(input: TimeLike) -> Result<NaiveDateTime, GeoDatasetError> {
    match input {
        TimeLike::Naive(dt) => Ok(dt),
        TimeLike::Str(s) => parse_epoch(s).ok_or_else(|| GeoDatasetError::InvalidTimeRange {
            msg: format!("could not parse '{s}' as a timestamp"),
        }),
    }
}

/// Something that can be coerced to a `chrono::Duration`: a native value, or
/// a `"<n> <unit>"` string such as `"3 hours"`.
pub enum DurationLike<'a> {
    Duration(Duration),
    Str(&'a str),
}

pub fn to_timedelta(input: DurationLike) -> Result<Duration, GeoDatasetError> {
    match input {
        DurationLike::Duration(d) => Ok(d),
        DurationLike::Str(s) => {
            let s = s.trim();
            let (n_str, unit_str) = s
                .split_once(' ')
                .ok_or_else(|| GeoDatasetError::InvalidTimeRange { msg: format!("could not parse '{s}' as a duration") })?;
            let n: i64 = n_str
                .parse()
                .map_err(|_| GeoDatasetError::InvalidTimeRange { msg: format!("could not parse '{s}' as a duration") })?;
            let unit = TimeUnit::from_str(unit_str.trim())
                .ok_or_else(|| GeoDatasetError::InvalidTimeRange { msg: format!("unknown unit in '{s}'") })?;
            Ok(unit.to_duration(n))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_unit_spec() {
        let (unit, epoch) = parse_time_units("seconds since 1970-01-01 00:00:00").unwrap();
        assert_eq!(unit, TimeUnit::Seconds);
        assert_eq!(epoch, NaiveDate::from_ymd_opt(1970, 1, 1).unwrap().and_hms_opt(0, 0, 0).unwrap());
    }

    #[test]
    fn gregorian_roundtrip() {
        let spec = "seconds since 2000-01-01 00:00:00";
        let values = vec![0, 3600, 86_400];
        let dates = num2date(&values, spec, Calendar::Gregorian, None).unwrap();
        let back = date2num(&dates, spec, Calendar::Gregorian, None).unwrap();
        assert_eq!(values, back);
    }

    #[test]
    fn other_calendar_without_converter_fails() {
        let spec = "days since 1970-01-01 00:00:00";
        let err = num2date(&[0], spec, Calendar::Other, None).unwrap_err();
        assert!(matches!(err, GeoDatasetError::InvalidUnit { .. }));
    }

    #[test]
    fn duration_from_string() {
        let d = to_timedelta(DurationLike::Str("3 hours")).unwrap();
        assert_eq!(d, Duration::hours(3));
    }
}
