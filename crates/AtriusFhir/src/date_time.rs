//! Precision-aware temporal primitives.
//!
//! FHIR and FHIRPath allow partial dates, date-times and times (`2019`,
//! `2019-06`, `2019-06-01T10`, `T14:30`). The value types in this module
//! remember which components were written so comparison can report an
//! indeterminate result instead of inventing the missing parts.

use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

use chrono::{
    DateTime as ChronoDateTime, Datelike, FixedOffset, Months, NaiveDate, NaiveDateTime,
    NaiveTime, TimeDelta, Timelike, Utc,
};
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};

/// Precision levels for date values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DatePrecision {
    /// `YYYY`
    Year,
    /// `YYYY-MM`
    YearMonth,
    /// `YYYY-MM-DD`
    Full,
}

/// Precision levels for time values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TimePrecision {
    /// `HH`
    Hour,
    /// `HH:MM`
    HourMinute,
    /// `HH:MM:SS`
    HourMinuteSecond,
    /// `HH:MM:SS.sss`
    Millisecond,
}

/// Precision levels for date-time values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DateTimePrecision {
    Year,
    YearMonth,
    Date,
    DateHour,
    DateHourMinute,
    DateHourMinuteSecond,
    Full,
}

/// The finest calendar unit present in any temporal value.
///
/// Dates and date-times share the leading units, so a `@2019` date and a
/// `@2019-06-01T10:00` date-time can be checked for comparable precision
/// without caring which kind each one is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TemporalPrecision {
    Year,
    Month,
    Day,
    Hour,
    Minute,
    Second,
    Millisecond,
}

impl TemporalPrecision {
    /// Seconds and milliseconds are a single precision for comparison.
    pub fn is_comparable_with(self, other: TemporalPrecision) -> bool {
        self.normalized() == other.normalized()
    }

    fn normalized(self) -> Self {
        match self {
            TemporalPrecision::Millisecond => TemporalPrecision::Second,
            p => p,
        }
    }
}

/// Calendar duration units usable in temporal arithmetic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CalendarUnit {
    Year,
    Month,
    Week,
    Day,
    Hour,
    Minute,
    Second,
    Millisecond,
}

impl CalendarUnit {
    /// Parses a calendar keyword (`year`, `months`, ...) or the matching UCUM code.
    pub fn parse(unit: &str) -> Option<Self> {
        let unit = match unit {
            "year" | "years" | "a" => CalendarUnit::Year,
            "month" | "months" | "mo" => CalendarUnit::Month,
            "week" | "weeks" | "wk" => CalendarUnit::Week,
            "day" | "days" | "d" => CalendarUnit::Day,
            "hour" | "hours" | "h" => CalendarUnit::Hour,
            "minute" | "minutes" | "min" => CalendarUnit::Minute,
            "second" | "seconds" | "s" => CalendarUnit::Second,
            "millisecond" | "milliseconds" | "ms" => CalendarUnit::Millisecond,
            _ => return None,
        };
        Some(unit)
    }

    fn months(self, amount: i64) -> Option<i64> {
        match self {
            CalendarUnit::Year => amount.checked_mul(12),
            CalendarUnit::Month => Some(amount),
            _ => None,
        }
    }

    fn delta(self, amount: i64) -> Option<TimeDelta> {
        match self {
            CalendarUnit::Week => TimeDelta::try_weeks(amount),
            CalendarUnit::Day => TimeDelta::try_days(amount),
            CalendarUnit::Hour => TimeDelta::try_hours(amount),
            CalendarUnit::Minute => TimeDelta::try_minutes(amount),
            CalendarUnit::Second => TimeDelta::try_seconds(amount),
            CalendarUnit::Millisecond => TimeDelta::try_milliseconds(amount),
            CalendarUnit::Year | CalendarUnit::Month => None,
        }
    }
}

fn shift_months(date: NaiveDate, months: i64) -> Option<NaiveDate> {
    let magnitude = Months::new(u32::try_from(months.unsigned_abs()).ok()?);
    if months >= 0 {
        date.checked_add_months(magnitude)
    } else {
        date.checked_sub_months(magnitude)
    }
}

fn digits(s: &str, width: usize) -> Option<u32> {
    if s.len() == width && s.bytes().all(|b| b.is_ascii_digit()) {
        s.parse().ok()
    } else {
        None
    }
}

fn format_offset(minutes: i32) -> String {
    if minutes == 0 {
        return "Z".to_string();
    }
    let sign = if minutes < 0 { '-' } else { '+' };
    let minutes = minutes.abs();
    format!("{}{:02}:{:02}", sign, minutes / 60, minutes % 60)
}

/// A date with year, year-month or full precision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrecisionDate {
    year: i32,
    month: Option<u32>,
    day: Option<u32>,
    precision: DatePrecision,
    original_string: Arc<str>,
}

impl PrecisionDate {
    pub fn from_year(year: i32) -> Self {
        Self::with_precision(year, 1, 1, DatePrecision::Year)
    }

    pub fn from_year_month(year: i32, month: u32) -> Self {
        Self::with_precision(year, month, 1, DatePrecision::YearMonth)
    }

    pub fn from_ymd(year: i32, month: u32, day: u32) -> Self {
        Self::with_precision(year, month, day, DatePrecision::Full)
    }

    /// Builds a date from calendar components, keeping only those the precision names.
    fn with_precision(year: i32, month: u32, day: u32, precision: DatePrecision) -> Self {
        let (month, day, text) = match precision {
            DatePrecision::Year => (None, None, format!("{:04}", year)),
            DatePrecision::YearMonth => (Some(month), None, format!("{:04}-{:02}", year, month)),
            DatePrecision::Full => (
                Some(month),
                Some(day),
                format!("{:04}-{:02}-{:02}", year, month, day),
            ),
        };
        Self {
            year,
            month,
            day,
            precision,
            original_string: Arc::from(text),
        }
    }

    pub fn from_naive_date(date: NaiveDate) -> Self {
        Self::from_ymd(date.year(), date.month(), date.day())
    }

    /// Parses `YYYY`, `YYYY-MM` or `YYYY-MM-DD`, with an optional leading `@`.
    pub fn parse(s: &str) -> Option<Self> {
        let s = s.strip_prefix('@').unwrap_or(s);
        let mut parts = s.split('-');
        let year = digits(parts.next()?, 4)? as i32;
        let month = match parts.next() {
            Some(m) => Some(digits(m, 2)?),
            None => None,
        };
        let day = match parts.next() {
            Some(d) => Some(digits(d, 2)?),
            None => None,
        };
        if parts.next().is_some() {
            return None;
        }
        let precision = match (month, day) {
            (None, _) => DatePrecision::Year,
            (Some(m), None) => {
                if !(1..=12).contains(&m) {
                    return None;
                }
                DatePrecision::YearMonth
            }
            (Some(m), Some(d)) => {
                NaiveDate::from_ymd_opt(year, m, d)?;
                DatePrecision::Full
            }
        };
        Some(Self {
            year,
            month,
            day,
            precision,
            original_string: Arc::from(s),
        })
    }

    pub fn precision(&self) -> DatePrecision {
        self.precision
    }

    pub fn temporal_precision(&self) -> TemporalPrecision {
        match self.precision {
            DatePrecision::Year => TemporalPrecision::Year,
            DatePrecision::YearMonth => TemporalPrecision::Month,
            DatePrecision::Full => TemporalPrecision::Day,
        }
    }

    pub fn original_string(&self) -> &str {
        &self.original_string
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn month(&self) -> Option<u32> {
        self.month
    }

    pub fn day(&self) -> Option<u32> {
        self.day
    }

    /// Fills missing components with the first month/day.
    pub fn to_naive_date(&self) -> Option<NaiveDate> {
        NaiveDate::from_ymd_opt(self.year, self.month.unwrap_or(1), self.day.unwrap_or(1))
    }

    /// Compares two dates component by component.
    ///
    /// Returns `None` when the values agree on every shared component but one
    /// of them stops earlier, since the answer depends on the missing part.
    pub fn compare(&self, other: &Self) -> Option<Ordering> {
        match self.year.cmp(&other.year) {
            Ordering::Equal => {}
            decided => return Some(decided),
        }
        match (self.month, other.month) {
            (None, None) => return Some(Ordering::Equal),
            (Some(a), Some(b)) if a != b => return Some(a.cmp(&b)),
            (Some(_), Some(_)) => {}
            _ => return None,
        }
        match (self.day, other.day) {
            (None, None) => Some(Ordering::Equal),
            (Some(a), Some(b)) => Some(a.cmp(&b)),
            _ => None,
        }
    }

    /// Adds a calendar duration, keeping this value's precision.
    ///
    /// Units finer than a day cannot be applied to a date.
    pub fn add_duration(&self, amount: i64, unit: CalendarUnit) -> Option<Self> {
        let base = self.to_naive_date()?;
        let shifted = match unit.months(amount) {
            Some(months) => shift_months(base, months)?,
            None => match unit {
                CalendarUnit::Week | CalendarUnit::Day => {
                    base.checked_add_signed(unit.delta(amount)?)?
                }
                _ => return None,
            },
        };
        Some(Self::with_precision(
            shifted.year(),
            shifted.month(),
            shifted.day(),
            self.precision,
        ))
    }
}

impl Default for PrecisionDate {
    fn default() -> Self {
        Self::from_ymd(1970, 1, 1)
    }
}

/// A time of day with hour through millisecond precision. Times carry no offset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrecisionTime {
    hour: u32,
    minute: Option<u32>,
    second: Option<u32>,
    millisecond: Option<u32>,
    precision: TimePrecision,
    original_string: Arc<str>,
}

impl PrecisionTime {
    pub fn from_hour(hour: u32) -> Self {
        Self::with_precision(hour, 0, 0, 0, TimePrecision::Hour)
    }

    pub fn from_hm(hour: u32, minute: u32) -> Self {
        Self::with_precision(hour, minute, 0, 0, TimePrecision::HourMinute)
    }

    pub fn from_hms(hour: u32, minute: u32, second: u32) -> Self {
        Self::with_precision(hour, minute, second, 0, TimePrecision::HourMinuteSecond)
    }

    pub fn from_hms_milli(hour: u32, minute: u32, second: u32, millisecond: u32) -> Self {
        Self::with_precision(hour, minute, second, millisecond, TimePrecision::Millisecond)
    }

    fn with_precision(
        hour: u32,
        minute: u32,
        second: u32,
        millisecond: u32,
        precision: TimePrecision,
    ) -> Self {
        let (minute, second, millisecond, text) = match precision {
            TimePrecision::Hour => (None, None, None, format!("{:02}", hour)),
            TimePrecision::HourMinute => {
                (Some(minute), None, None, format!("{:02}:{:02}", hour, minute))
            }
            TimePrecision::HourMinuteSecond => (
                Some(minute),
                Some(second),
                None,
                format!("{:02}:{:02}:{:02}", hour, minute, second),
            ),
            TimePrecision::Millisecond => (
                Some(minute),
                Some(second),
                Some(millisecond),
                format!("{:02}:{:02}:{:02}.{:03}", hour, minute, second, millisecond),
            ),
        };
        Self {
            hour,
            minute,
            second,
            millisecond,
            precision,
            original_string: Arc::from(text),
        }
    }

    pub fn from_naive_time(time: NaiveTime) -> Self {
        Self::from_hms_milli(
            time.hour(),
            time.minute(),
            time.second(),
            time.nanosecond() / 1_000_000 % 1000,
        )
    }

    /// Parses `HH`, `HH:MM`, `HH:MM:SS` or `HH:MM:SS.fff`, with optional `@` and `T` prefixes.
    ///
    /// A timezone suffix is rejected.
    pub fn parse(s: &str) -> Option<Self> {
        let s = s.strip_prefix('@').unwrap_or(s);
        let s = s.strip_prefix('T').unwrap_or(s);
        if s.contains(['+', '-', 'Z']) {
            return None;
        }

        let mut parts = s.split(':');
        let hour = digits(parts.next()?, 2)?;
        let minute = match parts.next() {
            Some(m) => Some(digits(m, 2)?),
            None => None,
        };
        let seconds = parts.next();
        if parts.next().is_some() {
            return None;
        }
        let (second, millisecond) = match seconds {
            None => (None, None),
            Some(text) => match text.split_once('.') {
                None => (Some(digits(text, 2)?), None),
                Some((whole, fraction)) => {
                    if fraction.is_empty() || !fraction.bytes().all(|b| b.is_ascii_digit()) {
                        return None;
                    }
                    let padded = format!("{:0<3}", &fraction[..fraction.len().min(3)]);
                    (Some(digits(whole, 2)?), Some(padded.parse().ok()?))
                }
            },
        };
        if hour > 23 || minute.is_some_and(|m| m > 59) || second.is_some_and(|s| s > 59) {
            return None;
        }
        let precision = match (minute, second, millisecond) {
            (None, _, _) => TimePrecision::Hour,
            (Some(_), None, _) => TimePrecision::HourMinute,
            (Some(_), Some(_), None) => TimePrecision::HourMinuteSecond,
            (Some(_), Some(_), Some(_)) => TimePrecision::Millisecond,
        };
        Some(Self {
            hour,
            minute,
            second,
            millisecond,
            precision,
            original_string: Arc::from(s),
        })
    }

    pub fn precision(&self) -> TimePrecision {
        self.precision
    }

    pub fn temporal_precision(&self) -> TemporalPrecision {
        match self.precision {
            TimePrecision::Hour => TemporalPrecision::Hour,
            TimePrecision::HourMinute => TemporalPrecision::Minute,
            TimePrecision::HourMinuteSecond => TemporalPrecision::Second,
            TimePrecision::Millisecond => TemporalPrecision::Millisecond,
        }
    }

    pub fn original_string(&self) -> &str {
        &self.original_string
    }

    pub fn to_naive_time(&self) -> Option<NaiveTime> {
        NaiveTime::from_hms_milli_opt(
            self.hour,
            self.minute.unwrap_or(0),
            self.second.unwrap_or(0),
            self.millisecond.unwrap_or(0),
        )
    }

    /// Compares two times; seconds and milliseconds count as one precision.
    pub fn compare(&self, other: &Self) -> Option<Ordering> {
        match self.hour.cmp(&other.hour) {
            Ordering::Equal => {}
            decided => return Some(decided),
        }
        match (self.minute, other.minute) {
            (None, None) => return Some(Ordering::Equal),
            (Some(a), Some(b)) if a != b => return Some(a.cmp(&b)),
            (Some(_), Some(_)) => {}
            _ => return None,
        }
        match (self.second, other.second) {
            (None, None) => Some(Ordering::Equal),
            (Some(a), Some(b)) => {
                let left = a * 1000 + self.millisecond.unwrap_or(0);
                let right = b * 1000 + other.millisecond.unwrap_or(0);
                Some(left.cmp(&right))
            }
            _ => None,
        }
    }

    /// Adds a duration of hours or finer, wrapping around midnight.
    pub fn add_duration(&self, amount: i64, unit: CalendarUnit) -> Option<Self> {
        let delta = match unit {
            CalendarUnit::Hour
            | CalendarUnit::Minute
            | CalendarUnit::Second
            | CalendarUnit::Millisecond => unit.delta(amount)?,
            _ => return None,
        };
        let (shifted, _) = self.to_naive_time()?.overflowing_add_signed(delta);
        Some(Self::with_precision(
            shifted.hour(),
            shifted.minute(),
            shifted.second(),
            shifted.nanosecond() / 1_000_000 % 1000,
            self.precision,
        ))
    }
}

impl Default for PrecisionTime {
    fn default() -> Self {
        Self::from_hms(0, 0, 0)
    }
}

/// A date-time with any precision from year to millisecond and an optional offset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrecisionDateTime {
    date: PrecisionDate,
    time: Option<PrecisionTime>,
    /// Offset from UTC in minutes.
    timezone_offset: Option<i32>,
    precision: DateTimePrecision,
    original_string: Arc<str>,
}

impl PrecisionDateTime {
    pub fn from_year(year: i32) -> Self {
        Self::from_precision_date(PrecisionDate::from_year(year))
    }

    pub fn from_year_month(year: i32, month: u32) -> Self {
        Self::from_precision_date(PrecisionDate::from_year_month(year, month))
    }

    pub fn from_date(year: i32, month: u32, day: u32) -> Self {
        Self::from_precision_date(PrecisionDate::from_ymd(year, month, day))
    }

    /// Widens a date into a date-time of the same precision.
    pub fn from_precision_date(date: PrecisionDate) -> Self {
        let precision = match date.precision {
            DatePrecision::Year => DateTimePrecision::Year,
            DatePrecision::YearMonth => DateTimePrecision::YearMonth,
            DatePrecision::Full => DateTimePrecision::Date,
        };
        Self {
            original_string: date.original_string.clone(),
            date,
            time: None,
            timezone_offset: None,
            precision,
        }
    }

    /// Captures a clock reading at millisecond precision.
    pub fn from_fixed_offset(instant: &ChronoDateTime<FixedOffset>) -> Self {
        let naive = instant.naive_local();
        let offset = instant.offset().local_minus_utc() / 60;
        Self::assemble(naive, DateTimePrecision::Full, Some(offset))
    }

    fn assemble(naive: NaiveDateTime, precision: DateTimePrecision, offset: Option<i32>) -> Self {
        let date_precision = match precision {
            DateTimePrecision::Year => DatePrecision::Year,
            DateTimePrecision::YearMonth => DatePrecision::YearMonth,
            _ => DatePrecision::Full,
        };
        let date = PrecisionDate::with_precision(
            naive.year(),
            naive.month(),
            naive.day(),
            date_precision,
        );
        let time_precision = match precision {
            DateTimePrecision::DateHour => Some(TimePrecision::Hour),
            DateTimePrecision::DateHourMinute => Some(TimePrecision::HourMinute),
            DateTimePrecision::DateHourMinuteSecond => Some(TimePrecision::HourMinuteSecond),
            DateTimePrecision::Full => Some(TimePrecision::Millisecond),
            _ => None,
        };
        let time = time_precision.map(|p| {
            PrecisionTime::with_precision(
                naive.hour(),
                naive.minute(),
                naive.second(),
                naive.nanosecond() / 1_000_000 % 1000,
                p,
            )
        });
        let mut text = date.original_string().to_string();
        if let Some(time) = &time {
            text.push('T');
            text.push_str(time.original_string());
            if let Some(minutes) = offset {
                text.push_str(&format_offset(minutes));
            }
        }
        Self {
            date,
            time,
            timezone_offset: if time_precision.is_some() { offset } else { None },
            precision,
            original_string: Arc::from(text),
        }
    }

    /// Parses a date-time literal, preserving precision and offset.
    ///
    /// A trailing `T` with nothing after it (`2019-01-01T`) is accepted.
    pub fn parse(s: &str) -> Option<Self> {
        let s = s.strip_prefix('@').unwrap_or(s);
        let Some((date_part, rest)) = s.split_once('T') else {
            let date = PrecisionDate::parse(s)?;
            return Some(Self::from_precision_date(date));
        };
        let date = PrecisionDate::parse(date_part)?;

        let (time_part, timezone_offset) = if let Some(stripped) = rest.strip_suffix('Z') {
            (stripped, Some(0))
        } else if let Some(pos) = rest.rfind(['+', '-']) {
            let sign = if rest[pos..].starts_with('-') { -1 } else { 1 };
            (&rest[..pos], Some(sign * Self::parse_offset(&rest[pos + 1..])?))
        } else {
            (rest, None)
        };

        if time_part.is_empty() {
            if timezone_offset.is_some() {
                return None;
            }
            let mut widened = Self::from_precision_date(date);
            widened.original_string = Arc::from(s);
            return Some(widened);
        }
        if date.precision != DatePrecision::Full {
            return None;
        }
        let time = PrecisionTime::parse(time_part)?;
        let precision = match time.precision {
            TimePrecision::Hour => DateTimePrecision::DateHour,
            TimePrecision::HourMinute => DateTimePrecision::DateHourMinute,
            TimePrecision::HourMinuteSecond => DateTimePrecision::DateHourMinuteSecond,
            TimePrecision::Millisecond => DateTimePrecision::Full,
        };
        Some(Self {
            date,
            time: Some(time),
            timezone_offset,
            precision,
            original_string: Arc::from(s),
        })
    }

    /// `HH:MM` into minutes.
    fn parse_offset(s: &str) -> Option<i32> {
        let (hours, minutes) = s.split_once(':')?;
        let hours = digits(hours, 2)? as i32;
        let minutes = digits(minutes, 2)? as i32;
        if hours > 14 || minutes > 59 {
            return None;
        }
        Some(hours * 60 + minutes)
    }

    pub fn precision(&self) -> DateTimePrecision {
        self.precision
    }

    pub fn temporal_precision(&self) -> TemporalPrecision {
        match &self.time {
            Some(time) => time.temporal_precision(),
            None => self.date.temporal_precision(),
        }
    }

    pub fn original_string(&self) -> &str {
        &self.original_string
    }

    pub fn date(&self) -> &PrecisionDate {
        &self.date
    }

    pub fn time(&self) -> Option<&PrecisionTime> {
        self.time.as_ref()
    }

    pub fn timezone_offset(&self) -> Option<i32> {
        self.timezone_offset
    }

    pub fn to_naive_datetime(&self) -> Option<NaiveDateTime> {
        let date = self.date.to_naive_date()?;
        let time = match &self.time {
            Some(time) => time.to_naive_time()?,
            None => NaiveTime::from_hms_opt(0, 0, 0)?,
        };
        Some(date.and_time(time))
    }

    /// Normalizes to UTC; a missing offset is read as UTC.
    pub fn to_utc(&self) -> Option<ChronoDateTime<Utc>> {
        let naive = self.to_naive_datetime()?;
        let offset = TimeDelta::try_minutes(i64::from(self.timezone_offset.unwrap_or(0)))?;
        Some(ChronoDateTime::<Utc>::from_naive_utc_and_offset(
            naive.checked_sub_signed(offset)?,
            Utc,
        ))
    }

    /// Compares two date-times considering precision and offsets.
    pub fn compare(&self, other: &Self) -> Option<Ordering> {
        if self.time.is_some() != other.time.is_some() {
            return match self.date.compare(&other.date)? {
                Ordering::Equal => None,
                decided => Some(decided),
            };
        }
        if self.time.is_some() {
            match (self.timezone_offset, other.timezone_offset) {
                (Some(_), Some(_)) => {
                    if !self
                        .temporal_precision()
                        .is_comparable_with(other.temporal_precision())
                    {
                        return None;
                    }
                    return Some(self.to_utc()?.cmp(&other.to_utc()?));
                }
                (None, None) => {}
                _ => return None,
            }
        }
        match self.date.compare(&other.date)? {
            Ordering::Equal => match (&self.time, &other.time) {
                (Some(a), Some(b)) => a.compare(b),
                _ => Some(Ordering::Equal),
            },
            decided => Some(decided),
        }
    }

    /// Adds a calendar duration, keeping this value's precision and offset.
    pub fn add_duration(&self, amount: i64, unit: CalendarUnit) -> Option<Self> {
        let base = self.to_naive_datetime()?;
        let shifted = match unit.months(amount) {
            Some(months) => shift_months(base.date(), months)?.and_time(base.time()),
            None => base.checked_add_signed(unit.delta(amount)?)?,
        };
        Some(Self::assemble(shifted, self.precision, self.timezone_offset))
    }
}

impl Default for PrecisionDateTime {
    fn default() -> Self {
        Self::from_date(1970, 1, 1)
    }
}

impl fmt::Display for PrecisionDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.original_string)
    }
}

impl fmt::Display for PrecisionDateTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.original_string)
    }
}

impl fmt::Display for PrecisionTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.original_string)
    }
}

macro_rules! string_serde {
    ($ty:ty, $expecting:literal) => {
        impl Serialize for $ty {
            fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
            where
                S: Serializer,
            {
                serializer.serialize_str(&self.original_string)
            }
        }

        impl<'de> Deserialize<'de> for $ty {
            fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
            where
                D: Deserializer<'de>,
            {
                let s = String::deserialize(deserializer)?;
                <$ty>::parse(&s)
                    .ok_or_else(|| de::Error::custom(format!("invalid {}: {}", $expecting, s)))
            }
        }
    };
}

string_serde!(PrecisionDate, "date");
string_serde!(PrecisionTime, "time");
string_serde!(PrecisionDateTime, "dateTime");
