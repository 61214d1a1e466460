use chrono::{DateTime, Days, NaiveDate, TimeZone};
use serde::Serialize;

pub const MINUTES_PER_DAY: u32 = 24 * 60;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GridError {
    InvalidInterval(u32),
    InvalidHour(u32),
}

impl std::fmt::Display for GridError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GridError::InvalidInterval(value) => {
                write!(f, "slot interval must be positive, got {value}")
            }
            GridError::InvalidHour(value) => write!(f, "hour out of range 0..=24: {value}"),
        }
    }
}

impl std::error::Error for GridError {}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TimeParseError {
    Clock(String),
    DateKey(String),
}

impl std::fmt::Display for TimeParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TimeParseError::Clock(input) => write!(f, "invalid HH:MM time: {input:?}"),
            TimeParseError::DateKey(input) => write!(f, "invalid YYYY-MM-DD date: {input:?}"),
        }
    }
}

impl std::error::Error for TimeParseError {}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeSlot {
    /// 12-hour display label, e.g. `6:30 AM`.
    pub time: String,
    /// Zero-padded 24-hour key, e.g. `06:30`.
    pub value: String,
    pub minutes_since_midnight: u32,
}

impl TimeSlot {
    fn at(minutes: u32) -> Self {
        Self {
            time: format_clock_12h(minutes),
            value: minutes_to_time(minutes),
            minutes_since_midnight: minutes,
        }
    }
}

/// Slots from `start_hour:00` (inclusive) to `end_hour:00` (exclusive).
///
/// A zero interval is rejected; `start_hour >= end_hour` is an empty grid.
pub fn generate_slots(
    start_hour: u32,
    end_hour: u32,
    interval_minutes: u32,
) -> Result<Vec<TimeSlot>, GridError> {
    if interval_minutes == 0 {
        return Err(GridError::InvalidInterval(interval_minutes));
    }
    for hour in [start_hour, end_hour] {
        if hour > 24 {
            return Err(GridError::InvalidHour(hour));
        }
    }
    if start_hour >= end_hour {
        return Ok(Vec::new());
    }
    let slots = (start_hour * 60..end_hour * 60)
        .step_by(interval_minutes as usize)
        .map(TimeSlot::at)
        .collect();
    Ok(slots)
}

/// A validated grid configuration together with its slots.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimeGrid {
    start_hour: u32,
    end_hour: u32,
    interval_minutes: u32,
    slots: Vec<TimeSlot>,
}

impl TimeGrid {
    pub fn new(start_hour: u32, end_hour: u32, interval_minutes: u32) -> Result<Self, GridError> {
        let slots = generate_slots(start_hour, end_hour, interval_minutes)?;
        Ok(Self {
            start_hour,
            end_hour,
            interval_minutes,
            slots,
        })
    }

    pub fn start_hour(&self) -> u32 {
        self.start_hour
    }

    pub fn end_hour(&self) -> u32 {
        self.end_hour
    }

    pub fn start_minutes(&self) -> u32 {
        self.start_hour * 60
    }

    pub fn interval_minutes(&self) -> u32 {
        self.interval_minutes
    }

    pub fn slots(&self) -> &[TimeSlot] {
        &self.slots
    }

    pub fn slot(&self, index: usize) -> Option<&TimeSlot> {
        self.slots.get(index)
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

/// Parses a strict `HH:MM` (two digits each, 24-hour clock).
pub fn time_to_minutes(value: &str) -> Result<u32, TimeParseError> {
    let invalid = || TimeParseError::Clock(value.to_string());
    if value.len() != 5 || value.as_bytes()[2] != b':' {
        return Err(invalid());
    }
    let hours = value.get(0..2).and_then(two_digits).ok_or_else(invalid)?;
    let minutes = value.get(3..5).and_then(two_digits).ok_or_else(invalid)?;
    if hours >= 24 || minutes >= 60 {
        return Err(invalid());
    }
    Ok(hours * 60 + minutes)
}

fn two_digits(field: &str) -> Option<u32> {
    if field.bytes().all(|b| b.is_ascii_digit()) {
        field.parse().ok()
    } else {
        None
    }
}

/// Inverse of [`time_to_minutes`]. Values past midnight wrap around.
pub fn minutes_to_time(minutes: u32) -> String {
    let minutes = minutes % MINUTES_PER_DAY;
    format!("{:02}:{:02}", minutes / 60, minutes % 60)
}

pub fn format_clock_12h(minutes: u32) -> String {
    let minutes = minutes % MINUTES_PER_DAY;
    let hours = minutes / 60;
    let suffix = if hours >= 12 { "PM" } else { "AM" };
    let display_hours = match hours % 12 {
        0 => 12,
        h => h,
    };
    format!("{display_hours}:{:02} {suffix}", minutes % 60)
}

/// Signed minutes from `start` to `end`, both `HH:MM`.
pub fn minutes_between(start: &str, end: &str) -> Result<i64, TimeParseError> {
    let start = time_to_minutes(start)?;
    let end = time_to_minutes(end)?;
    Ok(i64::from(end) - i64::from(start))
}

/// `YYYY-MM-DD` from the calendar fields of `date`.
pub fn date_key(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

pub fn parse_date_key(value: &str) -> Result<NaiveDate, TimeParseError> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d")
        .map_err(|_| TimeParseError::DateKey(value.to_string()))
}

/// Date key of the wall-clock day `now` falls on in its own time zone.
pub fn today_key<Tz: TimeZone>(now: &DateTime<Tz>) -> String {
    date_key(now.date_naive())
}

pub fn add_calendar_days(date: NaiveDate, days: i64) -> Option<NaiveDate> {
    if days >= 0 {
        date.checked_add_days(Days::new(days.unsigned_abs()))
    } else {
        date.checked_sub_days(Days::new(days.unsigned_abs()))
    }
}

/// Header label such as `Friday, Oct 16`.
pub fn format_day_heading(date: NaiveDate) -> String {
    date.format("%A, %b %-d").to_string()
}
