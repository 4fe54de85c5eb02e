//! Validation and normalization of raw trip records.
//!
//! Bad rows are dropped, never fatal: a trip archive with a few corrupt lines
//! still produces features from the rest.

use chrono::{DateTime, Duration, NaiveDateTime, Timelike, Utc};
use serde::Deserialize;
use tracing::debug;

/// Station identifier after rounding to an integer.
pub type LocationId = i64;

/// One row of a trip archive, exactly as read. Unknown columns are ignored.
///
/// Older archives use `starttime` / `stoptime` / `start station id` headers;
/// the aliases map them onto the current names.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct RawTrip {
    #[serde(default, alias = "starttime", alias = "Start Time")]
    pub started_at: Option<String>,
    #[serde(default, alias = "stoptime", alias = "Stop Time")]
    pub ended_at: Option<String>,
    #[serde(default, alias = "start station id", alias = "Start Station ID")]
    pub start_station_id: Option<String>,
}

impl RawTrip {
    pub fn new(started_at: &str, ended_at: &str, start_station_id: &str) -> Self {
        Self {
            started_at: Some(started_at.to_string()),
            ended_at: Some(ended_at.to_string()),
            start_station_id: Some(start_station_id.to_string()),
        }
    }
}

/// A validated trip with its pickup hour already derived.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TripEvent {
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub location_id: LocationId,
    pub pickup_hour: DateTime<Utc>,
}

impl TripEvent {
    pub fn duration(&self) -> Duration {
        self.end_time - self.start_time
    }
}

const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%m/%d/%Y %H:%M:%S",
    "%m/%d/%Y %H:%M",
];

const OFFSET_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S%.f%:z", "%Y-%m-%d %H:%M:%S%.f%z"];

fn unquote(raw: &str) -> &str {
    raw.trim().trim_matches('"').trim()
}

/// Parses a trip timestamp into UTC.
///
/// Values carrying an offset are converted; naive values are taken as UTC.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let s = unquote(raw);
    if s.is_empty() {
        return None;
    }

    if let Ok(ts) = DateTime::parse_from_rfc3339(s) {
        return Some(ts.with_timezone(&Utc));
    }
    for fmt in OFFSET_FORMATS {
        if let Ok(ts) = DateTime::parse_from_str(s, fmt) {
            return Some(ts.with_timezone(&Utc));
        }
    }
    NAIVE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
        .map(|naive| naive.and_utc())
}

/// Parses a station identifier, rounding decimal IDs such as `"6140.05"`.
pub fn parse_location_id(raw: &str) -> Option<LocationId> {
    let value: f64 = unquote(raw).parse().ok()?;
    if !value.is_finite() {
        return None;
    }

    let rounded = value.round();
    if rounded < 0.0 || rounded >= i64::MAX as f64 {
        return None;
    }
    Some(rounded as LocationId)
}

/// Floors a timestamp to the start of its hour.
pub fn truncate_to_hour(ts: DateTime<Utc>) -> DateTime<Utc> {
    ts - Duration::minutes(i64::from(ts.minute()))
        - Duration::seconds(i64::from(ts.second()))
        - Duration::nanoseconds(i64::from(ts.nanosecond()))
}

/// Validates a single row. Returns `None` for anything unusable.
pub fn clean_trip(row: &RawTrip, max_duration: Duration) -> Option<TripEvent> {
    let start_time = parse_timestamp(row.started_at.as_deref()?)?;
    let end_time = parse_timestamp(row.ended_at.as_deref()?)?;

    let duration = end_time - start_time;
    if duration <= Duration::zero() || duration > max_duration {
        return None;
    }

    let location_id = parse_location_id(row.start_station_id.as_deref()?)?;

    Some(TripEvent {
        start_time,
        end_time,
        location_id,
        pickup_hour: truncate_to_hour(start_time),
    })
}

/// Keeps only the valid trips, in input order.
pub fn clean_trips<'a, I>(rows: I, max_duration: Duration) -> Vec<TripEvent>
where
    I: IntoIterator<Item = &'a RawTrip>,
{
    let mut seen = 0usize;
    let events: Vec<TripEvent> = rows
        .into_iter()
        .inspect(|_| seen += 1)
        .filter_map(|row| clean_trip(row, max_duration))
        .collect();

    debug!(
        raw_rows = seen,
        kept = events.len(),
        dropped = seen - events.len(),
        "Trip rows cleaned"
    );
    events
}
