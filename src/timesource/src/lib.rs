//! # Asynx TimeSource
//!
//! Wall-clock access and naive-timestamp localization. Kept behind a trait
//! so tests can freeze time instead of racing the system clock.

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TimeSourceError {
    #[error("unknown timezone: {0}")]
    UnknownZone(String),

    #[error("ambiguous or invalid local time while localizing {0}")]
    AmbiguousLocalTime(NaiveDateTime),
}

/// Clock + localization abstraction. `now_utc` is the sole source of "now"
/// used throughout the queue, so tests can substitute a fixed clock.
pub trait TimeSource: Send + Sync {
    fn now_utc(&self) -> DateTime<Utc>;

    /// Localize a naive timestamp using `zone`, then normalize to UTC.
    fn localize(
        &self,
        naive: NaiveDateTime,
        zone: &Tz,
    ) -> Result<DateTime<Utc>, TimeSourceError> {
        match zone.from_local_datetime(&naive) {
            chrono::LocalResult::Single(dt) => Ok(dt.with_timezone(&Utc)),
            chrono::LocalResult::Ambiguous(dt, _) => Ok(dt.with_timezone(&Utc)),
            chrono::LocalResult::None => Err(TimeSourceError::AmbiguousLocalTime(naive)),
        }
    }
}

/// Resolve an IANA timezone name (e.g. `"America/New_York"`) to a [`Tz`].
pub fn parse_zone(name: &str) -> Result<Tz, TimeSourceError> {
    name.parse::<Tz>()
        .map_err(|_| TimeSourceError::UnknownZone(name.to_string()))
}

/// Default [`TimeSource`] backed by the system clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemTimeSource;

impl TimeSource for SystemTimeSource {
    fn now_utc(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Fixed-clock [`TimeSource`] for deterministic tests.
#[derive(Debug, Clone)]
pub struct FixedTimeSource {
    pub now: std::sync::Arc<std::sync::Mutex<DateTime<Utc>>>,
}

impl FixedTimeSource {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now: std::sync::Arc::new(std::sync::Mutex::new(now)),
        }
    }

    pub fn advance(&self, duration: chrono::Duration) {
        let mut guard = self.now.lock().unwrap();
        *guard = *guard + duration;
    }

    pub fn set(&self, now: DateTime<Utc>) {
        *self.now.lock().unwrap() = now;
    }
}

impl TimeSource for FixedTimeSource {
    fn now_utc(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn localizes_naive_to_utc() {
        let src = SystemTimeSource;
        let zone = parse_zone("America/New_York").unwrap();
        let naive = NaiveDate::from_ymd_opt(2026, 7, 30)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap();
        let utc = src.localize(naive, &zone).unwrap();
        // America/New_York is UTC-4 in July (EDT).
        assert_eq!(utc.naive_utc().hour_diff(&naive), 4);
    }

    trait HourDiff {
        fn hour_diff(&self, other: &NaiveDateTime) -> i64;
    }

    impl HourDiff for NaiveDateTime {
        fn hour_diff(&self, other: &NaiveDateTime) -> i64 {
            (*self - *other).num_hours()
        }
    }

    #[test]
    fn unknown_zone_errors() {
        assert!(parse_zone("Not/AZone").is_err());
    }

    #[test]
    fn fixed_time_source_advances() {
        let start = Utc::now();
        let src = FixedTimeSource::new(start);
        src.advance(chrono::Duration::seconds(5));
        assert_eq!(src.now_utc(), start + chrono::Duration::seconds(5));
    }
}
