//! # Asynx ScheduleSpec
//!
//! Two recurring-schedule forms — a fixed interval (`every N seconds`) and a
//! standard 5-field cron expression — with string round-trip and due-time
//! arithmetic relative to a reference instant.

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ScheduleError {
    #[error("not a recognized schedule string: {0}")]
    UnrecognizedForm(String),

    #[error("interval must be a positive number of seconds, got {0}")]
    NonPositiveInterval(f64),

    #[error("invalid cron expression {0:?}: {1}")]
    InvalidCron(String, String),

    #[error("cron expression must have exactly 5 fields, got {0}")]
    WrongFieldCount(usize),
}

static INTERVAL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^every\s*(\d+\.?\d*|\d*\.?\d+)\s*seconds?$").unwrap());

/// A recurring schedule: either a fixed interval or a 5-field cron
/// expression. Both text forms are kept bit-exact on round-trip
/// (`parse(format(s)) == s`) because the encoded form is persisted.
#[derive(Debug, Clone, PartialEq)]
pub enum ScheduleSpec {
    Interval(f64),
    Cron(CronFields),
}

/// The five whitespace-separated cron fields, kept verbatim as parsed so
/// `format()` reproduces the original spacing-normalized string exactly.
#[derive(Debug, Clone, PartialEq)]
pub struct CronFields {
    pub minute: String,
    pub hour: String,
    pub day_of_month: String,
    pub month_of_year: String,
    pub day_of_week: String,
}

impl CronFields {
    fn to_cron_schedule(&self) -> Result<cron::Schedule, ScheduleError> {
        // The `cron` crate expects a leading seconds field; Asynx's wire
        // format is the standard 5-field form, so a synthetic `0` seconds
        // field is prepended only for this internal computation.
        let six_field = format!(
            "0 {} {} {} {} {}",
            self.minute, self.hour, self.day_of_month, self.month_of_year, self.day_of_week
        );
        cron::Schedule::from_str(&six_field)
            .map_err(|e| ScheduleError::InvalidCron(self.to_string(), e.to_string()))
    }
}

impl fmt::Display for CronFields {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {} {} {}",
            self.minute, self.hour, self.day_of_month, self.month_of_year, self.day_of_week
        )
    }
}

impl ScheduleSpec {
    /// Canonical string form, stored as-is in the task's `schedule` field.
    pub fn format(&self) -> String {
        match self {
            ScheduleSpec::Interval(n) => {
                if n.fract() == 0.0 {
                    format!("every {} seconds", *n as i64)
                } else {
                    format!("every {} seconds", n)
                }
            }
            ScheduleSpec::Cron(fields) => fields.to_string(),
        }
    }

    /// Parse either schedule form from its canonical string.
    pub fn parse(input: &str) -> Result<Self, ScheduleError> {
        let trimmed = input.trim();
        if let Some(caps) = INTERVAL_RE.captures(trimmed) {
            let n: f64 = caps[1].parse().unwrap();
            if n <= 0.0 {
                return Err(ScheduleError::NonPositiveInterval(n));
            }
            return Ok(ScheduleSpec::Interval(n));
        }

        let fields: Vec<&str> = trimmed.split_whitespace().collect();
        if fields.len() == 5 {
            let cron_fields = CronFields {
                minute: fields[0].to_string(),
                hour: fields[1].to_string(),
                day_of_month: fields[2].to_string(),
                month_of_year: fields[3].to_string(),
                day_of_week: fields[4].to_string(),
            };
            // Validate eagerly so a malformed cron string fails at parse
            // time rather than at the next `is_due` call.
            cron_fields.to_cron_schedule()?;
            return Ok(ScheduleSpec::Cron(cron_fields));
        }

        if fields.is_empty() {
            return Err(ScheduleError::UnrecognizedForm(input.to_string()));
        }
        Err(ScheduleError::WrongFieldCount(fields.len()))
    }

    /// Whether the schedule is due relative to `reference`, and the number
    /// of seconds remaining until it is (`0.0` once due).
    pub fn is_due(
        &self,
        reference: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<(bool, f64), ScheduleError> {
        match self {
            ScheduleSpec::Interval(n) => {
                let fire_at = reference + chrono_duration_from_secs_f64(*n);
                let remaining = (fire_at - now).num_milliseconds() as f64 / 1000.0;
                Ok((remaining <= 0.0, remaining.max(0.0)))
            }
            ScheduleSpec::Cron(fields) => {
                let schedule = fields.to_cron_schedule()?;
                let next = schedule
                    .after(&reference)
                    .next()
                    .expect("cron schedules are infinite");
                let remaining = (next - now).num_milliseconds() as f64 / 1000.0;
                Ok((remaining <= 0.0, remaining.max(0.0)))
            }
        }
    }
}

fn chrono_duration_from_secs_f64(secs: f64) -> chrono::Duration {
    chrono::Duration::milliseconds((secs * 1000.0).round() as i64)
}

impl fmt::Display for ScheduleSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.format())
    }
}

impl FromStr for ScheduleSpec {
    type Err = ScheduleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ScheduleSpec::parse(s)
    }
}

impl Serialize for ScheduleSpec {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.format())
    }
}

impl<'de> Deserialize<'de> for ScheduleSpec {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct ScheduleVisitor;
        impl<'de> Visitor<'de> for ScheduleVisitor {
            type Value = ScheduleSpec;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("an `every N seconds` or 5-field cron string")
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
                ScheduleSpec::parse(v).map_err(de::Error::custom)
            }
        }
        deserializer.deserialize_str(ScheduleVisitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn interval_round_trips() {
        let s = ScheduleSpec::parse("every 30 seconds").unwrap();
        assert_eq!(s.format(), "every 30 seconds");
        let s2 = ScheduleSpec::parse("every2.5seconds").unwrap();
        assert_eq!(s2, ScheduleSpec::Interval(2.5));
    }

    #[test]
    fn interval_rejects_non_positive() {
        assert!(ScheduleSpec::parse("every 0 seconds").is_err());
    }

    #[test]
    fn cron_round_trips() {
        let s = ScheduleSpec::parse("*/5 * * * *").unwrap();
        assert_eq!(s.format(), "*/5 * * * *");
    }

    #[test]
    fn cron_rejects_wrong_field_count() {
        assert!(ScheduleSpec::parse("* * * *").is_err());
    }

    #[test]
    fn interval_is_due_arithmetic() {
        let reference = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let s = ScheduleSpec::Interval(10.0);
        let not_yet = reference + chrono::Duration::seconds(3);
        let (due, remaining) = s.is_due(reference, not_yet).unwrap();
        assert!(!due);
        assert!((remaining - 7.0).abs() < 0.01);

        let past_due = reference + chrono::Duration::seconds(11);
        let (due, remaining) = s.is_due(reference, past_due).unwrap();
        assert!(due);
        assert_eq!(remaining, 0.0);
    }

    #[test]
    fn cron_is_due_arithmetic() {
        // Fires at minute 0 of every hour.
        let s = ScheduleSpec::parse("0 * * * *").unwrap();
        let reference = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let now = Utc.with_ymd_and_hms(2026, 1, 1, 0, 30, 0).unwrap();
        let (due, remaining) = s.is_due(reference, now).unwrap();
        assert!(!due);
        assert!((remaining - 1800.0).abs() < 1.0);
    }
}
